// Public library interface for xfs-bulkstat
// The scan CLI and the layout validator both build on these modules

pub mod scanner;
pub mod xfs;
