//! XFS bulkstat: walk every inode of a mounted volume without touching the
//! directory tree.
//!
//! ```no_run
//! use xfs_bulkstat::xfs::{BulkOptions, Bulkstat, XfsVolume};
//!
//! let mut req = Bulkstat::<XfsVolume>::open("/mnt/data", BulkOptions::default())?;
//! loop {
//!     let batch = req.next()?;
//!     if batch.is_empty() {
//!         break;
//!     }
//!     for stat in &batch {
//!         println!("{} {:o} {}", stat.ino, stat.mode, stat.size);
//!     }
//! }
//! req.release();
//! # Ok::<(), xfs_bulkstat::xfs::BulkstatError>(())
//! ```

pub mod abi;
pub mod bulkreq;
pub mod error;
pub mod ioctl;
pub mod types;

#[cfg(test)]
pub(crate) mod sim;

pub use bulkreq::{BulkOptions, BulkReq, Bulkstat, Inumbers, Records, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
pub use error::{BulkstatError, DecodeError, LayoutMismatch};
pub use ioctl::{BulkOp, BulkRequest, ControlHandle, XfsVolume};
pub use types::{
    decode, decode_records, encode_records, verify_layout, BsTime, BulkRecord, FileType,
    InodeGroup, InodeStat, XFlags,
};
