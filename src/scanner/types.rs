use std::path::PathBuf;

use crate::xfs::{FileType, InodeStat};

/// Running totals for one whole-volume bulkstat pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Inodes returned across all batches
    pub inodes: u64,
    pub dirs: u64,
    /// Regular files
    pub files: u64,
    pub symlinks: u64,
    /// Devices, FIFOs, sockets and anything with an unrecognised mode
    pub other: u64,
    /// Sum of `bs_size` over regular files
    pub total_bytes: u64,
    /// Sum of `bs_blocks` (512-byte units) over every inode
    pub total_blocks: u64,
    /// Non-empty control calls issued
    pub batches: u64,
    /// Largest inode number seen
    pub highest_ino: u64,
    pub elapsed_ms: u64,
}

impl ScanSummary {
    pub fn record(&mut self, stat: &InodeStat) {
        self.inodes += 1;
        match stat.file_type() {
            FileType::Directory => self.dirs += 1,
            FileType::Regular => {
                self.files += 1;
                self.total_bytes = self.total_bytes.saturating_add(stat.size.max(0) as u64);
            }
            FileType::Symlink => self.symlinks += 1,
            _ => self.other += 1,
        }
        self.total_blocks = self.total_blocks.saturating_add(stat.blocks.max(0) as u64);
        self.highest_ino = self.highest_ino.max(stat.ino);
    }
}

/// Progress updates emitted during a scan.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    /// Enumeration bound to a volume
    Started { root: PathBuf, batch_size: u32 },
    /// One non-empty batch consumed
    Batch {
        batch: u64,
        inodes_scanned: u64,
        cursor: u64,
    },
    /// Volume exhausted
    Completed(ScanSummary),
    /// Scan aborted
    Error { path: PathBuf, message: String },
}
