use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::ioctl::BulkOp;

/// A returned byte block that does not line up with the record layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("kernel reported a negative record count ({0})")]
    NegativeCount(i32),
    #[error("kernel reported {count} records but only {capacity} were requested")]
    CountOverflow { count: usize, capacity: usize },
    #[error("{count} records of {record_size} bytes need {needed} bytes, buffer holds {available}")]
    Truncated {
        count: usize,
        record_size: usize,
        needed: usize,
        available: usize,
    },
    #[error("last record after cursor {after} has no inode number to resume from")]
    CursorOverflow { after: u64 },
}

#[derive(Debug, Error)]
pub enum BulkstatError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not on an XFS filesystem (f_type {fs_type:#x})", .path.display())]
    NotXfs { path: PathBuf, fs_type: i64 },
    #[error("bulkstat is only available on Linux ({})", .path.display())]
    Unsupported { path: PathBuf },
    #[error("batch size {0} out of range (1..={max})", max = super::bulkreq::MAX_BATCH_SIZE)]
    InvalidBatchSize(u32),
    #[error("{op} control call failed: {source}")]
    ControlCall {
        op: BulkOp,
        #[source]
        source: io::Error,
    },
    #[error("malformed {op} response: {source}")]
    Decode {
        op: BulkOp,
        #[source]
        source: DecodeError,
    },
}

impl BulkstatError {
    /// True for every failure to acquire a usable volume handle.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::NotXfs { .. } | Self::Unsupported { .. }
        )
    }

    /// Raw errno of a failed control call, if that is what this is.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ControlCall { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BulkstatError>;

/// The startup self-check found a field away from its kernel ABI offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("xfs_bstat layout mismatch: {field} not at byte offset {offset}")]
pub struct LayoutMismatch {
    pub field: &'static str,
    pub offset: usize,
}
