use std::marker::PhantomData;
use std::path::Path;
use std::vec;

use super::error::{BulkstatError, DecodeError, Result};
use super::ioctl::{BulkOp, BulkRequest, ControlHandle, XfsVolume};
use super::types::{decode_records, BulkRecord, InodeGroup, InodeStat};

/// Records requested per control call unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: u32 = 4096;

/// Largest batch accepted at construction (about 136 MiB of bstat records).
/// The kernel takes larger requests, but a buffer that size is almost
/// certainly a caller bug, so it is rejected up front.
pub const MAX_BATCH_SIZE: u32 = 1 << 20;

/// Construction-time options for a [`BulkReq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Resume strictly after this inode number (0 = from the beginning)
    pub start_ino: u64,
    /// Records requested per control call
    pub batch_size: u32,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            start_ino: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BulkOptions {
    pub fn with_start_ino(mut self, start_ino: u64) -> Self {
        self.start_ino = start_ino;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(BulkstatError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }
}

/// Resumable enumeration over one of the bulk ioctls.
///
/// Each [`next`](Self::next) issues exactly one control call. The cursor only
/// moves after a batch decodes cleanly, so a failed call can be retried as
/// is. Once a call comes back empty the enumeration is exhausted and every
/// later call returns an empty batch without touching the kernel.
///
/// `next` mutates the cursor in place, so concurrent callers need their own
/// enumerator (each with its own handle) or external locking.
pub struct BulkReq<H: ControlHandle, R: BulkRecord = InodeStat> {
    handle: H,
    cursor: u64,
    batch_size: u32,
    exhausted: bool,
    batches: u64,
    _record: PhantomData<fn() -> R>,
}

/// Walks `xfs_bstat` records.
pub type Bulkstat<H = XfsVolume> = BulkReq<H, InodeStat>;

/// Walks `xfs_inogrp` allocation chunks.
pub type Inumbers<H = XfsVolume> = BulkReq<H, InodeGroup>;

impl<R: BulkRecord> BulkReq<XfsVolume, R> {
    /// Open `path` read-only and bind a fresh enumeration to it.
    pub fn open(path: impl AsRef<Path>, options: BulkOptions) -> Result<Self> {
        options.validate()?;
        let volume = XfsVolume::open(path.as_ref())?;
        tracing::info!(
            "{} on {} (start after ino {}, batch {})",
            R::OP,
            volume.path().display(),
            options.start_ino,
            options.batch_size
        );
        Self::with_handle(volume, options)
    }
}

impl<H: ControlHandle, R: BulkRecord> BulkReq<H, R> {
    /// Bind an enumeration to an already-open handle. On error the handle
    /// is dropped (and so released) before returning.
    pub fn with_handle(handle: H, options: BulkOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            handle,
            cursor: options.start_ino,
            batch_size: options.batch_size,
            exhausted: false,
            batches: 0,
            _record: PhantomData,
        })
    }

    /// Last inode number returned; the next batch starts strictly after it.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Non-empty batches returned so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Fetch the next batch. Empty means the volume is exhausted; errors
    /// never masquerade as an empty batch.
    pub fn next(&mut self) -> Result<Vec<R>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let capacity = self.batch_size as usize;
        let mut buffer = vec![0u8; capacity * R::SIZE];
        let mut lastip = self.cursor;
        let mut ocount: i32 = 0;

        self.handle
            .bulk_request(
                R::OP,
                BulkRequest {
                    lastip: &mut lastip,
                    icount: self.batch_size as i32,
                    buffer: &mut buffer,
                    ocount: &mut ocount,
                },
            )
            .map_err(|source| BulkstatError::ControlCall { op: R::OP, source })?;

        let records = reported_count(ocount, capacity)
            .and_then(|count| decode_records::<R>(&buffer, count))
            .map_err(|source| BulkstatError::Decode { op: R::OP, source })?;

        let Some(last) = records.last() else {
            tracing::debug!("{} exhausted after ino {}", R::OP, self.cursor);
            self.exhausted = true;
            return Ok(records);
        };

        // The kernel rewrites lastip in place; fall back to the last record
        // for handles that leave it alone.
        let cursor = if lastip != self.cursor {
            lastip
        } else {
            last.resume_key().ok_or(BulkstatError::Decode {
                op: R::OP,
                source: DecodeError::CursorOverflow { after: self.cursor },
            })?
        };
        self.cursor = cursor;
        self.batches += 1;

        tracing::debug!(
            "{} batch {}: {} records, cursor now {}",
            R::OP,
            self.batches,
            records.len(),
            self.cursor
        );
        Ok(records)
    }

    /// Iterate records one at a time across batch boundaries. Stops after
    /// exhaustion or the first error.
    pub fn records(&mut self) -> Records<'_, H, R> {
        Records {
            req: self,
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Release the volume handle. Consumes the enumeration, so it cannot be
    /// used afterwards.
    pub fn release(self) {
        tracing::debug!(
            "Releasing {} handle after {} batches (cursor {})",
            R::OP,
            self.batches,
            self.cursor
        );
        drop(self.handle);
    }
}

impl<H: ControlHandle> BulkReq<H, InodeStat> {
    /// Stat exactly one inode with `FSBULKSTAT_SINGLE`. Leaves the
    /// enumeration cursor alone.
    pub fn stat_one(&mut self, ino: u64) -> Result<InodeStat> {
        const OP: BulkOp = BulkOp::BulkstatSingle;

        let mut buffer = vec![0u8; InodeStat::SIZE];
        let mut lastip = ino;
        let mut ocount: i32 = 0;

        self.handle
            .bulk_request(
                OP,
                BulkRequest {
                    lastip: &mut lastip,
                    icount: 1,
                    buffer: &mut buffer,
                    ocount: &mut ocount,
                },
            )
            .map_err(|source| BulkstatError::ControlCall { op: OP, source })?;

        // Older kernels do not report a count for the single variant.
        decode_records::<InodeStat>(&buffer, 1)
            .map(|mut records| records.remove(0))
            .map_err(|source| BulkstatError::Decode { op: OP, source })
    }
}

fn reported_count(ocount: i32, capacity: usize) -> std::result::Result<usize, DecodeError> {
    let count = usize::try_from(ocount).map_err(|_| DecodeError::NegativeCount(ocount))?;
    if count > capacity {
        return Err(DecodeError::CountOverflow { count, capacity });
    }
    Ok(count)
}

/// Record-at-a-time view of a [`BulkReq`].
pub struct Records<'a, H: ControlHandle, R: BulkRecord> {
    req: &'a mut BulkReq<H, R>,
    pending: vec::IntoIter<R>,
    done: bool,
}

impl<H: ControlHandle, R: BulkRecord> Iterator for Records<'_, H, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.req.next() {
                Ok(batch) if batch.is_empty() => {
                    self.done = true;
                    return None;
                }
                Ok(batch) => self.pending = batch.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<H: ControlHandle, R: BulkRecord> std::iter::FusedIterator for Records<'_, H, R> {}
