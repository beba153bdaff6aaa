//! In-memory XFS volume that answers bulk control calls the way the kernel
//! does, for exercising the enumerator without a real mount.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use super::abi::XFS_INODES_PER_CHUNK;
use super::ioctl::{BulkOp, BulkRequest, ControlHandle};
use super::types::{BsTime, BulkRecord, InodeGroup, InodeStat};

#[derive(Debug, Default)]
struct SimState {
    calls: usize,
    closes: usize,
    fail_next: Option<i32>,
    count_override: Option<i32>,
}

/// Simulated volume handle. Dropping it counts as one close.
#[derive(Debug)]
pub(crate) struct SimVolume {
    inodes: Rc<Vec<InodeStat>>,
    state: Rc<RefCell<SimState>>,
    update_cursor: bool,
}

/// Observer sharing a [`SimVolume`]'s counters after the volume has been
/// handed to an enumerator.
#[derive(Debug, Clone)]
pub(crate) struct SimProbe {
    inodes: Rc<Vec<InodeStat>>,
    state: Rc<RefCell<SimState>>,
}

/// Sparse, strictly increasing inode numbers starting at a typical root ino.
fn sim_ino(i: usize) -> u64 {
    let i = i as u64;
    128 + i * 2 + (i / 10) * 5
}

fn sim_stat(i: usize) -> InodeStat {
    let mode = match i % 10 {
        0 => 0o040755,
        9 => 0o120777,
        _ => 0o100644,
    };
    InodeStat {
        ino: sim_ino(i),
        mode,
        nlink: 1,
        uid: 1000 + (i % 3) as u32,
        gid: 100,
        blksize: 4096,
        size: (i as i64) * 100,
        mtime: BsTime { sec: 1_600_000_000 + i as i64, nsec: 0 },
        blocks: (i as i64) * 100 / 512,
        extents: 1,
        gen: i as u32,
        ..Default::default()
    }
}

impl SimVolume {
    pub(crate) fn with_inodes(count: usize) -> Self {
        Self {
            inodes: Rc::new((0..count).map(sim_stat).collect()),
            state: Rc::default(),
            update_cursor: true,
        }
    }

    /// Behave like a handle that never writes the cursor cell back.
    pub(crate) fn without_cursor_update(mut self) -> Self {
        self.update_cursor = false;
        self
    }

    pub(crate) fn inode_numbers(&self) -> Vec<u64> {
        self.inodes.iter().map(|s| s.ino).collect()
    }

    pub(crate) fn probe(&self) -> SimProbe {
        SimProbe {
            inodes: Rc::clone(&self.inodes),
            state: Rc::clone(&self.state),
        }
    }

    fn write_batch<R: BulkRecord>(
        request: &mut BulkRequest<'_>,
        records: &[R],
        update_cursor: bool,
    ) -> io::Result<()> {
        let n = records.len().min(request.icount.max(0) as usize);
        let records = &records[..n];
        if request.buffer.len() < n * R::SIZE {
            return Err(io::Error::from_raw_os_error(libc::EFAULT));
        }
        for (record, frame) in records.iter().zip(request.buffer.chunks_exact_mut(R::SIZE)) {
            record.encode_frame(frame);
        }
        if let (true, Some(key)) = (update_cursor, records.last().and_then(R::resume_key)) {
            *request.lastip = key;
        }
        *request.ocount = n as i32;
        Ok(())
    }
}

fn group_inodes(inodes: &[InodeStat]) -> Vec<InodeGroup> {
    let mut groups: Vec<InodeGroup> = Vec::new();
    for stat in inodes {
        let startino = stat.ino - stat.ino % XFS_INODES_PER_CHUNK;
        let bit = 1u64 << (stat.ino - startino);
        match groups.last_mut() {
            Some(g) if g.startino == startino => {
                g.alloccount += 1;
                g.allocmask |= bit;
            }
            _ => groups.push(InodeGroup { startino, alloccount: 1, allocmask: bit }),
        }
    }
    groups
}

impl ControlHandle for SimVolume {
    fn bulk_request(&mut self, op: BulkOp, mut request: BulkRequest<'_>) -> io::Result<()> {
        let (fail, override_count) = {
            let mut state = self.state.borrow_mut();
            state.calls += 1;
            (state.fail_next.take(), state.count_override.take())
        };
        if let Some(errno) = fail {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if request.icount <= 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let after = *request.lastip;
        match op {
            BulkOp::Bulkstat => {
                let start = self.inodes.partition_point(|s| s.ino <= after);
                Self::write_batch(&mut request, &self.inodes[start..], self.update_cursor)?;
            }
            BulkOp::BulkstatSingle => {
                let Ok(idx) = self.inodes.binary_search_by_key(&after, |s| s.ino) else {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                };
                Self::write_batch(&mut request, &self.inodes[idx..=idx], false)?;
            }
            BulkOp::Inumbers => {
                let groups = group_inodes(&self.inodes);
                let start = groups.partition_point(|g| g.startino <= after);
                Self::write_batch(&mut request, &groups[start..], self.update_cursor)?;
            }
        }

        if let Some(count) = override_count {
            *request.ocount = count;
        }
        Ok(())
    }
}

impl Drop for SimVolume {
    fn drop(&mut self) {
        self.state.borrow_mut().closes += 1;
    }
}

impl SimProbe {
    pub(crate) fn calls(&self) -> usize {
        self.state.borrow().calls
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    /// Fail the next control call with `errno`.
    pub(crate) fn fail_next_call(&self, errno: i32) {
        self.state.borrow_mut().fail_next = Some(errno);
    }

    /// Make the next control call report `count` records regardless of how
    /// many it wrote.
    pub(crate) fn report_count_next_call(&self, count: i32) {
        self.state.borrow_mut().count_override = Some(count);
    }

    pub(crate) fn inode_groups(&self) -> Vec<InodeGroup> {
        group_inodes(&self.inodes)
    }
}
