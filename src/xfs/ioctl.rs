//! Control-call adapter: the only place a bulk request turns into raw
//! pointers handed to the kernel.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::abi;
use super::error::{BulkstatError, Result};

/// The three members of the bulk ioctl family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkOp {
    /// `XFS_IOC_FSBULKSTAT`: stat records for inodes after the cursor
    Bulkstat,
    /// `XFS_IOC_FSBULKSTAT_SINGLE`: stat record for exactly the cursor inode
    BulkstatSingle,
    /// `XFS_IOC_FSINUMBERS`: allocation chunks after the cursor
    Inumbers,
}

impl BulkOp {
    pub fn opcode(self) -> u32 {
        match self {
            BulkOp::Bulkstat => abi::XFS_IOC_FSBULKSTAT,
            BulkOp::BulkstatSingle => abi::XFS_IOC_FSBULKSTAT_SINGLE,
            BulkOp::Inumbers => abi::XFS_IOC_FSINUMBERS,
        }
    }
}

impl fmt::Display for BulkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BulkOp::Bulkstat => "FSBULKSTAT",
            BulkOp::BulkstatSingle => "FSBULKSTAT_SINGLE",
            BulkOp::Inumbers => "FSINUMBERS",
        })
    }
}

/// One request block, borrowed for a single control call.
///
/// The kernel may rewrite `lastip` (the resume cursor), fills `buffer` with
/// up to `icount` records and stores how many it wrote in `ocount`.
#[derive(Debug)]
pub struct BulkRequest<'a> {
    pub lastip: &'a mut u64,
    pub icount: i32,
    pub buffer: &'a mut [u8],
    pub ocount: &'a mut i32,
}

/// An open volume that can service bulk control calls.
///
/// Dropping the handle releases it.
pub trait ControlHandle {
    fn bulk_request(&mut self, op: BulkOp, request: BulkRequest<'_>) -> io::Result<()>;
}

/// Read-only handle on a mounted XFS volume (mount point or any path in it).
#[derive(Debug)]
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub struct XfsVolume {
    file: File,
    path: PathBuf,
}

impl XfsVolume {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(target_os = "linux")]
impl XfsVolume {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| BulkstatError::Open {
            path: path.clone(),
            source,
        })?;

        let fs_type = fs_magic(&file).map_err(|source| BulkstatError::Open {
            path: path.clone(),
            source,
        })?;
        if fs_type != abi::XFS_SUPER_MAGIC {
            return Err(BulkstatError::NotXfs { path, fs_type });
        }

        tracing::debug!("Opened XFS volume handle on {}", path.display());
        Ok(Self { file, path })
    }
}

#[cfg(target_os = "linux")]
fn fs_magic(file: &File) -> io::Result<i64> {
    use std::mem::MaybeUninit;
    use std::os::fd::AsRawFd;

    let mut buf = MaybeUninit::<libc::statfs>::zeroed();
    let rc = unsafe { libc::fstatfs(file.as_raw_fd(), buf.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let st = unsafe { buf.assume_init() };
    Ok(st.f_type as i64)
}

#[cfg(target_os = "linux")]
impl ControlHandle for XfsVolume {
    fn bulk_request(&mut self, op: BulkOp, request: BulkRequest<'_>) -> io::Result<()> {
        use std::os::fd::AsRawFd;

        let mut req = abi::FsopBulkreq::new(
            request.lastip,
            request.icount,
            request.buffer,
            request.ocount,
        );
        // SAFETY: `req` points at three live exclusive borrows, and `buffer`
        // holds at least `icount` records of the size the opcode implies.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                op.opcode() as _,
                &mut req as *mut abi::FsopBulkreq<'_>,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

// ─── Non-Linux stubs ────────────────────────────────────────────────────────

#[cfg(not(target_os = "linux"))]
impl XfsVolume {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tracing::warn!("XFS bulkstat is only available on Linux");
        Err(BulkstatError::Unsupported { path })
    }
}

#[cfg(not(target_os = "linux"))]
impl ControlHandle for XfsVolume {
    fn bulk_request(&mut self, _op: BulkOp, _request: BulkRequest<'_>) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
