//! Raw XFS bulkstat ABI, as laid out by `xfs_fs.h` on 64-bit Linux.
//!
//! Everything that crosses the ioctl boundary lives here. The record
//! structs are `Pod` only because every hole the C compiler would insert is
//! spelled out as an explicit field; the asserts at the bottom pin each
//! size against the pahole dumps of the kernel headers.

use std::marker::PhantomData;
use std::mem;

use bytemuck::{Pod, Zeroable};

/// `_IOWR('X', 101, struct xfs_fsop_bulkreq)`
pub const XFS_IOC_FSBULKSTAT: u32 = 0xc020_5865;
/// `_IOWR('X', 102, struct xfs_fsop_bulkreq)`
pub const XFS_IOC_FSBULKSTAT_SINGLE: u32 = 0xc020_5866;
/// `_IOWR('X', 103, struct xfs_fsop_bulkreq)`
pub const XFS_IOC_FSINUMBERS: u32 = 0xc020_5867;

/// `statfs.f_type` of an XFS mount.
pub const XFS_SUPER_MAGIC: i64 = 0x5846_5342;

/// `sizeof(struct xfs_bstat)`. Hardcoded from the kernel headers, not summed
/// from the fields: the 4-byte hole after `bs_blksize` is not a field in C.
pub const BSTAT_SIZE: usize = 136;

/// `sizeof(struct xfs_inogrp)`, again including a 4-byte hole.
pub const INOGRP_SIZE: usize = 24;

/// `sizeof(struct xfs_fsop_bulkreq)` on 64-bit targets.
pub const BULKREQ_SIZE: usize = 32;

/// Inodes covered by one inode chunk (`XFS_INODES_PER_CHUNK`).
pub const XFS_INODES_PER_CHUNK: u64 = 64;

/// `struct xfs_bstime`
///
/// ```text
/// time_t  tv_sec;    //  0  8
/// __s32   tv_nsec;   //  8  4
/// // padding: 4
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawBstime {
    pub tv_sec: i64,
    pub tv_nsec: i32,
    pub _pad: u32,
}

/// `struct xfs_bstat`
///
/// ```text
/// __u64         bs_ino;        //   0   8
/// __u16         bs_mode;       //   8   2
/// __u16         bs_nlink;      //  10   2
/// __u32         bs_uid;        //  12   4
/// __u32         bs_gid;        //  16   4
/// __u32         bs_rdev;       //  20   4
/// __s32         bs_blksize;    //  24   4
/// // XXX 4 bytes hole
/// __s64         bs_size;       //  32   8
/// xfs_bstime_t  bs_atime;      //  40  16
/// xfs_bstime_t  bs_mtime;      //  56  16
/// xfs_bstime_t  bs_ctime;      //  72  16
/// int64_t       bs_blocks;     //  88   8
/// __u32         bs_xflags;     //  96   4
/// __s32         bs_extsize;    // 100   4
/// __s32         bs_extents;    // 104   4
/// __u32         bs_gen;        // 108   4
/// __u16         bs_projid_lo;  // 112   2
/// __u16         bs_forkoff;    // 114   2
/// __u16         bs_projid_hi;  // 116   2
/// unsigned char bs_pad[10];    // 118  10
/// __u32         bs_dmevmask;   // 128   4
/// __u16         bs_dmstate;    // 132   2
/// __u16         bs_aextents;   // 134   2
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawBstat {
    pub bs_ino: u64,
    pub bs_mode: u16,
    pub bs_nlink: u16,
    pub bs_uid: u32,
    pub bs_gid: u32,
    pub bs_rdev: u32,
    pub bs_blksize: i32,
    pub _hole: u32,
    pub bs_size: i64,
    pub bs_atime: RawBstime,
    pub bs_mtime: RawBstime,
    pub bs_ctime: RawBstime,
    pub bs_blocks: i64,
    pub bs_xflags: u32,
    pub bs_extsize: i32,
    pub bs_extents: i32,
    pub bs_gen: u32,
    pub bs_projid_lo: u16,
    pub bs_forkoff: u16,
    pub bs_projid_hi: u16,
    pub bs_pad: [u8; 10],
    pub bs_dmevmask: u32,
    pub bs_dmstate: u16,
    pub bs_aextents: u16,
}

/// `struct xfs_inogrp`
///
/// ```text
/// __u64  xi_startino;    //  0  8
/// __s32  xi_alloccount;  //  8  4
/// // XXX 4 bytes hole
/// __u64  xi_allocmask;   // 16  8
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawInogrp {
    pub xi_startino: u64,
    pub xi_alloccount: i32,
    pub _hole: u32,
    pub xi_allocmask: u64,
}

/// `struct xfs_fsop_bulkreq`
///
/// ```text
/// __u64 *  lastip;   //  0  8
/// __s32    icount;   //  8  4
/// // XXX 4 bytes hole
/// void *   ubuffer;  // 16  8
/// __s32 *  ocount;   // 24  8
/// ```
///
/// Only ever built on the stack for the duration of one ioctl. The lifetime
/// ties the raw pointers to the borrows they were taken from, so the block
/// cannot outlive the cursor, buffer or count cell the kernel writes into.
#[repr(C)]
pub struct FsopBulkreq<'a> {
    pub lastip: *mut u64,
    pub icount: i32,
    pub ubuffer: *mut libc::c_void,
    pub ocount: *mut i32,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> FsopBulkreq<'a> {
    pub fn new(lastip: &'a mut u64, icount: i32, ubuffer: &'a mut [u8], ocount: &'a mut i32) -> Self {
        Self {
            lastip,
            icount,
            ubuffer: ubuffer.as_mut_ptr().cast(),
            ocount,
            _borrow: PhantomData,
        }
    }
}

const _: () = assert!(mem::size_of::<RawBstime>() == 16);
const _: () = assert!(mem::size_of::<RawBstat>() == BSTAT_SIZE);
const _: () = assert!(mem::offset_of!(RawBstat, bs_size) == 32);
const _: () = assert!(mem::offset_of!(RawBstat, bs_atime) == 40);
const _: () = assert!(mem::offset_of!(RawBstat, bs_blocks) == 88);
const _: () = assert!(mem::offset_of!(RawBstat, bs_projid_hi) == 116);
const _: () = assert!(mem::offset_of!(RawBstat, bs_pad) == 118);
const _: () = assert!(mem::offset_of!(RawBstat, bs_dmevmask) == 128);
const _: () = assert!(mem::offset_of!(RawBstat, bs_aextents) == 134);
const _: () = assert!(mem::size_of::<RawInogrp>() == INOGRP_SIZE);
const _: () = assert!(mem::offset_of!(RawInogrp, xi_allocmask) == 16);

#[cfg(target_pointer_width = "64")]
const _: () = assert!(mem::size_of::<FsopBulkreq<'static>>() == BULKREQ_SIZE);
#[cfg(target_pointer_width = "64")]
const _: () = assert!(mem::offset_of!(FsopBulkreq<'static>, ubuffer) == 16);
#[cfg(target_pointer_width = "64")]
const _: () = assert!(mem::offset_of!(FsopBulkreq<'static>, ocount) == 24);
