use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitflags::bitflags;

use super::abi::{RawBstat, RawBstime, RawInogrp, BSTAT_SIZE, INOGRP_SIZE, XFS_INODES_PER_CHUNK};
use super::error::{DecodeError, LayoutMismatch};
use super::ioctl::BulkOp;

/// A fixed-size record returned back-to-back by one of the bulk ioctls.
///
/// Frames are always little-endian on the wire; padding bytes are skipped on
/// decode and written as zero on encode.
pub trait BulkRecord: Sized {
    /// Encoded size of one frame, including holes.
    const SIZE: usize;
    /// Control call that produces this record.
    const OP: BulkOp;

    /// Decode one frame. `frame.len()` is exactly `Self::SIZE`.
    fn decode_frame(frame: &[u8]) -> Self;

    /// Encode into one frame. `frame.len()` is exactly `Self::SIZE`.
    fn encode_frame(&self, frame: &mut [u8]);

    /// Cursor value that resumes strictly after this record, or `None` if
    /// the record sits too close to the end of the inode space to have one.
    fn resume_key(&self) -> Option<u64>;
}

/// `xfs_bstime`: seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BsTime {
    pub sec: i64,
    pub nsec: i32,
}

impl BsTime {
    /// `None` if the nanosecond part is out of range or the time does not fit
    /// in a `SystemTime` on this platform.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        if !(0..1_000_000_000).contains(&self.nsec) {
            return None;
        }
        let nanos = Duration::from_nanos(self.nsec as u64);
        if self.sec >= 0 {
            UNIX_EPOCH
                .checked_add(Duration::from_secs(self.sec as u64))?
                .checked_add(nanos)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(self.sec.unsigned_abs()))?
                .checked_add(nanos)
        }
    }

    fn from_raw(raw: RawBstime) -> Self {
        Self {
            sec: i64::from_le(raw.tv_sec),
            nsec: i32::from_le(raw.tv_nsec),
        }
    }

    fn to_raw(self) -> RawBstime {
        RawBstime {
            tv_sec: self.sec.to_le(),
            tv_nsec: self.nsec.to_le(),
            _pad: 0,
        }
    }
}

/// File type carried in the top bits of `bs_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Fifo,
    CharDevice,
    Directory,
    BlockDevice,
    Regular,
    Symlink,
    Socket,
    Unknown,
}

impl FileType {
    const MASK: u16 = 0o170000;

    pub fn from_mode(mode: u16) -> Self {
        match mode & Self::MASK {
            0o010000 => FileType::Fifo,
            0o020000 => FileType::CharDevice,
            0o040000 => FileType::Directory,
            0o060000 => FileType::BlockDevice,
            0o100000 => FileType::Regular,
            0o120000 => FileType::Symlink,
            0o140000 => FileType::Socket,
            _ => FileType::Unknown,
        }
    }
}

bitflags! {
    /// `bs_xflags` bits (`FS_XFLAG_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct XFlags: u32 {
        const REALTIME = 0x0000_0001;
        const PREALLOC = 0x0000_0002;
        const IMMUTABLE = 0x0000_0008;
        const APPEND = 0x0000_0010;
        const SYNC = 0x0000_0020;
        const NOATIME = 0x0000_0040;
        const NODUMP = 0x0000_0080;
        const RTINHERIT = 0x0000_0100;
        const PROJINHERIT = 0x0000_0200;
        const NOSYMLINKS = 0x0000_0400;
        const EXTSIZE = 0x0000_0800;
        const EXTSZINHERIT = 0x0000_1000;
        const NODEFRAG = 0x0000_2000;
        const FILESTREAM = 0x0000_4000;
        const DAX = 0x0000_8000;
        const COWEXTSIZE = 0x0001_0000;
        const HASATTR = 0x8000_0000;
    }
}

/// One inode's metadata as reported by `XFS_IOC_FSBULKSTAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InodeStat {
    /// Inode number, unique within the volume
    pub ino: u64,
    /// Type and permission bits
    pub mode: u16,
    /// Hard link count
    pub nlink: u16,
    pub uid: u32,
    pub gid: u32,
    /// Device number, for device special files
    pub rdev: u32,
    /// Preferred I/O block size
    pub blksize: i32,
    /// File size in bytes
    pub size: i64,
    pub atime: BsTime,
    pub mtime: BsTime,
    pub ctime: BsTime,
    /// Allocated blocks, in 512-byte units
    pub blocks: i64,
    /// Extended attribute flags, see [`XFlags`]
    pub xflags: u32,
    /// Extent size hint
    pub extsize: i32,
    /// Data fork extent count
    pub extents: i32,
    /// Inode generation number
    pub gen: u32,
    pub projid_lo: u16,
    /// Attribute fork offset, in 8-byte units
    pub forkoff: u16,
    pub projid_hi: u16,
    /// DMAPI event mask
    pub dmevmask: u32,
    /// DMAPI state
    pub dmstate: u16,
    /// Attribute fork extent count
    pub aextents: u16,
}

impl InodeStat {
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.file_type() == FileType::Regular
    }

    /// Full 32-bit project ID from its two on-disk halves.
    pub fn project_id(&self) -> u32 {
        (u32::from(self.projid_hi) << 16) | u32::from(self.projid_lo)
    }

    pub fn xflags(&self) -> XFlags {
        XFlags::from_bits_retain(self.xflags)
    }
}

impl From<RawBstat> for InodeStat {
    fn from(raw: RawBstat) -> Self {
        Self {
            ino: u64::from_le(raw.bs_ino),
            mode: u16::from_le(raw.bs_mode),
            nlink: u16::from_le(raw.bs_nlink),
            uid: u32::from_le(raw.bs_uid),
            gid: u32::from_le(raw.bs_gid),
            rdev: u32::from_le(raw.bs_rdev),
            blksize: i32::from_le(raw.bs_blksize),
            size: i64::from_le(raw.bs_size),
            atime: BsTime::from_raw(raw.bs_atime),
            mtime: BsTime::from_raw(raw.bs_mtime),
            ctime: BsTime::from_raw(raw.bs_ctime),
            blocks: i64::from_le(raw.bs_blocks),
            xflags: u32::from_le(raw.bs_xflags),
            extsize: i32::from_le(raw.bs_extsize),
            extents: i32::from_le(raw.bs_extents),
            gen: u32::from_le(raw.bs_gen),
            projid_lo: u16::from_le(raw.bs_projid_lo),
            forkoff: u16::from_le(raw.bs_forkoff),
            projid_hi: u16::from_le(raw.bs_projid_hi),
            dmevmask: u32::from_le(raw.bs_dmevmask),
            dmstate: u16::from_le(raw.bs_dmstate),
            aextents: u16::from_le(raw.bs_aextents),
        }
    }
}

impl From<&InodeStat> for RawBstat {
    fn from(stat: &InodeStat) -> Self {
        RawBstat {
            bs_ino: stat.ino.to_le(),
            bs_mode: stat.mode.to_le(),
            bs_nlink: stat.nlink.to_le(),
            bs_uid: stat.uid.to_le(),
            bs_gid: stat.gid.to_le(),
            bs_rdev: stat.rdev.to_le(),
            bs_blksize: stat.blksize.to_le(),
            _hole: 0,
            bs_size: stat.size.to_le(),
            bs_atime: stat.atime.to_raw(),
            bs_mtime: stat.mtime.to_raw(),
            bs_ctime: stat.ctime.to_raw(),
            bs_blocks: stat.blocks.to_le(),
            bs_xflags: stat.xflags.to_le(),
            bs_extsize: stat.extsize.to_le(),
            bs_extents: stat.extents.to_le(),
            bs_gen: stat.gen.to_le(),
            bs_projid_lo: stat.projid_lo.to_le(),
            bs_forkoff: stat.forkoff.to_le(),
            bs_projid_hi: stat.projid_hi.to_le(),
            bs_pad: [0; 10],
            bs_dmevmask: stat.dmevmask.to_le(),
            bs_dmstate: stat.dmstate.to_le(),
            bs_aextents: stat.aextents.to_le(),
        }
    }
}

impl BulkRecord for InodeStat {
    const SIZE: usize = BSTAT_SIZE;
    const OP: BulkOp = BulkOp::Bulkstat;

    fn decode_frame(frame: &[u8]) -> Self {
        bytemuck::pod_read_unaligned::<RawBstat>(frame).into()
    }

    fn encode_frame(&self, frame: &mut [u8]) {
        frame.copy_from_slice(bytemuck::bytes_of(&RawBstat::from(self)));
    }

    fn resume_key(&self) -> Option<u64> {
        Some(self.ino)
    }
}

/// One inode chunk as reported by `XFS_IOC_FSINUMBERS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InodeGroup {
    /// First inode number of the chunk
    pub startino: u64,
    /// Allocated inodes in the chunk
    pub alloccount: i32,
    /// Bit `n` set when `startino + n` is allocated
    pub allocmask: u64,
}

impl BulkRecord for InodeGroup {
    const SIZE: usize = INOGRP_SIZE;
    const OP: BulkOp = BulkOp::Inumbers;

    fn decode_frame(frame: &[u8]) -> Self {
        let raw = bytemuck::pod_read_unaligned::<RawInogrp>(frame);
        Self {
            startino: u64::from_le(raw.xi_startino),
            alloccount: i32::from_le(raw.xi_alloccount),
            allocmask: u64::from_le(raw.xi_allocmask),
        }
    }

    fn encode_frame(&self, frame: &mut [u8]) {
        let raw = RawInogrp {
            xi_startino: self.startino.to_le(),
            xi_alloccount: self.alloccount.to_le(),
            _hole: 0,
            xi_allocmask: self.allocmask.to_le(),
        };
        frame.copy_from_slice(bytemuck::bytes_of(&raw));
    }

    fn resume_key(&self) -> Option<u64> {
        self.startino.checked_add(XFS_INODES_PER_CHUNK - 1)
    }
}

/// Decode the first `count` frames of `buf`. All or nothing: a short buffer
/// fails the whole batch and nothing past `count` frames is read.
pub fn decode_records<R: BulkRecord>(buf: &[u8], count: usize) -> Result<Vec<R>, DecodeError> {
    let needed = count.checked_mul(R::SIZE).unwrap_or(usize::MAX);
    if buf.len() < needed {
        return Err(DecodeError::Truncated {
            count,
            record_size: R::SIZE,
            needed,
            available: buf.len(),
        });
    }
    Ok(buf[..needed].chunks_exact(R::SIZE).map(R::decode_frame).collect())
}

/// Decode `count` bulkstat records from the start of `buf`.
pub fn decode(buf: &[u8], count: usize) -> Result<Vec<InodeStat>, DecodeError> {
    decode_records(buf, count)
}

/// Encode records back-to-back, the way the kernel fills `ubuffer`.
pub fn encode_records<R: BulkRecord>(records: &[R]) -> Vec<u8> {
    let mut buf = vec![0u8; records.len() * R::SIZE];
    for (record, frame) in records.iter().zip(buf.chunks_exact_mut(R::SIZE)) {
        record.encode_frame(frame);
    }
    buf
}

/// Startup self-check: a trial encode must land every probed field at its
/// kernel offset, leave the holes zeroed, and decode back unchanged.
pub fn verify_layout() -> Result<(), LayoutMismatch> {
    let probe = InodeStat {
        ino: 0x0102_0304_0506_0708,
        size: 0x1112_1314_1516_1718,
        atime: BsTime { sec: 0x2122_2324_2526_2728, nsec: 0x3132_3334 },
        blocks: 0x4142_4344_4546_4748,
        projid_hi: 0x5152,
        dmevmask: 0x6162_6364,
        aextents: 0x7172,
        ..Default::default()
    };
    let bytes = encode_records(std::slice::from_ref(&probe));

    let expect = |field: &'static str, offset: usize, value: &[u8]| {
        if bytes.get(offset..offset + value.len()) == Some(value) {
            Ok(())
        } else {
            Err(LayoutMismatch { field, offset })
        }
    };
    expect("bs_ino", 0, &probe.ino.to_le_bytes())?;
    expect("hole after bs_blksize", 28, &[0; 4])?;
    expect("bs_size", 32, &probe.size.to_le_bytes())?;
    expect("bs_atime.tv_sec", 40, &probe.atime.sec.to_le_bytes())?;
    expect("bs_atime.tv_nsec", 48, &probe.atime.nsec.to_le_bytes())?;
    expect("bs_blocks", 88, &probe.blocks.to_le_bytes())?;
    expect("bs_projid_hi", 116, &probe.projid_hi.to_le_bytes())?;
    expect("bs_pad", 118, &[0; 10])?;
    expect("bs_dmevmask", 128, &probe.dmevmask.to_le_bytes())?;
    expect("bs_aextents", 134, &probe.aextents.to_le_bytes())?;

    if bytes.len() != BSTAT_SIZE {
        return Err(LayoutMismatch { field: "sizeof(xfs_bstat)", offset: bytes.len() });
    }
    match decode(&bytes, 1) {
        Ok(decoded) if decoded == [probe] => Ok(()),
        _ => Err(LayoutMismatch { field: "round trip", offset: 0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ino: u64) -> InodeStat {
        InodeStat {
            ino,
            mode: 0o100644,
            nlink: 2,
            uid: 1000,
            gid: 100,
            rdev: 0x0803,
            blksize: 4096,
            size: 123_456_789,
            atime: BsTime { sec: 1_700_000_000, nsec: 1 },
            mtime: BsTime { sec: -5, nsec: 999_999_999 },
            ctime: BsTime { sec: 0, nsec: 0 },
            blocks: 241_128,
            xflags: (XFlags::APPEND | XFlags::HASATTR).bits(),
            extsize: 16,
            extents: 3,
            gen: 0xdead_beef,
            projid_lo: 0x0042,
            forkoff: 15,
            projid_hi: 0x0007,
            dmevmask: 0xffff_0000,
            dmstate: 9,
            aextents: 1,
        }
    }

    #[test]
    fn layout_self_check_passes() {
        assert_eq!(verify_layout(), Ok(()));
    }

    #[test]
    fn record_survives_encode_and_decode() {
        let stat = sample(133);
        let bytes = encode_records(&[stat]);
        assert_eq!(bytes.len(), BSTAT_SIZE);
        assert_eq!(decode(&bytes, 1).unwrap(), vec![stat]);
    }

    #[test]
    fn padding_is_written_as_zero_and_ignored_on_read() {
        let stat = sample(200);
        let mut bytes = encode_records(&[stat]);
        assert!(bytes[28..32].iter().all(|&b| b == 0));
        assert!(bytes[52..56].iter().all(|&b| b == 0));
        assert!(bytes[118..128].iter().all(|&b| b == 0));

        // Garbage in the holes must not leak into any field.
        bytes[28..32].fill(0xAA);
        bytes[52..56].fill(0xAA);
        bytes[118..128].fill(0xAA);
        assert_eq!(decode(&bytes, 1).unwrap(), vec![stat]);
    }

    #[test]
    fn fields_are_read_little_endian_at_kernel_offsets() {
        let mut bytes = vec![0u8; BSTAT_SIZE];
        bytes[0..8].copy_from_slice(&0x80u64.to_le_bytes());
        bytes[8..10].copy_from_slice(&0o040755u16.to_le_bytes());
        bytes[24..28].copy_from_slice(&4096i32.to_le_bytes());
        bytes[32..40].copy_from_slice(&6i64.to_le_bytes());
        bytes[72..80].copy_from_slice(&99i64.to_le_bytes());
        bytes[112..114].copy_from_slice(&0x0001u16.to_le_bytes());
        bytes[116..118].copy_from_slice(&0x0002u16.to_le_bytes());
        bytes[134..136].copy_from_slice(&5u16.to_le_bytes());

        let stat = decode(&bytes, 1).unwrap()[0];
        assert_eq!(stat.ino, 0x80);
        assert!(stat.is_dir());
        assert_eq!(stat.blksize, 4096);
        assert_eq!(stat.size, 6);
        assert_eq!(stat.ctime.sec, 99);
        assert_eq!(stat.project_id(), 0x0002_0001);
        assert_eq!(stat.aextents, 5);
    }

    #[test]
    fn decode_preserves_kernel_order() {
        let stats = [sample(300), sample(128), sample(4000)];
        let bytes = encode_records(&stats);
        let inos: Vec<u64> = decode(&bytes, 3).unwrap().iter().map(|s| s.ino).collect();
        assert_eq!(inos, vec![300, 128, 4000]);
    }

    #[test]
    fn decode_reads_only_count_frames() {
        let bytes = encode_records(&[sample(1), sample(2), sample(3)]);
        let stats = decode(&bytes, 2).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].ino, 2);
    }

    #[test]
    fn zero_count_decodes_to_empty_for_any_buffer() {
        assert!(decode(&[], 0).unwrap().is_empty());
        assert!(decode(&[0xFF; 7], 0).unwrap().is_empty());
    }

    #[test]
    fn short_buffer_fails_the_whole_batch() {
        let bytes = encode_records(&[sample(1), sample(2)]);
        let err = decode(&bytes[..BSTAT_SIZE * 2 - 1], 2).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                count: 2,
                record_size: BSTAT_SIZE,
                needed: BSTAT_SIZE * 2,
                available: BSTAT_SIZE * 2 - 1,
            }
        );
        assert!(decode(&bytes, 3).is_err());
    }

    #[test]
    fn absurd_count_does_not_overflow() {
        assert!(matches!(
            decode(&[0; BSTAT_SIZE], usize::MAX),
            Err(DecodeError::Truncated { needed: usize::MAX, .. })
        ));
    }

    #[test]
    fn inode_group_has_hole_after_alloccount() {
        let group = InodeGroup { startino: 128, alloccount: 61, allocmask: u64::MAX >> 3 };
        let bytes = encode_records(&[group]);
        assert_eq!(bytes.len(), INOGRP_SIZE);
        assert_eq!(&bytes[12..16], &[0; 4]);
        assert_eq!(&bytes[16..24], &group.allocmask.to_le_bytes());
        assert_eq!(decode_records::<InodeGroup>(&bytes, 1).unwrap(), vec![group]);
        assert_eq!(group.resume_key(), Some(191));

        let last_chunk = InodeGroup { startino: u64::MAX - 10, ..group };
        assert_eq!(last_chunk.resume_key(), None);
    }

    #[test]
    fn mode_maps_to_file_type() {
        assert_eq!(FileType::from_mode(0o100600), FileType::Regular);
        assert_eq!(FileType::from_mode(0o120777), FileType::Symlink);
        assert_eq!(FileType::from_mode(0o060660), FileType::BlockDevice);
        assert_eq!(FileType::from_mode(0o020620), FileType::CharDevice);
        assert_eq!(FileType::from_mode(0o010644), FileType::Fifo);
        assert_eq!(FileType::from_mode(0o140755), FileType::Socket);
        assert_eq!(FileType::from_mode(0), FileType::Unknown);
    }

    #[test]
    fn xflags_keep_unknown_bits() {
        let stat = InodeStat { xflags: 0x8000_0010 | 0x0400_0000, ..Default::default() };
        let flags = stat.xflags();
        assert!(flags.contains(XFlags::APPEND | XFlags::HASATTR));
        assert_eq!(flags.bits(), 0x8400_0010);
    }

    #[test]
    fn timestamps_convert_to_system_time() {
        let t = BsTime { sec: 10, nsec: 500 };
        assert_eq!(t.to_system_time(), Some(UNIX_EPOCH + Duration::new(10, 500)));
        let before = BsTime { sec: -1, nsec: 0 };
        assert_eq!(before.to_system_time(), Some(UNIX_EPOCH - Duration::from_secs(1)));
        assert_eq!(BsTime { sec: 0, nsec: -1 }.to_system_time(), None);
    }
}
