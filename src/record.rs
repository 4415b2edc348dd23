//! Record builders: fill the chunk buffer with Hello/Entry/trailer/Goodbye
//! bytes, or with raw payload data (§4.4).

use std::os::fd::RawFd;

use arcwalk_format::{
    DeviceRecord, EntryRecordPrefix, FeatureFlags, GoodbyeRecord, HelloRecord, PayloadHeader,
    RecordHeader as Header, SymlinkHeader, RECORD_ENTRY,
};
use zerocopy::IntoBytes;

use crate::buffer::ChunkBuffer;
use crate::error::{Error, InputKind, Result};
use crate::node::{Node, Stat};
use crate::time;

/// Bytes read per raw-payload chunk.
pub(crate) const BUFFER_SIZE: usize = 64 * 1024;

/// Writes the fixed Hello record into `buf`.
pub(crate) fn build_hello(buf: &mut ChunkBuffer, flags: FeatureFlags) {
    let rec = HelloRecord::new(flags);
    buf.extend_from_slice(rec.as_bytes());
}

/// Writes the degenerate single-entry Goodbye record into `buf`.
pub(crate) fn build_goodbye(buf: &mut ChunkBuffer) {
    let rec = GoodbyeRecord::new();
    buf.extend_from_slice(rec.as_bytes());
}

/// Masks `stat.mode` per the rules in §4.4's field derivations.
pub(crate) fn masked_mode(stat: &Stat, flags: FeatureFlags) -> u64 {
    let type_bits = (stat.mode & libc::S_IFMT) as u64;

    if stat.is_lnk() {
        return type_bits | 0o777;
    }

    if flags.contains(FeatureFlags::WITH_PERMISSIONS) {
        type_bits | (stat.mode as u64 & 0o7777)
    } else if flags.contains(FeatureFlags::WITH_READONLY) {
        let writable = stat.mode & 0o222 != 0;
        let perm: u64 = if stat.is_dir() {
            if writable { 0o777 } else { 0o555 }
        } else if writable {
            0o666
        } else {
            0o444
        };
        type_bits | perm
    } else {
        type_bits
    }
}

/// Validates and derives the `(uid, gid)` pair to stamp into an Entry,
/// rejecting reserved sentinels and widths that don't fit.
pub(crate) fn masked_uid_gid(stat: &Stat, flags: FeatureFlags) -> Result<(u64, u64)> {
    const RESERVED_16: u32 = u16::MAX as u32;
    const RESERVED_32: u32 = u32::MAX;

    if stat.uid == RESERVED_16 || stat.uid == RESERVED_32 || stat.gid == RESERVED_16 || stat.gid == RESERVED_32
    {
        return Err(InputKind::ReservedId.into());
    }

    if !flags.intersects(FeatureFlags::WITH_UID_GID_16BIT | FeatureFlags::WITH_UID_GID_32BIT) {
        return Ok((0, 0));
    }

    if flags.contains(FeatureFlags::WITH_UID_GID_16BIT) && (stat.uid > 0xffff || stat.gid > 0xffff) {
        return Err(InputKind::WidthExceeded.into());
    }

    Ok((stat.uid as u64, stat.gid as u64))
}

/// Rejects a child whose kind requires a feature flag that isn't set.
pub(crate) fn check_type_gate(stat: &Stat, flags: FeatureFlags) -> Result<()> {
    let (gate, name) = if stat.is_lnk() {
        (FeatureFlags::WITH_SYMLINKS, "symlink")
    } else if stat.is_blk() || stat.is_chr() {
        (FeatureFlags::WITH_DEVICE_NODES, "device")
    } else if stat.is_fifo() {
        (FeatureFlags::WITH_FIFOS, "fifo")
    } else if stat.is_sock() {
        (FeatureFlags::WITH_SOCKETS, "socket")
    } else {
        return Ok(());
    };
    if flags.contains(gate) {
        Ok(())
    } else {
        Err(InputKind::ProtocolUnsupported(name).into())
    }
}

/// Appends an Entry record (and, for non-directory children, its trailer)
/// for `child`, named `name`, into `buf`.
pub(crate) fn build_entry(
    buf: &mut ChunkBuffer,
    child: &Node,
    name: &std::ffi::OsStr,
    flags: FeatureFlags,
    time_granularity: u64,
) -> Result<()> {
    check_type_gate(&child.stat, flags)?;

    let mode = masked_mode(&child.stat, flags);
    let (uid, gid) = masked_uid_gid(&child.stat, flags)?;
    let mtime = time::quantize(time::timespec_to_nsec(child.stat.mtime), time_granularity);

    let name_bytes = {
        use std::os::unix::ffi::OsStrExt;
        name.as_bytes()
    };
    let name_len = name_bytes.len() as u64 + 1; // NUL terminator

    let prefix_size = EntryRecordPrefix::SIZE + name_len;
    let prefix = EntryRecordPrefix {
        header: Header::new(RECORD_ENTRY, prefix_size),
        mode,
        uid,
        gid,
        mtime,
    };
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&[0u8]);

    if child.stat.is_reg() {
        let trailer = PayloadHeader::new(child.stat.size);
        buf.extend_from_slice(trailer.as_bytes());
    } else if child.stat.is_lnk() {
        let target = child
            .symlink_target
            .as_ref()
            .expect("symlink child always has a resolved target");
        let target_bytes = target.as_bytes_with_nul();
        let trailer = SymlinkHeader::new(target_bytes.len() as u64);
        buf.extend_from_slice(trailer.as_bytes());
        buf.extend_from_slice(target_bytes);
    } else if child.stat.is_blk() || child.stat.is_chr() {
        let major = unsafe { libc::major(child.stat.rdev) } as u64;
        let minor = unsafe { libc::minor(child.stat.rdev) } as u64;
        let trailer = DeviceRecord::new(major, minor);
        buf.extend_from_slice(trailer.as_bytes());
    }

    Ok(())
}

/// Reads up to `BUFFER_SIZE` bytes (or the remainder of `payload_size`,
/// whichever is smaller) from `fd` at `offset` directly into `buf`.
/// A short read is treated as an I/O error (§4.4).
pub(crate) fn build_payload_chunk(
    buf: &mut ChunkBuffer,
    fd: RawFd,
    offset: u64,
    payload_size: u64,
) -> Result<usize> {
    let remaining = payload_size.saturating_sub(offset);
    let want = remaining.min(BUFFER_SIZE as u64) as usize;
    if want == 0 {
        return Ok(0);
    }
    let dst = buf.acquire_exact(want);
    let read = unsafe {
        libc::pread(
            fd,
            dst.as_mut_ptr() as *mut libc::c_void,
            want,
            offset as libc::off_t,
        )
    };
    if read < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let read = read as usize;
    if read != want {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "short read on payload descriptor",
        )));
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg_stat(mode: u32) -> Stat {
        Stat {
            mode: libc::S_IFREG | mode,
            size: 0,
            uid: 0,
            gid: 0,
            mtime: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            rdev: 0,
        }
    }

    #[test]
    fn symlink_mode_is_always_ifLnk_0777() {
        let st = Stat {
            mode: libc::S_IFLNK | 0o600,
            ..reg_stat(0)
        };
        assert_eq!(masked_mode(&st, FeatureFlags::empty()), (libc::S_IFLNK as u64) | 0o777);
    }

    #[test]
    fn permissions_keeps_low_twelve_bits() {
        let st = reg_stat(0o4755);
        let mode = masked_mode(&st, FeatureFlags::WITH_PERMISSIONS);
        assert_eq!(mode, (libc::S_IFREG as u64) | 0o4755);
    }

    #[test]
    fn readonly_synthesizes_file_perms() {
        let writable = reg_stat(0o644);
        assert_eq!(
            masked_mode(&writable, FeatureFlags::WITH_READONLY),
            (libc::S_IFREG as u64) | 0o666
        );
        let readonly = reg_stat(0o444);
        assert_eq!(
            masked_mode(&readonly, FeatureFlags::WITH_READONLY),
            (libc::S_IFREG as u64) | 0o444
        );
    }

    #[test]
    fn readonly_treats_group_or_other_write_as_writable() {
        let group_writable = reg_stat(0o464);
        assert_eq!(
            masked_mode(&group_writable, FeatureFlags::WITH_READONLY),
            (libc::S_IFREG as u64) | 0o666
        );
    }

    #[test]
    fn neither_flag_keeps_only_type_bits() {
        let st = reg_stat(0o755);
        assert_eq!(masked_mode(&st, FeatureFlags::empty()), libc::S_IFREG as u64);
    }

    #[test]
    fn reserved_sentinels_are_rejected_regardless_of_width() {
        let mut st = reg_stat(0o644);
        st.uid = u16::MAX as u32;
        assert!(matches!(
            masked_uid_gid(&st, FeatureFlags::WITH_UID_GID_32BIT),
            Err(Error::InputKind(InputKind::ReservedId))
        ));
    }

    #[test]
    fn no_width_flag_zeroes_uid_gid() {
        let mut st = reg_stat(0o644);
        st.uid = 1000;
        st.gid = 1000;
        assert_eq!(masked_uid_gid(&st, FeatureFlags::empty()).unwrap(), (0, 0));
    }

    #[test]
    fn sixteen_bit_width_rejects_overflow() {
        let mut st = reg_stat(0o644);
        st.uid = 70_000;
        assert!(matches!(
            masked_uid_gid(&st, FeatureFlags::WITH_UID_GID_16BIT),
            Err(Error::InputKind(InputKind::WidthExceeded))
        ));
    }

    #[test]
    fn type_gate_rejects_disabled_symlinks() {
        let st = Stat {
            mode: libc::S_IFLNK | 0o777,
            ..reg_stat(0)
        };
        assert!(matches!(
            check_type_gate(&st, FeatureFlags::empty()),
            Err(Error::InputKind(InputKind::ProtocolUnsupported("symlink")))
        ));
    }

    #[test]
    fn hello_record_bytes_start_with_its_header() {
        let mut buf = ChunkBuffer::new();
        build_hello(&mut buf, FeatureFlags::WITH_BEST);
        assert_eq!(buf.len(), size_of::<HelloRecord>());
        assert_eq!(&buf.as_slice()[0..8], &arcwalk_format::RECORD_HELLO.to_le_bytes());
    }

    #[test]
    fn goodbye_record_bytes_are_24() {
        let mut buf = ChunkBuffer::new();
        build_goodbye(&mut buf);
        assert_eq!(buf.len(), 24);
    }
}
