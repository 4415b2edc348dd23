//! Traversal-stack node: an open filesystem object at a given depth (§3).

use std::ffi::{CString, OsString};
use std::os::fd::RawFd;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use nix::dir::Dir;
use nix::fcntl::{AtFlags, OFlag};
use nix::sys::stat::{fstat, fstatat, Mode, SFlag};
use nix::unistd::readlinkat;

use crate::error::Result;

/// Owned or borrowed raw descriptor, closed on drop unless it is borrowed
/// or happens to alias one of the three standard streams (the same
/// defensive guard the original C core applies to every node, not only
/// the root).
#[derive(Debug)]
pub(crate) enum NodeFd {
    /// Supplied externally; the caller keeps ownership.
    Borrowed(RawFd),
    /// Opened by this crate; closed when the node is dropped.
    Owned(RawFd),
    /// No descriptor opened yet (pending child) or not applicable.
    None,
}

impl NodeFd {
    pub(crate) fn raw(&self) -> Option<RawFd> {
        match self {
            NodeFd::Borrowed(fd) | NodeFd::Owned(fd) => Some(*fd),
            NodeFd::None => None,
        }
    }
}

impl Drop for NodeFd {
    fn drop(&mut self) {
        if let NodeFd::Owned(fd) = self {
            if *fd >= 3 {
                unsafe {
                    libc::close(*fd);
                }
            }
        }
    }
}

/// A snapshot of the metadata this encoder cares about, taken once per node.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Stat {
    /// Full `st_mode`, including the `S_IFMT` type bits.
    pub(crate) mode: u32,
    pub(crate) size: u64,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) mtime: libc::timespec,
    pub(crate) rdev: u64,
}

impl From<libc::stat> for Stat {
    fn from(st: libc::stat) -> Self {
        Stat {
            mode: st.st_mode,
            size: st.st_size as u64,
            uid: st.st_uid,
            gid: st.st_gid,
            mtime: libc::timespec {
                tv_sec: st.st_mtime,
                tv_nsec: st.st_mtime_nsec,
            },
            rdev: st.st_rdev as u64,
        }
    }
}

impl Stat {
    pub(crate) fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFDIR
    }

    pub(crate) fn is_reg(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFREG
    }

    pub(crate) fn is_lnk(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFLNK
    }

    pub(crate) fn is_blk(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFBLK
    }

    pub(crate) fn is_chr(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFCHR
    }

    pub(crate) fn is_fifo(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFIFO
    }

    pub(crate) fn is_sock(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFSOCK
    }
}

/// One level of the traversal stack.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) fd: NodeFd,
    pub(crate) stat: Stat,
    /// `.`/`..`-filtered, byte-wise-sorted child names. `None` until first read.
    pub(crate) dirents: Option<Vec<OsString>>,
    pub(crate) dirent_idx: usize,
    /// Null-terminated link text, present once a symlink child has been opened.
    pub(crate) symlink_target: Option<CString>,
    /// Total size in bytes, resolved on first demand for block devices.
    pub(crate) device_size: Option<u64>,
}

impl Node {
    /// A freshly reserved stack slot: no descriptor, no stat yet.
    pub(crate) fn empty() -> Self {
        Node {
            fd: NodeFd::None,
            stat: Stat::default(),
            dirents: None,
            dirent_idx: 0,
            symlink_target: None,
            device_size: None,
        }
    }

    /// Wraps an externally supplied root descriptor. The caller keeps ownership.
    pub(crate) fn from_borrowed_root(fd: RawFd) -> Result<Self> {
        let st = fstat(fd)?;
        Ok(Node {
            fd: NodeFd::Borrowed(fd),
            stat: Stat::from(st),
            dirents: None,
            dirent_idx: 0,
            symlink_target: None,
            device_size: None,
        })
    }

    pub(crate) fn current_dirent(&self) -> Option<&OsString> {
        self.dirents.as_ref()?.get(self.dirent_idx)
    }

    /// Scans the directory, filters `.`/`..`, and sorts by byte-wise name
    /// comparison (explicitly locale-independent; see §4.2).
    pub(crate) fn read_dirents(&mut self) -> Result<()> {
        if self.dirents.is_some() {
            return Ok(());
        }
        let fd = self.fd.raw().expect("directory node always has an fd");
        // `Dir::from_fd` takes ownership of a *duplicate* so the original
        // descriptor keeps belonging to this node's `NodeFd`.
        let dup = nix::unistd::dup(fd)?;
        let mut dir = Dir::from_fd(dup)?;
        let mut names: Vec<OsString> = Vec::new();
        for entry in dir.iter() {
            let entry = entry?;
            let name = entry.file_name().to_bytes();
            if is_dot_or_dotdot(name) {
                continue;
            }
            names.push(std::ffi::OsStr::from_bytes(name).to_os_string());
        }
        names.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        self.dirents = Some(names);
        self.dirent_idx = 0;
        Ok(())
    }

    /// Resolves and caches this block device's total size via `BLKGETSIZE64`.
    #[cfg(target_os = "linux")]
    pub(crate) fn read_device_size(&mut self) -> Result<u64> {
        if let Some(size) = self.device_size {
            return Ok(size);
        }
        let fd = self.fd.raw().expect("block device node always has an fd");
        let mut size: u64 = 0;
        let ret = unsafe { libc::ioctl(fd, blkgetsize64_request(), &mut size as *mut u64) };
        if ret < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        self.device_size = Some(size);
        Ok(size)
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn read_device_size(&mut self) -> Result<u64> {
        if let Some(size) = self.device_size {
            return Ok(size);
        }
        let fd = self.fd.raw().expect("block device node always has an fd");
        let st = fstat(fd)?;
        self.device_size = Some(st.st_size as u64);
        Ok(self.device_size.unwrap())
    }

    /// The payload length driving `payload_offset` comparisons: the file
    /// size for a regular file, the resolved device size for a block device.
    pub(crate) fn payload_size(&mut self) -> Result<u64> {
        if self.stat.is_blk() {
            self.read_device_size()
        } else {
            Ok(self.stat.size)
        }
    }
}

#[cfg(target_os = "linux")]
fn blkgetsize64_request() -> libc::c_ulong {
    // _IOR(0x12, 114, size_t), matches <linux/fs.h> BLKGETSIZE64.
    const IOC_NRBITS: u32 = 8;
    const IOC_TYPEBITS: u32 = 8;
    const IOC_SIZEBITS: u32 = 14;
    const IOC_READ: u32 = 2;
    let size = size_of::<u64>() as u32;
    let dir = IOC_READ;
    let typ = 0x12u32;
    let nr = 114u32;
    ((dir << (IOC_TYPEBITS + IOC_NRBITS + IOC_SIZEBITS))
        | (typ << (IOC_NRBITS + IOC_SIZEBITS))
        | (nr << IOC_SIZEBITS)
        | size) as libc::c_ulong
}

fn is_dot_or_dotdot(name: &[u8]) -> bool {
    matches!(name, b"." | b"..")
}

/// Opens a symlink/device/fifo/socket candidate and, for symlinks, its
/// target text, without entering it onto the stack. Directories and
/// regular files are opened directly by the caller and never reach here.
pub(crate) fn fstatat_child(dir_fd: RawFd, name: &std::ffi::OsStr) -> Result<libc::stat> {
    let st = fstatat(
        dir_fd,
        std::path::Path::new(name),
        AtFlags::AT_SYMLINK_NOFOLLOW,
    )?;
    Ok(st)
}

/// Opens a regular file or directory child with the flags mandated by §4.2.
/// Returns a raw descriptor the caller takes ownership of (`nix::fcntl::openat`
/// hands back an `OwnedFd`; we unwrap it here since `Node` tracks ownership
/// itself via [`NodeFd`]).
pub(crate) fn openat_child(dir_fd: RawFd, name: &std::ffi::OsStr, is_dir: bool) -> Result<RawFd> {
    use std::os::fd::IntoRawFd;

    let mut flags = OFlag::O_RDONLY | OFlag::O_CLOEXEC | OFlag::O_NOCTTY | OFlag::O_NOFOLLOW;
    if is_dir {
        flags |= OFlag::O_DIRECTORY;
    }
    let owned = nix::fcntl::openat(dir_fd, std::path::Path::new(name), flags, Mode::empty())?;
    Ok(owned.into_raw_fd())
}

/// Reads a symlink target. `nix::unistd::readlinkat` implements the classic
/// readlink sizing internally (retrying with a doubled buffer until the
/// kernel reports a length shorter than what was offered, per §4.2), so we
/// only need to convert its result into the null-terminated form §6 writes.
pub(crate) fn read_symlink_target(dir_fd: RawFd, name: &std::ffi::OsStr) -> Result<CString> {
    let target = readlinkat(dir_fd, std::path::Path::new(name))?;
    let bytes = target.into_os_string().into_vec();
    Ok(CString::new(bytes).expect("readlinkat target contains no NUL byte"))
}

pub(crate) fn mode_is_enterable(mode: u32) -> bool {
    matches!(mode & libc::S_IFMT, libc::S_IFDIR | libc::S_IFREG)
}

pub(crate) fn sflag_for(mode: u32) -> SFlag {
    SFlag::from_bits_truncate(mode & libc::S_IFMT)
}
