//! Symlink-safe path resolution
//!
//! Logical paths are never handed to the kernel as strings. The parent
//! directory is reached from the mount's root descriptor one component at a
//! time with `O_NOFOLLOW`, and the leaf is then addressed relative to that
//! descriptor. A symlink swapped in after resolution cannot redirect the
//! following `fstatat`.
//!
//! Names are raw bytes: the backing tree may hold names that are not UTF-8.

use crate::error::{Error, Result};
use crate::fs::{Attr, Mount};
use nix::fcntl::{openat, AtFlags, OFlag};
use nix::sys::stat::{fstatat, FileStat, Mode};
use std::ffi::{OsStr, OsString};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Flags for every directory open on the resolution path
pub(crate) fn dir_open_flags() -> OFlag {
    OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC
}

/// Logical path without leading or trailing `/`
pub fn trim_slashes(path: &OsStr) -> &OsStr {
    let mut bytes = path.as_bytes();
    while let [b'/', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b'/'] = bytes {
        bytes = rest;
    }
    OsStr::from_bytes(bytes)
}

/// Reject names that could leave the directory they are resolved in
pub fn check_name(name: impl AsRef<OsStr>) -> Result<()> {
    let name = name.as_ref();
    let bytes = name.as_bytes();
    if bytes.is_empty()
        || bytes == b"."
        || bytes == b".."
        || bytes.contains(&b'/')
        || bytes.contains(&0)
    {
        return Err(Error::InvalidName(name.to_string_lossy().into_owned()));
    }
    Ok(())
}

/// Open directory descriptor, released on drop
///
/// Every live descriptor is counted on its mount so leaks are observable.
pub struct DirFd<'m> {
    fd: OwnedFd,
    live: &'m AtomicUsize,
}

impl<'m> DirFd<'m> {
    fn new(fd: OwnedFd, live: &'m AtomicUsize) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { fd, live }
    }
}

impl AsFd for DirFd<'_> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for DirFd<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Open `rel` below `root` without following symlinks anywhere
///
/// Intermediate descriptors are closed as soon as the next one is open.
pub fn open_dir_nofollow<'m>(
    root: BorrowedFd<'_>,
    rel: &OsStr,
    live: &'m AtomicUsize,
) -> Result<DirFd<'m>> {
    let components: Vec<&OsStr> = rel
        .as_bytes()
        .split(|&b| b == b'/')
        .filter(|c| !c.is_empty())
        .map(OsStr::from_bytes)
        .collect();
    for &c in &components {
        check_name(c)?;
    }

    let mut fd = openat(root, ".", dir_open_flags(), Mode::empty())
        .map_err(|e| Error::from_errno(e, "/"))?;
    for c in components {
        fd = openat(fd.as_fd(), c, dir_open_flags(), Mode::empty())
            .map_err(|e| Error::from_errno(e, &rel.to_string_lossy()))?;
    }
    Ok(DirFd::new(fd, live))
}

/// Directory descriptor plus the leaf name to use with it
pub struct ResolvedTarget<'m> {
    pub dir: DirFd<'m>,
    pub leaf: OsString,
}

impl ResolvedTarget<'_> {
    /// `fstatat` the leaf without following a final symlink
    pub fn stat(&self) -> Result<FileStat> {
        fstatat(
            self.dir.as_fd(),
            self.leaf.as_os_str(),
            AtFlags::AT_SYMLINK_NOFOLLOW,
        )
        .map_err(|e| Error::from_errno(e, &self.leaf.to_string_lossy()))
    }

    /// Raw attributes of the leaf, inode not yet virtualized
    pub fn attr(&self) -> Result<Attr> {
        self.stat().map(|st| Attr::from_stat(&st))
    }
}

/// Resolve `name` inside the directory at logical path `parent_path`
///
/// An empty `name` resolves `parent_path` itself: its containing directory
/// and its own last component. The mount root resolves to itself and `.`.
pub fn resolve<'m>(
    mount: &'m Mount,
    parent_path: impl AsRef<OsStr>,
    name: impl AsRef<OsStr>,
) -> Result<ResolvedTarget<'m>> {
    let parent_path = trim_slashes(parent_path.as_ref());
    let name = name.as_ref();

    if !name.is_empty() {
        check_name(name)?;
        return Ok(ResolvedTarget {
            dir: mount.open_dir(parent_path)?,
            leaf: name.to_os_string(),
        });
    }

    if parent_path.is_empty() {
        return Ok(ResolvedTarget {
            dir: mount.open_dir("")?,
            leaf: OsString::from("."),
        });
    }

    let bytes = parent_path.as_bytes();
    let (dir, base) = match bytes.iter().rposition(|&b| b == b'/') {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (&b""[..], bytes),
    };
    let base = OsStr::from_bytes(base);
    check_name(base)?;
    Ok(ResolvedTarget {
        dir: mount.open_dir(OsStr::from_bytes(dir))?,
        leaf: base.to_os_string(),
    })
}
