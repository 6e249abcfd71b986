//! Stat-equivalent attributes reported through the reverse view

use crate::config::Owner;
use nix::sys::stat::FileStat;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File type of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    NamedPipe,
    Socket,
}

impl FileKind {
    /// Decode the `S_IFMT` bits of a mode
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFLNK as u32 => FileKind::Symlink,
            m if m == libc::S_IFBLK as u32 => FileKind::BlockDevice,
            m if m == libc::S_IFCHR as u32 => FileKind::CharDevice,
            m if m == libc::S_IFIFO as u32 => FileKind::NamedPipe,
            m if m == libc::S_IFSOCK as u32 => FileKind::Socket,
            _ => FileKind::RegularFile,
        }
    }

    pub fn to_fuser(&self) -> fuser::FileType {
        match self {
            FileKind::RegularFile => fuser::FileType::RegularFile,
            FileKind::Directory => fuser::FileType::Directory,
            FileKind::Symlink => fuser::FileType::Symlink,
            FileKind::BlockDevice => fuser::FileType::BlockDevice,
            FileKind::CharDevice => fuser::FileType::CharDevice,
            FileKind::NamedPipe => fuser::FileType::NamedPipe,
            FileKind::Socket => fuser::FileType::Socket,
        }
    }
}

/// Attributes of one entry
///
/// Everything passes through from the backing object except `ino`
/// (virtualized), `size` (translated for regular files) and the owner
/// (when a fixed owner is configured).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Device of the backing object
    pub dev: u64,
    /// Inode number; raw until virtualized
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub kind: FileKind,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

fn to_system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

impl Attr {
    pub fn from_stat(st: &FileStat) -> Self {
        Attr {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            size: st.st_size.max(0) as u64,
            blocks: st.st_blocks.max(0) as u64,
            atime: to_system_time(st.st_atime as i64, st.st_atime_nsec as i64),
            mtime: to_system_time(st.st_mtime as i64, st.st_mtime_nsec as i64),
            ctime: to_system_time(st.st_ctime as i64, st.st_ctime_nsec as i64),
            kind: FileKind::from_mode(st.st_mode as u32),
            perm: (st.st_mode as u32 & 0o7777) as u16,
            nlink: st.st_nlink as u32,
            uid: st.st_uid,
            gid: st.st_gid,
            rdev: st.st_rdev as u32,
            blksize: st.st_blksize as u32,
        }
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::RegularFile
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Report `owner` instead of the backing owner, if set
    pub fn apply_owner(&mut self, owner: Option<Owner>) {
        if let Some(owner) = owner {
            self.uid = owner.uid;
            self.gid = owner.gid;
        }
    }

    /// Convert to fuser FileAttr
    pub fn to_fuser_attr(&self) -> fuser::FileAttr {
        fuser::FileAttr {
            ino: self.ino,
            size: self.size,
            blocks: self.blocks,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            crtime: self.ctime,
            kind: self.kind.to_fuser(),
            perm: self.perm,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            blksize: self.blksize,
            flags: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn test_attr(kind: FileKind, size: u64) -> Self {
        Attr {
            dev: 1,
            ino: 2,
            size,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            kind,
            perm: 0o644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            rdev: 0,
            blksize: 4096,
        }
    }
}
