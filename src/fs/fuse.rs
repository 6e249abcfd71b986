//! FUSE binding for the reverse view
//!
//! Thin glue between fuser's inode-number protocol and the node tree. The
//! kernel sees virtual inode numbers directly, except for the root, which is
//! always inode 1.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use fuser::{
    Filesystem, MountOption, ReplyAttr, ReplyData, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyStatfs, Request,
};
use libc::{EBADF, EINVAL, EIO, ENOENT, ENOTSUP, EROFS};
use nix::sys::statvfs::fstatvfs;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::{Attr, Child, FsNode, Mount, Node, VirtualFile};

const ROOT_INO: u64 = 1;

/// Kernel-facing filesystem over one reverse mount
pub struct ReverseFs {
    mount: Arc<Mount>,
    root: Child,
    /// Kernel inode -> child and outstanding lookup count
    children: DashMap<u64, (Child, u64)>,
    /// Open virtual files by handle
    handles: DashMap<u64, Arc<VirtualFile>>,
    next_fh: AtomicU64,
    ttl: Duration,
}

impl ReverseFs {
    pub fn new(mount: Arc<Mount>) -> Self {
        let ttl = Duration::from_secs(mount.config().attr_ttl_secs);
        Self {
            root: Child::Node(Arc::new(Node::root(Arc::clone(&mount)))),
            mount,
            children: DashMap::new(),
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
            ttl,
        }
    }

    /// Mount read-only at `mountpoint`; blocks until unmounted
    pub fn mount(self, mountpoint: &Path) -> std::io::Result<()> {
        let mut options = vec![
            MountOption::RO,
            MountOption::FSName("revcryptfs".to_string()),
            MountOption::Subtype("revcryptfs".to_string()),
            MountOption::DefaultPermissions,
        ];
        if self.mount.config().allow_other {
            options.push(MountOption::AllowOther);
        }
        fuser::mount2(self, mountpoint, &options)
    }

    fn child(&self, ino: u64) -> Option<Child> {
        if ino == ROOT_INO {
            return Some(self.root.clone());
        }
        self.children.get(&ino).map(|e| e.0.clone())
    }

    fn kernel_attr(&self, ino: u64, attr: &Attr) -> fuser::FileAttr {
        let mut out = attr.to_fuser_attr();
        if ino == ROOT_INO {
            out.ino = ROOT_INO;
        }
        out
    }

    /// Number of children the kernel currently holds references to
    pub fn known_inodes(&self) -> usize {
        self.children.len()
    }

    /// Record one kernel lookup of `child`; returns the kernel inode
    ///
    /// A known inode moves to the child it was most recently found as, so
    /// hard links and reused inode numbers resolve through the latest name.
    fn remember(&self, child: Child, ino: u64) -> Option<u64> {
        if ino == ROOT_INO {
            return None;
        }
        match self.children.entry(ino) {
            MapEntry::Occupied(mut e) => {
                let known = e.get_mut();
                known.0 = child;
                known.1 += 1;
            }
            MapEntry::Vacant(e) => {
                e.insert((child, 1));
            }
        }
        Some(ino)
    }

    /// Drop `nlookup` references to `ino`
    fn forget_ino(&self, ino: u64, nlookup: u64) {
        let gone = match self.children.get_mut(&ino) {
            Some(mut e) => {
                e.1 = e.1.saturating_sub(nlookup);
                e.1 == 0
            }
            None => false,
        };
        if gone {
            self.children.remove_if(&ino, |_, e| e.1 == 0);
        }
    }
}

impl Filesystem for ReverseFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);

        let Some(dir) = self.child(parent) else {
            reply.error(ENOENT);
            return;
        };

        match dir.as_fs_node().lookup(name) {
            Ok(entry) => match self.remember(entry.child, entry.attr.ino) {
                Some(ino) => reply.entry(&self.ttl, &self.kernel_attr(ino, &entry.attr), 1),
                None => {
                    error!("{:?} maps onto the root inode number", name);
                    reply.error(EIO);
                }
            },
            Err(e) => {
                debug!("lookup of {:?} failed: {}", name, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.forget_ino(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!("getattr(ino={})", ino);

        let Some(node) = self.child(ino) else {
            reply.error(ENOENT);
            return;
        };
        match node.as_fs_node().getattr(None) {
            Ok(attr) => reply.attr(&self.ttl, &self.kernel_attr(ino, &attr)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={})", ino, flags);

        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(EROFS);
            return;
        }
        match self.child(ino) {
            Some(Child::Virtual(vf)) => {
                let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
                self.handles.insert(fh, vf);
                reply.opened(fh, 0);
            }
            // Content of real files comes from the encryption layer
            Some(Child::Node(_)) => reply.error(ENOTSUP),
            None => reply.error(ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        if offset < 0 {
            reply.error(EINVAL);
            return;
        }
        match self.handles.get(&fh) {
            Some(vf) => reply.data(&vf.read_at(offset as u64, size as usize)),
            None => reply.error(EBADF),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release(ino={}, fh={})", ino, fh);
        self.handles.remove(&fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match fstatvfs(self.mount.root_fd()) {
            Ok(st) => reply.statfs(
                st.blocks() as u64,
                st.blocks_free() as u64,
                st.blocks_available() as u64,
                st.files() as u64,
                st.files_free() as u64,
                st.block_size() as u32,
                st.name_max() as u32,
                st.fragment_size() as u32,
            ),
            Err(e) => {
                error!("statfs on backing root failed: {}", e);
                reply.error(e as i32);
            }
        }
    }
}
