//! Nodes of the reverse view and the two operations the kernel drives
//!
//! A node only remembers its name and its parent link; the logical path is
//! rebuilt from the ancestry when needed. Nodes are created on first lookup
//! and dropped when the kernel forgets them.

use crate::error::{Error, Result};
use crate::fs::names::{classify, EntryKind};
use crate::fs::resolve::{check_name, resolve, ResolvedTarget};
use crate::fs::virtual_file::{synthesize, VirtualFile};
use crate::fs::{Attr, InoTag, Mount};
use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use tracing::{debug, warn};

/// An open handle that pins the object it was opened on
pub trait FileGetattr: Send + Sync {
    fn getattr(&self) -> Result<Attr>;
}

/// Operations the kernel-facing layer dispatches to tree nodes
pub trait FsNode: Send + Sync {
    /// Find `name` in this directory
    fn lookup(&self, name: &OsStr) -> Result<Entry>;

    /// Attributes of this node, through `handle` if one is open
    fn getattr(&self, handle: Option<&dyn FileGetattr>) -> Result<Attr>;
}

/// Child produced by a lookup
#[derive(Clone)]
pub enum Child {
    /// Backed by a real plaintext object
    Node(Arc<Node>),
    /// Exists only in the reverse view
    Virtual(Arc<VirtualFile>),
}

impl Child {
    pub fn as_fs_node(&self) -> &dyn FsNode {
        match self {
            Child::Node(n) => n.as_ref(),
            Child::Virtual(v) => v.as_ref(),
        }
    }
}

/// Result of a successful lookup
#[derive(Clone)]
pub struct Entry {
    pub child: Child,
    pub attr: Attr,
}

struct PathLink {
    parent: Option<Arc<PathLink>>,
    name: OsString,
}

/// A real file or directory in the reverse view
pub struct Node {
    mount: Arc<Mount>,
    /// `None` for the root
    link: Option<Arc<PathLink>>,
}

impl Node {
    pub fn root(mount: Arc<Mount>) -> Self {
        Self { mount, link: None }
    }

    fn child(&self, name: &OsStr) -> Self {
        Self {
            mount: Arc::clone(&self.mount),
            link: Some(Arc::new(PathLink {
                parent: self.link.clone(),
                name: name.to_os_string(),
            })),
        }
    }

    pub fn mount(&self) -> &Arc<Mount> {
        &self.mount
    }

    pub fn is_root(&self) -> bool {
        self.link.is_none()
    }

    /// Last path component, empty for the root
    pub fn name(&self) -> &OsStr {
        self.link
            .as_ref()
            .map_or(OsStr::new(""), |l| l.name.as_os_str())
    }

    /// Logical path relative to the mount root, `""` for the root
    pub fn path(&self) -> OsString {
        let mut names = Vec::new();
        let mut cur = self.link.as_deref();
        while let Some(link) = cur {
            names.push(link.name.as_os_str());
            cur = link.parent.as_deref();
        }

        let mut path = OsString::new();
        for (i, name) in names.iter().rev().enumerate() {
            if i > 0 {
                path.push("/");
            }
            path.push(name);
        }
        path
    }

    /// Stat a resolved target and turn it into presented attributes
    fn presented_attr(&self, target: &ResolvedTarget<'_>) -> Result<Attr> {
        let mut attr = target.attr()?;
        self.mount.inomap().translate_attr(&mut attr, InoTag::Real)?;
        self.mount.sizing().translate_size(&mut attr);
        attr.apply_owner(self.mount.force_owner());
        Ok(attr)
    }
}

impl FsNode for Node {
    fn lookup(&self, name: &OsStr) -> Result<Entry> {
        check_name(name)?;
        let path = self.path();
        debug!("lookup(path={:?}, name={:?})", path, name);

        // reserved names are ASCII, so anything else is a real file
        let kind = name.to_str().map_or(EntryKind::RealFile, classify);
        match kind {
            kind @ (EntryKind::ConfigDescriptor | EntryKind::DirectoryIvFile) => {
                let vf = synthesize(&self.mount, kind, &path)?;
                let attr = vf.attr().clone();
                Ok(Entry {
                    child: Child::Virtual(Arc::new(vf)),
                    attr,
                })
            }
            EntryKind::LongNameFile => {
                warn!("long name file {:?} requested under {:?}", name, path);
                Err(Error::NotSupported(format!("long name file {:?}", name)))
            }
            EntryKind::RealFile => {
                let target = resolve(&self.mount, &path, name)?;
                let attr = self.presented_attr(&target)?;
                Ok(Entry {
                    child: Child::Node(Arc::new(self.child(name))),
                    attr,
                })
            }
        }
    }

    fn getattr(&self, handle: Option<&dyn FileGetattr>) -> Result<Attr> {
        if let Some(h) = handle {
            return h.getattr();
        }
        debug!("getattr(path={:?})", self.path());

        let target = resolve(&self.mount, self.path(), "")?;
        self.presented_attr(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MountConfig, Owner};
    use crate::crypto::{derive, Purpose, DIRIV_LEN, HEADER_LEN};
    use crate::fs::names::{CONFIG_NAME, DIRIV_NAME, REVERSE_CONFIG_NAME};
    use crate::fs::FileKind;
    use std::fs;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;
    use tempfile::{tempdir, TempDir};

    const CONF: &[u8] = b"{\"Creator\": \"test\", \"Version\": 2}";

    struct Fixture {
        dir: TempDir,
        root: Node,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(|_| {})
        }

        fn with_config(tweak: impl FnOnce(&mut MountConfig)) -> Self {
            let dir = tempdir().unwrap();
            let p = dir.path();
            fs::create_dir_all(p.join("a/b")).unwrap();
            fs::create_dir_all(p.join("a/c")).unwrap();
            fs::write(p.join("empty"), b"").unwrap();
            fs::write(p.join("a/b/chunk"), vec![7u8; 4096]).unwrap();
            fs::write(p.join(REVERSE_CONFIG_NAME), CONF).unwrap();

            let mut config = MountConfig::with_backing_dir(p);
            tweak(&mut config);
            let mount = Arc::new(Mount::new(config).unwrap());
            Self {
                dir,
                root: Node::root(mount),
            }
        }

        fn mount(&self) -> &Mount {
            self.root.mount()
        }

        /// Walk from the root through real directories
        fn node(&self, path: &str) -> Arc<Node> {
            let mut cur = Arc::new(Node::root(Arc::clone(self.root.mount())));
            for name in path.split('/').filter(|n| !n.is_empty()) {
                cur = match cur.lookup(OsStr::new(name)).unwrap().child {
                    Child::Node(n) => n,
                    Child::Virtual(_) => panic!("{} is virtual", name),
                };
            }
            cur
        }
    }

    #[test]
    fn test_path_from_ancestry() {
        let fx = Fixture::new();
        assert_eq!(fx.root.path(), "");
        assert!(fx.root.is_root());

        let b = fx.node("a/b");
        assert_eq!(b.path(), "a/b");
        assert_eq!(b.name(), "b");
    }

    #[test]
    fn test_config_same_under_every_directory() {
        let fx = Fixture::new();

        let top = fx.root.lookup(OsStr::new(CONFIG_NAME)).unwrap();
        let deep = fx.node("a/b").lookup(OsStr::new(CONFIG_NAME)).unwrap();

        assert_eq!(top.attr.size, CONF.len() as u64);
        assert_eq!(deep.attr.size, CONF.len() as u64);
        assert_eq!(top.attr.ino, deep.attr.ino);
        assert_eq!(top.attr.perm, 0o444);

        // distinct from the backing file's own virtual inode
        let backing = fs::metadata(fx.dir.path().join(REVERSE_CONFIG_NAME)).unwrap();
        let real = fx
            .mount()
            .inomap()
            .translate(crate::fs::QIno::new(backing.dev(), InoTag::Real, backing.ino()))
            .unwrap();
        assert_ne!(top.attr.ino, real);

        match top.child {
            Child::Virtual(vf) => assert_eq!(&vf.content()[..], CONF),
            Child::Node(_) => panic!("config must be virtual"),
        }
        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_config_missing_is_not_found() {
        let fx = Fixture::new();
        fs::remove_file(fx.dir.path().join(REVERSE_CONFIG_NAME)).unwrap();

        assert!(fx.root.lookup(OsStr::new(CONFIG_NAME)).err().unwrap().is_not_found());
        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_diriv_differs_per_directory() {
        let fx = Fixture::new();

        let b = fx.node("a/b").lookup(OsStr::new(DIRIV_NAME)).unwrap();
        let c = fx.node("a/c").lookup(OsStr::new(DIRIV_NAME)).unwrap();

        assert_eq!(b.attr.size, DIRIV_LEN as u64);
        assert_eq!(c.attr.size, DIRIV_LEN as u64);
        assert_ne!(b.attr.ino, c.attr.ino);

        let content = |e: &Entry| match &e.child {
            Child::Virtual(vf) => vf.content().clone(),
            Child::Node(_) => panic!("diriv must be virtual"),
        };
        assert_ne!(content(&b), content(&c));
        assert_eq!(&content(&b)[..], &derive("a/b", Purpose::DirIv)[..]);
    }

    #[test]
    fn test_diriv_inode_distinct_from_directory() {
        let fx = Fixture::new();
        let b = fx.node("a/b");

        let dir_attr = b.getattr(None).unwrap();
        let iv = b.lookup(OsStr::new(DIRIV_NAME)).unwrap();
        assert_ne!(dir_attr.ino, iv.attr.ino);
        assert_eq!(iv.attr.mtime, dir_attr.mtime);
    }

    #[test]
    fn test_getattr_translates_size() {
        let fx = Fixture::new();

        let empty = fx.node("empty").getattr(None).unwrap();
        assert_eq!(empty.size, 0);

        let chunk = fx.node("a/b/chunk").getattr(None).unwrap();
        assert_eq!(chunk.size, HEADER_LEN + 4096 + 32);
        assert_eq!(chunk.kind, FileKind::RegularFile);
    }

    #[test]
    fn test_lookup_and_getattr_agree() {
        let fx = Fixture::new();
        let b = fx.node("a/b");

        let entry = b.lookup(OsStr::new("chunk")).unwrap();
        let again = match &entry.child {
            Child::Node(n) => n.getattr(None).unwrap(),
            Child::Virtual(_) => panic!("chunk must be real"),
        };
        assert_eq!(entry.attr.ino, again.ino);
        assert_eq!(entry.attr.size, again.size);
    }

    #[test]
    fn test_directory_size_untouched() {
        let fx = Fixture::new();
        let on_disk = fs::metadata(fx.dir.path().join("a")).unwrap().len();
        let attr = fx.root.lookup(OsStr::new("a")).unwrap().attr;
        assert_eq!(attr.size, on_disk);
        assert!(attr.is_dir());
    }

    #[test]
    fn test_root_getattr() {
        let fx = Fixture::new();
        let attr = fx.root.getattr(None).unwrap();
        assert!(attr.is_dir());
        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_missing_entries() {
        let fx = Fixture::new();

        assert!(fx.root.lookup(OsStr::new("ghost")).err().unwrap().is_not_found());
        assert!(fx.node("a").lookup(OsStr::new("ghost")).err().unwrap().is_not_found());

        // parent removed after its node was created
        let c = fx.node("a/c");
        fs::remove_dir(fx.dir.path().join("a/c")).unwrap();
        assert!(c.getattr(None).err().unwrap().is_not_found());
        assert!(c.lookup(OsStr::new("x")).err().unwrap().is_not_found());
        assert!(c.lookup(OsStr::new(DIRIV_NAME)).err().unwrap().is_not_found());

        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_long_name_not_supported() {
        let fx = Fixture::new();
        let err = fx.root.lookup(OsStr::new("gocryptfs.longname.abcdef.name")).err().unwrap();
        assert!(matches!(err, Error::NotSupported(_)));
        assert_eq!(err.to_errno(), libc::ENOTSUP);
    }

    #[test]
    fn test_invalid_names() {
        let fx = Fixture::new();
        for name in ["", "..", ".", "a/b"] {
            assert!(
                matches!(fx.root.lookup(OsStr::new(name)), Err(Error::InvalidName(_))),
                "name={:?}",
                name
            );
        }

        // an empty name must not produce a child aliasing its parent
        let a = fx.node("a");
        assert!(matches!(a.lookup(OsStr::new("")), Err(Error::InvalidName(_))));
        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_non_utf8_names() {
        let fx = Fixture::new();
        let name = OsStr::from_bytes(b"caf\xe9");
        fs::write(fx.dir.path().join("a").join(name), b"xyz").unwrap();

        let entry = fx.node("a").lookup(name).unwrap();
        assert_eq!(entry.attr.size, HEADER_LEN + 3 + 32);

        let node = match entry.child {
            Child::Node(n) => n,
            Child::Virtual(_) => panic!("non-UTF-8 name must be real"),
        };
        assert_eq!(node.path().as_bytes(), b"a/caf\xe9");
        assert_eq!(node.name(), name);
        assert_eq!(node.getattr(None).unwrap().ino, entry.attr.ino);

        // a reserved name with a stray byte is an ordinary missing file
        let near = OsStr::from_bytes(b"gocryptfs.diriv\xff");
        assert!(fx.root.lookup(near).err().unwrap().is_not_found());
        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_symlinked_directory_not_traversed() {
        let fx = Fixture::new();
        std::os::unix::fs::symlink(fx.dir.path().join("a"), fx.dir.path().join("link")).unwrap();

        let link = fx.root.lookup(OsStr::new("link")).unwrap();
        assert_eq!(link.attr.kind, FileKind::Symlink);

        let node = match link.child {
            Child::Node(n) => n,
            Child::Virtual(_) => panic!("symlink must be real"),
        };
        let err = node.lookup(OsStr::new("b")).err().unwrap();
        assert!(matches!(err, Error::Io(_)), "got {:?}", err);
        assert_eq!(fx.mount().open_dir_count(), 0);
    }

    #[test]
    fn test_force_owner() {
        let fx = Fixture::with_config(|c| c.force_owner = Some(Owner { uid: 4321, gid: 8765 }));

        let real = fx.node("a/b/chunk").getattr(None).unwrap();
        assert_eq!((real.uid, real.gid), (4321, 8765));

        let iv = fx.root.lookup(OsStr::new(DIRIV_NAME)).unwrap().attr;
        assert_eq!((iv.uid, iv.gid), (4321, 8765));
    }

    #[test]
    fn test_getattr_with_handle_delegates() {
        let fx = Fixture::new();
        let iv = match fx.root.lookup(OsStr::new(DIRIV_NAME)).unwrap().child {
            Child::Virtual(vf) => vf,
            Child::Node(_) => panic!("diriv must be virtual"),
        };

        // even a vanished backing object is irrelevant once a handle is open
        let c = fx.node("a/c");
        fs::remove_dir(fx.dir.path().join("a/c")).unwrap();
        let handle: &dyn FileGetattr = &*iv;
        let attr = c.getattr(Some(handle)).unwrap();
        assert_eq!(attr, *iv.attr());
    }

    #[test]
    fn test_concurrent_lookups_release_descriptors() {
        let fx = Fixture::new();
        let b = fx.node("a/b");
        let names = ["chunk", "ghost", DIRIV_NAME, CONFIG_NAME, "..", "gocryptfs.longname.x.name"];

        let inos: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let b = Arc::clone(&b);
                    let root = &fx.root;
                    s.spawn(move || {
                        let mut chunk_ino = 0;
                        for i in 0..50 {
                            let name = names[(t + i) % names.len()];
                            if let Ok(entry) = b.lookup(OsStr::new(name)) {
                                if name == "chunk" {
                                    chunk_ino = entry.attr.ino;
                                }
                            }
                            let _ = root.getattr(None);
                        }
                        chunk_ino
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(inos.iter().all(|&i| i != 0 && i == inos[0]));
        assert_eq!(fx.mount().open_dir_count(), 0);
    }
}
