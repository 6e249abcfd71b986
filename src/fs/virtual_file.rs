//! Files that exist only in the reverse view
//!
//! The directory IV file and the configuration descriptor have no plaintext
//! counterpart. They are built on demand from a real stat (for timestamps
//! and device) plus in-memory content, and are never written anywhere.

use crate::crypto::{derive, Purpose};
use crate::error::{Error, Result};
use crate::fs::names::{EntryKind, REVERSE_CONFIG_NAME};
use crate::fs::resolve::{resolve, trim_slashes, ResolvedTarget};
use crate::fs::{Attr, Entry, FileGetattr, FileKind, FsNode, InoTag, Mount};
use bytes::Bytes;
use std::ffi::{OsStr, OsString};
use tracing::{debug, error};

/// Mode bits of every virtual file: read-only regular file
pub const VIRTUAL_FILE_PERM: u16 = 0o444;

/// In-memory file with synthesized attributes
#[derive(Debug, Clone)]
pub struct VirtualFile {
    content: Bytes,
    attr: Attr,
}

impl VirtualFile {
    /// Build a virtual file whose attributes are derived from `base`
    ///
    /// `base` is the raw (not yet virtualized) attribute record of the real
    /// object the file describes. `tag` must not be [`InoTag::Real`], or the
    /// virtual inode would collide with the real object's.
    pub fn new(mount: &Mount, content: Bytes, base: &Attr, tag: InoTag) -> Result<Self> {
        if tag == InoTag::Real {
            error!("virtual file requested with the real-entry inode tag");
            return Err(Error::InvalidState(
                "virtual file inode tag must not be Real".to_string(),
            ));
        }

        let mut attr = base.clone();
        mount.inomap().translate_attr(&mut attr, tag)?;
        attr.kind = FileKind::RegularFile;
        attr.perm = VIRTUAL_FILE_PERM;
        attr.size = content.len() as u64;
        attr.blocks = attr.size.div_ceil(512);
        attr.nlink = 1;
        attr.rdev = 0;
        attr.apply_owner(mount.force_owner());

        Ok(Self { content, attr })
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn attr(&self) -> &Attr {
        &self.attr
    }

    /// Up to `len` bytes starting at `offset`; empty past the end
    pub fn read_at(&self, offset: u64, len: usize) -> Bytes {
        let total = self.content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(total);
        let end = start.saturating_add(len).min(total);
        self.content.slice(start..end)
    }
}

impl FileGetattr for VirtualFile {
    fn getattr(&self) -> Result<Attr> {
        Ok(self.attr.clone())
    }
}

impl FsNode for VirtualFile {
    fn lookup(&self, name: &OsStr) -> Result<Entry> {
        Err(Error::NotADirectory(format!("lookup of {:?} in a virtual file", name)))
    }

    fn getattr(&self, handle: Option<&dyn FileGetattr>) -> Result<Attr> {
        match handle {
            Some(h) => h.getattr(),
            None => Ok(self.attr.clone()),
        }
    }
}

/// Build the synthetic entry `kind` as seen from directory `dir_path`
pub fn synthesize(
    mount: &Mount,
    kind: EntryKind,
    dir_path: impl AsRef<OsStr>,
) -> Result<VirtualFile> {
    let dir_path = trim_slashes(dir_path.as_ref());
    match kind {
        EntryKind::DirectoryIvFile => {
            let target = resolve(mount, dir_path, "")?;
            let base = target.attr()?;
            let iv = derive(dir_path, Purpose::DirIv);
            debug!("diriv for {:?}: {}", dir_path, hex::encode(iv));
            VirtualFile::new(mount, Bytes::copy_from_slice(&iv), &base, InoTag::DirIv)
        }
        EntryKind::ConfigDescriptor => {
            let root = ResolvedTarget {
                dir: mount.open_dir("")?,
                leaf: OsString::from(REVERSE_CONFIG_NAME),
            };
            let base = root.attr()?;
            let content = mount.config_source().serialize(mount.root_fd())?;
            VirtualFile::new(mount, content, &base, InoTag::Config)
        }
        EntryKind::LongNameFile => Err(Error::NotSupported(
            "long name files are not implemented in reverse mode".to_string(),
        )),
        EntryKind::RealFile => Err(Error::InvalidState(
            "real files cannot be synthesized".to_string(),
        )),
    }
}
