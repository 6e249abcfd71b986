//! Per-mount shared state
//!
//! One `Mount` exists per reverse mount and every node holds it by `Arc`.
//! It owns the root descriptor that all resolution starts from, the inode
//! table, and the collaborators used for synthetic entries.

use crate::config::{MountConfig, Owner};
use crate::crypto::ContentSizing;
use crate::error::{Error, Result};
use crate::fs::names::REVERSE_CONFIG_NAME;
use crate::fs::resolve::{dir_open_flags, open_dir_nofollow, DirFd};
use crate::fs::InoMap;
use bytes::Bytes;
use nix::fcntl::{openat, OFlag};
use nix::sys::stat::Mode;
use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Produces the bytes served as the configuration descriptor
pub trait ConfigSource: Send + Sync {
    fn serialize(&self, root: BorrowedFd<'_>) -> Result<Bytes>;
}

/// Reads `.gocryptfs.reverse.conf` from the storage root
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseConfigFile;

impl ConfigSource for ReverseConfigFile {
    fn serialize(&self, root: BorrowedFd<'_>) -> Result<Bytes> {
        let fd = openat(
            root,
            REVERSE_CONFIG_NAME,
            OFlag::O_RDONLY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| Error::from_errno(e, REVERSE_CONFIG_NAME))?;

        let mut content = Vec::new();
        std::fs::File::from(fd).read_to_end(&mut content)?;
        Ok(Bytes::from(content))
    }
}

/// Fixed, already serialized configuration
#[derive(Debug, Clone)]
pub struct StaticConfig(pub Bytes);

impl ConfigSource for StaticConfig {
    fn serialize(&self, _root: BorrowedFd<'_>) -> Result<Bytes> {
        Ok(self.0.clone())
    }
}

/// State shared by every node of one mount
pub struct Mount {
    config: MountConfig,
    root: OwnedFd,
    inomap: InoMap,
    sizing: ContentSizing,
    config_source: Box<dyn ConfigSource>,
    /// Directory descriptors currently open through `open_dir`
    open_dirs: AtomicUsize,
}

impl Mount {
    /// Open the backing directory and set up a fresh inode table
    pub fn new(config: MountConfig) -> Result<Self> {
        Self::with_config_source(config, Box::new(ReverseConfigFile))
    }

    pub fn with_config_source(
        config: MountConfig,
        config_source: Box<dyn ConfigSource>,
    ) -> Result<Self> {
        config.validate()?;

        let root = OpenOptions::new()
            .read(true)
            .custom_flags(dir_open_flags().bits())
            .open(&config.backing_dir)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::NotFound(config.backing_dir.display().to_string())
                }
                _ => Error::Io(e),
            })?;

        info!(
            "Reverse mount of {} (chunk size {}, {:?})",
            config.backing_dir.display(),
            config.chunk_size,
            config.cipher
        );

        Ok(Self {
            sizing: ContentSizing::from_config(&config),
            config,
            root: OwnedFd::from(root),
            inomap: InoMap::new(),
            config_source,
            open_dirs: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn inomap(&self) -> &InoMap {
        &self.inomap
    }

    pub fn sizing(&self) -> &ContentSizing {
        &self.sizing
    }

    pub fn force_owner(&self) -> Option<Owner> {
        self.config.force_owner
    }

    pub fn config_source(&self) -> &dyn ConfigSource {
        self.config_source.as_ref()
    }

    /// Descriptor of the backing root, fixed for the life of the mount
    pub fn root_fd(&self) -> BorrowedFd<'_> {
        self.root.as_fd()
    }

    /// Open the directory at logical path `rel`
    pub fn open_dir(&self, rel: impl AsRef<OsStr>) -> Result<DirFd<'_>> {
        open_dir_nofollow(self.root.as_fd(), rel.as_ref(), &self.open_dirs)
    }

    /// Directory descriptors currently held by in-flight operations
    pub fn open_dir_count(&self) -> usize {
        self.open_dirs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_backing_dir() {
        let dir = tempdir().unwrap();
        let config = MountConfig::with_backing_dir(dir.path().join("missing"));
        assert!(Mount::new(config).err().unwrap().is_not_found());
    }

    #[test]
    fn test_backing_dir_must_be_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(Mount::new(MountConfig::with_backing_dir(file)).is_err());
    }

    #[test]
    fn test_reverse_config_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(REVERSE_CONFIG_NAME), b"{\"Version\": 2}").unwrap();
        let mount = Mount::new(MountConfig::with_backing_dir(dir.path())).unwrap();

        let content = mount.config_source().serialize(mount.root_fd()).unwrap();
        assert_eq!(&content[..], b"{\"Version\": 2}");
    }

    #[test]
    fn test_reverse_config_file_symlink_refused() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("elsewhere.conf");
        std::fs::write(&other, b"{}").unwrap();
        std::os::unix::fs::symlink(&other, dir.path().join(REVERSE_CONFIG_NAME)).unwrap();
        let mount = Mount::new(MountConfig::with_backing_dir(dir.path())).unwrap();

        assert!(mount.config_source().serialize(mount.root_fd()).is_err());
    }

    #[test]
    fn test_open_dir_counts() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mount = Mount::new(MountConfig::with_backing_dir(dir.path())).unwrap();

        let a = mount.open_dir("").unwrap();
        let b = mount.open_dir("sub").unwrap();
        assert_eq!(mount.open_dir_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(mount.open_dir_count(), 0);
    }
}
