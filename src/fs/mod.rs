//! Reverse-mode filesystem core
//!
//! Presents an encrypted-shaped view of a plaintext directory: real entries
//! are resolved symlink-safely and reported with ciphertext sizes, and a few
//! synthetic entries (directory IVs, the configuration descriptor) are
//! generated on the fly.

mod attr;
mod fuse;
mod inomap;
mod mount;
pub mod names;
mod node;
pub mod resolve;
mod virtual_file;

pub use attr::{Attr, FileKind};
pub use fuse::ReverseFs;
pub use inomap::{InoMap, InoTag, QIno};
pub use mount::{ConfigSource, Mount, ReverseConfigFile, StaticConfig};
pub use names::{classify, EntryKind};
pub use node::{Child, Entry, FileGetattr, FsNode, Node};
pub use virtual_file::{synthesize, VirtualFile};
