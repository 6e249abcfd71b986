//! revcryptfs - Encrypted view of a plaintext directory tree
//!
//! This library implements the lookup and attribute path of a reverse-mode
//! encrypting overlay: callers see ciphertext-shaped sizes and synthetic
//! bookkeeping files while the backing store holds ordinary plaintext.

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;

pub use config::MountConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MountConfig;
    pub use crate::error::{Error, Result};
    pub use crate::fs::{Child, Entry, FsNode, Mount, Node};
}
