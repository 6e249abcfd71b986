//! Error types for revcryptfs
//!
//! Every storage failure is mapped to one of these kinds as soon as it
//! surfaces. The kernel adapter turns them into errno values.

use nix::errno::Errno;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Target or parent directory is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying storage call failed for a reason other than absence
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry kind intentionally left unimplemented
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Internal invariant violated
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Name would escape descriptor-relative resolution
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Lookup below something that is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errno reported to the kernel for this error
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::NotFound(_) => libc::ENOENT,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::NotSupported(_) => libc::ENOTSUP,
            Error::InvalidName(_) => libc::EINVAL,
            Error::NotADirectory(_) => libc::ENOTDIR,
            Error::InvalidState(_)
            | Error::Config(_)
            | Error::InvalidConfig(_)
            | Error::Serialization(_) => libc::EIO,
        }
    }

    /// Map a failed syscall on `what` to the nearest error kind
    pub fn from_errno(errno: Errno, what: &str) -> Self {
        match errno {
            Errno::ENOENT => Error::NotFound(what.to_string()),
            other => Error::Io(std::io::Error::from(other)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::from_errno(errno, errno.desc())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
