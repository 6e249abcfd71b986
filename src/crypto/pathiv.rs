//! Path-derived IVs
//!
//! In reverse mode there is nowhere to store random per-directory IVs, so
//! they are derived from the logical path instead. SHA-256 keeps the
//! derivation one-way: the IV does not reveal the path it came from.

use ring::digest::{Context, SHA256};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

/// Length of a directory IV in bytes
pub const DIRIV_LEN: usize = 16;

/// What the derived value will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Content of the per-directory IV file
    DirIv,
    /// File id written into the content header
    FileIv,
    /// IV for encrypting symlink targets
    SymlinkIv,
}

impl Purpose {
    /// Tag mixed into the hash
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::DirIv => "DIRIV",
            Purpose::FileIv => "FILEIV",
            Purpose::SymlinkIv => "SYMLINKIV",
        }
    }
}

/// Derive a 16-byte value from a logical path and purpose
///
/// Computes `SHA-256(path || 0x00 || purpose)` truncated to [`DIRIV_LEN`].
/// The NUL separator keeps `("a", "BC")` and `("aB", "C")` apart. The path
/// is hashed as raw bytes.
pub fn derive(path: impl AsRef<OsStr>, purpose: Purpose) -> [u8; DIRIV_LEN] {
    let mut ctx = Context::new(&SHA256);
    ctx.update(path.as_ref().as_bytes());
    ctx.update(&[0u8]);
    ctx.update(purpose.as_str().as_bytes());
    let digest = ctx.finish();

    let mut out = [0u8; DIRIV_LEN];
    out.copy_from_slice(&digest.as_ref()[..DIRIV_LEN]);
    out
}
