//! Reserved names and entry classification
//!
//! The reverse view adds a few synthetic entries next to the real ones.
//! Classification is a pure function of the requested name so it can run
//! before any syscall.

/// Name under which the configuration descriptor is presented
pub const CONFIG_NAME: &str = "gocryptfs.conf";

/// Backing file in the storage root holding the configuration
pub const REVERSE_CONFIG_NAME: &str = ".gocryptfs.reverse.conf";

/// Per-directory IV file
pub const DIRIV_NAME: &str = "gocryptfs.diriv";

/// Long-name files are `LONGNAME_PREFIX` + hash + `LONGNAME_SUFFIX`
pub const LONGNAME_PREFIX: &str = "gocryptfs.longname.";
pub const LONGNAME_SUFFIX: &str = ".name";

/// What a requested name denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Backed by a real plaintext object
    RealFile,
    /// Configuration descriptor, same under every directory
    ConfigDescriptor,
    /// Synthetic per-directory IV
    DirectoryIvFile,
    /// Stored full name of an over-long encrypted name
    LongNameFile,
}

impl EntryKind {
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, EntryKind::RealFile)
    }
}

/// `gocryptfs.longname.<hash>.name` with a non-empty hash
pub fn is_long_name_file(name: &str) -> bool {
    name.len() > LONGNAME_PREFIX.len() + LONGNAME_SUFFIX.len()
        && name.starts_with(LONGNAME_PREFIX)
        && name.ends_with(LONGNAME_SUFFIX)
}

/// Classify a requested name
///
/// Exact, case-sensitive matches only; anything unrecognized is a real file.
pub fn classify(name: &str) -> EntryKind {
    if name == CONFIG_NAME {
        EntryKind::ConfigDescriptor
    } else if name == DIRIV_NAME {
        EntryKind::DirectoryIvFile
    } else if is_long_name_file(name) {
        EntryKind::LongNameFile
    } else {
        EntryKind::RealFile
    }
}
