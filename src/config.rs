//! Mount configuration for revcryptfs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default plaintext chunk size: 4KiB
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest chunk size the content layer accepts
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default attribute/entry TTL reported to the kernel
pub const DEFAULT_ATTR_TTL_SECS: u64 = 1;

/// AEAD used by the content layer; only its nonce size matters here
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContentCipher {
    /// AES-256-GCM with 128-bit nonces
    #[default]
    AesGcm,
    /// XChaCha20-Poly1305 with 192-bit nonces
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

/// Fixed owner reported for every entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl FromStr for Owner {
    type Err = Error;

    /// Parse `uid:gid`
    fn from_str(s: &str) -> Result<Self> {
        let (uid, gid) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::InvalidConfig(format!("owner must be uid:gid, got {:?}", s)))?;
        let parse = |v: &str| {
            v.parse::<u32>()
                .map_err(|e| Error::InvalidConfig(format!("bad owner id {:?}: {}", v, e)))
        };
        Ok(Owner {
            uid: parse(uid)?,
            gid: parse(gid)?,
        })
    }
}

/// Process-wide configuration for one reverse mount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Plaintext directory presented in encrypted form
    pub backing_dir: PathBuf,

    /// Plaintext bytes per encrypted chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Content cipher, determines per-chunk nonce overhead
    #[serde(default)]
    pub cipher: ContentCipher,

    /// Report this owner instead of the backing file's
    #[serde(default)]
    pub force_owner: Option<Owner>,

    /// Allow other users to access the mount
    #[serde(default)]
    pub allow_other: bool,

    /// TTL for attributes and entries handed to the kernel
    #[serde(default = "default_attr_ttl")]
    pub attr_ttl_secs: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_attr_ttl() -> u64 {
    DEFAULT_ATTR_TTL_SECS
}

impl MountConfig {
    /// Configuration with defaults for everything but the backing directory
    pub fn with_backing_dir(backing_dir: impl Into<PathBuf>) -> Self {
        MountConfig {
            backing_dir: backing_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cipher: ContentCipher::default(),
            force_owner: None,
            allow_other: false,
            attr_ttl_secs: DEFAULT_ATTR_TTL_SECS,
        }
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: MountConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus overrides, validated; for running without a config file
    pub fn from_overrides<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::with_backing_dir("/");
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `REVCRYPTFS_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("REVCRYPTFS_BACKING_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.backing_dir = PathBuf::from(dir);
            }
        }

        if let Some(chunk_size) = lookup("REVCRYPTFS_CHUNK_SIZE") {
            if let Ok(size) = chunk_size.trim().parse::<usize>() {
                self.chunk_size = size;
            }
        }

        if let Some(owner) = lookup("REVCRYPTFS_FORCE_OWNER") {
            if !owner.trim().is_empty() {
                self.force_owner = Some(owner.parse()?);
            }
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.backing_dir.is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "Backing directory must be absolute: {}",
                self.backing_dir.display()
            )));
        }

        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "Chunk size exceeds {} bytes",
                MAX_CHUNK_SIZE
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_owner_parse() {
        let owner: Owner = "1000:100".parse().unwrap();
        assert_eq!(owner, Owner { uid: 1000, gid: 100 });

        assert!("1000".parse::<Owner>().is_err());
        assert!("a:b".parse::<Owner>().is_err());
    }

    #[test]
    fn test_validate() {
        let config = MountConfig::with_backing_dir("/srv/plain");
        assert!(config.validate().is_ok());

        let relative = MountConfig::with_backing_dir("plain");
        assert!(relative.validate().is_err());

        let mut zero = MountConfig::with_backing_dir("/srv/plain");
        zero.chunk_size = 0;
        assert!(zero.validate().is_err());

        let mut huge = MountConfig::with_backing_dir("/srv/plain");
        huge.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("REVCRYPTFS_BACKING_DIR", "/data/plain"),
            ("REVCRYPTFS_CHUNK_SIZE", "8192"),
            ("REVCRYPTFS_FORCE_OWNER", "0:0"),
        ]
        .into_iter()
        .collect();

        let mut config = MountConfig::with_backing_dir("/srv/plain");
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.backing_dir, PathBuf::from("/data/plain"));
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.force_owner, Some(Owner { uid: 0, gid: 0 }));
    }

    #[test]
    fn test_from_overrides_validates() {
        let config = MountConfig::from_overrides(|_| None).unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);

        let zero = MountConfig::from_overrides(|k| {
            (k == "REVCRYPTFS_CHUNK_SIZE").then(|| "0".to_string())
        });
        assert!(matches!(zero, Err(Error::InvalidConfig(_))));

        let relative = MountConfig::from_overrides(|k| {
            (k == "REVCRYPTFS_BACKING_DIR").then(|| "plain".to_string())
        });
        assert!(matches!(relative, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_save_and_load_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("revcryptfs.json");
        std::fs::write(&path, r#"{"backing_dir": "/srv/plain", "cipher": "xchacha20-poly1305"}"#)
            .unwrap();

        let config = MountConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.cipher, ContentCipher::XChaCha20Poly1305);
        assert_eq!(config.attr_ttl_secs, DEFAULT_ATTR_TTL_SECS);
        assert!(config.force_owner.is_none());

        let saved = dir.path().join("saved.json");
        config.save(&saved).unwrap();
        let text = std::fs::read_to_string(&saved).unwrap();
        assert!(text.contains("\"xchacha20-poly1305\""));
    }
}
