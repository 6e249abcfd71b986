//! Sizing contract of the content encryption layer
//!
//! An encrypted file is an 18-byte header followed by one ciphertext chunk
//! per plaintext chunk. Each ciphertext chunk carries its own nonce and
//! authentication tag. Sizes reported through the reverse view must match
//! the encryptor's output length exactly or copy tools truncate files.

use crate::config::{ContentCipher, MountConfig};
use crate::fs::{Attr, FileKind};
use tracing::warn;

/// File header: 2-byte version + 16-byte file id
pub const HEADER_LEN: u64 = 18;

/// AEAD authentication tag length
pub const AUTH_TAG_LEN: u64 = 16;

impl ContentCipher {
    /// Per-chunk nonce length
    pub fn nonce_len(&self) -> u64 {
        match self {
            ContentCipher::AesGcm => 16,
            ContentCipher::XChaCha20Poly1305 => 24,
        }
    }
}

/// Plaintext/ciphertext size arithmetic for one mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSizing {
    chunk_size: u64,
    overhead: u64,
}

impl ContentSizing {
    /// Panics if `chunk_size` is zero; configs are validated before this
    pub fn new(chunk_size: u64, cipher: ContentCipher) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            chunk_size,
            overhead: cipher.nonce_len() + AUTH_TAG_LEN,
        }
    }

    pub fn from_config(config: &MountConfig) -> Self {
        Self::new(config.chunk_size as u64, config.cipher)
    }

    /// Plaintext bytes per chunk
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Nonce + tag bytes added to every chunk
    pub fn chunk_overhead(&self) -> u64 {
        self.overhead
    }

    /// Ciphertext bytes per full chunk
    pub fn cipher_chunk_size(&self) -> u64 {
        self.chunk_size + self.overhead
    }

    /// Size of the encrypted file for a plaintext file of `plain` bytes
    ///
    /// Empty files stay empty: the encryptor writes no header for them.
    pub fn plain_to_cipher(&self, plain: u64) -> u64 {
        if plain == 0 {
            return 0;
        }
        let chunks = plain.div_ceil(self.chunk_size);
        HEADER_LEN
            .saturating_add(plain)
            .saturating_add(chunks.saturating_mul(self.overhead))
    }

    /// Plaintext size for an encrypted file of `cipher` bytes
    ///
    /// Sizes no encryptor could have produced yield 0.
    pub fn cipher_to_plain(&self, cipher: u64) -> u64 {
        if cipher == 0 {
            return 0;
        }
        if cipher < HEADER_LEN {
            warn!("cipher_to_plain: size {} is smaller than the header", cipher);
            return 0;
        }
        let body = cipher - HEADER_LEN;
        let cipher_chunk = self.cipher_chunk_size();
        let full = body / cipher_chunk;
        let partial = body % cipher_chunk;

        let mut plain = full * self.chunk_size;
        if partial > 0 {
            if partial <= self.overhead {
                warn!(
                    "cipher_to_plain: trailing chunk of {} bytes cannot hold data (size {})",
                    partial, cipher
                );
                return 0;
            }
            plain += partial - self.overhead;
        }
        plain
    }

    /// Replace a regular file's plaintext size with its presented size
    pub fn translate_size(&self, attr: &mut Attr) {
        if attr.kind != FileKind::RegularFile {
            return;
        }
        attr.size = self.plain_to_cipher(attr.size);
    }
}

impl Default for ContentSizing {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHUNK_SIZE as u64, ContentCipher::AesGcm)
    }
}
