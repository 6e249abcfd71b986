//! Cryptographic helpers for the reverse view
//!
//! Only what the lookup/attribute path needs lives here: deterministic
//! per-path IV derivation and the sizing contract of the content layer.
//! Actual content encryption is done elsewhere.

pub mod content;
pub mod pathiv;

pub use content::{ContentSizing, AUTH_TAG_LEN, HEADER_LEN};
pub use pathiv::{derive, Purpose, DIRIV_LEN};
