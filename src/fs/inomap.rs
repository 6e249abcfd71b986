//! Virtual inode numbers
//!
//! Backing entries may live on several devices, and synthetic entries have
//! no inode of their own, so raw inode numbers cannot be reported as-is.
//! Each (device, tag) pair gets a namespace that occupies the top bits of the
//! reported number; the low 48 bits pass the raw inode through. Raw inodes
//! that do not fit, or that arrive after the namespaces run out, are handed
//! sequential numbers from a spill table with the top bit set.

use crate::error::{Error, Result};
use crate::fs::Attr;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::error;

/// Raw inode bits passed through unchanged
pub const PASSTHRU_BITS: u32 = 48;

/// Namespace bits above the pass-through bits; bit 63 is left for spill
pub const NAMESPACE_BITS: u32 = 15;

pub const MAX_PASSTHRU_INO: u64 = (1 << PASSTHRU_BITS) - 1;

const MAX_NAMESPACE: u64 = (1 << NAMESPACE_BITS) - 1;

/// Marks numbers from the spill table
pub const SPILL_BIT: u64 = 1 << 63;

const MAX_SPILL: u64 = SPILL_BIT - 1;

/// Distinguishes synthetic entries from the real object they are based on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InoTag {
    Real = 0,
    DirIv = 1,
    NameFile = 2,
    Config = 3,
}

/// Qualified inode: what the virtual number is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QIno {
    pub dev: u64,
    pub tag: InoTag,
    pub ino: u64,
}

impl QIno {
    pub fn new(dev: u64, tag: InoTag, ino: u64) -> Self {
        Self { dev, tag, ino }
    }

    pub fn from_attr(attr: &Attr, tag: InoTag) -> Self {
        Self::new(attr.dev, tag, attr.ino)
    }
}

#[derive(Default)]
struct Tables {
    namespaces: HashMap<(u64, InoTag), u64>,
    next_namespace: u64,
    spill: HashMap<QIno, u64>,
    next_spill: u64,
}

impl Tables {
    fn spill(&mut self, q: QIno) -> Result<u64> {
        if let Some(&n) = self.spill.get(&q) {
            return Ok(SPILL_BIT | n);
        }
        if self.next_spill > MAX_SPILL {
            error!("inode spill table exhausted at {:?}", q);
            return Err(Error::InvalidState("inode spill table exhausted".to_string()));
        }
        let n = self.next_spill;
        self.next_spill += 1;
        self.spill.insert(q, n);
        Ok(SPILL_BIT | n)
    }
}

/// Mount-lifetime table of virtual inode numbers
///
/// Entries are never removed. One lock guards both tables so concurrent
/// first sightings of the same object agree on one number.
pub struct InoMap {
    tables: Mutex<Tables>,
}

impl InoMap {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Virtual inode number for `q`, stable for the life of the map
    pub fn translate(&self, q: QIno) -> Result<u64> {
        let mut tables = self.tables.lock();

        if q.ino > MAX_PASSTHRU_INO {
            return tables.spill(q);
        }

        let ns = match tables.namespaces.get(&(q.dev, q.tag)) {
            Some(&ns) => ns,
            None => {
                if tables.next_namespace > MAX_NAMESPACE {
                    return tables.spill(q);
                }
                let ns = tables.next_namespace;
                tables.next_namespace += 1;
                tables.namespaces.insert((q.dev, q.tag), ns);
                ns
            }
        };

        Ok(ns << PASSTHRU_BITS | q.ino)
    }

    /// Replace the raw inode in `attr` with its virtual number
    pub fn translate_attr(&self, attr: &mut Attr, tag: InoTag) -> Result<()> {
        attr.ino = self.translate(QIno::from_attr(attr, tag))?;
        Ok(())
    }

    /// Namespaces handed out so far
    pub fn namespace_count(&self) -> usize {
        self.tables.lock().namespaces.len()
    }

    /// Entries in the spill table
    pub fn spill_count(&self) -> usize {
        self.tables.lock().spill.len()
    }

    #[cfg(test)]
    fn exhaust_namespaces(&self) {
        self.tables.lock().next_namespace = MAX_NAMESPACE + 1;
    }
}

impl Default for InoMap {
    fn default() -> Self {
        Self::new()
    }
}
