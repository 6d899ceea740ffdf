//! Index keys and record identifiers
//!
//! Keys are fixed width: integers as-is, strings as a 20-byte digest,
//! geospatial values as 64-bit cell ids. Ordering is deterministic:
//! Integer < Digest < Cell.

use std::fmt;

use sha2::{Digest as _, Sha256};

/// Width of string key and record digests
pub const DIGEST_LEN: usize = 20;

/// Strings longer than this are not indexed
pub const MAX_STRING_KEY_LEN: usize = 2048;

/// A typed index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Integer(i64),
    Digest([u8; DIGEST_LEN]),
    Cell(u64),
}

impl IndexKey {
    pub fn from_int(v: i64) -> Self {
        IndexKey::Integer(v)
    }

    /// Hash a string value down to a fixed-width digest.
    pub fn from_str_value(s: &str) -> Self {
        IndexKey::Digest(digest20(s.as_bytes()))
    }

    pub fn from_cell(cell: u64) -> Self {
        IndexKey::Cell(cell)
    }

    /// Canonical bytes, used for partition hashing
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            IndexKey::Integer(v) => v.to_be_bytes().to_vec(),
            IndexKey::Digest(d) => d.to_vec(),
            IndexKey::Cell(c) => c.to_be_bytes().to_vec(),
        }
    }

    /// Partition owning this key among `partitions` shards.
    pub fn partition(&self, partitions: usize) -> usize {
        if partitions <= 1 {
            return 0;
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.to_bytes());
        hasher.finalize() as usize % partitions
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Integer(v) => write!(f, "{}", v),
            IndexKey::Digest(d) => write!(f, "{}", hex(d)),
            IndexKey::Cell(c) => write!(f, "cell:{:016x}", c),
        }
    }
}

/// Identifier of the record an index entry points at
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey([u8; DIGEST_LEN]);

impl RecordKey {
    pub fn from_digest(digest: [u8; DIGEST_LEN]) -> Self {
        Self(digest)
    }

    /// Digest a user key.
    pub fn from_user_key(key: &str) -> Self {
        Self(digest20(key.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", hex(&self.0))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

fn digest20(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let full = Sha256::digest(bytes);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&full[..DIGEST_LEN]);
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
