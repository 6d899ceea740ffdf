//! Secondary index errors
//!
//! Error kinds map onto stable `AERO_SINDEX_*` codes. Path mismatches are
//! never errors; they produce zero keys.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type for secondary index operations
pub type SindexResult<T> = Result<T, SindexError>;

/// Result type for index store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Memory accounting tier that refused a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemoryTier {
    Global,
    Namespace,
    Index,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Global => "global",
            MemoryTier::Namespace => "namespace",
            MemoryTier::Index => "index",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Secondary index errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SindexError {
    #[error("Index not found: {0}")]
    NotFound(String),

    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Index not readable: {0}")]
    NotReadable(String),

    #[error("Out of memory at {tier} tier ({requested} bytes requested)")]
    OutOfMemory { tier: MemoryTier, requested: u64 },

    #[error("Invariant violated: {0}")]
    Unknown(String),
}

impl SindexError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SindexError::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        SindexError::AlreadyExists(what.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SindexError::InvalidParameter(msg.into())
    }

    pub fn not_readable(name: impl Into<String>) -> Self {
        SindexError::NotReadable(name.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        SindexError::Unknown(msg.into())
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SindexError::NotFound(_) => "AERO_SINDEX_NOT_FOUND",
            SindexError::AlreadyExists(_) => "AERO_SINDEX_ALREADY_EXISTS",
            SindexError::InvalidParameter(_) => "AERO_SINDEX_INVALID_PARAMETER",
            SindexError::NotReadable(_) => "AERO_SINDEX_NOT_READABLE",
            SindexError::OutOfMemory { .. } => "AERO_SINDEX_OUT_OF_MEMORY",
            SindexError::Unknown(_) => "AERO_SINDEX_UNKNOWN",
        }
    }

    /// Only quota exhaustion can succeed on a later attempt without
    /// the caller changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SindexError::OutOfMemory { .. })
    }
}

/// Errors reported by an index store shard
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("index store out of memory")]
    OutOfMemory,

    #[error("index store failure: {0}")]
    Internal(String),
}

impl From<StoreError> for SindexError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OutOfMemory => SindexError::OutOfMemory {
                tier: MemoryTier::Index,
                requested: 0,
            },
            StoreError::Internal(msg) => SindexError::Unknown(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SindexError::not_found("idx").code(), "AERO_SINDEX_NOT_FOUND");
        assert_eq!(
            SindexError::already_exists("idx").code(),
            "AERO_SINDEX_ALREADY_EXISTS"
        );
        assert_eq!(
            SindexError::invalid("bad path").code(),
            "AERO_SINDEX_INVALID_PARAMETER"
        );
        assert_eq!(SindexError::not_readable("idx").code(), "AERO_SINDEX_NOT_READABLE");
        assert_eq!(SindexError::unknown("refcount").code(), "AERO_SINDEX_UNKNOWN");
    }

    #[test]
    fn test_out_of_memory_display() {
        let err = SindexError::OutOfMemory {
            tier: MemoryTier::Namespace,
            requested: 128,
        };
        let display = err.to_string();
        assert!(display.contains("namespace"));
        assert!(display.contains("128"));
        assert!(err.is_retryable());
        assert!(!SindexError::not_found("x").is_retryable());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: SindexError = StoreError::OutOfMemory.into();
        assert!(matches!(
            err,
            SindexError::OutOfMemory {
                tier: MemoryTier::Index,
                ..
            }
        ));

        let err: SindexError = StoreError::Internal("broken".into()).into();
        assert_eq!(err.code(), "AERO_SINDEX_UNKNOWN");
    }
}
