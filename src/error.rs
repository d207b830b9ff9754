use thiserror::Error;

// ============================================================================
// Key derivation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDerivationError {
    #[error("Invalid UID length: expected 4-10 bytes, got {len}")]
    InvalidUidLength { len: usize },
}

// ============================================================================
// Hardware
// ============================================================================

/// Errors surfaced by a [`HardwareAdapter`](crate::hardware::HardwareAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// The RF session dropped. Remaining reads are aborted.
    #[error("Tag was lost (connection dropped)")]
    TagLost,

    #[error("Tag is not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl HardwareError {
    pub fn is_session_lost(&self) -> bool {
        matches!(self, HardwareError::TagLost)
    }
}

// ============================================================================
// Persistent store / cache
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Internal cache failure. Counted and logged, never returned to callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Persistent store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt cache record for {uid}: {reason}")]
    CorruptRecord { uid: String, reason: String },
}

// ============================================================================
// Per-scan recoverable failures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    #[error("Tag descriptor unavailable: {0}")]
    Unreadable(#[from] HardwareError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("Sector {sector}: both key A and key B rejected")]
    Rejected { sector: u8 },

    #[error("Sector {sector}: authentication error: {source}")]
    Hardware { sector: u8, source: HardwareError },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Block {block}: read failed: {source}")]
pub struct BlockReadError {
    pub block: u8,
    pub source: HardwareError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretationError {
    #[error("Missing required block {0}")]
    MissingBlock(u8),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Malformed field {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Format {0} has no interpreter")]
    Unsupported(String),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
