/// Unified error types for the PLC ledger
use thiserror::Error;

/// Main error type for operation validation and storage
#[derive(Error, Debug)]
pub enum PlcError {
    /// A key identifier uses an unrecognized signature algorithm
    #[error("Unsupported key type {key}: {reason}")]
    UnsupportedKey { key: String, reason: String },

    /// Structurally invalid operation
    #[error("Improperly formatted operation: {0}")]
    ImproperOperation(String),

    /// Operation does not extend any known non-nullified entry, or appears out of place
    #[error("Operations not correctly ordered: {0}")]
    MisorderedOperation(String),

    /// No permitted key verifies the operation's signature
    #[error("Invalid signature on operation {0}")]
    InvalidSignature(String),

    /// Claimed DID does not match the hash of the genesis operation
    #[error("Hash of genesis operation does not match DID identifier: {expected}")]
    GenesisHashError { expected: String },

    /// Fork requested outside of the recovery window
    #[error(
        "Recovery operation occurred outside of the allowed 72 hr recovery window. Time lapsed: {}s",
        .elapsed.num_seconds()
    )]
    LateRecovery { elapsed: chrono::Duration },

    /// The log tail changed between validation and commit
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Canonical encoding errors
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlcError {
    /// Only storage conflicts may be retried, and only by re-running validation
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlcError::Conflict(_))
    }

    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            PlcError::UnsupportedKey { .. } => "unsupported_key",
            PlcError::ImproperOperation(_) => "improper_operation",
            PlcError::MisorderedOperation(_) => "misordered_operation",
            PlcError::InvalidSignature(_) => "invalid_signature",
            PlcError::GenesisHashError { .. } => "genesis_hash",
            PlcError::LateRecovery { .. } => "late_recovery",
            PlcError::Conflict(_) => "conflict",
            PlcError::Database(_) => "database",
            PlcError::Migration(_) => "migration",
            PlcError::Encoding(_) => "encoding",
            PlcError::Config(_) => "config",
            PlcError::Io(_) => "io",
            PlcError::Internal(_) => "internal",
        }
    }

    /// Whether this is a permanent validation failure of the submitted operation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlcError::UnsupportedKey { .. }
                | PlcError::ImproperOperation(_)
                | PlcError::MisorderedOperation(_)
                | PlcError::InvalidSignature(_)
                | PlcError::GenesisHashError { .. }
                | PlcError::LateRecovery { .. }
        )
    }
}

/// Result type alias for ledger operations
pub type PlcResult<T> = Result<T, PlcError>;
