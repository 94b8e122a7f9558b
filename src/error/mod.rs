//! Error handling for the chain node
//!
//! One crate-wide error enum. Validation outcomes are unit variants so the
//! caller can match on them as values; infrastructure failures carry a
//! description string.

use std::fmt;

/// Result type alias for chain node operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Error values surfaced by the chain node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Re-derived component hash does not match the stored one
    ComponentHashMismatch,
    /// Re-derived block hash does not match the stored one
    HashMismatch,
    /// Block hash does not carry enough leading zero bytes
    UnmetDifficulty,
    /// Parent block is absent from the store at height - 1
    UnknownParent,
    /// Store lookup missed
    NotFound,
    /// Ancestry query targeted a hash the store does not hold
    UnknownBlockHash,
    /// Block query had an unrecognised shape
    InvalidBlockQuery,
    /// Block no longer extends the current chain head
    StaleBlock,
    /// Hex string could not be parsed into a hash
    InvalidHash(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Network communication errors
    Network(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::ComponentHashMismatch => write!(f, "component hash mismatch"),
            ChainError::HashMismatch => write!(f, "hash mismatch"),
            ChainError::UnmetDifficulty => write!(f, "unmet difficulty"),
            ChainError::UnknownParent => write!(f, "unknown parent"),
            ChainError::NotFound => write!(f, "not found"),
            ChainError::UnknownBlockHash => write!(f, "unknown block hash"),
            ChainError::InvalidBlockQuery => write!(f, "invalid block query"),
            ChainError::StaleBlock => write!(f, "stale block"),
            ChainError::InvalidHash(msg) => write!(f, "invalid hash: {msg}"),
            ChainError::Database(msg) => write!(f, "Database error: {msg}"),
            ChainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            ChainError::Network(msg) => write!(f, "Network error: {msg}"),
            ChainError::Io(msg) => write!(f, "I/O error: {msg}"),
            ChainError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<sled::Error> for ChainError {
    fn from(err: sled::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ChainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ChainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}
