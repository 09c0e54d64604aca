//! Error types for Polystore
//!
//! One crate-wide error enum; each variant is a distinct failure category so
//! callers can branch on kind without string matching.

use std::fmt;
use std::io;

/// Main error type for Polystore operations
#[derive(Debug, Clone, PartialEq)]
pub enum PolystoreError {
    /// IO related errors
    Io(String),

    /// Serialization/Deserialization errors
    Serialization(String),
    Deserialization(String),

    /// Bad caller-supplied input (empty PK, zero k, negative range, ...)
    InvalidArgument(String),

    /// Write-write conflict: per-key lock contention or commit-time
    /// snapshot validation failure. Retryable after rollback.
    WriteConflict(String),

    /// Second insert with an already-taken value on a unique index.
    /// Retryable after rollback.
    UniqueViolation(String),

    /// Logical not-found where the operation promises a result
    /// (e.g. shortest path, unknown transaction target)
    NotFound(String),

    /// Transaction misuse or lifecycle errors
    Transaction(String),
    TransactionNotFound(String),

    /// Poisoned or unobtainable lock
    LockPoisoned(String),

    /// Storage related errors
    Storage(String),

    /// Index related errors
    Index(String),

    /// Graph related errors
    Graph(String),

    /// Vector index related errors
    Vector(String),
    VectorDimensionMismatch { expected: usize, actual: usize },

    /// Configuration errors
    Config(String),

    /// Persistent state and in-memory state disagree
    Integrity(String),
}

impl PolystoreError {
    /// True for errors a caller should treat as "roll back and retry the
    /// whole transaction": write-write conflicts and unique-index violations.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict(_) | Self::UniqueViolation(_))
    }
}

impl fmt::Display for PolystoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO Error: {msg}"),
            Self::Serialization(msg) => write!(f, "Serialization Error: {msg}"),
            Self::Deserialization(msg) => write!(f, "Deserialization Error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "Invalid Argument: {msg}"),
            Self::WriteConflict(msg) => write!(f, "Write Conflict: {msg}"),
            Self::UniqueViolation(msg) => write!(f, "Unique Violation: {msg}"),
            Self::NotFound(msg) => write!(f, "Not Found: {msg}"),
            Self::Transaction(msg) => write!(f, "Transaction Error: {msg}"),
            Self::TransactionNotFound(msg) => write!(f, "Transaction Not Found: {msg}"),
            Self::LockPoisoned(msg) => write!(f, "Lock Poisoned: {msg}"),
            Self::Storage(msg) => write!(f, "Storage Error: {msg}"),
            Self::Index(msg) => write!(f, "Index Error: {msg}"),
            Self::Graph(msg) => write!(f, "Graph Error: {msg}"),
            Self::Vector(msg) => write!(f, "Vector Error: {msg}"),
            Self::VectorDimensionMismatch { expected, actual } => {
                write!(f, "Vector Dimension Mismatch: expected {expected}, got {actual}")
            }
            Self::Config(msg) => write!(f, "Config Error: {msg}"),
            Self::Integrity(msg) => write!(f, "Integrity Error: {msg}"),
        }
    }
}

impl std::error::Error for PolystoreError {}

// Implement From traits for common error types
impl From<io::Error> for PolystoreError {
    fn from(error: io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for PolystoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for PolystoreError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<std::string::FromUtf8Error> for PolystoreError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::Deserialization(error.to_string())
    }
}
