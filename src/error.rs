//! Error types for bufmap
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BufMapError
pub type Result<T> = std::result::Result<T, BufMapError>;

/// Unified error type for bufmap operations
#[derive(Debug, Error)]
pub enum BufMapError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("OutOfMemory: Required={required}, Available={available}")]
    OutOfMemory { required: u64, available: u64 },

    // -------------------------------------------------------------------------
    // Value Errors
    // -------------------------------------------------------------------------
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    /// A structural invariant of the buffer does not hold; this is a defect,
    /// not a recoverable user error.
    #[error("Corrupt map structure: {0}")]
    Corrupt(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // -------------------------------------------------------------------------
    // Iteration Errors
    // -------------------------------------------------------------------------
    #[error("Concurrent modification: bucket count {expected}!={actual}")]
    ConcurrentModification { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BufMapError {
    /// True for the out-of-memory condition
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, BufMapError::OutOfMemory { .. })
    }

    pub(crate) fn out_of_memory(required: usize, available: usize) -> Self {
        BufMapError::OutOfMemory {
            required: required as u64,
            available: available as u64,
        }
    }
}
