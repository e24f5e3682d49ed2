//! Replica error types

use std::io;

use thiserror::Error;

/// Replica error
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// Offset out of bounds
    #[error("Offset {offset} + length {length} exceeds replica size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    /// Write against a read-only replica
    #[error("Replica is read-only")]
    ReadOnly,

    /// Backing file is larger than the configured size
    #[error("Backing file is {actual} bytes, expected at most {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for replica operations
pub type ReplicaResult<T> = Result<T, ReplicaError>;

impl From<ReplicaError> for io::Error {
    fn from(err: ReplicaError) -> Self {
        match err {
            ReplicaError::Io(e) => e,
            ReplicaError::OutOfBounds { .. } => Self::new(io::ErrorKind::InvalidInput, err),
            ReplicaError::ReadOnly => Self::new(io::ErrorKind::PermissionDenied, err),
            ReplicaError::SizeMismatch { .. } => Self::new(io::ErrorKind::InvalidData, err),
        }
    }
}
