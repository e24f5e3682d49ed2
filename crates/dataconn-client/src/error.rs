//! Error types for the outbound connection pool

use std::io;
use std::time::Duration;

use dataconn_nbd::NbdError;
use thiserror::Error;

/// Connection pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid NBD URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("NBD negotiation with {target} failed: {source}")]
    Negotiate {
        target: String,
        #[source]
        source: NbdError,
    },

    #[error("connection {index} reports export size {actual}, expected {expected}")]
    SizeMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection {index} is unhealthy")]
    ConnectionUnavailable { index: usize },

    #[error("a pool holds 1..=8 connections, got {count}")]
    InvalidPoolSize { count: usize },

    #[error("no healthy connections left in pool")]
    NoHealthyConnections,

    #[error(transparent)]
    Nbd(#[from] NbdError),
}

impl PoolError {
    /// Whether the connection that produced this error must not be reused
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        match self {
            Self::Nbd(e) => e.is_transport(),
            _ => true,
        }
    }
}

impl From<PoolError> for io::Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Nbd(e) => e.into(),
            PoolError::Connect { source, .. } => source,
            PoolError::Timeout(_) => Self::new(io::ErrorKind::TimedOut, err),
            PoolError::ConnectionUnavailable { .. } | PoolError::NoHealthyConnections => {
                Self::new(io::ErrorKind::NotConnected, err)
            }
            PoolError::InvalidUri { .. } | PoolError::InvalidPoolSize { .. } => {
                Self::new(io::ErrorKind::InvalidInput, err)
            }
            PoolError::Negotiate { .. } | PoolError::SizeMismatch { .. } => {
                Self::new(io::ErrorKind::InvalidData, err)
            }
        }
    }
}
