//! Error types for the data server

use std::io;

use dataconn_common::DataServerProtocol;
use dataconn_nbd::NbdError;
use thiserror::Error;

/// Data server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] dataconn_common::Error),

    #[error("failed to bind {protocol} listener on {address}: {source}")]
    Bind {
        protocol: DataServerProtocol,
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("sector size {sector_size} cannot be advertised as an NBD block size")]
    Geometry { sector_size: u64 },

    #[error("NBD session failed: {0}")]
    Nbd(#[from] NbdError),

    #[error("framed protocol handler failed: {0}")]
    Framed(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for data server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// Whether the error ends the whole server rather than one connection
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Bind { .. })
    }
}

impl From<ServerError> for io::Error {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Io(e) | ServerError::Framed(e) => e,
            ServerError::Nbd(e) => e.into(),
            ServerError::Bind { source, .. } => source,
            ServerError::Config(e) => Self::new(io::ErrorKind::InvalidInput, e),
            other @ ServerError::Geometry { .. } => Self::new(io::ErrorKind::InvalidData, other),
        }
    }
}
