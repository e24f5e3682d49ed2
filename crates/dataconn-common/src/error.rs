//! Error types for dataconn
//!
//! Configuration and parsing failures shared across crates. Data-path
//! errors live next to the component that raises them.

use thiserror::Error;

/// Common result type for dataconn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for dataconn
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("unsupported frontend: {0}")]
    UnsupportedFrontend(String),

    #[error("unsupported failover policy: {0}")]
    UnsupportedFailover(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error was raised while validating configuration values
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedProtocol(_)
                | Self::UnsupportedFrontend(_)
                | Self::UnsupportedFailover(_)
                | Self::Configuration(_)
        )
    }
}
