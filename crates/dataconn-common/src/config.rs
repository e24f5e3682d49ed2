//! Configuration types for dataconn
//!
//! This module defines the configuration file layout shared by the daemon
//! and the library crates. Every field has a default so a partial TOML file
//! (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{
    DEFAULT_EXPORT_DESCRIPTION, DEFAULT_EXPORT_NAME, DataServerProtocol, FailoverPolicy, Frontend,
    MAX_POOL_CONNECTIONS,
};

/// Root configuration for dataconn
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data server (inbound) configuration
    pub server: ServerConfig,
    /// Local replica backing the data server
    pub replica: ReplicaConfig,
    /// Outbound connection pool configuration
    pub client: ClientConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot describe a working data path
    pub fn validate(&self) -> Result<()> {
        if self.server.address.is_empty() {
            return Err(Error::configuration("server.address must not be empty"));
        }
        if self.server.export_name.is_empty() {
            return Err(Error::configuration("server.export_name must not be empty"));
        }
        self.replica.validate()?;
        self.client.validate()
    }
}

/// Inbound data server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Transport protocol (`tcp`, `tcp+nbd`, `unix`, `unix+nbd`)
    pub protocol: DataServerProtocol,
    /// Bind address: `host:port` for TCP, a socket path for UNIX
    pub address: String,
    /// Frontend served on plain `tcp`/`unix` listeners
    pub frontend: Frontend,
    /// NBD export name
    pub export_name: String,
    /// NBD export description
    pub export_description: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: DataServerProtocol::Tcp,
            address: "0.0.0.0:9503".to_string(),
            frontend: Frontend::Nbd,
            export_name: DEFAULT_EXPORT_NAME.to_string(),
            export_description: DEFAULT_EXPORT_DESCRIPTION.to_string(),
        }
    }
}

/// Flat-file replica configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Backing file (created sparse when missing)
    pub path: PathBuf,
    /// Volume size in bytes
    pub size_bytes: u64,
    /// Sector size in bytes
    pub sector_size: u64,
    /// Serve the replica read-only
    pub read_only: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./replica.img"),
            size_bytes: 1024 * 1024 * 1024, // 1 GiB
            sector_size: 512,
            read_only: false,
        }
    }
}

impl ReplicaConfig {
    fn validate(&self) -> Result<()> {
        if self.sector_size == 0 || !self.sector_size.is_power_of_two() {
            return Err(Error::configuration(format!(
                "replica.sector_size must be a power of two, got {}",
                self.sector_size
            )));
        }
        if self.size_bytes == 0 {
            return Err(Error::configuration("replica.size_bytes must be non-zero"));
        }
        if !self.size_bytes.is_multiple_of(self.sector_size) {
            return Err(Error::configuration(format!(
                "replica.size_bytes {} is not a multiple of sector size {}",
                self.size_bytes, self.sector_size
            )));
        }
        Ok(())
    }
}

/// Outbound connection pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote export URI (`nbd://host:port/export` or `nbd+unix:///export?socket=path`)
    pub remote: String,
    /// Per-operation deadline in milliseconds
    pub op_timeout_ms: u64,
    /// Upper bound on pooled connections (1..=8)
    pub max_connections: usize,
    /// Behavior when the selected connection fails
    pub failover: FailoverPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote: "nbd://127.0.0.1:9503".to_string(),
            op_timeout_ms: 8_000,
            max_connections: MAX_POOL_CONNECTIONS,
            failover: FailoverPolicy::FailFast,
        }
    }
}

impl ClientConfig {
    /// Per-operation deadline
    #[must_use]
    pub const fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.op_timeout_ms == 0 {
            return Err(Error::configuration("client.op_timeout_ms must be non-zero"));
        }
        if !(1..=MAX_POOL_CONNECTIONS).contains(&self.max_connections) {
            return Err(Error::configuration(format!(
                "client.max_connections must be within 1..={MAX_POOL_CONNECTIONS}, got {}",
                self.max_connections
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
