//! Core type definitions for dataconn
//!
//! Transport protocols, wire frontends and pool policies selected by
//! configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Upper bound on parallel outbound connections to one remote export
pub const MAX_POOL_CONNECTIONS: usize = 8;

/// Default export name advertised over NBD
pub const DEFAULT_EXPORT_NAME: &str = "default";

/// Default export description advertised over NBD
pub const DEFAULT_EXPORT_DESCRIPTION: &str = "The default export";

/// Socket family a data server binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Unix,
}

/// Transport protocol of a data server listener
///
/// The `+nbd` variants pin the listener to the NBD frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataServerProtocol {
    #[default]
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "tcp+nbd")]
    TcpNbd,
    #[serde(rename = "unix")]
    Unix,
    #[serde(rename = "unix+nbd")]
    UnixNbd,
}

impl DataServerProtocol {
    /// Socket family to bind
    #[must_use]
    pub const fn transport(self) -> Transport {
        match self {
            Self::Tcp | Self::TcpNbd => Transport::Tcp,
            Self::Unix | Self::UnixNbd => Transport::Unix,
        }
    }

    /// Whether the protocol forces the NBD frontend
    #[must_use]
    pub const fn is_nbd(self) -> bool {
        matches!(self, Self::TcpNbd | Self::UnixNbd)
    }

    /// Frontend actually served on a listener of this protocol
    #[must_use]
    pub const fn effective_frontend(self, configured: Frontend) -> Frontend {
        if self.is_nbd() {
            Frontend::Nbd
        } else {
            configured
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::TcpNbd => "tcp+nbd",
            Self::Unix => "unix",
            Self::UnixNbd => "unix+nbd",
        }
    }
}

impl fmt::Display for DataServerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataServerProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "tcp+nbd" => Ok(Self::TcpNbd),
            "unix" => Ok(Self::Unix),
            "unix+nbd" => Ok(Self::UnixNbd),
            other => Err(Error::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Wire protocol spoken on an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frontend {
    /// External framed binary protocol
    #[default]
    Default,
    /// Network Block Device
    Nbd,
}

impl Frontend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Nbd => "nbd",
        }
    }
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frontend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "nbd" => Ok(Self::Nbd),
            other => Err(Error::UnsupportedFrontend(other.to_string())),
        }
    }
}

/// What the outbound pool does when the selected connection fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverPolicy {
    /// Report the first failure to the caller
    #[default]
    FailFast,
    /// Try the remaining healthy connections in ring order before failing
    Failover,
}

impl fmt::Display for FailoverPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail-fast"),
            Self::Failover => f.write_str("failover"),
        }
    }
}

impl FromStr for FailoverPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(Self::FailFast),
            "failover" => Ok(Self::Failover),
            other => Err(Error::UnsupportedFailover(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!("tcp".parse::<DataServerProtocol>().unwrap(), DataServerProtocol::Tcp);
        assert_eq!(
            "unix+nbd".parse::<DataServerProtocol>().unwrap(),
            DataServerProtocol::UnixNbd
        );
        let err = "udp".parse::<DataServerProtocol>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedProtocol(ref p) if p == "udp"));
    }

    #[test]
    fn test_protocol_transport() {
        assert_eq!(DataServerProtocol::TcpNbd.transport(), Transport::Tcp);
        assert_eq!(DataServerProtocol::Unix.transport(), Transport::Unix);
    }

    #[test]
    fn test_nbd_protocol_forces_frontend() {
        assert_eq!(
            DataServerProtocol::TcpNbd.effective_frontend(Frontend::Default),
            Frontend::Nbd
        );
        assert_eq!(
            DataServerProtocol::Unix.effective_frontend(Frontend::Default),
            Frontend::Default
        );
        assert_eq!(
            DataServerProtocol::Tcp.effective_frontend(Frontend::Nbd),
            Frontend::Nbd
        );
    }

    #[test]
    fn test_frontend_parse() {
        assert_eq!("nbd".parse::<Frontend>().unwrap(), Frontend::Nbd);
        assert!("iscsi".parse::<Frontend>().is_err());
    }

    #[test]
    fn test_failover_parse() {
        assert_eq!(
            "failover".parse::<FailoverPolicy>().unwrap(),
            FailoverPolicy::Failover
        );
        assert_eq!(FailoverPolicy::default(), FailoverPolicy::FailFast);
        assert_eq!(FailoverPolicy::FailFast.to_string(), "fail-fast");
    }
}
