//! NBD URIs
//!
//! Supported forms:
//!
//! - `nbd://host[:port][/export]`
//! - `nbd+unix:///[export]?socket=/path/to.sock`
//!
//! Export names are taken verbatim; percent-encoding is not decoded.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use dataconn_common::BoxedStream;
use tokio::net::{TcpStream, UnixStream};

use crate::channel::Dialer;
use crate::error::PoolError;

/// IANA port for NBD, used when a TCP URI has none
pub const DEFAULT_NBD_PORT: u16 = 10809;

/// A parsed NBD URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NbdUri {
    Tcp {
        host: String,
        port: u16,
        export: String,
    },
    Unix {
        socket: PathBuf,
        export: String,
    },
}

impl NbdUri {
    #[must_use]
    pub fn export(&self) -> &str {
        match self {
            Self::Tcp { export, .. } | Self::Unix { export, .. } => export,
        }
    }
}

impl fmt::Display for NbdUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port, export } if host.contains(':') => {
                write!(f, "nbd://[{host}]:{port}/{export}")
            }
            Self::Tcp { host, port, export } => write!(f, "nbd://{host}:{port}/{export}"),
            Self::Unix { socket, export } => {
                write!(f, "nbd+unix:///{export}?socket={}", socket.display())
            }
        }
    }
}

impl FromStr for NbdUri {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| PoolError::InvalidUri {
            uri: s.to_string(),
            reason,
        };

        if let Some(rest) = s.strip_prefix("nbd+unix://") {
            let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
            if !path.is_empty() && !path.starts_with('/') {
                return Err(invalid("nbd+unix URIs take no host"));
            }
            let socket = query
                .split('&')
                .find_map(|pair| pair.strip_prefix("socket="))
                .filter(|p| !p.is_empty())
                .ok_or_else(|| invalid("missing socket= query parameter"))?;
            return Ok(Self::Unix {
                socket: PathBuf::from(socket),
                export: path.trim_start_matches('/').to_string(),
            });
        }

        let rest = s
            .strip_prefix("nbd://")
            .ok_or_else(|| invalid("scheme must be nbd:// or nbd+unix://"))?;
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // [v6addr] or [v6addr]:port
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(invalid("unexpected characters after IPv6 address")),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        let port = match port {
            Some(p) => p.parse().map_err(|_| invalid("invalid port"))?,
            None => DEFAULT_NBD_PORT,
        };

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
            export: path.to_string(),
        })
    }
}

#[async_trait]
impl Dialer for NbdUri {
    type Stream = BoxedStream;

    async fn dial(&self) -> io::Result<Self::Stream> {
        match self {
            Self::Tcp { host, port, .. } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            Self::Unix { socket, .. } => Ok(Box::new(UnixStream::connect(socket).await?)),
        }
    }

    fn export_name(&self) -> &str {
        self.export()
    }

    fn target(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let uri: NbdUri = "nbd://127.0.0.1:9503".parse().unwrap();
        assert_eq!(
            uri,
            NbdUri::Tcp {
                host: "127.0.0.1".to_string(),
                port: 9503,
                export: String::new(),
            }
        );

        let uri: NbdUri = "nbd://replica-2/vol-7".parse().unwrap();
        assert_eq!(uri.export(), "vol-7");
        assert!(matches!(uri, NbdUri::Tcp { port: DEFAULT_NBD_PORT, .. }));
    }

    #[test]
    fn test_parse_ipv6() {
        let uri: NbdUri = "nbd://[::1]:9000/default".parse().unwrap();
        assert!(matches!(&uri, NbdUri::Tcp { host, port: 9000, .. } if host == "::1"));
        assert_eq!(uri.to_string(), "nbd://[::1]:9000/default");
    }

    #[test]
    fn test_parse_unix() {
        let uri: NbdUri = "nbd+unix:///default?socket=/run/replica.sock"
            .parse()
            .unwrap();
        assert_eq!(
            uri,
            NbdUri::Unix {
                socket: PathBuf::from("/run/replica.sock"),
                export: "default".to_string(),
            }
        );
        assert_eq!(uri.target(), "nbd+unix:///default?socket=/run/replica.sock");
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "http://host/export",
            "nbd://",
            "nbd://host:notaport",
            "nbd://[::1",
            "nbd+unix:///export",
            "nbd+unix://host/export?socket=/x",
        ] {
            let err = bad.parse::<NbdUri>().unwrap_err();
            assert!(matches!(err, PoolError::InvalidUri { .. }), "{bad}");
        }
    }
}
