//! Connection sources for the data server
//!
//! - [`BoundListener`]: the TCP or UNIX-domain socket selected by the
//!   configured protocol
//! - [`StreamListener`]: in-memory streams pushed through a channel, for
//!   tests and embedding

use std::io;

use async_trait::async_trait;
use dataconn_common::{BoxedStream, DataServerProtocol, Transport};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::{ServerError, ServerResult};

/// Source of incoming connections
///
/// `accept` returns the stream together with a printable peer description.
/// An error of kind [`io::ErrorKind::BrokenPipe`] means the source is
/// exhausted and no further connections will arrive.
#[async_trait]
pub trait Listener: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;
}

/// A bound TCP or UNIX-domain listener
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl BoundListener {
    /// Local address: `ip:port` for TCP, the socket path for UNIX
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Self::Tcp(l) => l.local_addr().map(|a| a.to_string()),
            Self::Unix(l) => {
                let addr = l.local_addr()?;
                Ok(addr
                    .as_pathname()
                    .map_or_else(|| "(unnamed)".to_string(), |p| p.display().to_string()))
            }
        }
    }
}

#[async_trait]
impl Listener for BoundListener {
    type Stream = BoxedStream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        match self {
            Self::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), peer.to_string()))
            }
            Self::Unix(l) => {
                let (stream, _peer) = l.accept().await?;
                Ok((Box::new(stream), "unix".to_string()))
            }
        }
    }
}

/// Bind the listener for `protocol` on `address`
///
/// Bind failures are fatal and returned to the caller. A stale UNIX socket
/// file is not removed.
pub async fn bind(protocol: DataServerProtocol, address: &str) -> ServerResult<BoundListener> {
    let bound = match protocol.transport() {
        Transport::Tcp => TcpListener::bind(address).await.map(BoundListener::Tcp),
        Transport::Unix => UnixListener::bind(address).map(BoundListener::Unix),
    };
    let listener = bound.map_err(|source| ServerError::Bind {
        protocol,
        address: address.to_string(),
        source,
    })?;

    info!(
        "data server: listening on {protocol}://{}",
        listener.local_addr().unwrap_or_else(|_| address.to_string())
    );
    Ok(listener)
}

/// A listener that accepts streams from a channel
///
/// Accept fails with `BrokenPipe` once every sender is dropped.
pub struct StreamListener<S> {
    rx: mpsc::Receiver<S>,
    accepted: u64,
}

impl<S> StreamListener<S> {
    /// Returns the sender half for pushing streams and the listener
    pub fn new(buffer: usize) -> (mpsc::Sender<S>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx, accepted: 0 })
    }
}

#[async_trait]
impl<S> Listener for StreamListener<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        let stream = self
            .rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "channel closed"))?;
        self.accepted += 1;
        Ok((stream, format!("stream-{}", self.accepted)))
    }
}
