//! Hand-off point for the framed ("default") wire protocol
//!
//! The framed protocol lives outside this crate. Whoever links it provides a
//! [`FramedHandler`]; from then on the handler owns the connection.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use dataconn_common::BoxedStream;
use dataconn_replica::Replica;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Serves one connection speaking the framed protocol
#[async_trait]
pub trait FramedHandler: Send + Sync {
    /// Handle the connection until it closes
    async fn handle(&self, stream: BoxedStream, replica: Arc<dyn Replica>) -> io::Result<()>;
}

/// Closes every framed connection
///
/// Used when no framed protocol implementation is linked in.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectFramedHandler;

#[async_trait]
impl FramedHandler for RejectFramedHandler {
    async fn handle(&self, mut stream: BoxedStream, _replica: Arc<dyn Replica>) -> io::Result<()> {
        warn!("data server: framed protocol is not available, closing connection");
        stream.shutdown().await?;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "framed protocol handler not linked",
        ))
    }
}
