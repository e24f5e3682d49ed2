//! Seams between the pool and its connections

use std::io;

use async_trait::async_trait;
use dataconn_nbd::{NbdClient, NbdError};
use tokio::io::{AsyncRead, AsyncWrite};

/// Opens transport streams to one remote export
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream to the remote
    async fn dial(&self) -> io::Result<Self::Stream>;

    /// Export to select once connected
    fn export_name(&self) -> &str;

    /// Printable description of the remote, for logs and errors
    fn target(&self) -> String;
}

/// One established connection as used by the pool
#[async_trait]
pub trait BlockChannel: Send {
    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), NbdError>;

    async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<(), NbdError>;

    /// Tell the remote we are leaving and close the stream
    async fn close(&mut self) -> Result<(), NbdError>;
}

#[async_trait]
impl<S> BlockChannel for NbdClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), NbdError> {
        NbdClient::read_at(self, buf, offset).await
    }

    async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<(), NbdError> {
        NbdClient::write_at(self, buf, offset).await
    }

    async fn close(&mut self) -> Result<(), NbdError> {
        self.disconnect().await
    }
}
