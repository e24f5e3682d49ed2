//! Storage seam behind an NBD export

use std::io;

use async_trait::async_trait;

/// I/O target of an [`NbdServer`](crate::NbdServer)
///
/// Errors are reported to the client as the errno derived by
/// [`errno_for`](crate::errno_for).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fill `buf` from `offset`
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write `buf` at `offset`
    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Discard `length` bytes at `offset`
    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize>;

    /// Current size of the device in bytes
    async fn size(&self) -> io::Result<u64>;

    /// Make completed writes durable
    async fn sync(&self) -> io::Result<()>;
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for std::sync::Arc<T> {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset).await
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset).await
    }

    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize> {
        (**self).unmap_at(length, offset).await
    }

    async fn size(&self) -> io::Result<u64> {
        (**self).size().await
    }

    async fn sync(&self) -> io::Result<()> {
        (**self).sync().await
    }
}
