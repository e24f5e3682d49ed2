//! NBD backend over a local replica

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use dataconn_nbd::Backend;
use dataconn_replica::Replica;

/// Pass-through from NBD I/O to a replica
///
/// Adds no buffering and no reordering; ordering and durability are exactly
/// the replica's. One instance belongs to one connection.
pub struct ReplicaBackend {
    replica: Arc<dyn Replica>,
}

impl ReplicaBackend {
    pub fn new(replica: Arc<dyn Replica>) -> Self {
        Self { replica }
    }
}

#[async_trait]
impl Backend for ReplicaBackend {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.replica.read_at(buf, offset).await
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.replica.write_at(buf, offset).await
    }

    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize> {
        self.replica.unmap_at(length, offset).await
    }

    async fn size(&self) -> io::Result<u64> {
        let (_state, info) = self.replica.status();
        Ok(info.size)
    }

    // Durability belongs to the replica
    async fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataconn_replica::MemoryReplica;

    fn backend(size: u64) -> (Arc<MemoryReplica>, ReplicaBackend) {
        let replica = Arc::new(MemoryReplica::new(size, 512));
        let backend = ReplicaBackend::new(Arc::clone(&replica) as Arc<dyn Replica>);
        (replica, backend)
    }

    #[tokio::test]
    async fn write_then_read_returns_data() {
        let (_replica, backend) = backend(64 * 1024);

        let data: Vec<u8> = (0..1536u32).map(|i| (i * 7 % 256) as u8).collect();
        assert_eq!(backend.write_at(&data, 4096).await.unwrap(), data.len());

        let mut buf = vec![0u8; data.len()];
        assert_eq!(backend.read_at(&mut buf, 4096).await.unwrap(), data.len());
        assert_eq!(buf, data);
    }

    #[tokio::test]
    async fn size_tracks_replica_status() {
        let (_replica, backend) = backend(10 * 1024 * 1024);
        assert_eq!(backend.size().await.unwrap(), 10_485_760);
        backend.sync().await.unwrap();
    }

    #[tokio::test]
    async fn replica_errors_pass_through() {
        let (replica, backend) = backend(4096);

        let mut buf = [0u8; 512];
        let err = backend.read_at(&mut buf, 4000).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        replica.set_read_only(true);
        let err = backend.write_at(&buf, 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn unmap_reaches_replica() {
        let (replica, backend) = backend(4096);
        backend.write_at(&[0xFF; 1024], 0).await.unwrap();

        assert_eq!(backend.unmap_at(512, 0).await.unwrap(), 512);
        assert!(replica.snapshot(0, 512).iter().all(|&b| b == 0));
        assert!(replica.snapshot(512, 512).iter().all(|&b| b == 0xFF));
    }
}
