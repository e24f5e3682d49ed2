//! In-memory replica
//!
//! A zero-filled volume held in a single buffer. Reads after writes are
//! consistent because every operation takes the buffer lock.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ReplicaError;
use crate::{BlockIo, Replica, ReplicaInfo, ReplicaState, check_bounds};

/// In-memory replica
pub struct MemoryReplica {
    data: RwLock<Vec<u8>>,
    info: ReplicaInfo,
    read_only: AtomicBool,
}

impl MemoryReplica {
    /// Create a zero-filled writable replica
    #[must_use]
    pub fn new(size: u64, sector_size: u64) -> Self {
        Self {
            data: RwLock::new(vec![0u8; usize::try_from(size).unwrap_or(usize::MAX)]),
            info: ReplicaInfo { size, sector_size },
            read_only: AtomicBool::new(false),
        }
    }

    /// Mark the replica read-only (or writable again)
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Copy of `length` bytes at `offset`, bypassing the data path
    #[must_use]
    pub fn snapshot(&self, offset: u64, length: usize) -> Vec<u8> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let data = self.data.read();
        data.get(start..start.saturating_add(length))
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    fn range(&self, offset: u64, length: usize) -> Result<std::ops::Range<usize>, ReplicaError> {
        check_bounds(offset, length as u64, self.info.size)?;
        // Bounded by the buffer length, which is a usize
        let start = offset as usize;
        Ok(start..start + length)
    }
}

#[async_trait]
impl BlockIo for MemoryReplica {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.data.read()[range]);
        Ok(buf.len())
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        if self.read_only() {
            return Err(ReplicaError::ReadOnly.into());
        }
        let range = self.range(offset, buf.len())?;
        self.data.write()[range].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize> {
        if self.read_only() {
            return Err(ReplicaError::ReadOnly.into());
        }
        let range = self.range(offset, length as usize)?;
        self.data.write()[range].fill(0);
        Ok(length as usize)
    }
}

impl Replica for MemoryReplica {
    fn status(&self) -> (ReplicaState, ReplicaInfo) {
        (ReplicaState::Open, self.info)
    }

    fn read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let replica = MemoryReplica::new(4096, 512);
        let n = replica.write_at(&[0xAB; 100], 50).await.unwrap();
        assert_eq!(n, 100);

        let mut buf = vec![0u8; 200];
        replica.read_at(&mut buf, 0).await.unwrap();
        assert_eq!(&buf[..50], &[0x00; 50]);
        assert_eq!(&buf[50..150], &[0xAB; 100]);
        assert_eq!(&buf[150..], &[0x00; 50]);
    }

    #[tokio::test]
    async fn test_out_of_bounds() {
        let replica = MemoryReplica::new(1024, 512);
        let mut buf = vec![0u8; 512];
        let err = replica.read_at(&mut buf, 768).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = replica.write_at(&buf, u64::MAX).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let replica = MemoryReplica::new(1024, 512);
        replica.set_read_only(true);
        assert!(replica.read_only());

        let err = replica.write_at(&[1; 16], 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(replica.snapshot(0, 16), vec![0; 16]);
    }

    #[tokio::test]
    async fn test_unmap_zeroes_range() {
        let replica = MemoryReplica::new(2048, 512);
        replica.write_at(&[0xFF; 1024], 0).await.unwrap();

        let n = replica.unmap_at(512, 512).await.unwrap();
        assert_eq!(n, 512);
        assert_eq!(replica.snapshot(0, 512), vec![0xFF; 512]);
        assert_eq!(replica.snapshot(512, 512), vec![0x00; 512]);
    }

    #[test]
    fn test_status() {
        let replica = MemoryReplica::new(10 * 1024 * 1024, 512);
        let (state, info) = replica.status();
        assert_eq!(state, ReplicaState::Open);
        assert_eq!(info.size, 10_485_760);
        assert_eq!(info.sector_size, 512);
    }
}
