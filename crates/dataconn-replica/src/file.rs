//! Flat-file replica
//!
//! Stores the volume in one sparse file of exactly `size` bytes. Unwritten
//! regions read back as zeroes. Unmap overwrites the range with zeroes
//! since hole punching is filesystem specific.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ReplicaError, ReplicaResult};
use crate::{BlockIo, Replica, ReplicaInfo, ReplicaState, check_bounds};

/// Zero buffer size used by unmap
const ZERO_CHUNK: usize = 1024 * 1024;

/// Replica backed by a single flat file
pub struct FileReplica {
    path: PathBuf,
    file: Mutex<File>,
    info: ReplicaInfo,
    read_only: bool,
}

impl FileReplica {
    /// Open (or create) the backing file at `path`
    ///
    /// A missing or shorter file is extended to `size` bytes. A read-only
    /// replica never creates or extends its file.
    pub async fn open(
        path: impl AsRef<Path>,
        size: u64,
        sector_size: u64,
        read_only: bool,
    ) -> ReplicaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .truncate(false)
            .open(&path)
            .await?;

        let actual = file.metadata().await?.len();
        if actual > size {
            return Err(ReplicaError::SizeMismatch {
                expected: size,
                actual,
            });
        }
        if actual < size {
            if read_only {
                return Err(ReplicaError::SizeMismatch {
                    expected: size,
                    actual,
                });
            }
            file.set_len(size).await?;
        }

        info!(
            "Opened file replica {} ({size}B, sector {sector_size}B, read_only={read_only})",
            path.display()
        );

        Ok(Self {
            path,
            file: Mutex::new(file),
            info: ReplicaInfo { size, sector_size },
            read_only,
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BlockIo for FileReplica {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        check_bounds(offset, buf.len() as u64, self.info.size)?;
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.read_exact(buf).await?;
        Ok(buf.len())
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        if self.read_only {
            return Err(ReplicaError::ReadOnly.into());
        }
        check_bounds(offset, buf.len() as u64, self.info.size)?;
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(buf).await?;
        file.flush().await?;
        Ok(buf.len())
    }

    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize> {
        if self.read_only {
            return Err(ReplicaError::ReadOnly.into());
        }
        check_bounds(offset, u64::from(length), self.info.size)?;
        let zeroes = vec![0u8; ZERO_CHUNK.min(length as usize)];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut remaining = length as usize;
        while remaining > 0 {
            let n = remaining.min(zeroes.len());
            file.write_all(&zeroes[..n]).await?;
            remaining -= n;
        }
        file.flush().await?;
        Ok(length as usize)
    }
}

impl Replica for FileReplica {
    fn status(&self) -> (ReplicaState, ReplicaInfo) {
        (ReplicaState::Open, self.info)
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_sparse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.img");

        let replica = FileReplica::open(&path, 1024 * 1024, 512, false)
            .await
            .unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024 * 1024);
        assert_eq!(replica.path(), path.as_path());

        let mut buf = vec![0xEEu8; 4096];
        replica.read_at(&mut buf, 8192).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_write_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.img");

        {
            let replica = FileReplica::open(&path, 64 * 1024, 512, false)
                .await
                .unwrap();
            replica.write_at(b"hello replica", 4096).await.unwrap();
        }

        let replica = FileReplica::open(&path, 64 * 1024, 512, true)
            .await
            .unwrap();
        let mut buf = vec![0u8; 13];
        replica.read_at(&mut buf, 4096).await.unwrap();
        assert_eq!(&buf, b"hello replica");
        assert!(replica.read_only());

        let err = replica.write_at(b"x", 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.img");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();

        let result = FileReplica::open(&path, 4096, 512, false).await;
        assert!(matches!(
            result,
            Err(ReplicaError::SizeMismatch {
                expected: 4096,
                actual: 8192
            })
        ));
    }

    #[tokio::test]
    async fn test_unmap_zeroes_range() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::open(dir.path().join("r.img"), 8192, 512, false)
            .await
            .unwrap();
        replica.write_at(&[0x5A; 2048], 0).await.unwrap();

        assert_eq!(replica.unmap_at(1024, 512).await.unwrap(), 1024);

        let mut buf = vec![0u8; 2048];
        replica.read_at(&mut buf, 0).await.unwrap();
        assert_eq!(&buf[..512], &[0x5A; 512]);
        assert_eq!(&buf[512..1536], &[0x00; 1024]);
        assert_eq!(&buf[1536..], &[0x5A; 512]);
    }

    #[tokio::test]
    async fn test_read_past_end() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::open(dir.path().join("r.img"), 4096, 512, false)
            .await
            .unwrap();
        let mut buf = vec![0u8; 1024];
        let err = replica.read_at(&mut buf, 3584).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
