//! dataconn Replica - data-path contract of a local replica
//!
//! The replica's storage engine (snapshot chains, sparse files) lives
//! elsewhere. This crate only defines what the data path needs from it:
//! byte-addressed I/O ([`BlockIo`]) plus status queries ([`Replica`]).
//!
//! Two reference replicas are provided:
//!
//! - [`MemoryReplica`]: a zero-filled in-memory volume (tests, benchmarks)
//! - [`FileReplica`]: a flat, sparse backing file (the daemon)

pub mod error;
pub mod file;
pub mod memory;

use std::fmt;
use std::io;

use async_trait::async_trait;

pub use error::{ReplicaError, ReplicaResult};
pub use file::FileReplica;
pub use memory::MemoryReplica;

/// Byte-addressed random access I/O
///
/// Implemented by replicas and by the outbound connection pool, so either
/// can sit behind a data path.
#[async_trait]
pub trait BlockIo: Send + Sync {
    /// Fill `buf` from `offset`, returning the number of bytes read
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write `buf` at `offset`, returning the number of bytes written
    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Release `length` bytes at `offset`
    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize>;
}

/// A local replica as seen by the data server
pub trait Replica: BlockIo {
    /// Current state and geometry; `info.size` and `info.sector_size` are authoritative
    fn status(&self) -> (ReplicaState, ReplicaInfo);

    /// Whether the replica rejects writes
    fn read_only(&self) -> bool;
}

/// Replica geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaInfo {
    /// Volume size in bytes
    pub size: u64,
    /// Sector size in bytes
    pub sector_size: u64,
}

/// Replica lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    Initial,
    Open,
    Closed,
    Dirty,
    Rebuilding,
    Error,
}

impl ReplicaState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Dirty => "dirty",
            Self::Rebuilding => "rebuilding",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject an I/O range that runs past the end of a volume
pub(crate) fn check_bounds(offset: u64, length: u64, size: u64) -> ReplicaResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(ReplicaError::OutOfBounds {
            offset,
            length,
            size,
        }),
    }
}
