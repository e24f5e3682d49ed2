//! Shared fixtures for the server and client tests

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::export::Export;

/// In-memory backend that counts calls and can be told to fail reads
pub struct VecBackend {
    data: Mutex<Vec<u8>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub syncs: AtomicUsize,
    pub fail_reads: AtomicBool,
}

impl VecBackend {
    pub fn new(size: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; size]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

#[async_trait]
impl Backend for VecBackend {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(5));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        let data = self.data.lock();
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(buf.len())
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.lock();
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn unmap_at(&self, length: u32, offset: u64) -> io::Result<usize> {
        let mut data = self.data.lock();
        let start = offset as usize;
        data[start..start + length as usize].fill(0);
        Ok(length as usize)
    }

    async fn size(&self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    async fn sync(&self) -> io::Result<()> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn test_export(size_bytes: u64, read_only: bool) -> Export {
    Export {
        name: "test".to_string(),
        description: "test export".to_string(),
        size_bytes,
        minimum_block_size: 512,
        preferred_block_size: 512,
        maximum_block_size: 512,
        read_only,
        supports_multi_conn: true,
    }
}
