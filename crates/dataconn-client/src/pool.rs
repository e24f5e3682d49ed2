//! Round-robin pool of NBD connections to one remote export
//!
//! Every connection sits in a slot with its own async mutex, so a slow call
//! only blocks callers routed to the same connection. The slot cursor is a
//! single atomic counter: the k-th call (counting from 1) goes to slot
//! `k % len`. A slot whose transport failed, timed out, or whose call was
//! dropped mid-request is marked unhealthy and never used again, since its
//! stream may be out of step with its requests.
//!
//! `op_timeout` bounds a whole `read_at`/`write_at`, including every
//! connection tried under [`FailoverPolicy::Failover`].

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dataconn_common::config::ClientConfig;
use dataconn_common::{BoxedStream, FailoverPolicy, MAX_POOL_CONNECTIONS};
use dataconn_nbd::NbdClient;
use dataconn_replica::BlockIo;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::channel::{BlockChannel, Dialer};
use crate::error::PoolError;
use crate::uri::NbdUri;

/// Pool over the transport streams opened by [`NbdUri`]
pub type NbdPool = ConnectionPool<NbdClient<BoxedStream>>;

/// Pool tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Deadline for each read, write and connection setup
    pub op_timeout: Duration,
    /// Upper bound on connections; clamped to `1..=8`
    pub max_connections: usize,
    pub failover: FailoverPolicy,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(8),
            max_connections: MAX_POOL_CONNECTIONS,
            failover: FailoverPolicy::FailFast,
        }
    }
}

impl PoolOptions {
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections.clamp(1, MAX_POOL_CONNECTIONS)
    }
}

impl From<&ClientConfig> for PoolOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            op_timeout: config.op_timeout(),
            max_connections: config.max_connections,
            failover: config.failover,
        }
    }
}

struct Slot<C> {
    conn: Mutex<C>,
    healthy: AtomicBool,
}

impl<C> Slot<C> {
    fn new(conn: C) -> Self {
        Self {
            conn: Mutex::new(conn),
            healthy: AtomicBool::new(true),
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    fn poison(&self) {
        self.healthy.store(false, Ordering::Release);
    }
}

enum Op<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl Op<'_> {
    const fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Write(_) => "write",
        }
    }
}

/// Fixed-size pool of connections to one export
pub struct ConnectionPool<C> {
    slots: Vec<Slot<C>>,
    cursor: AtomicUsize,
    size_bytes: u64,
    options: PoolOptions,
}

impl NbdPool {
    /// Parse `uri` and connect
    pub async fn connect_uri(uri: &str, options: PoolOptions) -> Result<Self, PoolError> {
        let uri: NbdUri = uri.parse()?;
        ConnectionPool::connect(&uri, options).await
    }
}

impl<S> ConnectionPool<NbdClient<S>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    /// Connect to the export behind `dialer`
    ///
    /// Opens one connection, then up to `max_connections - 1` more if the
    /// server advertises multi-connection support. Every connection must
    /// report the same export size. On any failure, connections opened so
    /// far are disconnected and the error is returned.
    pub async fn connect<D>(dialer: &D, options: PoolOptions) -> Result<Self, PoolError>
    where
        D: Dialer<Stream = S>,
    {
        let target = dialer.target();
        let first = open(dialer, &options).await?;
        let size_bytes = first.size_bytes();
        let multi_conn = first.can_multi_conn();

        info!(
            "pool: connected to {target} ({size_bytes}B, multi-conn: {multi_conn})"
        );

        let mut conns = vec![first];
        if multi_conn {
            for index in 1..options.max_connections() {
                let opened = match open(dialer, &options).await {
                    Ok(mut conn) if conn.size_bytes() != size_bytes => {
                        let actual = conn.size_bytes();
                        let _ = conn.disconnect().await;
                        Err(PoolError::SizeMismatch {
                            index,
                            expected: size_bytes,
                            actual,
                        })
                    }
                    other => other,
                };

                match opened {
                    Ok(conn) => conns.push(conn),
                    Err(e) => {
                        warn!("pool: connection {index} to {target} failed: {e}");
                        for conn in &mut conns {
                            let _ = conn.disconnect().await;
                        }
                        return Err(e);
                    }
                }
            }
        }

        debug!("pool: {} connection(s) to {target}", conns.len());
        Self::from_channels(conns, size_bytes, options)
    }
}

async fn open<D>(dialer: &D, options: &PoolOptions) -> Result<NbdClient<D::Stream>, PoolError>
where
    D: Dialer,
{
    let setup = async {
        let stream = dialer.dial().await.map_err(|source| PoolError::Connect {
            target: dialer.target(),
            source,
        })?;
        let client = NbdClient::connect(stream, dialer.export_name())
            .await
            .map_err(|source| PoolError::Negotiate {
                target: dialer.target(),
                source,
            })?;
        Ok::<_, PoolError>(client)
    };
    timeout(options.op_timeout, setup)
        .await
        .map_err(|_| PoolError::Timeout(options.op_timeout))?
}

impl<C: BlockChannel> ConnectionPool<C> {
    /// Pool over already established connections
    pub fn from_channels(
        channels: Vec<C>,
        size_bytes: u64,
        options: PoolOptions,
    ) -> Result<Self, PoolError> {
        if !(1..=MAX_POOL_CONNECTIONS).contains(&channels.len()) {
            return Err(PoolError::InvalidPoolSize {
                count: channels.len(),
            });
        }
        Ok(Self {
            slots: channels.into_iter().map(Slot::new).collect(),
            cursor: AtomicUsize::new(0),
            size_bytes,
            options,
        })
    }

    /// Number of connections, fixed at construction
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Connections still eligible for I/O
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_healthy()).count()
    }

    /// Export size reported at connection time
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[must_use]
    pub const fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Disconnect every connection
    pub async fn close(&self) {
        for (index, slot) in self.slots.iter().enumerate() {
            slot.poison();
            let mut conn = slot.conn.lock().await;
            if let Err(e) = conn.close().await {
                debug!("pool: closing connection {index}: {e}");
            }
        }
    }

    fn next_index(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % self.slots.len()
    }

    async fn run(&self, mut op: Op<'_>, offset: u64) -> Result<usize, PoolError> {
        let len = op.len();
        let start = self.next_index();
        let deadline = Instant::now() + self.options.op_timeout;

        match self.options.failover {
            FailoverPolicy::FailFast => {
                self.run_on(start, &mut op, offset, deadline).await?;
                Ok(len)
            }
            FailoverPolicy::Failover => {
                let mut last_err = None;
                for step in 0..self.slots.len() {
                    let index = (start + step) % self.slots.len();
                    if !self.slots[index].is_healthy() {
                        continue;
                    }
                    if step > 0 && Instant::now() >= deadline {
                        return Err(PoolError::Timeout(self.options.op_timeout));
                    }
                    match self.run_on(index, &mut op, offset, deadline).await {
                        Ok(()) => return Ok(len),
                        // The remote would answer the same on any connection
                        Err(e) if !e.is_transport() => return Err(e),
                        Err(e) => {
                            warn!("pool: {} failed on connection {index}, trying next: {e}", op.name());
                            last_err = Some(e);
                        }
                    }
                }
                Err(last_err.unwrap_or(PoolError::NoHealthyConnections))
            }
        }
    }

    async fn run_on(
        &self,
        index: usize,
        op: &mut Op<'_>,
        offset: u64,
        deadline: Instant,
    ) -> Result<(), PoolError> {
        let slot = &self.slots[index];
        if !slot.is_healthy() {
            return Err(PoolError::ConnectionUnavailable { index });
        }

        // Waiting for the connection leaves its stream intact
        let mut conn = timeout_at(deadline, slot.conn.lock())
            .await
            .map_err(|_| PoolError::Timeout(self.options.op_timeout))?;
        if !slot.is_healthy() {
            return Err(PoolError::ConnectionUnavailable { index });
        }

        // From here on the stream may hold a partial request until a reply
        // arrives, so any exit other than a complete exchange retires the
        // slot. That includes the caller dropping this future.
        let guard = InFlight::new(slot, index);

        let io = async {
            match op {
                Op::Read(buf) => conn.read_at(buf, offset).await,
                Op::Write(buf) => conn.write_at(buf, offset).await,
            }
        };

        match timeout_at(deadline, io).await {
            Ok(Ok(())) => {
                guard.complete();
                Ok(())
            }
            Ok(Err(e)) if !e.is_transport() => {
                guard.complete();
                Err(e.into())
            }
            Ok(Err(e)) => {
                warn!("pool: connection {index} marked unhealthy: {e}");
                Err(e.into())
            }
            Err(_) => {
                warn!(
                    "pool: {} of {} bytes at offset {offset} on connection {index} timed out after {:?}",
                    op.name(),
                    op.len(),
                    self.options.op_timeout
                );
                Err(PoolError::Timeout(self.options.op_timeout))
            }
        }
    }
}

/// Marks a slot unhealthy on drop unless the request finished
struct InFlight<'a, C> {
    slot: &'a Slot<C>,
    index: usize,
    done: bool,
}

impl<'a, C> InFlight<'a, C> {
    const fn new(slot: &'a Slot<C>, index: usize) -> Self {
        Self {
            slot,
            index,
            done: false,
        }
    }

    fn complete(mut self) {
        self.done = true;
    }
}

impl<C> Drop for InFlight<'_, C> {
    fn drop(&mut self) {
        if !self.done {
            self.slot.poison();
            debug!("pool: connection {} retired mid-request", self.index);
        }
    }
}

#[async_trait]
impl<C> BlockIo for ConnectionPool<C>
where
    C: BlockChannel + 'static,
{
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(self.run(Op::Read(buf), offset).await?)
    }

    async fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        Ok(self.run(Op::Write(buf), offset).await?)
    }

    /// Accepted without deallocating anything on the remote
    async fn unmap_at(&self, length: u32, _offset: u64) -> io::Result<usize> {
        Ok(length as usize)
    }
}
