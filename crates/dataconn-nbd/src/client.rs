//! NBD client
//!
//! Negotiates an export with `NBD_OPT_GO` and then issues one request at a
//! time, waiting for each reply. Callers needing parallelism open more
//! connections when the server advertises `NBD_FLAG_CAN_MULTI_CONN`.

#![allow(clippy::cast_possible_truncation)]

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::protocol::*;

/// Block size constraints reported with `NBD_INFO_BLOCK_SIZE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizes {
    pub minimum: u32,
    pub preferred: u32,
    pub maximum: u32,
}

/// NBD client for one connection
pub struct NbdClient<S> {
    stream: S,
    next_handle: u64,
    size_bytes: u64,
    transmission_flags: u16,
    block_sizes: Option<BlockSizes>,
}

impl<S> NbdClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the handshake and select `export_name`
    pub async fn connect(mut stream: S, export_name: &str) -> Result<Self, NbdError> {
        let magic = stream.read_u64().await?;
        if magic != NBD_MAGIC {
            return Err(NbdError::InvalidMagic {
                expected: NBD_MAGIC,
                actual: magic,
            });
        }
        let opts_magic = stream.read_u64().await?;
        if opts_magic != NBD_OPTS_MAGIC {
            return Err(NbdError::InvalidMagic {
                expected: NBD_OPTS_MAGIC,
                actual: opts_magic,
            });
        }

        let flags = stream.read_u16().await?;
        if flags & NBD_FLAG_FIXED_NEWSTYLE == 0 {
            return Err(NbdError::NegotiationFailed {
                reason: "server does not support fixed newstyle",
            });
        }
        let client_flags = NBD_FLAG_C_FIXED_NEWSTYLE
            | if flags & NBD_FLAG_NO_ZEROES != 0 {
                NBD_FLAG_C_NO_ZEROES
            } else {
                0
            };
        stream.write_u32(client_flags).await?;

        // NBD_OPT_GO: name_len + name + info_count + requested info types
        let name = export_name.as_bytes();
        let mut data = Vec::with_capacity(4 + name.len() + 4);
        data.extend_from_slice(&(name.len() as u32).to_be_bytes());
        data.extend_from_slice(name);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&NBD_INFO_BLOCK_SIZE.to_be_bytes());

        stream.write_u64(NBD_OPTS_MAGIC).await?;
        stream.write_u32(NBD_OPT_GO).await?;
        stream.write_u32(data.len() as u32).await?;
        stream.write_all(&data).await?;
        stream.flush().await?;

        let mut size_bytes = None;
        let mut transmission_flags = 0u16;
        let mut block_sizes = None;

        loop {
            let magic = stream.read_u64().await?;
            if magic != NBD_OPTION_REPLY_MAGIC {
                return Err(NbdError::InvalidMagic {
                    expected: NBD_OPTION_REPLY_MAGIC,
                    actual: magic,
                });
            }
            let option = stream.read_u32().await?;
            let reply_type = stream.read_u32().await?;
            let reply_len = stream.read_u32().await? as usize;

            // Bound allocation against a misbehaving server
            if reply_len > OPTION_DATA_MAX_BYTES {
                return Err(NbdError::RequestTooLarge {
                    length_bytes: reply_len as u64,
                    max_bytes: OPTION_DATA_MAX_BYTES as u64,
                });
            }
            let mut reply = vec![0u8; reply_len];
            stream.read_exact(&mut reply).await?;

            match reply_type {
                NBD_REP_ACK => break,
                NBD_REP_INFO => match parse_info(&reply) {
                    Some(Info::Export { size, flags }) => {
                        size_bytes = Some(size);
                        transmission_flags = flags;
                    }
                    Some(Info::BlockSize(sizes)) => block_sizes = Some(sizes),
                    None => debug!(len = reply.len(), "ignoring NBD info reply"),
                },
                NBD_REP_ERR_UNKNOWN => {
                    return Err(NbdError::UnknownExport {
                        name: export_name.to_string(),
                    });
                }
                code if code & NBD_REP_FLAG_ERROR != 0 => {
                    return Err(NbdError::OptionRejected { option, reply: code });
                }
                other => debug!(reply = other, "ignoring NBD option reply"),
            }
        }

        let size_bytes = size_bytes.ok_or(NbdError::NegotiationFailed {
            reason: "server did not send NBD_INFO_EXPORT",
        })?;

        Ok(Self {
            stream,
            next_handle: 0,
            size_bytes,
            transmission_flags,
            block_sizes,
        })
    }

    /// Size of the export in bytes
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Transmission flags advertised by the server
    pub const fn transmission_flags(&self) -> u16 {
        self.transmission_flags
    }

    /// Block size constraints, when the server reported them
    pub const fn block_sizes(&self) -> Option<BlockSizes> {
        self.block_sizes
    }

    /// Whether the server allows several connections to the same export
    pub const fn can_multi_conn(&self) -> bool {
        self.transmission_flags & NBD_FLAG_CAN_MULTI_CONN != 0
    }

    pub const fn is_read_only(&self) -> bool {
        self.transmission_flags & NBD_FLAG_READ_ONLY != 0
    }

    pub const fn supports_trim(&self) -> bool {
        self.transmission_flags & NBD_FLAG_SEND_TRIM != 0
    }

    /// Largest READ or WRITE payload sent in one request
    ///
    /// The server's advertised maximum block size, capped at
    /// [`NBD_MAX_PAYLOAD_SIZE`].
    pub fn max_request_len(&self) -> u32 {
        self.block_sizes
            .map(|sizes| sizes.maximum)
            .filter(|&maximum| maximum > 0)
            .map_or(NBD_MAX_PAYLOAD_SIZE, |maximum| maximum.min(NBD_MAX_PAYLOAD_SIZE))
    }

    /// Fill `buf` from `offset`, splitting at [`Self::max_request_len`]
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), NbdError> {
        let mut pos = offset;
        for chunk in buf.chunks_mut(self.max_request_len() as usize) {
            let handle = self
                .send_request(NbdCommand::Read, pos, chunk.len() as u32)
                .await?;
            self.stream.flush().await?;
            self.read_reply(handle).await?;
            self.stream.read_exact(chunk).await?;
            pos += chunk.len() as u64;
        }
        Ok(())
    }

    /// Write `data` at `offset`, splitting at [`Self::max_request_len`]
    pub async fn write_at(&mut self, data: &[u8], offset: u64) -> Result<(), NbdError> {
        let mut pos = offset;
        for chunk in data.chunks(self.max_request_len() as usize) {
            let handle = self
                .send_request(NbdCommand::Write, pos, chunk.len() as u32)
                .await?;
            self.stream.write_all(chunk).await?;
            self.stream.flush().await?;
            self.read_reply(handle).await?;
            pos += chunk.len() as u64;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), NbdError> {
        self.execute(NbdCommand::Flush, 0, 0).await
    }

    /// Discard a range
    pub async fn trim(&mut self, offset: u64, length: u32) -> Result<(), NbdError> {
        self.execute(NbdCommand::Trim, offset, length).await
    }

    pub async fn write_zeroes(&mut self, offset: u64, length: u32) -> Result<(), NbdError> {
        self.execute(NbdCommand::WriteZeroes, offset, length).await
    }

    /// Send `NBD_CMD_DISC` and shut down the write half
    ///
    /// The server sends no reply to a disconnect.
    pub async fn disconnect(&mut self) -> Result<(), NbdError> {
        self.send_request(NbdCommand::Disconnect, 0, 0).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn execute(
        &mut self,
        command: NbdCommand,
        offset: u64,
        length: u32,
    ) -> Result<(), NbdError> {
        let handle = self.send_request(command, offset, length).await?;
        self.stream.flush().await?;
        self.read_reply(handle).await
    }

    async fn send_request(
        &mut self,
        command: NbdCommand,
        offset: u64,
        length: u32,
    ) -> Result<u64, NbdError> {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        let req = NbdRequest {
            flags: 0,
            command,
            handle,
            offset,
            length,
        };
        self.stream.write_all(&req.to_bytes()).await?;
        Ok(handle)
    }

    async fn read_reply(&mut self, handle: u64) -> Result<(), NbdError> {
        let mut buf = [0u8; NbdReply::SIZE_BYTES];
        self.stream.read_exact(&mut buf).await?;
        let reply = NbdReply::from_bytes(&buf)?;

        if reply.handle != handle {
            return Err(NbdError::HandleMismatch {
                expected: handle,
                actual: reply.handle,
            });
        }
        if reply.error != NBD_OK {
            return Err(NbdError::ServerError { code: reply.error });
        }
        Ok(())
    }
}

enum Info {
    Export { size: u64, flags: u16 },
    BlockSize(BlockSizes),
}

fn parse_info(data: &[u8]) -> Option<Info> {
    let info_type = u16::from_be_bytes(data.get(0..2)?.try_into().ok()?);
    let be32 = |at: usize| -> Option<u32> {
        Some(u32::from_be_bytes(data.get(at..at + 4)?.try_into().ok()?))
    };
    match info_type {
        NBD_INFO_EXPORT if data.len() == 12 => Some(Info::Export {
            size: u64::from_be_bytes(data.get(2..10)?.try_into().ok()?),
            flags: u16::from_be_bytes(data.get(10..12)?.try_into().ok()?),
        }),
        NBD_INFO_BLOCK_SIZE if data.len() == 14 => Some(Info::BlockSize(BlockSizes {
            minimum: be32(2)?,
            preferred: be32(6)?,
            maximum: be32(10)?,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::NbdServer;
    use crate::test_util::{VecBackend, test_export};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tokio::io::{DuplexStream, duplex};
    use tokio::task::JoinHandle;

    async fn connect(
        backend: Arc<VecBackend>,
        read_only: bool,
    ) -> (NbdClient<DuplexStream>, JoinHandle<Result<(), NbdError>>) {
        let size = backend.contents().len() as u64;
        let (client_end, server_end) = duplex(256 * 1024);
        let server = NbdServer::new(test_export(size, read_only), backend);
        let task = tokio::spawn(async move { server.serve(server_end).await });
        let client = NbdClient::connect(client_end, "test").await.unwrap();
        (client, task)
    }

    #[tokio::test]
    async fn connect_reports_export() {
        let backend = Arc::new(VecBackend::new(1024 * 1024));
        let (client, _task) = connect(backend, false).await;

        assert_eq!(client.size_bytes(), 1024 * 1024);
        assert!(client.can_multi_conn());
        assert!(!client.is_read_only());
        assert!(client.supports_trim());
        assert_eq!(
            client.block_sizes(),
            Some(BlockSizes {
                minimum: 512,
                preferred: 512,
                maximum: 512
            })
        );
    }

    #[tokio::test]
    async fn unknown_export_is_rejected() {
        let backend = Arc::new(VecBackend::new(4096));
        let (client_end, server_end) = duplex(64 * 1024);
        let server = NbdServer::new(test_export(4096, false), backend);
        tokio::spawn(async move { server.serve(server_end).await });

        let err = NbdClient::connect(client_end, "missing")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, NbdError::UnknownExport { name } if name == "missing"));
    }

    #[tokio::test]
    async fn write_then_read() {
        let backend = Arc::new(VecBackend::new(64 * 1024));
        let (mut client, _task) = connect(Arc::clone(&backend), false).await;

        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        client.write_at(&data, 8192).await.unwrap();

        let mut buf = vec![0u8; 4096];
        client.read_at(&mut buf, 8192).await.unwrap();
        assert_eq!(buf, data);
        assert_eq!(&backend.contents()[8192..12288], &data[..]);
    }

    #[tokio::test]
    async fn requests_split_at_advertised_maximum() {
        let backend = Arc::new(VecBackend::new(64 * 1024));
        let (mut client, _task) = connect(Arc::clone(&backend), false).await;
        assert_eq!(client.max_request_len(), 512);

        let data: Vec<u8> = (0..1300u32).map(|i| (i % 253) as u8).collect();
        client.write_at(&data, 1024).await.unwrap();
        // 512 + 512 + 276
        assert_eq!(backend.writes.load(Ordering::SeqCst), 3);

        let mut buf = vec![0u8; data.len()];
        client.read_at(&mut buf, 1024).await.unwrap();
        assert_eq!(buf, data);
        assert_eq!(backend.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_errors_keep_connection_usable() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, _task) = connect(Arc::clone(&backend), false).await;

        // Past the end
        let mut buf = vec![0u8; 512];
        let err = client.read_at(&mut buf, 4096).await.unwrap_err();
        assert!(matches!(err, NbdError::ServerError { code: NBD_EINVAL }));
        assert!(!err.is_transport());

        let err = client.write_at(&[1u8; 512], 4000).await.unwrap_err();
        assert!(matches!(err, NbdError::ServerError { code: NBD_ENOSPC }));

        backend.fail_reads.store(true, Ordering::SeqCst);
        let err = client.read_at(&mut buf, 0).await.unwrap_err();
        assert!(matches!(err, NbdError::ServerError { code: NBD_EIO }));
        backend.fail_reads.store(false, Ordering::SeqCst);

        client.write_at(&[7u8; 512], 0).await.unwrap();
        client.read_at(&mut buf, 0).await.unwrap();
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn read_only_export_rejects_writes() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, _task) = connect(backend, true).await;
        assert!(client.is_read_only());

        let err = client.write_at(&[1u8; 512], 0).await.unwrap_err();
        assert!(matches!(err, NbdError::ServerError { code: NBD_EPERM }));
        let err = client.trim(0, 512).await.unwrap_err();
        assert!(matches!(err, NbdError::ServerError { code: NBD_EPERM }));

        let mut buf = vec![0u8; 512];
        client.read_at(&mut buf, 0).await.unwrap();
    }

    #[tokio::test]
    async fn trim_and_write_zeroes_clear_data() {
        let backend = Arc::new(VecBackend::new(8192));
        let (mut client, _task) = connect(Arc::clone(&backend), false).await;

        client.write_at(&[0xAB; 8192], 0).await.unwrap();
        client.trim(0, 1024).await.unwrap();
        client.write_zeroes(4096, 2048).await.unwrap();
        client.flush().await.unwrap();

        let contents = backend.contents();
        assert!(contents[..1024].iter().all(|&b| b == 0));
        assert!(contents[1024..4096].iter().all(|&b| b == 0xAB));
        assert!(contents[4096..6144].iter().all(|&b| b == 0));
        assert!(contents[6144..].iter().all(|&b| b == 0xAB));
        assert_eq!(backend.syncs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_ends_session_cleanly() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, task) = connect(backend, false).await;

        client.disconnect().await.unwrap();
        task.await.unwrap().unwrap();
    }
}
