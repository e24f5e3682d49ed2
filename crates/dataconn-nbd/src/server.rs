//! NBD fixed-newstyle server
//!
//! Serves a single [`Export`] on a single connection: handshake, option
//! negotiation, then the transmission phase until the client disconnects.
//! Requests are handled strictly in order with simple replies, so the
//! ordering guarantees seen by the client are exactly the backend's.

#![allow(clippy::cast_possible_truncation)]

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::export::Export;
use crate::protocol::*;

/// Zero buffer size used for WRITE_ZEROES
const ZERO_CHUNK: usize = 1024 * 1024;

/// Outcome of option haggling
enum Negotiated {
    Transmission,
    Aborted,
}

/// Parsed `NBD_OPT_INFO` / `NBD_OPT_GO` payload
struct InfoRequest {
    name: String,
    info_types: Vec<u16>,
}

impl InfoRequest {
    /// `u32 name_len | name | u16 count | count * u16 info type`
    fn parse(data: &[u8]) -> Option<Self> {
        let name_len = u32::from_be_bytes(data.get(0..4)?.try_into().ok()?) as usize;
        let name_end = 4usize.checked_add(name_len)?;
        let name = data.get(4..name_end)?;
        let count_end = name_end.checked_add(2)?;
        let count = u16::from_be_bytes(data.get(name_end..count_end)?.try_into().ok()?) as usize;
        let list = data.get(count_end..)?;
        if list.len() != count * 2 {
            return None;
        }
        Some(Self {
            name: String::from_utf8_lossy(name).into_owned(),
            info_types: list
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
        })
    }
}

/// NBD server for one connection
pub struct NbdServer<B> {
    export: Export,
    backend: B,
}

impl<B: Backend> NbdServer<B> {
    pub const fn new(export: Export, backend: B) -> Self {
        Self { export, backend }
    }

    pub const fn export(&self) -> &Export {
        &self.export
    }

    /// Serve one connection until the client disconnects or an error occurs
    ///
    /// Returns `Ok(())` on a clean disconnect or an aborted negotiation.
    pub async fn serve<S>(&self, mut stream: S) -> Result<(), NbdError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let actual = self.backend.size().await?;
        if actual != self.export.size_bytes {
            return Err(NbdError::SizeChanged {
                exported: self.export.size_bytes,
                actual,
            });
        }

        let no_zeroes = handshake(&mut stream).await?;
        match self.negotiate_options(&mut stream, no_zeroes).await? {
            Negotiated::Transmission => self.data_phase(&mut stream).await,
            Negotiated::Aborted => Ok(()),
        }
    }

    async fn negotiate_options<S>(
        &self,
        stream: &mut S,
        no_zeroes: bool,
    ) -> Result<Negotiated, NbdError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            // Option header: IHAVEOPT magic (8) + option (4) + length (4)
            let magic = stream.read_u64().await?;
            if magic != NBD_OPTS_MAGIC {
                return Err(NbdError::InvalidMagic {
                    expected: NBD_OPTS_MAGIC,
                    actual: magic,
                });
            }
            let option = stream.read_u32().await?;
            let length = stream.read_u32().await? as usize;
            if length > OPTION_DATA_MAX_BYTES {
                return Err(NbdError::RequestTooLarge {
                    length_bytes: length as u64,
                    max_bytes: OPTION_DATA_MAX_BYTES as u64,
                });
            }

            let mut data = vec![0u8; length];
            stream.read_exact(&mut data).await?;

            debug!(option, length, "NBD option");

            match option {
                NBD_OPT_EXPORT_NAME => {
                    // Old-style selection: no option reply, straight to transmission
                    let name = String::from_utf8_lossy(&data).into_owned();
                    if !self.export.matches(&name) {
                        return Err(NbdError::UnknownExport { name });
                    }
                    stream.write_u64(self.export.size_bytes).await?;
                    stream.write_u16(self.export.transmission_flags()).await?;
                    if !no_zeroes {
                        stream.write_all(&[0u8; 124]).await?;
                    }
                    stream.flush().await?;
                    return Ok(Negotiated::Transmission);
                }

                NBD_OPT_INFO | NBD_OPT_GO => {
                    let Some(request) = InfoRequest::parse(&data) else {
                        send_option_reply(stream, option, NBD_REP_ERR_INVALID, b"malformed request")
                            .await?;
                        continue;
                    };
                    if !self.export.matches(&request.name) {
                        send_option_reply(stream, option, NBD_REP_ERR_UNKNOWN, b"export not found")
                            .await?;
                        continue;
                    }

                    self.send_export_info(stream, option, &request.info_types)
                        .await?;
                    send_option_reply(stream, option, NBD_REP_ACK, &[]).await?;

                    if option == NBD_OPT_GO {
                        return Ok(Negotiated::Transmission);
                    }
                }

                NBD_OPT_LIST => {
                    if !data.is_empty() {
                        send_option_reply(stream, option, NBD_REP_ERR_INVALID, &[]).await?;
                        continue;
                    }
                    let name = self.export.name.as_bytes();
                    let description = self.export.description.as_bytes();
                    let mut reply = Vec::with_capacity(4 + name.len() + description.len());
                    reply.extend_from_slice(&(name.len() as u32).to_be_bytes());
                    reply.extend_from_slice(name);
                    reply.extend_from_slice(description);
                    send_option_reply(stream, option, NBD_REP_SERVER, &reply).await?;
                    send_option_reply(stream, option, NBD_REP_ACK, &[]).await?;
                }

                NBD_OPT_ABORT => {
                    send_option_reply(stream, option, NBD_REP_ACK, &[]).await?;
                    return Ok(Negotiated::Aborted);
                }

                _ => {
                    send_option_reply(stream, option, NBD_REP_ERR_UNSUP, &[]).await?;
                }
            }
        }
    }

    /// `NBD_INFO_EXPORT`, the requested name/description, and block sizes
    async fn send_export_info<S>(
        &self,
        stream: &mut S,
        option: u32,
        requested: &[u16],
    ) -> Result<(), NbdError>
    where
        S: AsyncWrite + Unpin,
    {
        let export = &self.export;

        let mut info = Vec::with_capacity(12);
        info.extend_from_slice(&NBD_INFO_EXPORT.to_be_bytes());
        info.extend_from_slice(&export.size_bytes.to_be_bytes());
        info.extend_from_slice(&export.transmission_flags().to_be_bytes());
        send_option_reply(stream, option, NBD_REP_INFO, &info).await?;

        if requested.contains(&NBD_INFO_NAME) {
            let mut info = Vec::with_capacity(2 + export.name.len());
            info.extend_from_slice(&NBD_INFO_NAME.to_be_bytes());
            info.extend_from_slice(export.name.as_bytes());
            send_option_reply(stream, option, NBD_REP_INFO, &info).await?;
        }

        if requested.contains(&NBD_INFO_DESCRIPTION) && !export.description.is_empty() {
            let mut info = Vec::with_capacity(2 + export.description.len());
            info.extend_from_slice(&NBD_INFO_DESCRIPTION.to_be_bytes());
            info.extend_from_slice(export.description.as_bytes());
            send_option_reply(stream, option, NBD_REP_INFO, &info).await?;
        }

        let mut info = Vec::with_capacity(14);
        info.extend_from_slice(&NBD_INFO_BLOCK_SIZE.to_be_bytes());
        info.extend_from_slice(&export.minimum_block_size.to_be_bytes());
        info.extend_from_slice(&export.preferred_block_size.to_be_bytes());
        info.extend_from_slice(&export.maximum_block_size.to_be_bytes());
        send_option_reply(stream, option, NBD_REP_INFO, &info).await
    }

    /// Errno for a range that leaves the export, or `None` when it fits
    fn check_range(&self, offset: u64, length: u64, errno: u32) -> Option<u32> {
        match offset.checked_add(length) {
            Some(end) if end <= self.export.size_bytes => None,
            _ => Some(errno),
        }
    }

    async fn data_phase<S>(&self, stream: &mut S) -> Result<(), NbdError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut header = [0u8; NbdRequest::SIZE_BYTES];

        loop {
            match stream.read_exact(&mut header).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("NBD: client closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let req = match NbdRequest::from_bytes(&header) {
                Ok(req) => req,
                Err(NbdError::RequestTooLarge { .. })
                    if u16::from_be_bytes([header[6], header[7]]) == NBD_CMD_READ =>
                {
                    // No payload follows a READ, so the stream stays in sync
                    send_reply(stream, NbdRequest::peek_handle(&header), NBD_EOVERFLOW).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match req.command {
                NbdCommand::Read => {
                    if let Some(errno) =
                        self.check_range(req.offset, u64::from(req.length), NBD_EINVAL)
                    {
                        send_reply(stream, req.handle, errno).await?;
                        continue;
                    }

                    let mut data = vec![0u8; req.length as usize];
                    match self.backend.read_at(&mut data, req.offset).await {
                        Ok(_) => {
                            stream.write_all(&NbdReply::ok(req.handle).to_bytes()).await?;
                            stream.write_all(&data).await?;
                            stream.flush().await?;
                        }
                        Err(e) => {
                            warn!("NBD: read error at offset {}: {e}", req.offset);
                            send_reply(stream, req.handle, errno_for(&e)).await?;
                        }
                    }
                }

                NbdCommand::Write => {
                    // Always consume the payload to stay in sync
                    let mut data = vec![0u8; req.length as usize];
                    stream.read_exact(&mut data).await?;

                    let error = if self.export.read_only {
                        NBD_EPERM
                    } else if let Some(errno) =
                        self.check_range(req.offset, u64::from(req.length), NBD_ENOSPC)
                    {
                        errno
                    } else {
                        match self.backend.write_at(&data, req.offset).await {
                            Ok(_) => self.sync_if_fua(req.flags).await,
                            Err(e) => {
                                warn!("NBD: write error at offset {}: {e}", req.offset);
                                errno_for(&e)
                            }
                        }
                    };
                    send_reply(stream, req.handle, error).await?;
                }

                NbdCommand::Flush => {
                    let error = match self.backend.sync().await {
                        Ok(()) => NBD_OK,
                        Err(e) => {
                            warn!("NBD: flush error: {e}");
                            errno_for(&e)
                        }
                    };
                    send_reply(stream, req.handle, error).await?;
                }

                NbdCommand::Trim => {
                    let error = if self.export.read_only {
                        NBD_EPERM
                    } else if let Some(errno) =
                        self.check_range(req.offset, u64::from(req.length), NBD_EINVAL)
                    {
                        errno
                    } else {
                        match self.backend.unmap_at(req.length, req.offset).await {
                            Ok(_) => self.sync_if_fua(req.flags).await,
                            Err(e) => {
                                warn!("NBD: trim error at offset {}: {e}", req.offset);
                                errno_for(&e)
                            }
                        }
                    };
                    send_reply(stream, req.handle, error).await?;
                }

                NbdCommand::WriteZeroes => {
                    let error = if self.export.read_only {
                        NBD_EPERM
                    } else if let Some(errno) =
                        self.check_range(req.offset, u64::from(req.length), NBD_ENOSPC)
                    {
                        errno
                    } else {
                        match self.write_zeroes(req.offset, req.length).await {
                            Ok(()) => self.sync_if_fua(req.flags).await,
                            Err(e) => {
                                warn!("NBD: write_zeroes error at offset {}: {e}", req.offset);
                                errno_for(&e)
                            }
                        }
                    };
                    send_reply(stream, req.handle, error).await?;
                }

                NbdCommand::Disconnect => {
                    debug!("NBD: client sent disconnect for '{}'", self.export.name);
                    return Ok(());
                }
            }
        }
    }

    async fn write_zeroes(&self, offset: u64, length: u32) -> std::io::Result<()> {
        let zeroes = vec![0u8; ZERO_CHUNK.min(length as usize)];
        let mut pos = offset;
        let mut remaining = length as usize;
        while remaining > 0 {
            let n = remaining.min(zeroes.len());
            self.backend.write_at(&zeroes[..n], pos).await?;
            pos += n as u64;
            remaining -= n;
        }
        Ok(())
    }

    async fn sync_if_fua(&self, flags: u16) -> u32 {
        if flags & NBD_CMD_FLAG_FUA == 0 {
            return NBD_OK;
        }
        match self.backend.sync().await {
            Ok(()) => NBD_OK,
            Err(e) => {
                warn!("NBD: FUA sync error: {e}");
                errno_for(&e)
            }
        }
    }
}

/// Server greeting; returns whether the client asked for no zero padding
async fn handshake<S>(stream: &mut S) -> Result<bool, NbdError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Server → Client: NBDMAGIC + IHAVEOPT + handshake_flags
    stream.write_u64(NBD_MAGIC).await?;
    stream.write_u64(NBD_OPTS_MAGIC).await?;
    stream
        .write_u16(NBD_FLAG_FIXED_NEWSTYLE | NBD_FLAG_NO_ZEROES)
        .await?;
    stream.flush().await?;

    // Client → Server: client_flags (4 bytes)
    let client_flags = stream.read_u32().await?;
    if client_flags & NBD_FLAG_C_FIXED_NEWSTYLE == 0 {
        return Err(NbdError::NegotiationFailed {
            reason: "client must use fixed newstyle",
        });
    }
    if client_flags & !(NBD_FLAG_C_FIXED_NEWSTYLE | NBD_FLAG_C_NO_ZEROES) != 0 {
        return Err(NbdError::NegotiationFailed {
            reason: "unknown client flags",
        });
    }

    Ok(client_flags & NBD_FLAG_C_NO_ZEROES != 0)
}

async fn send_option_reply<S>(
    stream: &mut S,
    option: u32,
    reply_type: u32,
    data: &[u8],
) -> Result<(), NbdError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_u64(NBD_OPTION_REPLY_MAGIC).await?;
    stream.write_u32(option).await?;
    stream.write_u32(reply_type).await?;
    stream.write_u32(data.len() as u32).await?;
    if !data.is_empty() {
        stream.write_all(data).await?;
    }
    stream.flush().await?;
    Ok(())
}

async fn send_reply<S>(stream: &mut S, handle: u64, error: u32) -> Result<(), NbdError>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&NbdReply::error(handle, error).to_bytes())
        .await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{VecBackend, test_export};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tokio::io::{DuplexStream, duplex};
    use tokio::task::JoinHandle;

    fn spawn_server(
        export: Export,
        backend: Arc<VecBackend>,
    ) -> (DuplexStream, JoinHandle<Result<(), NbdError>>) {
        let (client, server_end) = duplex(1024 * 1024);
        let server = NbdServer::new(export, backend);
        let task = tokio::spawn(async move { server.serve(server_end).await });
        (client, task)
    }

    async fn read_greeting(client: &mut DuplexStream) {
        assert_eq!(client.read_u64().await.unwrap(), NBD_MAGIC);
        assert_eq!(client.read_u64().await.unwrap(), NBD_OPTS_MAGIC);
        let flags = client.read_u16().await.unwrap();
        assert_ne!(flags & NBD_FLAG_FIXED_NEWSTYLE, 0);
    }

    async fn send_option(client: &mut DuplexStream, option: u32, data: &[u8]) {
        client.write_u64(NBD_OPTS_MAGIC).await.unwrap();
        client.write_u32(option).await.unwrap();
        client.write_u32(data.len() as u32).await.unwrap();
        client.write_all(data).await.unwrap();
    }

    /// Returns (option, reply type, payload)
    async fn read_option_reply(client: &mut DuplexStream) -> (u32, u32, Vec<u8>) {
        assert_eq!(client.read_u64().await.unwrap(), NBD_OPTION_REPLY_MAGIC);
        let option = client.read_u32().await.unwrap();
        let reply_type = client.read_u32().await.unwrap();
        let len = client.read_u32().await.unwrap() as usize;
        let mut data = vec![0u8; len];
        client.read_exact(&mut data).await.unwrap();
        (option, reply_type, data)
    }

    fn go_payload(name: &str, info_types: &[u16]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(name.len() as u32).to_be_bytes());
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&(info_types.len() as u16).to_be_bytes());
        for t in info_types {
            data.extend_from_slice(&t.to_be_bytes());
        }
        data
    }

    #[tokio::test]
    async fn export_name_selects_old_style() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, task) = spawn_server(test_export(4096, false), backend);

        read_greeting(&mut client).await;
        client
            .write_u32(NBD_FLAG_C_FIXED_NEWSTYLE | NBD_FLAG_C_NO_ZEROES)
            .await
            .unwrap();
        send_option(&mut client, NBD_OPT_EXPORT_NAME, b"test").await;

        assert_eq!(client.read_u64().await.unwrap(), 4096);
        let flags = client.read_u16().await.unwrap();
        assert_ne!(flags & NBD_FLAG_HAS_FLAGS, 0);
        assert_ne!(flags & NBD_FLAG_CAN_MULTI_CONN, 0);

        // Disconnect
        let req = NbdRequest {
            flags: 0,
            command: NbdCommand::Disconnect,
            handle: 1,
            offset: 0,
            length: 0,
        };
        client.write_all(&req.to_bytes()).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn go_reports_export_info() {
        let backend = Arc::new(VecBackend::new(8192));
        let (mut client, _task) = spawn_server(test_export(8192, true), backend);

        read_greeting(&mut client).await;
        client.write_u32(NBD_FLAG_C_FIXED_NEWSTYLE).await.unwrap();

        // Unknown export first: the server must keep negotiating
        send_option(&mut client, NBD_OPT_GO, &go_payload("nope", &[])).await;
        let (_, reply, _) = read_option_reply(&mut client).await;
        assert_eq!(reply, NBD_REP_ERR_UNKNOWN);

        send_option(
            &mut client,
            NBD_OPT_GO,
            &go_payload("test", &[NBD_INFO_NAME, NBD_INFO_DESCRIPTION]),
        )
        .await;

        let (option, reply, data) = read_option_reply(&mut client).await;
        assert_eq!((option, reply), (NBD_OPT_GO, NBD_REP_INFO));
        assert_eq!(u16::from_be_bytes([data[0], data[1]]), NBD_INFO_EXPORT);
        assert_eq!(u64::from_be_bytes(data[2..10].try_into().unwrap()), 8192);
        let flags = u16::from_be_bytes([data[10], data[11]]);
        assert_ne!(flags & NBD_FLAG_READ_ONLY, 0);

        let (_, _, data) = read_option_reply(&mut client).await;
        assert_eq!(u16::from_be_bytes([data[0], data[1]]), NBD_INFO_NAME);
        assert_eq!(&data[2..], b"test");

        let (_, _, data) = read_option_reply(&mut client).await;
        assert_eq!(u16::from_be_bytes([data[0], data[1]]), NBD_INFO_DESCRIPTION);
        assert_eq!(&data[2..], b"test export");

        let (_, _, data) = read_option_reply(&mut client).await;
        assert_eq!(u16::from_be_bytes([data[0], data[1]]), NBD_INFO_BLOCK_SIZE);
        for field in data[2..].chunks_exact(4) {
            assert_eq!(u32::from_be_bytes(field.try_into().unwrap()), 512);
        }

        let (_, reply, _) = read_option_reply(&mut client).await;
        assert_eq!(reply, NBD_REP_ACK);
    }

    #[tokio::test]
    async fn list_then_abort() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, task) = spawn_server(test_export(4096, false), backend);

        read_greeting(&mut client).await;
        client.write_u32(NBD_FLAG_C_FIXED_NEWSTYLE).await.unwrap();

        send_option(&mut client, NBD_OPT_LIST, &[]).await;
        let (_, reply, data) = read_option_reply(&mut client).await;
        assert_eq!(reply, NBD_REP_SERVER);
        assert_eq!(u32::from_be_bytes(data[0..4].try_into().unwrap()), 4);
        assert_eq!(&data[4..8], b"test");
        let (_, reply, _) = read_option_reply(&mut client).await;
        assert_eq!(reply, NBD_REP_ACK);

        send_option(&mut client, 42, &[]).await;
        let (_, reply, _) = read_option_reply(&mut client).await;
        assert_eq!(reply, NBD_REP_ERR_UNSUP);

        send_option(&mut client, NBD_OPT_ABORT, &[]).await;
        let (_, reply, _) = read_option_reply(&mut client).await;
        assert_eq!(reply, NBD_REP_ACK);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejects_non_fixed_newstyle_client() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, task) = spawn_server(test_export(4096, false), backend);

        read_greeting(&mut client).await;
        client.write_u32(0).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, NbdError::NegotiationFailed { .. }));
    }

    #[tokio::test]
    async fn refuses_session_when_size_changed() {
        let backend = Arc::new(VecBackend::new(8192));
        let (_client, task) = spawn_server(test_export(4096, false), backend);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            NbdError::SizeChanged {
                exported: 4096,
                actual: 8192
            }
        ));
    }

    #[tokio::test]
    async fn oversized_read_gets_eoverflow() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, _task) = spawn_server(test_export(4096, false), backend);

        read_greeting(&mut client).await;
        client
            .write_u32(NBD_FLAG_C_FIXED_NEWSTYLE | NBD_FLAG_C_NO_ZEROES)
            .await
            .unwrap();
        send_option(&mut client, NBD_OPT_EXPORT_NAME, b"").await;
        client.read_u64().await.unwrap();
        client.read_u16().await.unwrap();

        let mut header = NbdRequest {
            flags: 0,
            command: NbdCommand::Read,
            handle: 9,
            offset: 0,
            length: 0,
        }
        .to_bytes();
        header[24..28].copy_from_slice(&(NBD_MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        client.write_all(&header).await.unwrap();

        let mut reply = [0u8; NbdReply::SIZE_BYTES];
        client.read_exact(&mut reply).await.unwrap();
        let reply = NbdReply::from_bytes(&reply).unwrap();
        assert_eq!(reply.handle, 9);
        assert_eq!(reply.error, NBD_EOVERFLOW);
    }

    #[tokio::test]
    async fn fua_write_syncs_backend() {
        let backend = Arc::new(VecBackend::new(4096));
        let (mut client, _task) = spawn_server(test_export(4096, false), Arc::clone(&backend));

        read_greeting(&mut client).await;
        client
            .write_u32(NBD_FLAG_C_FIXED_NEWSTYLE | NBD_FLAG_C_NO_ZEROES)
            .await
            .unwrap();
        send_option(&mut client, NBD_OPT_EXPORT_NAME, b"test").await;
        client.read_u64().await.unwrap();
        client.read_u16().await.unwrap();

        let req = NbdRequest {
            flags: NBD_CMD_FLAG_FUA,
            command: NbdCommand::Write,
            handle: 3,
            offset: 512,
            length: 4,
        };
        client.write_all(&req.to_bytes()).await.unwrap();
        client.write_all(b"abcd").await.unwrap();

        let mut reply = [0u8; NbdReply::SIZE_BYTES];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(NbdReply::from_bytes(&reply).unwrap().error, NBD_OK);
        assert_eq!(backend.syncs.load(Ordering::SeqCst), 1);
        assert_eq!(&backend.contents()[512..516], b"abcd");
    }
}
