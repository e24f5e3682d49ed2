//! NBD protocol constants and wire types
//!
//! Constants are defined for the full set of options and commands this
//! crate negotiates, even where only one side uses them.

#![allow(dead_code)]

use std::io;

use thiserror::Error;

// ── Magic values ──────────────────────────────────────────────────────────────

pub const NBD_MAGIC: u64 = 0x4e42_444d_4147_4943; // "NBDMAGIC"
pub const NBD_OPTS_MAGIC: u64 = 0x4948_4156_454f_5054; // "IHAVEOPT"
pub const NBD_OPTION_REPLY_MAGIC: u64 = 0x0003_e889_0455_65a9;
pub const NBD_REQUEST_MAGIC: u32 = 0x2560_9513;
pub const NBD_SIMPLE_REPLY_MAGIC: u32 = 0x6744_6698;

// ── Handshake flags ───────────────────────────────────────────────────────────

pub const NBD_FLAG_FIXED_NEWSTYLE: u16 = 1 << 0;
pub const NBD_FLAG_NO_ZEROES: u16 = 1 << 1;

pub const NBD_FLAG_C_FIXED_NEWSTYLE: u32 = 1 << 0;
pub const NBD_FLAG_C_NO_ZEROES: u32 = 1 << 1;

// ── Transmission flags ────────────────────────────────────────────────────────

pub const NBD_FLAG_HAS_FLAGS: u16 = 1 << 0;
pub const NBD_FLAG_READ_ONLY: u16 = 1 << 1;
pub const NBD_FLAG_SEND_FLUSH: u16 = 1 << 2;
pub const NBD_FLAG_SEND_FUA: u16 = 1 << 3;
pub const NBD_FLAG_ROTATIONAL: u16 = 1 << 4;
pub const NBD_FLAG_SEND_TRIM: u16 = 1 << 5;
pub const NBD_FLAG_SEND_WRITE_ZEROES: u16 = 1 << 6;
pub const NBD_FLAG_CAN_MULTI_CONN: u16 = 1 << 8;

// ── Options ───────────────────────────────────────────────────────────────────

pub const NBD_OPT_EXPORT_NAME: u32 = 1;
pub const NBD_OPT_ABORT: u32 = 2;
pub const NBD_OPT_LIST: u32 = 3;
pub const NBD_OPT_INFO: u32 = 6;
pub const NBD_OPT_GO: u32 = 7;

// ── Option replies ────────────────────────────────────────────────────────────

pub const NBD_REP_ACK: u32 = 1;
pub const NBD_REP_SERVER: u32 = 2;
pub const NBD_REP_INFO: u32 = 3;
pub const NBD_REP_FLAG_ERROR: u32 = 1 << 31;
pub const NBD_REP_ERR_UNSUP: u32 = 0x8000_0001;
pub const NBD_REP_ERR_POLICY: u32 = 0x8000_0002;
pub const NBD_REP_ERR_INVALID: u32 = 0x8000_0003;
pub const NBD_REP_ERR_UNKNOWN: u32 = 0x8000_0006;

// ── Info types ────────────────────────────────────────────────────────────────

pub const NBD_INFO_EXPORT: u16 = 0;
pub const NBD_INFO_NAME: u16 = 1;
pub const NBD_INFO_DESCRIPTION: u16 = 2;
pub const NBD_INFO_BLOCK_SIZE: u16 = 3;

// ── Commands ──────────────────────────────────────────────────────────────────

pub const NBD_CMD_READ: u16 = 0;
pub const NBD_CMD_WRITE: u16 = 1;
pub const NBD_CMD_DISC: u16 = 2;
pub const NBD_CMD_FLUSH: u16 = 3;
pub const NBD_CMD_TRIM: u16 = 4;
pub const NBD_CMD_WRITE_ZEROES: u16 = 6;

pub const NBD_CMD_FLAG_FUA: u16 = 1 << 0;

// ── Error codes (errno values carried in replies) ─────────────────────────────

pub const NBD_OK: u32 = 0;
pub const NBD_EPERM: u32 = 1;
pub const NBD_EIO: u32 = 5;
pub const NBD_ENOMEM: u32 = 12;
pub const NBD_EINVAL: u32 = 22;
pub const NBD_ENOSPC: u32 = 28;
pub const NBD_EOVERFLOW: u32 = 75;
pub const NBD_ENOTSUP: u32 = 95;
pub const NBD_ESHUTDOWN: u32 = 108;

/// Maximum READ/WRITE payload (32 MiB), the portable default.
///
/// TRIM and WRITE_ZEROES carry no payload and are bounded by the export size.
pub const NBD_MAX_PAYLOAD_SIZE: u32 = 32 * 1024 * 1024;

/// Upper bound on option data and option replies during negotiation
pub const OPTION_DATA_MAX_BYTES: usize = 64 * 1024;

/// NBD protocol errors
#[derive(Debug, Error)]
pub enum NbdError {
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },

    #[error("protocol negotiation failed: {reason}")]
    NegotiationFailed { reason: &'static str },

    #[error("option {option} rejected by server with reply {reply:#x}")]
    OptionRejected { option: u32, reply: u32 },

    #[error("unknown export: {name}")]
    UnknownExport { name: String },

    #[error("client aborted negotiation")]
    Aborted,

    #[error("unsupported command: {command}")]
    UnsupportedCommand { command: u16 },

    #[error("request too large: {length_bytes} bytes (max: {max_bytes})")]
    RequestTooLarge { length_bytes: u64, max_bytes: u64 },

    #[error("export size changed: exported {exported} bytes, backend reports {actual}")]
    SizeChanged { exported: u64, actual: u64 },

    #[error("server error: errno {code}")]
    ServerError { code: u32 },

    #[error("handle mismatch: expected {expected}, got {actual}")]
    HandleMismatch { expected: u64, actual: u64 },

    #[error("transmission error: {0}")]
    Io(#[from] io::Error),
}

impl NbdError {
    /// Whether the connection's byte stream can no longer be trusted
    ///
    /// A server-side errno leaves the stream in sync; every other failure
    /// does not.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        !matches!(self, Self::ServerError { .. })
    }
}

impl From<NbdError> for io::Error {
    fn from(err: NbdError) -> Self {
        match err {
            NbdError::Io(e) => e,
            NbdError::ServerError { code } => errno_to_io(code),
            other => Self::other(other),
        }
    }
}

/// Transmission-phase command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbdCommand {
    Read,
    Write,
    Disconnect,
    Flush,
    Trim,
    WriteZeroes,
}

impl NbdCommand {
    #[must_use]
    pub const fn from_u16(v: u16) -> Option<Self> {
        match v {
            NBD_CMD_READ => Some(Self::Read),
            NBD_CMD_WRITE => Some(Self::Write),
            NBD_CMD_DISC => Some(Self::Disconnect),
            NBD_CMD_FLUSH => Some(Self::Flush),
            NBD_CMD_TRIM => Some(Self::Trim),
            NBD_CMD_WRITE_ZEROES => Some(Self::WriteZeroes),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Read => NBD_CMD_READ,
            Self::Write => NBD_CMD_WRITE,
            Self::Disconnect => NBD_CMD_DISC,
            Self::Flush => NBD_CMD_FLUSH,
            Self::Trim => NBD_CMD_TRIM,
            Self::WriteZeroes => NBD_CMD_WRITE_ZEROES,
        }
    }
}

/// NBD request (28 bytes on wire)
#[derive(Debug, Clone, Copy)]
pub struct NbdRequest {
    pub flags: u16,
    pub command: NbdCommand,
    pub handle: u64,
    pub offset: u64,
    pub length: u32,
}

impl NbdRequest {
    pub const SIZE_BYTES: usize = 28;

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE_BYTES] {
        let mut buf = [0u8; Self::SIZE_BYTES];
        buf[0..4].copy_from_slice(&NBD_REQUEST_MAGIC.to_be_bytes());
        buf[4..6].copy_from_slice(&self.flags.to_be_bytes());
        buf[6..8].copy_from_slice(&self.command.to_u16().to_be_bytes());
        buf[8..16].copy_from_slice(&self.handle.to_be_bytes());
        buf[16..24].copy_from_slice(&self.offset.to_be_bytes());
        buf[24..28].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Parse a request header
    ///
    /// READ and WRITE lengths are capped at [`NBD_MAX_PAYLOAD_SIZE`]; TRIM
    /// and WRITE_ZEROES move no payload and are left to range checks.
    pub fn from_bytes(buf: &[u8; Self::SIZE_BYTES]) -> Result<Self, NbdError> {
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != NBD_REQUEST_MAGIC {
            return Err(NbdError::InvalidMagic {
                expected: u64::from(NBD_REQUEST_MAGIC),
                actual: u64::from(magic),
            });
        }

        let flags = u16::from_be_bytes([buf[4], buf[5]]);
        let cmd = u16::from_be_bytes([buf[6], buf[7]]);
        let command =
            NbdCommand::from_u16(cmd).ok_or(NbdError::UnsupportedCommand { command: cmd })?;
        let handle = u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        let offset = u64::from_be_bytes([
            buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
        ]);
        let length = u32::from_be_bytes([buf[24], buf[25], buf[26], buf[27]]);

        if matches!(command, NbdCommand::Read | NbdCommand::Write) && length > NBD_MAX_PAYLOAD_SIZE
        {
            return Err(NbdError::RequestTooLarge {
                length_bytes: u64::from(length),
                max_bytes: u64::from(NBD_MAX_PAYLOAD_SIZE),
            });
        }

        Ok(Self {
            flags,
            command,
            handle,
            offset,
            length,
        })
    }

    /// Handle of a header that failed validation, for the error reply
    #[must_use]
    pub fn peek_handle(buf: &[u8; Self::SIZE_BYTES]) -> u64 {
        u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ])
    }
}

/// NBD simple reply (16 bytes on wire)
#[derive(Debug, Clone, Copy)]
pub struct NbdReply {
    pub error: u32,
    pub handle: u64,
}

impl NbdReply {
    pub const SIZE_BYTES: usize = 16;

    #[must_use]
    pub const fn ok(handle: u64) -> Self {
        Self {
            error: NBD_OK,
            handle,
        }
    }

    #[must_use]
    pub const fn error(handle: u64, error: u32) -> Self {
        Self { error, handle }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE_BYTES] {
        let mut buf = [0u8; Self::SIZE_BYTES];
        buf[0..4].copy_from_slice(&NBD_SIMPLE_REPLY_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&self.error.to_be_bytes());
        buf[8..16].copy_from_slice(&self.handle.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE_BYTES]) -> Result<Self, NbdError> {
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != NBD_SIMPLE_REPLY_MAGIC {
            return Err(NbdError::InvalidMagic {
                expected: u64::from(NBD_SIMPLE_REPLY_MAGIC),
                actual: u64::from(magic),
            });
        }

        let error = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let handle = u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        Ok(Self { error, handle })
    }
}

const _: () = {
    assert!(NbdRequest::SIZE_BYTES == 28);
    assert!(NbdReply::SIZE_BYTES == 16);
};

/// Map a backend error onto the errno carried in an NBD reply
///
/// Raw OS errors NBD defines pass through unchanged; everything else is
/// classified by kind, falling back to `EIO`.
#[must_use]
pub fn errno_for(err: &io::Error) -> u32 {
    if let Some(code) = err.raw_os_error().and_then(|c| u32::try_from(c).ok()) {
        if matches!(
            code,
            NBD_EPERM | NBD_EIO | NBD_ENOMEM | NBD_EINVAL | NBD_ENOSPC | NBD_EOVERFLOW
                | NBD_ENOTSUP | NBD_ESHUTDOWN
        ) {
            return code;
        }
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => NBD_EPERM,
        io::ErrorKind::InvalidInput => NBD_EINVAL,
        io::ErrorKind::OutOfMemory => NBD_ENOMEM,
        io::ErrorKind::StorageFull => NBD_ENOSPC,
        io::ErrorKind::Unsupported => NBD_ENOTSUP,
        _ => NBD_EIO,
    }
}

/// Inverse of [`errno_for`] on the client side
#[must_use]
pub fn errno_to_io(code: u32) -> io::Error {
    let kind = match code {
        NBD_EPERM => io::ErrorKind::PermissionDenied,
        NBD_EINVAL => io::ErrorKind::InvalidInput,
        NBD_ENOMEM => io::ErrorKind::OutOfMemory,
        NBD_ENOSPC => io::ErrorKind::StorageFull,
        NBD_ENOTSUP => io::ErrorKind::Unsupported,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, format!("remote export returned errno {code}"))
}
