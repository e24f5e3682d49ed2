//! Type-erased transport streams
//!
//! Accepted and dialed connections are either TCP or UNIX-domain sockets
//! (or in-memory duplex pipes under test). Handlers only need an async byte
//! stream, so the concrete socket type is erased behind [`BoxedStream`].

use tokio::io::{AsyncRead, AsyncWrite};

/// An async byte stream usable as a data connection
pub trait DataStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> DataStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Owned, type-erased data connection
pub type BoxedStream = Box<dyn DataStream>;
