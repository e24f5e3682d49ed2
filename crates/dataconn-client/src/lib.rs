//! dataconn Client - outbound connections to a remote replica export
//!
//! [`ConnectionPool`] opens up to eight NBD connections to one export (more
//! than one only when the server advertises multi-connection support) and
//! spreads reads and writes across them round-robin. The pool implements
//! [`BlockIo`](dataconn_replica::BlockIo), so it can stand in for a local
//! replica.

pub mod channel;
pub mod error;
pub mod pool;
pub mod uri;

pub use channel::{BlockChannel, Dialer};
pub use error::PoolError;
pub use pool::{ConnectionPool, NbdPool, PoolOptions};
pub use uri::{DEFAULT_NBD_PORT, NbdUri};
