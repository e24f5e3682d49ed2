//! NBD (Network Block Device) protocol implementation
//!
//! Fixed-newstyle handshake, option haggling and simple-reply transmission,
//! transport-agnostic over any async byte stream.
//!
//! - [`NbdServer`] serves one [`Export`] through a [`Backend`] on one connection
//! - [`NbdClient`] negotiates an export and issues synchronous requests
//!
//! Based on https://github.com/NetworkBlockDevice/nbd/blob/master/doc/proto.md

mod backend;
mod client;
mod export;
mod protocol;
mod server;
#[cfg(test)]
mod test_util;

pub use backend::Backend;
pub use client::{BlockSizes, NbdClient};
pub use export::Export;
pub use protocol::*;
pub use server::NbdServer;
