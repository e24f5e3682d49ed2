//! dataconn Common - Shared types and utilities
//!
//! This crate provides the types, configuration and error definitions shared
//! by the replica data server, the NBD codec and the outbound connection pool.

pub mod config;
pub mod error;
pub mod stream;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use stream::{BoxedStream, DataStream};
pub use types::*;
