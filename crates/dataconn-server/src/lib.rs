//! dataconn Server - replica data server
//!
//! Accepts connections on a TCP or UNIX-domain listener and hands each one
//! to its own task. Per connection, the [`Dispatcher`] picks the frontend:
//!
//! - `nbd`: an NBD session over a [`ReplicaBackend`], with the export built
//!   from live replica status
//! - `default`: the external framed protocol, reached through a
//!   [`FramedHandler`]
//!
//! A failing connection only ends its own task.

pub mod acceptor;
pub mod backend;
pub mod dispatch;
pub mod error;
pub mod framed;
pub mod listener;

pub use acceptor::DataServer;
pub use backend::ReplicaBackend;
pub use dispatch::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use framed::{FramedHandler, RejectFramedHandler};
pub use listener::{BoundListener, Listener, StreamListener, bind};
