//! Data server accept loop
//!
//! One task per accepted connection, supervised by a `JoinSet`. Accept
//! errors are logged and retried after a short backoff; only bind failures
//! end the server.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use dataconn_common::config::ServerConfig;
use dataconn_common::{DataServerProtocol, Frontend};
use dataconn_replica::Replica;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::ServerResult;
use crate::framed::FramedHandler;
use crate::listener::{BoundListener, Listener, bind};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Replica data server
pub struct DataServer {
    protocol: DataServerProtocol,
    address: String,
    dispatcher: Arc<Dispatcher>,
}

impl DataServer {
    pub fn new(
        protocol: DataServerProtocol,
        address: impl Into<String>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            protocol,
            address: address.into(),
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn from_config(
        config: &ServerConfig,
        replica: Arc<dyn Replica>,
        framed: Arc<dyn FramedHandler>,
    ) -> Self {
        Self::new(
            config.protocol,
            config.address.clone(),
            Dispatcher::from_config(config, replica, framed),
        )
    }

    pub const fn protocol(&self) -> DataServerProtocol {
        self.protocol
    }

    pub fn frontend(&self) -> Frontend {
        self.dispatcher.frontend()
    }

    /// Bind the configured listener
    pub async fn bind(&self) -> ServerResult<BoundListener> {
        bind(self.protocol, &self.address).await
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn listen_and_serve<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections from `listener` until `shutdown` resolves
    ///
    /// On shutdown every in-flight connection is aborted, which closes it.
    /// If the listener reports exhaustion, accepting stops and in-flight
    /// connections are allowed to finish.
    pub async fn serve<L, F>(&self, mut listener: L, shutdown: F) -> ServerResult<()>
    where
        L: Listener,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            "data server: serving {} frontend over {}",
            self.dispatcher.frontend(),
            self.protocol
        );

        let mut handlers = JoinSet::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(
                        "data server: shutting down, closing {} connection(s)",
                        handlers.len()
                    );
                    handlers.abort_all();
                    while handlers.join_next().await.is_some() {}
                    return Ok(());
                }

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        error!("data server: connection handler panicked: {e}");
                    }
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let conn_id = next_id;
                        let dispatcher = Arc::clone(&self.dispatcher);
                        info!("data server: connection {conn_id} from {peer}");

                        handlers.spawn(async move {
                            match dispatcher.dispatch(Box::new(stream)).await {
                                Ok(()) => info!("data server: connection {conn_id} closed"),
                                Err(e) => warn!("data server: connection {conn_id} error: {e}"),
                            }
                        });
                    }
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        info!("data server: listener exhausted");
                        break;
                    }
                    Err(e) => {
                        error!("data server: accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                error!("data server: connection handler panicked: {e}");
            }
        }
        Ok(())
    }
}
