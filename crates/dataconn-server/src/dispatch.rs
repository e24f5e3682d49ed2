//! Per-connection protocol dispatch

use std::sync::Arc;

use dataconn_common::config::ServerConfig;
use dataconn_common::{BoxedStream, Frontend};
use dataconn_nbd::{Export, NbdServer};
use dataconn_replica::Replica;
use tracing::debug;

use crate::backend::ReplicaBackend;
use crate::error::{ServerError, ServerResult};
use crate::framed::FramedHandler;

/// Routes accepted connections to the configured frontend
pub struct Dispatcher {
    replica: Arc<dyn Replica>,
    frontend: Frontend,
    export_name: String,
    export_description: String,
    framed: Arc<dyn FramedHandler>,
}

impl Dispatcher {
    pub fn new(
        replica: Arc<dyn Replica>,
        frontend: Frontend,
        export_name: impl Into<String>,
        export_description: impl Into<String>,
        framed: Arc<dyn FramedHandler>,
    ) -> Self {
        Self {
            replica,
            frontend,
            export_name: export_name.into(),
            export_description: export_description.into(),
            framed,
        }
    }

    /// Dispatcher for a listener configured by `config`
    ///
    /// `+nbd` protocols override the configured frontend.
    pub fn from_config(
        config: &ServerConfig,
        replica: Arc<dyn Replica>,
        framed: Arc<dyn FramedHandler>,
    ) -> Self {
        Self::new(
            replica,
            config.protocol.effective_frontend(config.frontend),
            config.export_name.clone(),
            config.export_description.clone(),
            framed,
        )
    }

    pub const fn frontend(&self) -> Frontend {
        self.frontend
    }

    /// Export metadata from the replica's current status
    pub fn build_export(&self) -> ServerResult<Export> {
        let (state, info) = self.replica.status();
        let block_size = u32::try_from(info.sector_size).map_err(|_| ServerError::Geometry {
            sector_size: info.sector_size,
        })?;
        debug!(
            state = %state,
            size = info.size,
            block_size,
            "building NBD export '{}'",
            self.export_name
        );

        Ok(Export {
            name: self.export_name.clone(),
            description: self.export_description.clone(),
            size_bytes: info.size,
            minimum_block_size: block_size,
            preferred_block_size: block_size,
            maximum_block_size: block_size,
            read_only: self.replica.read_only(),
            supports_multi_conn: true,
        })
    }

    /// Serve one connection to completion
    pub async fn dispatch(&self, stream: BoxedStream) -> ServerResult<()> {
        match self.frontend {
            Frontend::Default => self
                .framed
                .handle(stream, Arc::clone(&self.replica))
                .await
                .map_err(ServerError::Framed),
            Frontend::Nbd => {
                let export = self.build_export()?;
                let backend = ReplicaBackend::new(Arc::clone(&self.replica));
                NbdServer::new(export, backend).serve(stream).await?;
                Ok(())
            }
        }
    }
}
