//! In-process runtime hosting the configured roles.
//!
//! Builds the server context, starts every role and the network listener,
//! and tears them down together.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::BusError;
use crate::channel::AuthorityScope;
use crate::config::{Config, ConfigError, RoleConfig};
use crate::context::ServerContext;
use crate::database::{DatabaseServer, MemoryObjectStore};
use crate::interfaces::SchemaCatalog;
use crate::network;
use crate::schema::{SchemaError, StaticCatalog};
use crate::stateserver::{StateServer, StateServerError};

/// Errors raised while starting the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    StateServer(#[from] StateServerError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running server.
pub struct Runtime {
    context: ServerContext,
    listen_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Validate `config`, load its schema files and start everything.
    pub async fn from_config(config: &Config) -> Result<Self, RuntimeError> {
        config.validate()?;
        let catalog = StaticCatalog::load(config.general.schema_files.as_slice())?;
        Self::start(config, Arc::new(catalog)).await
    }

    /// Start roles and listener against an already-built catalog.
    pub async fn start(config: &Config, catalog: Arc<dyn SchemaCatalog>) -> Result<Self, RuntimeError> {
        let scope = AuthorityScope::new(config.general.authority_scope_prefix);
        let context = ServerContext::new(catalog, scope);
        let mut tasks = Vec::new();

        for role in &config.roles {
            let task = match role {
                RoleConfig::Stateserver(ss) => StateServer::new(context.clone(), ss).start().await?,
                RoleConfig::Database(db) => {
                    let store = Arc::new(MemoryObjectStore::new(db.generate.min));
                    DatabaseServer::new(context.clone(), db, store).start().await?
                }
            };
            tasks.push(task);
        }

        let mut listen_addr = None;
        if let Some(bind) = &config.messagedirector.bind {
            let (addr, task) = network::listen(context.clone(), bind).await?;
            listen_addr = Some(addr);
            tasks.push(task);
        }

        info!(
            roles = config.roles.len(),
            listen = ?listen_addr,
            scope_prefix = scope.prefix(),
            "Runtime started"
        );
        Ok(Self {
            context,
            listen_addr,
            tasks,
        })
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Address the network listener is bound to, if any.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    /// Run until Ctrl+C, then shut down.
    pub async fn run(self) -> Result<(), RuntimeError> {
        tokio::signal::ctrl_c().await?;
        info!("Shutting down runtime");
        self.shutdown().await;
        Ok(())
    }

    /// Stop every role, object and connection.
    pub async fn shutdown(self) {
        self.context.shutdown().await;
        for task in &self.tasks {
            task.abort();
        }
        futures::future::join_all(self.tasks).await;
    }
}
