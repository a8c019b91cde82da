//! Process-wide server context.
//!
//! Holds the bus, the object directory, the schema catalog and the shutdown
//! signal. Every role and object task gets a clone; there are no globals.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::bus::MessageBus;
use crate::channel::AuthorityScope;
use crate::directory::ObjectDirectory;
use crate::interfaces::SchemaCatalog;

/// Shared handles for one running server.
#[derive(Clone)]
pub struct ServerContext {
    bus: Arc<MessageBus>,
    directory: Arc<ObjectDirectory>,
    catalog: Arc<dyn SchemaCatalog>,
    scope: AuthorityScope,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServerContext {
    pub fn new(catalog: Arc<dyn SchemaCatalog>, scope: AuthorityScope) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus: Arc::new(MessageBus::new()),
            directory: Arc::new(ObjectDirectory::new()),
            catalog,
            scope,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn directory(&self) -> &Arc<ObjectDirectory> {
        &self.directory
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    pub fn scope(&self) -> AuthorityScope {
        self.scope
    }

    /// Receiver that flips to `true` once [`shutdown`](Self::shutdown) runs.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signal every task to stop, then drop all objects and participants.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let objects = self.directory.clear().await;
        self.bus.clear().await;
        info!(objects, "Server context shut down");
    }
}

/// Resolve once `signal` reports shutdown or its sender is gone.
pub async fn wait_for_shutdown(signal: &mut watch::Receiver<bool>) {
    while !*signal.borrow_and_update() {
        if signal.changed().await.is_err() {
            return;
        }
    }
}
