//! State server role.
//!
//! Listens on its control channel for generate requests and turns each valid
//! one into a live distributed object. Everything after generation is handled
//! by the object itself on its own channel.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusError, Mailbox, ParticipantId};
use crate::channel::{Channel, DoId};
use crate::config::StateServerConfig;
use crate::context::{wait_for_shutdown, ServerContext};
use crate::datagram::{Datagram, DatagramError, MessageType};
use crate::directory::DirectoryError;
use crate::object::{spawn_object, DistributedObject, GenerateHeader, GenerateOptions, ObjectError};
use crate::schema::ClassId;

/// Result type for state server operations.
pub type Result<T> = std::result::Result<T, StateServerError>;

/// Reasons a generate request was refused.
#[derive(Debug, thiserror::Error)]
pub enum StateServerError {
    #[error("Unknown class {class_id} for object {do_id}")]
    UnknownClass { do_id: DoId, class_id: ClassId },

    #[error("Object {do_id} placed under reserved scope prefix {parent}")]
    ReservedParent { do_id: DoId, parent: DoId },

    #[error(transparent)]
    Duplicate(#[from] DirectoryError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error("Malformed generate: {0}")]
    Datagram(#[from] DatagramError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// A running state server participant.
pub struct StateServer {
    ctx: ServerContext,
    control: Channel,
    options: GenerateOptions,
}

impl StateServer {
    pub fn new(ctx: ServerContext, config: &StateServerConfig) -> Self {
        let options = GenerateOptions {
            scope: ctx.scope(),
            eager_scope_subscription: config.eager_scope_subscription,
        };
        Self {
            ctx,
            control: config.control,
            options,
        }
    }

    /// Subscribe to the control channel and start serving requests.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        let (participant, mailbox) = self
            .ctx
            .bus()
            .register(format!("stateserver:{}", self.control))
            .await;
        self.ctx.bus().subscribe(participant, self.control).await?;
        info!(control = self.control, "State server started");
        Ok(tokio::spawn(self.run(participant, mailbox)))
    }

    async fn run(self, participant: ParticipantId, mut mailbox: Mailbox) {
        let mut shutdown = self.ctx.shutdown_signal();
        loop {
            tokio::select! {
                received = mailbox.recv() => {
                    let Some(datagram) = received else {
                        break;
                    };
                    if let Err(e) = self.handle_datagram(&datagram).await {
                        warn!(
                            control = self.control,
                            sender = datagram.sender(),
                            error = %e,
                            "Generate rejected"
                        );
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        self.ctx.bus().deregister(participant).await;
        debug!(control = self.control, "State server stopped");
    }

    /// Handle one control-channel datagram.
    ///
    /// Returns the id of the generated object, if any.
    pub async fn handle_datagram(&self, dg: &Datagram) -> Result<Option<DoId>> {
        let with_other = match dg.kind() {
            Some(MessageType::ObjectGenerateWithRequired) => false,
            Some(MessageType::ObjectGenerateWithRequiredOther) => true,
            _ => {
                warn!(
                    control = self.control,
                    msg_type = dg.msg_type(),
                    "Unrecognized message type"
                );
                return Ok(None);
            }
        };
        self.generate(dg, with_other).await.map(Some)
    }

    async fn generate(&self, dg: &Datagram, with_other: bool) -> Result<DoId> {
        let mut it = dg.reader();
        let header = GenerateHeader::read(&mut it)?;

        if header.parent == self.options.scope.prefix() {
            return Err(StateServerError::ReservedParent {
                do_id: header.do_id,
                parent: header.parent,
            });
        }

        if self.ctx.directory().contains(header.do_id).await {
            return Err(DirectoryError::AlreadyExists(header.do_id).into());
        }
        let class = self
            .ctx
            .catalog()
            .class_by_id(header.class_id)
            .ok_or(StateServerError::UnknownClass {
                do_id: header.do_id,
                class_id: header.class_id,
            })?;

        let (object, effects) =
            DistributedObject::generate(header, class, &mut it, with_other, &self.options)?;
        spawn_object(&self.ctx, object, effects).await?;
        Ok(header.do_id)
    }
}
