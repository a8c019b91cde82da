//! Database role participant.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DatabaseBackend, DatabaseError, DbOperation, DbResponse, Result};
use crate::bus::{BusError, Mailbox, ParticipantId};
use crate::channel::{database_broadcast_channel, Channel, DoId};
use crate::codec::{decode_field, field_count};
use crate::config::DatabaseConfig;
use crate::context::{wait_for_shutdown, ServerContext};
use crate::datagram::{Datagram, DatagramIterator, MessageType};
use crate::interfaces::ObjectStore;
use crate::schema::FieldId;

/// Serves create, get-all and delete requests on a control channel.
pub struct DatabaseServer {
    ctx: ServerContext,
    control: Channel,
    broadcast: bool,
    backend: DatabaseBackend,
}

impl DatabaseServer {
    pub fn new(ctx: ServerContext, config: &DatabaseConfig, store: Arc<dyn ObjectStore>) -> Self {
        let backend = DatabaseBackend::new(store, Arc::clone(ctx.catalog()), config.generate);
        Self {
            ctx,
            control: config.control,
            broadcast: config.broadcast,
            backend,
        }
    }

    /// Subscribe to the control channel and start serving requests.
    pub async fn start(self) -> std::result::Result<JoinHandle<()>, BusError> {
        let (participant, mailbox) = self
            .ctx
            .bus()
            .register(format!("database:{}", self.control))
            .await;
        self.ctx.bus().subscribe(participant, self.control).await?;
        let range = self.backend.range();
        info!(
            control = self.control,
            min = range.min,
            max = range.max,
            "Database started"
        );
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
                    if let Some(reply) = self.handle_datagram(&datagram).await {
                        self.ctx.bus().publish_from(Some(participant), reply).await;
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        self.ctx.bus().deregister(participant).await;
        debug!(control = self.control, "Database stopped");
    }

    /// Handle one request, returning the datagram to publish in response.
    pub async fn handle_datagram(&self, dg: &Datagram) -> Option<Datagram> {
        let result = match dg.kind() {
            Some(MessageType::DbCreateObject) => self.create(dg).await,
            Some(MessageType::DbGetAll) => self.get_all(dg).await,
            Some(MessageType::DbDeleteObject) => self.delete(dg).await,
            _ => {
                warn!(
                    control = self.control,
                    msg_type = dg.msg_type(),
                    "Unrecognized message type"
                );
                return None;
            }
        };
        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    control = self.control,
                    msg_type = dg.msg_type(),
                    sender = dg.sender(),
                    body = %hex::encode(dg.body()),
                    error = %e,
                    "Malformed database request"
                );
                None
            }
        }
    }

    async fn create(&self, dg: &Datagram) -> Result<Option<Datagram>> {
        let mut it = dg.reader();
        let context = it.read_u32()?;
        let class_id = it.read_u16()?;
        let class = self
            .ctx
            .catalog()
            .class_by_id(class_id)
            .ok_or(DatabaseError::UnknownClass(class_id))?;

        let count = it.read_u16()?;
        let mut fields = BTreeMap::new();
        for _ in 0..count {
            let field_id = it.read_u16()?;
            let field = class
                .field(field_id)
                .ok_or(DatabaseError::UnknownField {
                    class_id,
                    field: field_id,
                })?;
            fields.insert(field_id, decode_field(field, &mut it)?);
        }

        let do_id = match self
            .backend
            .submit(DbOperation::Create { class_id, fields })
            .await
        {
            Ok(DbResponse::Created(do_id)) => do_id,
            Ok(_) => 0,
            Err(e) => {
                warn!(context, class_id, error = %e, "Create failed");
                0
            }
        };

        let reply = self
            .reply(dg.sender(), MessageType::DbCreateObjectResp)
            .add_u32(context)
            .add_u32(do_id)
            .build()?;
        Ok(Some(reply))
    }

    async fn get_all(&self, dg: &Datagram) -> Result<Option<Datagram>> {
        let mut it = dg.reader();
        let context = it.read_u32()?;
        let do_id = it.read_u32()?;

        let builder = self
            .reply(dg.sender(), MessageType::DbGetAllResp)
            .add_u32(context);
        let builder = match self.backend.submit(DbOperation::Get { do_id }).await {
            Ok(DbResponse::Found(snapshot)) => builder
                .add_u8(1)
                .add_u16(snapshot.class.id)
                .add_data(&encode_field_list(&snapshot.fields)?),
            Ok(_) => builder.add_u8(0),
            Err(e) => {
                debug!(context, do_id, error = %e, "Get failed");
                builder.add_u8(0)
            }
        };
        Ok(Some(builder.build()?))
    }

    async fn delete(&self, dg: &Datagram) -> Result<Option<Datagram>> {
        let do_id: DoId = DatagramIterator::new(dg.body().clone()).read_u32()?;
        self.backend.submit(DbOperation::Delete { do_id }).await?;

        if !self.broadcast {
            return Ok(None);
        }
        let notice = self
            .reply(database_broadcast_channel(do_id), MessageType::DbDeleteObject)
            .add_u32(do_id)
            .build()?;
        Ok(Some(notice))
    }

    fn reply(&self, to: Channel, msg_type: MessageType) -> crate::datagram::DatagramBuilder {
        Datagram::builder(self.control, msg_type).to(to)
    }
}

/// `count u16` then `(field id u16, value)` per entry.
fn encode_field_list(fields: &BTreeMap<FieldId, Bytes>) -> crate::codec::Result<Bytes> {
    let mut out = Vec::new();
    out.extend_from_slice(&field_count(fields.len())?.to_le_bytes());
    for (id, value) in fields {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(value);
    }
    Ok(Bytes::from(out))
}
