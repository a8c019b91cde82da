//! Distributed objects.
//!
//! A [`DistributedObject`] is a pure state machine: it consumes one datagram
//! at a time and answers with a list of [`Effect`]s (datagrams to publish,
//! channels to join or leave, self-destruction). The [`actor`] module owns
//! the bus participant that drains the object's mailbox and applies those
//! effects, so the rules below are testable without a running bus.
//!
//! Invariants:
//! - every required field holds a value from generation until deletion
//! - non-ram, non-required fields are never stored
//! - `authority == 0` means no managing authority; inherited authority is
//!   only overridden by parent notifications while `authority_explicit` is
//!   false

pub mod actor;
pub mod message;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::channel::{location_channel, AuthorityScope, Channel, DoId, ZoneId, INVALID_CHANNEL};
use crate::codec::{decode_field, field_count, CodecError};
use crate::datagram::{Datagram, DatagramBuilder, DatagramError, DatagramIterator, MessageType};
use crate::schema::{ClassDef, ClassId, FieldDef, FieldId};

pub use actor::spawn_object;
pub use message::{GenerateHeader, ObjectMessage};

/// Result type for object operations.
pub type Result<T> = std::result::Result<T, ObjectError>;

/// Errors raised while generating an object or handling its traffic.
///
/// A handler that returns an error has not changed the object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("Object {do_id} has no field {field}")]
    UnknownField { do_id: DoId, field: FieldId },

    #[error("Field {field} of object {do_id} is not a ram field")]
    NotRam { do_id: DoId, field: FieldId },

    #[error("Object {0} has been deleted")]
    Deleted(DoId),

    #[error("Object {do_id} cannot move under reserved scope prefix {parent}")]
    ReservedParent { do_id: DoId, parent: DoId },

    #[error("Malformed field payload: {0}")]
    Codec(#[from] CodecError),

    #[error("Malformed datagram: {0}")]
    Datagram(#[from] DatagramError),
}

/// Something the object asks its host to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Subscribe(Channel),
    Unsubscribe(Channel),
    Publish(Datagram),
    /// Unregister from the directory and the bus.
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Entering,
    Active,
    Deleted,
}

/// Per-server knobs applied to every object a state server generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub scope: AuthorityScope,
    /// Join the parent's authority-scope channel at generation and on every
    /// zone change, rather than only after the first zone change.
    pub eager_scope_subscription: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            scope: AuthorityScope::default(),
            eager_scope_subscription: true,
        }
    }
}

/// A live, replicated object instance.
#[derive(Debug)]
pub struct DistributedObject {
    do_id: DoId,
    class: Arc<ClassDef>,
    parent: DoId,
    zone: ZoneId,
    fields: HashMap<FieldId, Bytes>,
    authority: Channel,
    authority_explicit: bool,
    has_ram_fields: bool,
    lifecycle: Lifecycle,
    scope: AuthorityScope,
}

impl DistributedObject {
    /// Build an object from a generate body positioned just past its header.
    ///
    /// Reads the required fields in declared order and, when `with_other` is
    /// set, a counted list of `(field id, value)` ram fields. Nothing is
    /// announced unless every value decodes.
    pub fn generate(
        header: GenerateHeader,
        class: Arc<ClassDef>,
        it: &mut DatagramIterator,
        with_other: bool,
        options: &GenerateOptions,
    ) -> Result<(Self, Vec<Effect>)> {
        let mut object = Self {
            do_id: header.do_id,
            class: Arc::clone(&class),
            parent: header.parent,
            zone: header.zone,
            fields: HashMap::new(),
            authority: INVALID_CHANNEL,
            authority_explicit: false,
            has_ram_fields: false,
            lifecycle: Lifecycle::Entering,
            scope: options.scope,
        };

        for field in class.required_fields() {
            let value = decode_field(field, it)?;
            object.fields.insert(field.id, value);
        }

        if with_other {
            let count = it.read_u16()?;
            for _ in 0..count {
                let field_id = it.read_u16()?;
                let field = class.field(field_id).ok_or(ObjectError::UnknownField {
                    do_id: object.do_id,
                    field: field_id,
                })?;
                if !field.is_ram() || field.is_molecular() {
                    return Err(ObjectError::NotRam {
                        do_id: object.do_id,
                        field: field_id,
                    });
                }
                let value = decode_field(field, it)?;
                object.fields.insert(field_id, value);
                object.has_ram_fields = true;
            }
        }

        let mut effects = vec![Effect::Subscribe(Channel::from(object.do_id))];
        if options.eager_scope_subscription {
            effects.push(Effect::Subscribe(object.scope.channel(object.parent)));
        }
        object.announce_location(&mut effects)?;
        object.lifecycle = Lifecycle::Active;

        info!(
            do_id = object.do_id,
            class = %object.class.name,
            parent = object.parent,
            zone = object.zone,
            "Object generated"
        );
        Ok((object, effects))
    }

    pub fn do_id(&self) -> DoId {
        self.do_id
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub fn class_id(&self) -> ClassId {
        self.class.id
    }

    pub fn parent(&self) -> DoId {
        self.parent
    }

    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    /// Channel of the object's current `(parent, zone)`.
    pub fn location(&self) -> Channel {
        location_channel(self.parent, self.zone)
    }

    pub fn authority(&self) -> Channel {
        self.authority
    }

    pub fn is_authority_explicit(&self) -> bool {
        self.authority_explicit
    }

    pub fn has_ram_fields(&self) -> bool {
        self.has_ram_fields
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Stored wire value of a field.
    pub fn field(&self, id: FieldId) -> Option<&Bytes> {
        self.fields.get(&id)
    }

    /// Ids of every stored field, ascending.
    pub fn field_ids(&self) -> Vec<FieldId> {
        let mut ids: Vec<_> = self.fields.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Apply one inbound datagram.
    pub fn handle(&mut self, dg: &Datagram) -> Result<Vec<Effect>> {
        if self.lifecycle == Lifecycle::Deleted {
            return Err(ObjectError::Deleted(self.do_id));
        }

        match ObjectMessage::parse(dg)? {
            ObjectMessage::Delete { do_id } => self.delete(do_id),
            ObjectMessage::UpdateField {
                do_id,
                field,
                payload,
            } => self.update_field(dg.sender(), do_id, field, payload),
            ObjectMessage::SetZone { parent, zone } => self.set_location(dg.sender(), parent, zone),
            ObjectMessage::SetAuthority { do_id, channel } => {
                if do_id != self.do_id {
                    return Ok(self.ignore(dg));
                }
                self.assign_authority(channel, true)
            }
            ObjectMessage::NotifyAuthority { do_id, channel } => {
                if do_id != self.parent || self.authority_explicit {
                    return Ok(self.ignore(dg));
                }
                self.assign_authority(channel, false)
            }
            ObjectMessage::QueryAuthority => self.reply_authority(dg.sender()),
            ObjectMessage::QueryAll { context } => self.reply_all(dg.sender(), context),
            ObjectMessage::QueryField {
                do_id,
                field,
                context,
            } => {
                if do_id != self.do_id {
                    return Ok(self.ignore(dg));
                }
                self.reply_field(dg.sender(), field, context)
            }
            ObjectMessage::Unrecognized(msg_type) => {
                warn!(do_id = self.do_id, msg_type, "Unrecognized message type");
                Ok(Vec::new())
            }
        }
    }

    /// `parent, zone, class, do_id` followed by every required field.
    pub fn required_snapshot(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(self.parent);
        out.put_u32_le(self.zone);
        out.put_u16_le(self.class.id);
        out.put_u32_le(self.do_id);
        for field in self.class.required_fields() {
            if let Some(value) = self.fields.get(&field.id) {
                out.extend_from_slice(value);
            }
        }
        out.freeze()
    }

    /// Count-prefixed `(field id, value)` list of stored ram, non-required fields.
    pub fn other_snapshot(&self) -> Result<Bytes> {
        let present: Vec<_> = self
            .class
            .other_fields()
            .filter_map(|f| self.fields.get(&f.id).map(|v| (f.id, v)))
            .collect();
        let mut out = BytesMut::new();
        out.put_u16_le(field_count(present.len())?);
        for (id, value) in present {
            out.put_u16_le(id);
            out.extend_from_slice(value);
        }
        Ok(out.freeze())
    }

    fn ignore(&self, dg: &Datagram) -> Vec<Effect> {
        debug!(
            do_id = self.do_id,
            msg_type = dg.msg_type(),
            sender = dg.sender(),
            "Ignoring message for another object"
        );
        Vec::new()
    }

    fn builder(&self, msg_type: MessageType) -> DatagramBuilder {
        Datagram::builder(Channel::from(self.do_id), msg_type)
    }

    /// Enter-zone to the current location plus an authority query to the parent.
    fn announce_location(&self, effects: &mut Vec<Effect>) -> Result<()> {
        let enter = if self.has_ram_fields {
            self.builder(MessageType::ObjectEnterZoneWithRequiredOther)
                .to(self.location())
                .add_data(&self.required_snapshot())
                .add_data(&self.other_snapshot()?)
        } else {
            self.builder(MessageType::ObjectEnterZoneWithRequired)
                .to(self.location())
                .add_data(&self.required_snapshot())
        };
        publish(effects, enter)?;

        let query = self
            .builder(MessageType::ObjectQueryAuthority)
            .to(Channel::from(self.parent))
            .add_u32(self.do_id);
        publish(effects, query)
    }

    fn update_field(
        &mut self,
        requester: Channel,
        do_id: DoId,
        field_id: FieldId,
        payload: Bytes,
    ) -> Result<Vec<Effect>> {
        if do_id != self.do_id {
            debug!(do_id = self.do_id, target = do_id, "Update for another object");
            return Ok(Vec::new());
        }

        let class = Arc::clone(&self.class);
        let field = class.field(field_id).ok_or(ObjectError::UnknownField {
            do_id,
            field: field_id,
        })?;
        let mut it = DatagramIterator::new(payload);

        // decode everything before touching state
        let mut decoded: Vec<(&FieldDef, Bytes)> = Vec::new();
        if field.is_molecular() {
            for component in field.components() {
                let sub = class.field(*component).ok_or(ObjectError::UnknownField {
                    do_id,
                    field: *component,
                })?;
                decoded.push((sub, decode_field(sub, &mut it)?));
            }
        } else {
            decoded.push((field, decode_field(field, &mut it)?));
        }
        if !it.is_empty() {
            debug!(do_id, field = field_id, trailing = it.remaining(), "Trailing bytes after field");
        }

        let mut data = BytesMut::new();
        for (def, value) in decoded {
            data.extend_from_slice(&value);
            if def.is_ram() {
                self.has_ram_fields = true;
            }
            if def.is_required() || def.is_ram() {
                self.fields.insert(def.id, value);
            }
        }

        debug!(do_id, field = %field.name, "Field updated");

        let mut effects = Vec::new();
        if field.is_broadcast() || field.is_airecv() {
            let mut notice = Datagram::builder(requester, MessageType::ObjectUpdateField);
            if field.is_broadcast() {
                notice = notice.to(self.location());
            }
            if field.is_airecv() {
                notice = notice.to(self.authority);
            }
            let notice = notice
                .to(requester)
                .add_u32(do_id)
                .add_u16(field_id)
                .add_data(&data);
            publish(&mut effects, notice)?;
        }
        Ok(effects)
    }

    fn set_location(&mut self, requester: Channel, parent: DoId, zone: ZoneId) -> Result<Vec<Effect>> {
        if parent == self.scope.prefix() {
            return Err(ObjectError::ReservedParent {
                do_id: self.do_id,
                parent,
            });
        }
        // the re-entry snapshot must encode before anything moves
        self.other_snapshot()?;

        let (old_parent, old_zone) = (self.parent, self.zone);
        let old_location = self.location();
        self.parent = parent;
        self.zone = zone;

        let mut effects = vec![
            Effect::Unsubscribe(self.scope.channel(old_parent)),
            Effect::Subscribe(self.scope.channel(parent)),
        ];

        let change = Datagram::builder(requester, MessageType::ObjectChangeZone)
            .to(old_location)
            .to(self.authority)
            .add_u32(self.do_id)
            .add_u32(parent)
            .add_u32(zone)
            .add_u32(old_parent)
            .add_u32(old_zone);
        publish(&mut effects, change)?;
        self.announce_location(&mut effects)?;

        info!(
            do_id = self.do_id,
            old_parent,
            old_zone,
            parent,
            zone,
            "Object changed zone"
        );
        Ok(effects)
    }

    fn assign_authority(&mut self, channel: Channel, explicit: bool) -> Result<Vec<Effect>> {
        let mut effects = Vec::new();
        if channel == self.authority {
            return Ok(effects);
        }
        let other = self.other_snapshot()?;

        if self.authority != INVALID_CHANNEL {
            let leaving = self
                .builder(MessageType::ObjectLeavingAuthority)
                .to(self.authority)
                .add_u32(self.do_id);
            publish(&mut effects, leaving)?;
        }

        let previous = self.authority;
        self.authority = channel;
        self.authority_explicit = explicit;

        if channel != INVALID_CHANNEL {
            let enter = self
                .builder(MessageType::ObjectEnterAuthority)
                .to(channel)
                .add_data(&self.required_snapshot())
                .add_data(&other);
            publish(&mut effects, enter)?;
        }

        let notify = self
            .builder(MessageType::ObjectNotifyAuthority)
            .to(self.scope.channel(self.do_id))
            .add_u32(self.do_id)
            .add_u64(channel);
        publish(&mut effects, notify)?;

        info!(
            do_id = self.do_id,
            previous,
            authority = channel,
            explicit,
            "Authority changed"
        );
        Ok(effects)
    }

    fn reply_authority(&self, requester: Channel) -> Result<Vec<Effect>> {
        let mut effects = Vec::new();
        let reply = self
            .builder(MessageType::ObjectNotifyAuthority)
            .to(requester)
            .add_u32(self.do_id)
            .add_u64(self.authority);
        publish(&mut effects, reply)?;
        Ok(effects)
    }

    fn reply_all(&self, requester: Channel, context: u32) -> Result<Vec<Effect>> {
        let mut effects = Vec::new();
        let reply = self
            .builder(MessageType::ObjectQueryAllResp)
            .to(requester)
            .add_u32(context)
            .add_data(&self.required_snapshot())
            .add_data(&self.other_snapshot()?);
        publish(&mut effects, reply)?;
        Ok(effects)
    }

    fn reply_field(&self, requester: Channel, field: FieldId, context: u32) -> Result<Vec<Effect>> {
        let mut effects = Vec::new();
        let mut reply = self
            .builder(MessageType::ObjectQueryFieldResp)
            .to(requester)
            .add_u32(self.do_id)
            .add_u16(field)
            .add_u32(context);
        reply = match self.fields.get(&field) {
            Some(value) => reply.add_u8(1).add_data(value),
            None => reply.add_u8(0),
        };
        publish(&mut effects, reply)?;
        Ok(effects)
    }

    fn delete(&mut self, do_id: DoId) -> Result<Vec<Effect>> {
        if do_id != self.do_id {
            debug!(do_id = self.do_id, target = do_id, "Delete for another object");
            return Ok(Vec::new());
        }

        let mut effects = Vec::new();
        let gone = self
            .builder(MessageType::ObjectDeleteRam)
            .to(self.location())
            .add_u32(self.do_id);
        publish(&mut effects, gone)?;
        effects.push(Effect::Destroy);
        self.lifecycle = Lifecycle::Deleted;

        info!(do_id, parent = self.parent, zone = self.zone, "Object deleted");
        Ok(effects)
    }
}

/// Queue a datagram unless every recipient was the invalid channel.
fn publish(effects: &mut Vec<Effect>, builder: DatagramBuilder) -> Result<()> {
    if builder.has_recipients() {
        effects.push(Effect::Publish(builder.build()?));
    }
    Ok(())
}
