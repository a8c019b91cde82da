//! Typed views of the datagrams a distributed object reacts to.

use bytes::Bytes;

use crate::channel::{Channel, DoId, ZoneId};
use crate::datagram::{Datagram, DatagramIterator, MessageType, Result};
use crate::schema::{ClassId, FieldId};

/// Header shared by both generate variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateHeader {
    pub parent: DoId,
    pub zone: ZoneId,
    pub class_id: ClassId,
    pub do_id: DoId,
}

impl GenerateHeader {
    /// Read `parent, zone, class, do_id` off the front of a generate body.
    pub fn read(it: &mut DatagramIterator) -> Result<Self> {
        Ok(Self {
            parent: it.read_u32()?,
            zone: it.read_u32()?,
            class_id: it.read_u16()?,
            do_id: it.read_u32()?,
        })
    }
}

/// A message addressed to a live object, decoded from its routing body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectMessage {
    Delete {
        do_id: DoId,
    },
    UpdateField {
        do_id: DoId,
        field: FieldId,
        /// Undecoded field payload; framing depends on the field descriptor.
        payload: Bytes,
    },
    SetZone {
        parent: DoId,
        zone: ZoneId,
    },
    SetAuthority {
        do_id: DoId,
        channel: Channel,
    },
    NotifyAuthority {
        do_id: DoId,
        channel: Channel,
    },
    QueryAuthority,
    QueryAll {
        context: u32,
    },
    QueryField {
        do_id: DoId,
        field: FieldId,
        context: u32,
    },
    /// A type code objects do not handle.
    Unrecognized(u16),
}

impl ObjectMessage {
    /// Decode the body of `dg` according to its message type.
    pub fn parse(dg: &Datagram) -> Result<Self> {
        let mut it = dg.reader();
        let message = match dg.kind() {
            Some(MessageType::ObjectDeleteRam) => Self::Delete {
                do_id: it.read_u32()?,
            },
            Some(MessageType::ObjectUpdateField) => Self::UpdateField {
                do_id: it.read_u32()?,
                field: it.read_u16()?,
                payload: it.read_remaining(),
            },
            Some(MessageType::ObjectSetZone) => Self::SetZone {
                parent: it.read_u32()?,
                zone: it.read_u32()?,
            },
            Some(MessageType::ObjectSetAuthority) => Self::SetAuthority {
                do_id: it.read_u32()?,
                channel: it.read_u64()?,
            },
            Some(MessageType::ObjectNotifyAuthority) => Self::NotifyAuthority {
                do_id: it.read_u32()?,
                channel: it.read_u64()?,
            },
            // the body names the asking object; replies go to the sender channel
            Some(MessageType::ObjectQueryAuthority) => Self::QueryAuthority,
            Some(MessageType::ObjectQueryAll) => Self::QueryAll {
                context: it.read_u32()?,
            },
            Some(MessageType::ObjectQueryField) => Self::QueryField {
                do_id: it.read_u32()?,
                field: it.read_u16()?,
                context: it.read_u32()?,
            },
            _ => Self::Unrecognized(dg.msg_type()),
        };
        Ok(message)
    }
}
