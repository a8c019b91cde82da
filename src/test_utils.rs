//! Shared fixtures for unit tests.
//!
//! `Avatar` (class 1) exercises every field shape and flag combination the
//! object rules distinguish. `Zone` (class 2) is a bare parent class.

use std::sync::Arc;

use bytes::Bytes;

use crate::channel::{Channel, DoId, ZoneId};
use crate::codec::{encode_fields, encode_prefixed};
use crate::datagram::{Datagram, MessageType};
use crate::object::{DistributedObject, GenerateHeader, GenerateOptions};
use crate::schema::{
    ClassDef, ClassId, FieldDef, FieldFlag::*, FieldId, FieldLayout, PrefixWidth, StaticCatalog,
};

pub const AVATAR: ClassId = 1;
pub const ZONE: ClassId = 2;

/// Field ids of the `Avatar` class.
pub mod fields {
    use crate::schema::FieldId;

    /// fixed 4, required broadcast ram
    pub const X: FieldId = 0;
    /// fixed 1, broadcast
    pub const FLASH: FieldId = 1;
    /// u16-prefixed, ram broadcast
    pub const NAME: FieldId = 2;
    /// fixed 4, ram airecv
    pub const SECRET: FieldId = 3;
    /// fixed 4, ram broadcast airecv
    pub const HP: FieldId = 4;
    /// composite (fixed 4, u16-prefixed), required
    pub const POS: FieldId = 5;
    /// molecular (NAME, FLASH), broadcast
    pub const NAME_FLASH: FieldId = 6;
    /// fixed 2, no flags
    pub const SCRATCH: FieldId = 7;
}

pub fn avatar_class() -> ClassDef {
    use fields::*;
    ClassDef::new(
        AVATAR,
        "Avatar",
        vec![
            FieldDef::new(X, "x", FieldLayout::Fixed(4)).with_flags([Required, Broadcast, Ram]),
            FieldDef::new(FLASH, "flash", FieldLayout::Fixed(1)).with_flags([Broadcast]),
            FieldDef::new(NAME, "name", FieldLayout::Prefixed(PrefixWidth::U16))
                .with_flags([Ram, Broadcast]),
            FieldDef::new(SECRET, "secret", FieldLayout::Fixed(4)).with_flags([Ram, Airecv]),
            FieldDef::new(HP, "hp", FieldLayout::Fixed(4)).with_flags([Ram, Broadcast, Airecv]),
            FieldDef::new(
                POS,
                "pos",
                FieldLayout::Composite(vec![
                    FieldDef::sub(FieldLayout::Fixed(4)),
                    FieldDef::sub(FieldLayout::Prefixed(PrefixWidth::U16)),
                ]),
            )
            .with_flags([Required]),
            FieldDef::new(NAME_FLASH, "name_flash", FieldLayout::Molecular(vec![NAME, FLASH]))
                .with_flags([Broadcast]),
            FieldDef::new(SCRATCH, "scratch", FieldLayout::Fixed(2)),
        ],
    )
}

pub fn zone_class() -> ClassDef {
    ClassDef::new(ZONE, "Zone", Vec::new())
}

pub fn test_catalog() -> Arc<StaticCatalog> {
    Arc::new(
        StaticCatalog::from_classes([avatar_class(), zone_class()])
            .expect("fixture classes are valid"),
    )
}

pub fn u32_value(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

/// Wire value of a u16-prefixed string.
pub fn name_value(name: &str) -> Bytes {
    encode_prefixed(PrefixWidth::U16, name.as_bytes()).expect("short name")
}

/// Wire value of the `pos` composite.
pub fn pos_value(slot: u32, label: &str) -> Bytes {
    encode_fields([u32_value(slot), name_value(label)])
}

/// Required-field payload for an avatar, in declared order.
pub fn avatar_required(x: u32) -> Bytes {
    encode_fields([u32_value(x), pos_value(1, "spawn")])
}

/// A generate-with-required datagram for an avatar.
pub fn generate_datagram(
    control: Channel,
    parent: DoId,
    zone: ZoneId,
    do_id: DoId,
    x: u32,
) -> Datagram {
    Datagram::builder(99, MessageType::ObjectGenerateWithRequired)
        .to(control)
        .add_u32(parent)
        .add_u32(zone)
        .add_u16(AVATAR)
        .add_u32(do_id)
        .add_data(&avatar_required(x))
        .build()
        .expect("valid datagram")
}

/// Generate an avatar directly, discarding its announcement effects.
pub fn generate_object(do_id: DoId, parent: DoId, zone: ZoneId) -> DistributedObject {
    let header = GenerateHeader {
        parent,
        zone,
        class_id: AVATAR,
        do_id,
    };
    let class = Arc::new(avatar_class());
    let mut it = crate::datagram::DatagramIterator::new(avatar_required(42));
    DistributedObject::generate(header, class, &mut it, false, &GenerateOptions::default())
        .expect("fixture object generates")
        .0
}

/// Field update datagram addressed to the object's own channel.
pub fn update_datagram(sender: Channel, do_id: DoId, field: FieldId, value: &[u8]) -> Datagram {
    Datagram::builder(sender, MessageType::ObjectUpdateField)
        .to(Channel::from(do_id))
        .add_u32(do_id)
        .add_u16(field)
        .add_data(value)
        .build()
        .expect("valid datagram")
}
