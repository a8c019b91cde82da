//! Schema-driven field codec.
//!
//! Field values are kept in their wire form. Decoding a field means consuming
//! exactly its bytes from a datagram body and returning them unchanged,
//! length prefixes included, so stored values can be re-emitted verbatim and
//! concatenated into snapshots without separators.

use bytes::{BufMut, Bytes, BytesMut};

use crate::datagram::{DatagramError, DatagramIterator};
use crate::schema::{FieldDef, FieldId, FieldLayout, PrefixWidth};

/// Maximum composite nesting the codec will descend into.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding or decoding field values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Datagram(#[from] DatagramError),

    #[error("Field nesting exceeds {MAX_NESTING_DEPTH} levels")]
    TooDeep,

    #[error("Molecular field {0} cannot be decoded directly")]
    Molecular(FieldId),

    #[error("Payload of {len} bytes does not fit a {width}-byte length prefix")]
    TooLong { len: usize, width: usize },

    #[error("{0} fields do not fit a u16 count")]
    TooManyFields(usize),
}

/// Consume one field value from `it`, returning its wire bytes.
pub fn decode_field(field: &FieldDef, it: &mut DatagramIterator) -> Result<Bytes> {
    let mut out = BytesMut::new();
    decode_into(field, it, &mut out, 0)?;
    Ok(out.freeze())
}

fn decode_into(
    field: &FieldDef,
    it: &mut DatagramIterator,
    out: &mut BytesMut,
    depth: usize,
) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(CodecError::TooDeep);
    }
    match &field.layout {
        FieldLayout::Fixed(size) => {
            out.extend_from_slice(&it.read_data(*size)?);
        }
        FieldLayout::Prefixed(PrefixWidth::U16) => {
            let len = it.read_u16()?;
            out.put_u16_le(len);
            out.extend_from_slice(&it.read_data(len as usize)?);
        }
        FieldLayout::Prefixed(PrefixWidth::U32) => {
            let len = it.read_u32()?;
            out.put_u32_le(len);
            out.extend_from_slice(&it.read_data(len as usize)?);
        }
        FieldLayout::Composite(fields) => {
            for sub in fields {
                decode_into(sub, it, out, depth + 1)?;
            }
        }
        FieldLayout::Molecular(_) => return Err(CodecError::Molecular(field.id)),
    }
    Ok(())
}

/// Concatenate already-encoded field values in the order given.
pub fn encode_fields<I, B>(values: I) -> Bytes
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut out = BytesMut::new();
    for value in values {
        out.extend_from_slice(value.as_ref());
    }
    out.freeze()
}

/// Wrap a raw payload in a length prefix of the given width.
pub fn encode_prefixed(width: PrefixWidth, payload: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(width.bytes() + payload.len());
    match width {
        PrefixWidth::U16 => {
            let len = u16::try_from(payload.len()).map_err(|_| CodecError::TooLong {
                len: payload.len(),
                width: 2,
            })?;
            out.put_u16_le(len);
        }
        PrefixWidth::U32 => {
            let len = u32::try_from(payload.len()).map_err(|_| CodecError::TooLong {
                len: payload.len(),
                width: 4,
            })?;
            out.put_u32_le(len);
        }
    }
    out.extend_from_slice(payload);
    Ok(out.freeze())
}

/// Count prefix for a `(field id, value)` list.
pub fn field_count(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| CodecError::TooManyFields(len))
}
