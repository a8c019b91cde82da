//! Routed datagrams.
//!
//! Wire layout (little-endian):
//!
//! ```text
//! u8            recipient count (1..=255)
//! u64 * count   destination channels
//! u64           sender channel
//! u16           message type
//! ...           message-type-specific body
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::{Channel, INVALID_CHANNEL};

mod message_type;

pub use message_type::MessageType;

/// Maximum number of destination channels in one routing header.
pub const MAX_RECIPIENTS: usize = u8::MAX as usize;

/// Result type for datagram operations.
pub type Result<T> = std::result::Result<T, DatagramError>;

/// Errors raised while building or reading datagrams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatagramError {
    #[error("Truncated datagram: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Datagram has no recipients")]
    NoRecipients,

    #[error("Too many recipients: {0} (max {MAX_RECIPIENTS})")]
    TooManyRecipients(usize),
}

/// An immutable routed message.
///
/// Shared between subscribers as `Arc<Datagram>`; the body is a cheap
/// reference-counted slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    recipients: Vec<Channel>,
    sender: Channel,
    msg_type: u16,
    body: Bytes,
}

impl Datagram {
    /// Start building a datagram from `sender` with the given type.
    pub fn builder(sender: Channel, msg_type: impl Into<u16>) -> DatagramBuilder {
        DatagramBuilder {
            recipients: Vec::new(),
            sender,
            msg_type: msg_type.into(),
            body: BytesMut::new(),
        }
    }

    /// Destination channels, in header order.
    pub fn recipients(&self) -> &[Channel] {
        &self.recipients
    }

    /// Sender channel.
    pub fn sender(&self) -> Channel {
        self.sender
    }

    /// Raw message-type code.
    pub fn msg_type(&self) -> u16 {
        self.msg_type
    }

    /// Known message kind, if the code is recognized.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_code(self.msg_type)
    }

    /// Message body following the routing header.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Cursor over the message body.
    pub fn reader(&self) -> DatagramIterator {
        DatagramIterator::new(self.body.clone())
    }

    /// Serialize header and body.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        out.put_u8(self.recipients.len() as u8);
        for channel in &self.recipients {
            out.put_u64_le(*channel);
        }
        out.put_u64_le(self.sender);
        out.put_u16_le(self.msg_type);
        out.extend_from_slice(&self.body);
        out.freeze()
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        1 + 8 * self.recipients.len() + 8 + 2 + self.body.len()
    }

    /// Parse a datagram from its wire form.
    pub fn decode(buf: Bytes) -> Result<Self> {
        let mut it = DatagramIterator::new(buf);
        let count = it.read_u8()? as usize;
        if count == 0 {
            return Err(DatagramError::NoRecipients);
        }
        let mut recipients = Vec::with_capacity(count);
        for _ in 0..count {
            recipients.push(it.read_u64()?);
        }
        let sender = it.read_u64()?;
        let msg_type = it.read_u16()?;
        Ok(Self {
            recipients,
            sender,
            msg_type,
            body: it.read_remaining(),
        })
    }
}

/// Incremental datagram construction.
#[derive(Debug, Clone)]
pub struct DatagramBuilder {
    recipients: Vec<Channel>,
    sender: Channel,
    msg_type: u16,
    body: BytesMut,
}

impl DatagramBuilder {
    /// Add a destination channel.
    ///
    /// The unset channel and channels already present are skipped, so callers
    /// can add optional scopes without checking them first.
    pub fn to(mut self, channel: Channel) -> Self {
        if channel != INVALID_CHANNEL && !self.recipients.contains(&channel) {
            self.recipients.push(channel);
        }
        self
    }

    pub fn add_u8(mut self, value: u8) -> Self {
        self.body.put_u8(value);
        self
    }

    pub fn add_u16(mut self, value: u16) -> Self {
        self.body.put_u16_le(value);
        self
    }

    pub fn add_u32(mut self, value: u32) -> Self {
        self.body.put_u32_le(value);
        self
    }

    pub fn add_u64(mut self, value: u64) -> Self {
        self.body.put_u64_le(value);
        self
    }

    /// Append raw bytes (already-encoded field data).
    pub fn add_data(mut self, data: &[u8]) -> Self {
        self.body.extend_from_slice(data);
        self
    }

    /// Whether any destination has been added.
    pub fn has_recipients(&self) -> bool {
        !self.recipients.is_empty()
    }

    /// Finish the datagram.
    pub fn build(self) -> Result<Datagram> {
        if self.recipients.is_empty() {
            return Err(DatagramError::NoRecipients);
        }
        if self.recipients.len() > MAX_RECIPIENTS {
            return Err(DatagramError::TooManyRecipients(self.recipients.len()));
        }
        Ok(Datagram {
            recipients: self.recipients,
            sender: self.sender,
            msg_type: self.msg_type,
            body: self.body.freeze(),
        })
    }
}

/// Bounds-checked little-endian reader over a datagram body.
#[derive(Debug, Clone)]
pub struct DatagramIterator {
    buf: Bytes,
}

impl DatagramIterator {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(DatagramError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Read exactly `len` raw bytes.
    pub fn read_data(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Take everything that is left.
    pub fn read_remaining(&mut self) -> Bytes {
        self.buf.split_to(self.buf.len())
    }
}
