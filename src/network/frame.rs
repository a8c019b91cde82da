//! Stream framing for network participants.
//!
//! Every frame is a little-endian u16 length followed by that many bytes.
//! A frame whose only recipient is [`CONTROL_CHANNEL`] is a control message
//! for the director itself and carries no sender field.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::channel::{Channel, CONTROL_CHANNEL};
use crate::datagram::{Datagram, DatagramError, DatagramIterator, MessageType};

/// Largest payload a single frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Errors raised while moving frames over a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {0} bytes exceeds the u16 length prefix")]
    TooLarge(usize),
}

/// Director control request from a connected participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    AddChannel(Channel),
    RemoveChannel(Channel),
    Unrecognized(u16),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Control(ControlMessage),
    Routed(Datagram),
}

impl Frame {
    pub fn parse(buf: Bytes) -> Result<Self, DatagramError> {
        let mut it = DatagramIterator::new(buf.clone());
        if it.read_u8()? == 1 && it.read_u64()? == CONTROL_CHANNEL {
            let msg_type = it.read_u16()?;
            let control = match MessageType::from_code(msg_type) {
                Some(MessageType::ControlAddChannel) => ControlMessage::AddChannel(it.read_u64()?),
                Some(MessageType::ControlRemoveChannel) => {
                    ControlMessage::RemoveChannel(it.read_u64()?)
                }
                _ => ControlMessage::Unrecognized(msg_type),
            };
            return Ok(Self::Control(control));
        }
        Ok(Self::Routed(Datagram::decode(buf)?))
    }
}

/// Wire form of a control request, without the length prefix.
pub fn encode_control(msg_type: MessageType, channel: Channel) -> Bytes {
    let mut out = BytesMut::with_capacity(1 + 8 + 2 + 8);
    out.put_u8(1);
    out.put_u64_le(CONTROL_CHANNEL);
    out.put_u16_le(msg_type.code());
    out.put_u64_le(channel);
    out.freeze()
}

/// Read one frame. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u16_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(Bytes::from(buf)))
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let mut out = BytesMut::with_capacity(2 + payload.len());
    out.put_u16_le(payload.len() as u16);
    out.extend_from_slice(payload);
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}
