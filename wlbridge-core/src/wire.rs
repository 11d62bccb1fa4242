//! Framing: length-prefix (4 bytes LE) + kind byte + bincode body.

use crate::protocol::{Message, KIND_ERROR, KIND_PACKET, KIND_REGISTER};

pub const LEN_SIZE: usize = 4;
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// A decoded frame payload. Unknown kinds are reported rather than treated as errors so a
/// newer peer can add message types without breaking the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(Message),
    Unknown { kind: u8 },
}

/// Encode a message into a single frame: 4 bytes LE length + kind byte + bincode body.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    let body = match msg {
        Message::Error { text } => bincode::serialize(text)?,
        Message::Packet { bytes } => bincode::serialize(bytes)?,
        Message::Register { addresses } => bincode::serialize(addresses)?,
    };
    let payload_len = body.len() + 1;
    if payload_len > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    let len = payload_len as u32;
    let mut out = Vec::with_capacity(LEN_SIZE + payload_len);
    out.extend_from_slice(&len.to_le_bytes());
    out.push(msg.kind());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Error encoding a message into a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Payload length announced by a 4-byte length prefix, checked against the frame size limit.
pub fn payload_len(prefix: [u8; LEN_SIZE]) -> Result<usize, FrameDecodeError> {
    let len = u32::from_le_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge(len));
    }
    Ok(len as usize)
}

/// Split one frame off the front of `bytes`. Returns the payload and the number of bytes
/// consumed. A payload that later fails to decode can be skipped using the consumed count.
pub fn split_frame(bytes: &[u8]) -> Result<(&[u8], usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = payload_len([bytes[0], bytes[1], bytes[2], bytes[3]])?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    Ok((&bytes[LEN_SIZE..LEN_SIZE + len], LEN_SIZE + len))
}

/// Decode a frame payload (kind byte + body).
pub fn decode_payload(payload: &[u8]) -> Result<Decoded, FrameDecodeError> {
    let (&kind, body) = payload.split_first().ok_or(FrameDecodeError::Empty)?;
    let msg = match kind {
        KIND_ERROR => Message::Error {
            text: bincode::deserialize(body)?,
        },
        KIND_PACKET => Message::Packet {
            bytes: bincode::deserialize(body)?,
        },
        KIND_REGISTER => Message::Register {
            addresses: bincode::deserialize(body)?,
        },
        kind => return Ok(Decoded::Unknown { kind }),
    };
    Ok(Decoded::Message(msg))
}

/// Decode one frame from the front of `bytes`. Returns the decoded payload and the number of
/// bytes consumed. `NeedMore` means the buffer holds only part of a frame.
pub fn decode_frame(bytes: &[u8]) -> Result<(Decoded, usize), FrameDecodeError> {
    let (payload, consumed) = split_frame(bytes)?;
    Ok((decode_payload(payload)?, consumed))
}

/// Error decoding a frame. `NeedMore` and `TooLarge` concern the framing itself; `Empty` and
/// `Decode` affect only the one payload.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large ({0} bytes)")]
    TooLarge(u32),
    #[error("empty frame payload")]
    Empty,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

impl FrameDecodeError {
    /// Whether the stream can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameDecodeError::Empty | FrameDecodeError::Decode(_))
    }
}
