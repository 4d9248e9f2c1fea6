//! Control message framing.
//!
//! ```text
//! +-----------------+---------------+--------+-------------------+
//! | length (u32 BE) | type (u16 BE) | 0x0000 | encrypted payload |
//! +-----------------+---------------+--------+-------------------+
//! ```
//!
//! `length` counts payload bytes only. Payloads go through the session
//! cipher; the header is sent in the clear.

use std::fmt;

use rp_core::ProtocolError;
use rp_crypto::SessionCipher;

pub const HEADER_LEN: usize = 8;

/// Largest payload a frame may declare. Control messages are tiny; a
/// larger length means the stream is corrupt.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// Payload of a heartbeat response.
pub const HEARTBEAT_RESPONSE_BODY: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x01, 0xfe, 0x00, 0x00];

/// Control message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    LoginPinRequest,
    LoginPinResponse,
    Login,
    SessionId,
    HeartbeatRequest,
    HeartbeatResponse,
    Standby,
    KeyboardEnableToggle,
    KeyboardOpen,
    KeyboardCloseRemote,
    KeyboardTextChangeReq,
    KeyboardTextChangeRes,
    KeyboardCloseReq,
    /// Code outside the known set.
    Unknown(u16),
}

impl MessageType {
    pub fn code(&self) -> u16 {
        match self {
            MessageType::LoginPinRequest => 0x04,
            MessageType::LoginPinResponse => 0x8004,
            MessageType::Login => 0x05,
            MessageType::SessionId => 0x33,
            MessageType::HeartbeatRequest => 0xfe,
            MessageType::HeartbeatResponse => 0x1fe,
            MessageType::Standby => 0x50,
            MessageType::KeyboardEnableToggle => 0x20,
            MessageType::KeyboardOpen => 0x21,
            MessageType::KeyboardCloseRemote => 0x22,
            MessageType::KeyboardTextChangeReq => 0x23,
            MessageType::KeyboardTextChangeRes => 0x24,
            MessageType::KeyboardCloseReq => 0x25,
            MessageType::Unknown(code) => *code,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MessageType::Unknown(_))
    }
}

impl From<u16> for MessageType {
    fn from(code: u16) -> Self {
        match code {
            0x04 => MessageType::LoginPinRequest,
            0x8004 => MessageType::LoginPinResponse,
            0x05 => MessageType::Login,
            0x33 => MessageType::SessionId,
            0xfe => MessageType::HeartbeatRequest,
            0x1fe => MessageType::HeartbeatResponse,
            0x50 => MessageType::Standby,
            0x20 => MessageType::KeyboardEnableToggle,
            0x21 => MessageType::KeyboardOpen,
            0x22 => MessageType::KeyboardCloseRemote,
            0x23 => MessageType::KeyboardTextChangeReq,
            0x24 => MessageType::KeyboardTextChangeRes,
            0x25 => MessageType::KeyboardCloseReq,
            other => MessageType::Unknown(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Unknown(code) => write!(f, "Unknown({:#06x})", code),
            known => write!(f, "{:?}", known),
        }
    }
}

/// A decoded control message with its plaintext payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

impl ControlMessage {
    pub fn new(kind: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn empty(kind: MessageType) -> Self {
        Self::new(kind, Vec::new())
    }
}

/// Frame `message`, encrypting its payload.
pub fn encode(cipher: &mut SessionCipher, message: &ControlMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + message.payload.len());
    out.extend_from_slice(&(message.payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&message.kind.code().to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&cipher.encrypt(&message.payload));
    out
}

/// Reassembles frames from a byte stream.
///
/// Socket reads may split or coalesce frames; bytes are buffered until a
/// complete frame is present.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, decrypting its payload.
    ///
    /// The full declared payload is decrypted even for unknown types so the
    /// keystream stays aligned with the host. A header declaring more than
    /// [`MAX_PAYLOAD_LEN`] bytes is an error and nothing is consumed.
    pub fn decode_next(
        &mut self,
        cipher: &mut SessionCipher,
    ) -> Result<Option<ControlMessage>, ProtocolError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        let frame_len = HEADER_LEN + len;
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        let kind = MessageType::from(u16::from_be_bytes([self.buf[4], self.buf[5]]));
        let mut payload: Vec<u8> = self.buf.drain(..frame_len).skip(HEADER_LEN).collect();
        cipher.apply_in_place(&mut payload);
        Ok(Some(ControlMessage { kind, payload }))
    }
}
