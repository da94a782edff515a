//! Wire codec — fixed frame header plus a pluggable body encoding.
//!
//! The 40-byte header is the stable part of the wire format: version, kind
//! tag, body length, and the sender/recipient pair. It is `#[repr(C,
//! packed)]` with zerocopy derives for deterministic layout and
//! allocation-free parsing. The body carries the serde-encoded
//! `ControlMessage`; any `MessageCodec` impl is acceptable as long as every
//! variant round-trips, including nested `Forward`.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::node::NodeId;
use crate::protocol::{ControlMessage, Envelope, MessageKind};

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Maximum body size in bytes. Larger control messages (oversized
/// relocation snapshots, mostly) must be split by the layer above.
pub const MAX_BODY: usize = 1 << 20;

/// Fixed-layout header preceding every encoded control message.
///
/// Wire size: 40 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Frame format version. Currently 0x01.
    pub version: u8,

    /// Variant tag (`MessageKind`). Decode verifies it matches the body.
    pub kind: u8,

    /// Reserved, must be zero.
    pub reserved: u16,

    /// Body length in bytes, not including this header.
    pub length: u32,

    /// Originating node.
    pub sender: [u8; 16],

    /// Addressed node.
    pub recipient: [u8; 16],
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 40]);

/// Header length on the wire.
pub const FRAME_LEN: usize = std::mem::size_of::<FrameHeader>();

/// Errors arising when encoding or decoding framed control messages.
///
/// Corrupt or truncated input always lands here — never in a panic or an
/// unrelated fault.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame truncated: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown message kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("reserved header bytes are non-zero")]
    ReservedSet,

    #[error("body length {0} exceeds maximum {}", MAX_BODY)]
    BodyTooLarge(usize),

    #[error("header kind {header:?} does not match body variant {body:?}")]
    KindMismatch {
        header: MessageKind,
        body: MessageKind,
    },

    #[error("body encoding failed: {0}")]
    Body(#[from] serde_json::Error),
}

/// Body-encoding contract between the router and the wire.
pub trait MessageCodec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CodecError>;
}

/// Default codec: `FrameHeader` + JSON body.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes, CodecError> {
        let body = serde_json::to_vec(&envelope.message)?;
        if body.len() > MAX_BODY {
            return Err(CodecError::BodyTooLarge(body.len()));
        }
        let header = FrameHeader {
            version: FRAME_VERSION,
            kind: envelope.message.kind() as u8,
            reserved: 0,
            length: body.len() as u32,
            sender: *envelope.sender.as_bytes(),
            recipient: *envelope.recipient.as_bytes(),
        };
        let mut out = Vec::with_capacity(FRAME_LEN + body.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&body);
        Ok(Bytes::from(out))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CodecError> {
        if bytes.len() < FRAME_LEN {
            return Err(CodecError::Truncated {
                got: bytes.len(),
                need: FRAME_LEN,
            });
        }
        let header = FrameHeader::read_from(&bytes[..FRAME_LEN]).ok_or(CodecError::Truncated {
            got: bytes.len(),
            need: FRAME_LEN,
        })?;

        // Packed fields are copied into locals before use.
        let version = header.version;
        let kind_byte = header.kind;
        let reserved = header.reserved;
        let length = header.length as usize;

        if version != FRAME_VERSION {
            return Err(CodecError::UnknownVersion(version));
        }
        let kind = MessageKind::from_u8(kind_byte).ok_or(CodecError::UnknownKind(kind_byte))?;
        if reserved != 0 {
            return Err(CodecError::ReservedSet);
        }
        if length > MAX_BODY {
            return Err(CodecError::BodyTooLarge(length));
        }
        let need = FRAME_LEN + length;
        if bytes.len() < need {
            return Err(CodecError::Truncated {
                got: bytes.len(),
                need,
            });
        }

        let message: ControlMessage = serde_json::from_slice(&bytes[FRAME_LEN..need])?;
        if message.kind() != kind {
            return Err(CodecError::KindMismatch {
                header: kind,
                body: message.kind(),
            });
        }
        Ok(Envelope {
            sender: NodeId::from_bytes(header.sender),
            recipient: NodeId::from_bytes(header.recipient),
            message,
        })
    }
}
