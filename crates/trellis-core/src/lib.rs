//! trellis-core — node identity, placement ring, and the grid control protocol.
//! The framed types here ARE the wire format; trellis-grid builds the router on top.

pub mod codec;
pub mod config;
pub mod hasher;
pub mod node;
pub mod protocol;
pub mod ring;

pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use config::{GridConfig, HasherKind, RingKind};
pub use hasher::{Blake3PointHasher, Crc32PointHasher, PointHasher};
pub use node::{ActorAddress, Definition, NodeId};
pub use protocol::{
    AnswerResult, ControlHandler, ControlMessage, CorrelationId, Delivery, Envelope, MessageKind,
    PendingDelivery,
};
pub use ring::{ring_for, LockedRing, Ring, SharedRing};
