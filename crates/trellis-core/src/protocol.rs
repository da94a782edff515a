//! Grid control protocol — the six message variants and their dispatch.
//!
//! The protocol is a closed tagged union. Consumers see it through the
//! `ControlHandler` visitor, one method per variant, so a cross-cutting
//! concern (tracing, metrics) is a new handler impl and never a change to
//! the variants themselves. Every variant is independently serializable;
//! `Forward` wraps exactly one inner message and preserves the original
//! sender so answers still correlate after a hop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{ActorAddress, Definition, NodeId};

/// Default budget of forward hops before a bouncing deliver is dropped.
/// Guards against forward loops during prolonged membership disagreement.
pub const DEFAULT_FORWARD_HOPS: u8 = 8;

/// Links an asynchronous deliver to its eventual answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deliver in flight: everything needed to invoke a method on an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub address: ActorAddress,
    pub definition: Definition,
    pub method: String,
    pub args: serde_json::Value,
    pub correlation: CorrelationId,
}

/// A deliver parked during relocation, together with the caller it still
/// owes an answer. Replayed in original order before new traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub caller: NodeId,
    pub delivery: Delivery,
}

/// Outcome carried by `Answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "lowercase")]
pub enum AnswerResult {
    Ok(serde_json::Value),
    Err(String),
}

/// One-byte variant tag carried in the frame header, so a relay can
/// classify traffic without decoding the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Start = 1,
    Deliver = 2,
    Answer = 3,
    Forward = 4,
    Relocate = 5,
    Standby = 6,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Start),
            2 => Some(Self::Deliver),
            3 => Some(Self::Answer),
            4 => Some(Self::Forward),
            5 => Some(Self::Relocate),
            6 => Some(Self::Standby),
            _ => None,
        }
    }
}

/// The control-plane message set of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Create a remote-resident actor from its definition. Idempotent if
    /// the address already exists.
    Start {
        address: ActorAddress,
        definition: Definition,
    },

    /// Invoke a method on the actor at `address`.
    Deliver(Delivery),

    /// Complete the pending call identified by the correlation.
    Answer {
        correlation: CorrelationId,
        result: AnswerResult,
    },

    /// Re-route a message whose first recipient's ring view disagreed with
    /// the sender's. Carries the original sender for answer correlation
    /// and a hop budget so disagreement cannot loop forever.
    Forward {
        original_sender: NodeId,
        hops_left: u8,
        inner: Box<ControlMessage>,
    },

    /// Move an actor: replace state at `address` with `snapshot`, then
    /// replay `pending` in order before accepting new traffic.
    Relocate {
        address: ActorAddress,
        definition: Definition,
        snapshot: Vec<u8>,
        pending: Vec<PendingDelivery>,
    },

    /// Materialize a passive backup that absorbs relocation snapshots but
    /// processes no delivers until promoted.
    Standby {
        protocol: String,
        address: ActorAddress,
        definition: Definition,
    },
}

impl ControlMessage {
    /// Wire kind tag for the frame header.
    pub fn kind(&self) -> MessageKind {
        match self {
            ControlMessage::Start { .. } => MessageKind::Start,
            ControlMessage::Deliver(_) => MessageKind::Deliver,
            ControlMessage::Answer { .. } => MessageKind::Answer,
            ControlMessage::Forward { .. } => MessageKind::Forward,
            ControlMessage::Relocate { .. } => MessageKind::Relocate,
            ControlMessage::Standby { .. } => MessageKind::Standby,
        }
    }

    /// Present this message to a handler. The match is exhaustive, so a
    /// handler cannot silently miss a variant.
    pub fn dispatch<H: ControlHandler + ?Sized>(
        self,
        sender: NodeId,
        handler: &H,
    ) -> anyhow::Result<()> {
        match self {
            ControlMessage::Start {
                address,
                definition,
            } => handler.on_start(sender, address, definition),
            ControlMessage::Deliver(delivery) => handler.on_deliver(sender, delivery),
            ControlMessage::Answer {
                correlation,
                result,
            } => handler.on_answer(sender, correlation, result),
            ControlMessage::Forward {
                original_sender,
                hops_left,
                inner,
            } => handler.on_forward(sender, original_sender, hops_left, *inner),
            ControlMessage::Relocate {
                address,
                definition,
                snapshot,
                pending,
            } => handler.on_relocate(sender, address, definition, snapshot, pending),
            ControlMessage::Standby {
                protocol,
                address,
                definition,
            } => handler.on_standby(sender, protocol, address, definition),
        }
    }
}

/// Handler side of the visitor — one method per variant, with the
/// effective sender threaded through.
pub trait ControlHandler {
    fn on_start(
        &self,
        sender: NodeId,
        address: ActorAddress,
        definition: Definition,
    ) -> anyhow::Result<()>;

    fn on_deliver(&self, sender: NodeId, delivery: Delivery) -> anyhow::Result<()>;

    fn on_answer(
        &self,
        sender: NodeId,
        correlation: CorrelationId,
        result: AnswerResult,
    ) -> anyhow::Result<()>;

    fn on_forward(
        &self,
        sender: NodeId,
        original_sender: NodeId,
        hops_left: u8,
        inner: ControlMessage,
    ) -> anyhow::Result<()>;

    fn on_relocate(
        &self,
        sender: NodeId,
        address: ActorAddress,
        definition: Definition,
        snapshot: Vec<u8>,
        pending: Vec<PendingDelivery>,
    ) -> anyhow::Result<()>;

    fn on_standby(
        &self,
        sender: NodeId,
        protocol: String,
        address: ActorAddress,
        definition: Definition,
    ) -> anyhow::Result<()>;
}

/// A control message plus the node pair it travels between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: NodeId,
    pub recipient: NodeId,
    pub message: ControlMessage,
}

impl Envelope {
    pub fn new(sender: NodeId, recipient: NodeId, message: ControlMessage) -> Self {
        Self {
            sender,
            recipient,
            message,
        }
    }
}
