//! Collaborator seams — what the grid needs from its host, nothing more.
//!
//! The byte transport, the cluster membership service, and the local actor
//! runtime are external systems. The router talks to them through these
//! traits and never inspects their internals.

use anyhow::Result;
use bytes::Bytes;

use trellis_core::node::{ActorAddress, Definition, NodeId};

/// Byte transport to other nodes. `send` is fire-and-forget; failures may
/// also surface asynchronously, in which case the router re-buffers.
pub trait Transport: Send + Sync {
    fn send(&self, node: NodeId, bytes: Bytes) -> Result<()>;

    fn is_reachable(&self, node: NodeId) -> bool;
}

/// Local actor runtime: address space, mailboxes, state capture.
pub trait LocalRuntime: Send + Sync {
    /// Create an actor at `address`. Idempotent if it already exists.
    fn create_local(&self, address: &ActorAddress, definition: &Definition) -> Result<()>;

    /// Invoke `method` with `args` on the actor at `address`.
    fn dispatch_local(
        &self,
        address: &ActorAddress,
        method: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Capture the actor's state for relocation.
    fn snapshot_local(&self, address: &ActorAddress) -> Result<Vec<u8>>;

    /// Replace the actor's state from a relocation snapshot.
    fn restore_local(&self, address: &ActorAddress, snapshot: &[u8]) -> Result<()>;

    fn has_local(&self, address: &ActorAddress) -> bool;
}

/// Membership change reported by the cluster service. The router consumes
/// these; it never produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(NodeId),
    Left(NodeId),
}
