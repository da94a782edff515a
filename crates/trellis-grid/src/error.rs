//! Fault taxonomy for grid routing.
//!
//! Transient faults (transport) recover locally via re-buffering; faults
//! that imply a stale or inconsistent cluster view (routing) are surfaced,
//! because retrying against a wrong node risks two live instances of one
//! relocated actor.

use trellis_core::codec::CodecError;
use trellis_core::node::{ActorAddress, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// The resolved node does not actually host the address — a stale ring
    /// view. Surfaced to the caller, never retried automatically.
    #[error("node {node} does not host actor {address}")]
    Routing {
        address: ActorAddress,
        node: NodeId,
    },

    /// Malformed payload. Fatal to the single message; corrupt bytes do
    /// not self-heal, so never retried verbatim.
    #[error("encoding fault: {0}")]
    Encoding(#[from] CodecError),

    /// Transient send failure. The message is re-buffered and retried
    /// until the retainer's expiry reclaims it.
    #[error("transport fault sending to {node}: {source}")]
    Transport {
        node: NodeId,
        #[source]
        source: anyhow::Error,
    },

    /// The local runtime refused an operation the grid asked of it.
    #[error("runtime fault for actor {address}: {source}")]
    Runtime {
        address: ActorAddress,
        #[source]
        source: anyhow::Error,
    },

    /// The ring has no nodes to resolve against.
    #[error("placement ring is empty")]
    NoNodes,
}
