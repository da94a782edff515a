//! Outbound buffer — per-node FIFO queues for currently unreachable nodes.
//!
//! Messages for a node that is not yet connected are parked here instead of
//! blocking the caller or getting dropped. Payload bytes are pinned in the
//! retainer, so the queue of a permanently dead node decays to cheap
//! tombstone entries once retention expires; `drain` skips those. Queues
//! are independent per node — one unreachable node never starves delivery
//! to another.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;

use trellis_core::node::NodeId;

use crate::retainer::{ReferenceRetainer, RetainKey};

/// One parked message: the pin handle, not the bytes.
#[derive(Debug, Clone, Copy)]
pub struct OutboundEntry {
    pub retain_key: RetainKey,
    pub enqueued_at: Instant,
}

/// Pending-message queues keyed by target node.
pub struct OutboundBuffer {
    queues: DashMap<NodeId, Vec<OutboundEntry>>,
    retainer: Arc<ReferenceRetainer>,
}

impl OutboundBuffer {
    pub fn new(retainer: Arc<ReferenceRetainer>) -> Self {
        Self {
            queues: DashMap::new(),
            retainer,
        }
    }

    /// Park a payload for `node`. Appends to that node's FIFO; never
    /// blocks beyond the queue entry's own lock.
    pub fn enqueue(&self, node: NodeId, payload: Bytes, now: Instant) {
        let retain_key = self.retainer.retain(payload, now);
        self.queues.entry(node).or_default().push(OutboundEntry {
            retain_key,
            enqueued_at: now,
        });
    }

    /// Remove and return everything queued for `node`, in enqueue order.
    /// Entries whose payload already expired are skipped. An unknown or
    /// empty node drains to an empty Vec, never an error.
    pub fn drain(&self, node: NodeId) -> Vec<Bytes> {
        let Some((_, entries)) = self.queues.remove(&node) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(entries.len());
        let mut expired = 0usize;
        for entry in entries {
            match self.retainer.release(entry.retain_key) {
                Some(payload) => out.push(payload),
                None => expired += 1,
            }
        }
        if expired > 0 {
            tracing::warn!(node = %node, expired, "dropped expired buffered messages");
        }
        out
    }

    /// How many entries are parked for `node` (including expired tombstones).
    pub fn pending(&self, node: NodeId) -> usize {
        self.queues.get(&node).map(|q| q.len()).unwrap_or(0)
    }

    /// Nodes that currently have parked entries.
    pub fn nodes_with_pending(&self) -> Vec<NodeId> {
        self.queues
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| *e.key())
            .collect()
    }
}
