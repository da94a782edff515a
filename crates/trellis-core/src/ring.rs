//! Consistent-hash ring over virtual points.
//!
//! Each physical node contributes `points_per_node` virtual points to a
//! 32-bit hash circle. The owner of a key is the node of the first point at
//! or after the key's hash, wrapping past the top of the space to the
//! smallest point. Excluding a node therefore remaps only the keys that
//! node's points owned; every other assignment stays put.
//!
//! Two variants implement one contract and differ only in read concurrency:
//! `LockedRing` serializes everything behind one mutex, `SharedRing` swaps
//! immutable snapshots so readers never wait on each other. Identical
//! include/exclude sequences yield identical lookups on either variant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::{HasherKind, PlacementConfig, RingKind};
use crate::hasher::{point_position, Blake3PointHasher, Crc32PointHasher, PointHasher};
use crate::node::NodeId;

/// Default virtual points per physical node.
pub const DEFAULT_POINTS_PER_NODE: u32 = 100;

/// One virtual point: a position on the ring bound to a physical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingPoint {
    pub hash: u32,
    pub node: NodeId,
}

/// Immutable ring contents: points sorted by `(hash, node)` plus a reverse
/// index from node to its point positions. Lookup results are a pure
/// function of table contents and key hash.
#[derive(Debug, Default, Clone)]
pub struct RingTable {
    points: Vec<RingPoint>,
    by_node: HashMap<NodeId, Vec<u32>>,
}

impl RingTable {
    fn with_node(&self, node: NodeId, positions: &[u32]) -> RingTable {
        let mut points = self.points.clone();
        points.extend(positions.iter().map(|&hash| RingPoint { hash, node }));
        // (hash, node) ordering makes tie-breaks identical on every replica.
        points.sort_by_key(|p| (p.hash, p.node));
        let mut by_node = self.by_node.clone();
        by_node.insert(node, positions.to_vec());
        RingTable { points, by_node }
    }

    fn without_node(&self, node: NodeId) -> RingTable {
        let points = self
            .points
            .iter()
            .copied()
            .filter(|p| p.node != node)
            .collect();
        let mut by_node = self.by_node.clone();
        by_node.remove(&node);
        RingTable { points, by_node }
    }

    fn has_node(&self, node: NodeId) -> bool {
        self.by_node.contains_key(&node)
    }

    fn node_of(&self, key_hash: u32) -> Option<NodeId> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|p| p.hash < key_hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        Some(self.points[idx].node)
    }

    fn nodes_of(&self, key_hash: u32, n: usize) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::with_capacity(n.min(self.by_node.len()));
        if self.points.is_empty() || n == 0 {
            return out;
        }
        let start = self.points.partition_point(|p| p.hash < key_hash);
        for offset in 0..self.points.len() {
            let point = self.points[(start + offset) % self.points.len()];
            if !out.contains(&point.node) {
                out.push(point.node);
                if out.len() == n {
                    break;
                }
            }
        }
        out
    }

    fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.by_node.keys().copied().collect();
        nodes.sort();
        nodes
    }
}

/// The placement contract both ring variants satisfy.
pub trait Ring: Send + Sync {
    /// Add a node's virtual points. Re-including a present node is a no-op.
    fn include_node(&self, node: NodeId);

    /// Remove exactly that node's points, atomically. Unknown node is a no-op.
    fn exclude_node(&self, node: NodeId);

    /// Clockwise-nearest owner of `key`. `None` only on an empty ring.
    fn node_of(&self, key: &[u8]) -> Option<NodeId>;

    /// First `n` distinct nodes walking clockwise from `key`'s hash. Never
    /// repeats a node; shorter than `n` when fewer nodes exist.
    fn nodes_of(&self, key: &[u8], n: usize) -> Vec<NodeId>;

    /// All member nodes, in stable order.
    fn nodes(&self) -> Vec<NodeId>;

    /// Total virtual point count.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hasher and point density shared by both variants.
struct RingShape {
    hasher: Arc<dyn PointHasher>,
    points_per_node: u32,
}

impl RingShape {
    fn positions(&self, node: NodeId) -> Vec<u32> {
        (0..self.points_per_node)
            .map(|i| point_position(&*self.hasher, &node, i))
            .collect()
    }

    fn key_hash(&self, key: &[u8]) -> u32 {
        self.hasher.hash_point(key)
    }
}

/// Single-mutex variant: simplest correct form. Reads and writes serialize
/// against each other.
pub struct LockedRing {
    shape: RingShape,
    table: Mutex<RingTable>,
}

impl LockedRing {
    pub fn new(hasher: Arc<dyn PointHasher>, points_per_node: u32) -> Self {
        Self {
            shape: RingShape {
                hasher,
                points_per_node,
            },
            table: Mutex::new(RingTable::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RingTable> {
        self.table.lock().expect("ring lock poisoned")
    }
}

impl Ring for LockedRing {
    fn include_node(&self, node: NodeId) {
        // Hash the positions outside the lock; they depend only on the node.
        let positions = self.shape.positions(node);
        let mut table = self.lock();
        if table.has_node(node) {
            return;
        }
        *table = table.with_node(node, &positions);
    }

    fn exclude_node(&self, node: NodeId) {
        let mut table = self.lock();
        if !table.has_node(node) {
            return;
        }
        *table = table.without_node(node);
    }

    fn node_of(&self, key: &[u8]) -> Option<NodeId> {
        let hash = self.shape.key_hash(key);
        self.lock().node_of(hash)
    }

    fn nodes_of(&self, key: &[u8], n: usize) -> Vec<NodeId> {
        let hash = self.shape.key_hash(key);
        self.lock().nodes_of(hash, n)
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.lock().nodes()
    }

    fn len(&self) -> usize {
        self.lock().points.len()
    }
}

/// Snapshot-swapping variant: readers clone an `Arc` to an immutable table
/// and search it without holding any lock across the search. A reader
/// observes either the pre- or post-mutation table, never a torn one.
pub struct SharedRing {
    shape: RingShape,
    table: RwLock<Arc<RingTable>>,
}

impl SharedRing {
    pub fn new(hasher: Arc<dyn PointHasher>, points_per_node: u32) -> Self {
        Self {
            shape: RingShape {
                hasher,
                points_per_node,
            },
            table: RwLock::new(Arc::new(RingTable::default())),
        }
    }

    fn snapshot(&self) -> Arc<RingTable> {
        self.table.read().expect("ring lock poisoned").clone()
    }
}

impl Ring for SharedRing {
    fn include_node(&self, node: NodeId) {
        let positions = self.shape.positions(node);
        let mut slot = self.table.write().expect("ring lock poisoned");
        if slot.has_node(node) {
            return;
        }
        *slot = Arc::new(slot.with_node(node, &positions));
    }

    fn exclude_node(&self, node: NodeId) {
        let mut slot = self.table.write().expect("ring lock poisoned");
        if !slot.has_node(node) {
            return;
        }
        *slot = Arc::new(slot.without_node(node));
    }

    fn node_of(&self, key: &[u8]) -> Option<NodeId> {
        self.snapshot().node_of(self.shape.key_hash(key))
    }

    fn nodes_of(&self, key: &[u8], n: usize) -> Vec<NodeId> {
        self.snapshot().nodes_of(self.shape.key_hash(key), n)
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.snapshot().nodes()
    }

    fn len(&self) -> usize {
        self.snapshot().points.len()
    }
}

/// Build the configured ring variant.
pub fn ring_for(config: &PlacementConfig) -> Arc<dyn Ring> {
    let hasher: Arc<dyn PointHasher> = match config.hasher {
        HasherKind::Blake3 => Arc::new(Blake3PointHasher),
        HasherKind::Crc32 => Arc::new(Crc32PointHasher),
    };
    match config.ring {
        RingKind::Shared => Arc::new(SharedRing::new(hasher, config.points_per_node)),
        RingKind::Locked => Arc::new(LockedRing::new(hasher, config.points_per_node)),
    }
}
