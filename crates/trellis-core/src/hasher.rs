//! Point hashing — maps node/point pairs and actor keys into the ring's
//! 32-bit hash space.
//!
//! Two interchangeable implementations: blake3 truncated to 32 bits when
//! placement must hold up against adversarial keys, and crc32 when raw
//! lookup speed matters more. Every node in a cluster must configure the
//! same hasher or placement disagrees on every key.

use crate::node::NodeId;

/// Hashes arbitrary bytes to a position on the ring.
pub trait PointHasher: Send + Sync {
    fn hash_point(&self, data: &[u8]) -> u32;
}

/// blake3, truncated to the first 4 bytes (little-endian).
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3PointHasher;

impl PointHasher for Blake3PointHasher {
    fn hash_point(&self, data: &[u8]) -> u32 {
        let hash = blake3::hash(data);
        let b = hash.as_bytes();
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

/// crc32 — fast, non-cryptographic.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32PointHasher;

impl PointHasher for Crc32PointHasher {
    fn hash_point(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// Ring position for virtual point `index` of `node`.
///
/// The input is the node id bytes followed by the index as 4 LE bytes, so
/// every node's points spread independently of how the node was named.
pub fn point_position(hasher: &dyn PointHasher, node: &NodeId, index: u32) -> u32 {
    let mut buf = [0u8; 20];
    buf[..16].copy_from_slice(node.as_bytes());
    buf[16..].copy_from_slice(&index.to_le_bytes());
    hasher.hash_point(&buf)
}
