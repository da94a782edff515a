//! Standby seats — passive backups awaiting promotion.
//!
//! A seat holds what the runtime would need to materialize the actor if
//! its primary node fails: the definition, plus the latest relocation
//! snapshot absorbed while passive. Seats never process delivers.

use dashmap::DashMap;

use trellis_core::node::{ActorAddress, Definition};

/// A passive backup for one actor.
#[derive(Debug, Clone)]
pub struct StandbySeat {
    pub protocol: String,
    pub definition: Definition,
    pub snapshot: Option<Vec<u8>>,
}

/// Seats keyed by actor address.
#[derive(Default)]
pub struct StandbyRegistry {
    seats: DashMap<ActorAddress, StandbySeat>,
}

impl StandbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a seat. Re-installing keeps any snapshot already absorbed.
    pub fn install(&self, address: ActorAddress, protocol: String, definition: Definition) {
        self.seats.entry(address).or_insert(StandbySeat {
            protocol,
            definition,
            snapshot: None,
        });
    }

    /// Absorb a relocation snapshot into a seat. `false` when no seat
    /// exists at this address.
    pub fn store_snapshot(&self, address: &ActorAddress, snapshot: Vec<u8>) -> bool {
        match self.seats.get_mut(address) {
            Some(mut seat) => {
                seat.snapshot = Some(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn is_standby(&self, address: &ActorAddress) -> bool {
        self.seats.contains_key(address)
    }

    /// Remove and return a seat for promotion to a live actor.
    pub fn promote(&self, address: &ActorAddress) -> Option<StandbySeat> {
        self.seats.remove(address).map(|(_, seat)| seat)
    }

    pub fn count(&self) -> usize {
        self.seats.len()
    }
}
