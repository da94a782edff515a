//! trellis-grid — placement-driven routing on top of trellis-core.
//!
//! The router owns the outbound path (resolve, send or buffer, flush on
//! reconnect) and the inbound path (decode, visit, handle or forward).
//! Transport and actor hosting stay behind traits so the grid logic is
//! testable without a network.

pub mod correlation;
pub mod error;
pub mod outbound;
pub mod retainer;
pub mod router;
pub mod runtime;
pub mod standby;

pub use correlation::CorrelationTable;
pub use error::GridError;
pub use outbound::OutboundBuffer;
pub use retainer::{ReferenceRetainer, RetainKey};
pub use router::GridRouter;
pub use runtime::{LocalRuntime, MembershipEvent, Transport};
pub use standby::{StandbyRegistry, StandbySeat};
