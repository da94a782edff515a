//! GridRouter — resolves placement, buffers or sends, dispatches inbound.
//!
//! Outbound path: resolve → local dispatch, or encode → send when the
//! target is reachable, park in the outbound buffer when it is not; parked
//! traffic flushes when the node reconnects. Inbound path: decode → visit →
//! handle, or forward when this node's ring view says the deliver belongs
//! elsewhere. Every dependency is passed in at construction; the router
//! holds no global state.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use trellis_core::codec::MessageCodec;
use trellis_core::config::GridConfig;
use trellis_core::node::{ActorAddress, Definition, NodeId};
use trellis_core::protocol::{
    AnswerResult, ControlHandler, ControlMessage, CorrelationId, Delivery, Envelope,
    PendingDelivery,
};
use trellis_core::ring::Ring;

use crate::correlation::CorrelationTable;
use crate::error::GridError;
use crate::outbound::OutboundBuffer;
use crate::retainer::ReferenceRetainer;
use crate::runtime::{LocalRuntime, MembershipEvent, Transport};
use crate::standby::{StandbyRegistry, StandbySeat};

pub struct GridRouter {
    node: NodeId,
    ring: Arc<dyn Ring>,
    codec: Arc<dyn MessageCodec>,
    transport: Arc<dyn Transport>,
    runtime: Arc<dyn LocalRuntime>,
    outbound: OutboundBuffer,
    retainer: Arc<ReferenceRetainer>,
    correlations: CorrelationTable,
    standbys: StandbyRegistry,
    standby_count: usize,
    forward_hops: u8,
}

impl GridRouter {
    pub fn new(
        node: NodeId,
        ring: Arc<dyn Ring>,
        codec: Arc<dyn MessageCodec>,
        transport: Arc<dyn Transport>,
        runtime: Arc<dyn LocalRuntime>,
        config: &GridConfig,
    ) -> Arc<Self> {
        let retainer = Arc::new(ReferenceRetainer::new(config.delivery.retention()));
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&node.as_bytes()[..8]);
        Arc::new(Self {
            outbound: OutboundBuffer::new(retainer.clone()),
            retainer,
            correlations: CorrelationTable::with_seed(u64::from_le_bytes(seed)),
            standbys: StandbyRegistry::new(),
            standby_count: config.placement.standby_count,
            forward_hops: config.delivery.forward_hop_limit,
            node,
            ring,
            codec,
            transport,
            runtime,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The retainer backing the outbound buffer.
    pub fn retainer(&self) -> Arc<ReferenceRetainer> {
        self.retainer.clone()
    }

    /// One housekeeping pass: reclaim expired outbound pins and purge
    /// correlations whose callers dropped their receivers. The retention
    /// deadline bounds the payload of an abandoned call; this bounds its
    /// table entry.
    pub fn sweep(&self, now: Instant) -> usize {
        self.retainer.sweep(now) + self.correlations.purge_closed()
    }

    /// Spawn the periodic housekeeping task.
    pub fn run_sweeper(
        self: Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep(Instant::now());
            }
        })
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Where the ring currently places `address`.
    pub fn resolve(&self, address: &ActorAddress) -> Result<NodeId, GridError> {
        self.ring.node_of(address.as_bytes()).ok_or(GridError::NoNodes)
    }

    /// Start an actor wherever the ring places it.
    pub fn start_actor(
        &self,
        address: &ActorAddress,
        definition: &Definition,
    ) -> Result<(), GridError> {
        let owner = self.resolve(address)?;
        if owner == self.node {
            return self
                .runtime
                .create_local(address, definition)
                .map_err(|source| GridError::Runtime {
                    address: address.clone(),
                    source,
                });
        }
        self.send_control(
            owner,
            ControlMessage::Start {
                address: address.clone(),
                definition: definition.clone(),
            },
        )
    }

    /// Invoke a method on an actor wherever it lives. The receiver resolves
    /// when the answer arrives; dropping it abandons the call, and the
    /// retainer's deadline reclaims anything still buffered for it.
    pub fn invoke(
        &self,
        address: &ActorAddress,
        definition: &Definition,
        method: &str,
        args: serde_json::Value,
    ) -> Result<oneshot::Receiver<AnswerResult>, GridError> {
        let owner = self.resolve(address)?;
        let (correlation, rx) = self.correlations.register();

        if owner == self.node {
            if !self.runtime.has_local(address) {
                self.correlations.abandon(correlation);
                return Err(GridError::Routing {
                    address: address.clone(),
                    node: self.node,
                });
            }
            let result = self.dispatch_to_runtime(address, method, &args);
            self.correlations.complete(correlation, result);
            return Ok(rx);
        }

        let delivery = Delivery {
            address: address.clone(),
            definition: definition.clone(),
            method: method.to_string(),
            args,
            correlation,
        };
        match self.send_control(owner, ControlMessage::Deliver(delivery)) {
            Ok(()) => Ok(rx),
            Err(e) => {
                self.correlations.abandon(correlation);
                Err(e)
            }
        }
    }

    /// Place passive standbys on the ring successors after the owner.
    /// Returns how many seats were placed.
    pub fn place_standbys(
        &self,
        protocol: &str,
        address: &ActorAddress,
        definition: &Definition,
    ) -> Result<usize, GridError> {
        let candidates = self
            .ring
            .nodes_of(address.as_bytes(), self.standby_count + 1);
        if candidates.is_empty() {
            return Err(GridError::NoNodes);
        }
        let mut placed = 0;
        // First candidate is the owner; the rest get seats.
        for node in candidates.into_iter().skip(1) {
            if node == self.node {
                self.standbys
                    .install(address.clone(), protocol.to_string(), definition.clone());
            } else {
                self.send_control(
                    node,
                    ControlMessage::Standby {
                        protocol: protocol.to_string(),
                        address: address.clone(),
                        definition: definition.clone(),
                    },
                )?;
            }
            placed += 1;
        }
        Ok(placed)
    }

    /// Move a live actor to `target`: snapshot its state and carry the
    /// not-yet-processed delivers along in one message. The host runtime
    /// deregisters the local instance once this returns.
    pub fn relocate_actor(
        &self,
        address: &ActorAddress,
        definition: &Definition,
        target: NodeId,
        pending: Vec<PendingDelivery>,
    ) -> Result<(), GridError> {
        let snapshot =
            self.runtime
                .snapshot_local(address)
                .map_err(|source| GridError::Runtime {
                    address: address.clone(),
                    source,
                })?;
        self.send_control(
            target,
            ControlMessage::Relocate {
                address: address.clone(),
                definition: definition.clone(),
                snapshot,
                pending,
            },
        )
    }

    /// Promote a standby seat into a live local actor. `false` when no
    /// seat exists at this address.
    pub fn promote_standby(&self, address: &ActorAddress) -> Result<bool, GridError> {
        let Some(seat) = self.standbys.promote(address) else {
            return Ok(false);
        };
        let StandbySeat {
            definition,
            snapshot,
            ..
        } = seat;
        self.runtime
            .create_local(address, &definition)
            .map_err(|source| GridError::Runtime {
                address: address.clone(),
                source,
            })?;
        if let Some(snapshot) = snapshot {
            self.runtime
                .restore_local(address, &snapshot)
                .map_err(|source| GridError::Runtime {
                    address: address.clone(),
                    source,
                })?;
        }
        Ok(true)
    }

    pub fn has_standby(&self, address: &ActorAddress) -> bool {
        self.standbys.is_standby(address)
    }

    /// How many messages are parked for `node`.
    pub fn pending_for(&self, node: NodeId) -> usize {
        self.outbound.pending(node)
    }

    fn dispatch_to_runtime(
        &self,
        address: &ActorAddress,
        method: &str,
        args: &serde_json::Value,
    ) -> AnswerResult {
        if !self.runtime.has_local(address) {
            let fault = GridError::Routing {
                address: address.clone(),
                node: self.node,
            };
            return AnswerResult::Err(fault.to_string());
        }
        match self.runtime.dispatch_local(address, method, args) {
            Ok(value) => AnswerResult::Ok(value),
            Err(e) => AnswerResult::Err(e.to_string()),
        }
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    fn send_control(&self, recipient: NodeId, message: ControlMessage) -> Result<(), GridError> {
        let envelope = Envelope::new(self.node, recipient, message);
        let bytes = self.codec.encode(&envelope)?;
        self.send_or_buffer(recipient, bytes);
        Ok(())
    }

    /// Send when reachable; park otherwise. A failed send re-buffers — the
    /// retainer's deadline bounds how long a dead node's backlog lives.
    fn send_or_buffer(&self, node: NodeId, bytes: Bytes) {
        if !self.transport.is_reachable(node) {
            tracing::debug!(node = %node, "target unreachable, buffering");
            self.outbound.enqueue(node, bytes, Instant::now());
            return;
        }
        if let Err(e) = self.transport.send(node, bytes.clone()) {
            tracing::warn!(node = %node, error = %e, "send failed, re-buffering");
            self.outbound.enqueue(node, bytes, Instant::now());
        }
    }

    /// Flush everything parked for `node`, in enqueue order. Returns how
    /// many messages went out. The first send failure stops the flush and
    /// re-buffers the failed payload together with the rest of the
    /// backlog, still in order, so a later flush cannot reorder delivery.
    pub fn flush(&self, node: NodeId) -> usize {
        let mut parked = self.outbound.drain(node).into_iter();
        let mut sent = 0;
        while let Some(bytes) = parked.next() {
            if let Err(e) = self.transport.send(node, bytes.clone()) {
                tracing::warn!(node = %node, error = %e, "flush send failed, re-buffering backlog");
                let now = Instant::now();
                self.outbound.enqueue(node, bytes, now);
                for rest in parked {
                    self.outbound.enqueue(node, rest, now);
                }
                return sent;
            }
            sent += 1;
        }
        sent
    }

    // ── Membership ────────────────────────────────────────────────────────────

    /// Translate a membership change into ring updates; a join also flushes
    /// anything parked for the node.
    pub fn handle_membership(&self, event: MembershipEvent) {
        match event {
            MembershipEvent::Joined(node) => {
                self.ring.include_node(node);
                tracing::info!(node = %node, "node joined the grid");
                if node != self.node {
                    self.flush(node);
                }
            }
            MembershipEvent::Left(node) => {
                self.ring.exclude_node(node);
                tracing::info!(node = %node, "node left the grid");
            }
        }
    }

    /// Pump membership events from the cluster service until it closes.
    pub async fn run_membership(self: Arc<Self>, mut events: mpsc::Receiver<MembershipEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_membership(event);
        }
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Entry point for received bytes: decode, then visitor-dispatch. A
    /// decode failure is fatal to that message only.
    pub fn on_receive(&self, bytes: &[u8]) {
        let envelope = match self.codec.decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "dropping undecodable frame");
                return;
            }
        };
        let Envelope {
            sender, message, ..
        } = envelope;
        if let Err(e) = message.dispatch(sender, self) {
            tracing::warn!(sender = %sender, error = %e, "control message handling failed");
        }
    }

    fn deliver_and_answer(&self, caller: NodeId, delivery: Delivery) -> Result<()> {
        let correlation = delivery.correlation;
        let result = self.dispatch_to_runtime(&delivery.address, &delivery.method, &delivery.args);
        Ok(self.send_control(caller, ControlMessage::Answer {
            correlation,
            result,
        })?)
    }
}

impl ControlHandler for GridRouter {
    fn on_start(
        &self,
        _sender: NodeId,
        address: ActorAddress,
        definition: Definition,
    ) -> Result<()> {
        if self.runtime.has_local(&address) {
            return Ok(());
        }
        self.runtime.create_local(&address, &definition)
    }

    fn on_deliver(&self, sender: NodeId, delivery: Delivery) -> Result<()> {
        // Our ring view may disagree with the sender's mid-rebalance. The
        // sender already committed to a decision; we re-resolve once and
        // forward rather than erroring.
        if let Some(owner) = self.ring.node_of(delivery.address.as_bytes()) {
            if owner != self.node {
                tracing::debug!(
                    address = %delivery.address,
                    owner = %owner,
                    "ring views disagree, forwarding deliver"
                );
                let message = ControlMessage::Forward {
                    original_sender: sender,
                    hops_left: self.forward_hops,
                    inner: Box::new(ControlMessage::Deliver(delivery)),
                };
                return Ok(self.send_control(owner, message)?);
            }
        }
        self.deliver_and_answer(sender, delivery)
    }

    fn on_answer(
        &self,
        _sender: NodeId,
        correlation: CorrelationId,
        result: AnswerResult,
    ) -> Result<()> {
        self.correlations.complete(correlation, result);
        Ok(())
    }

    fn on_forward(
        &self,
        _sender: NodeId,
        original_sender: NodeId,
        hops_left: u8,
        inner: ControlMessage,
    ) -> Result<()> {
        match inner {
            ControlMessage::Deliver(delivery) => {
                // Decrement first, then re-validate: prolonged membership
                // disagreement bounces a deliver at most `forward_hops`
                // times before it is dropped.
                let hops = hops_left.saturating_sub(1);
                if let Some(owner) = self.ring.node_of(delivery.address.as_bytes()) {
                    if owner != self.node {
                        if hops == 0 {
                            tracing::warn!(
                                address = %delivery.address,
                                original_sender = %original_sender,
                                "forward hop budget exhausted, dropping deliver"
                            );
                            return Ok(());
                        }
                        let message = ControlMessage::Forward {
                            original_sender,
                            hops_left: hops,
                            inner: Box::new(ControlMessage::Deliver(delivery)),
                        };
                        return Ok(self.send_control(owner, message)?);
                    }
                }
                // The answer goes to the original sender, not the forwarder.
                self.deliver_and_answer(original_sender, delivery)
            }
            other => other.dispatch(original_sender, self),
        }
    }

    fn on_relocate(
        &self,
        _sender: NodeId,
        address: ActorAddress,
        definition: Definition,
        snapshot: Vec<u8>,
        pending: Vec<PendingDelivery>,
    ) -> Result<()> {
        // A passive seat absorbs snapshots without going live.
        if self.standbys.is_standby(&address) {
            self.standbys.store_snapshot(&address, snapshot);
            return Ok(());
        }
        if !self.runtime.has_local(&address) {
            self.runtime.create_local(&address, &definition)?;
        }
        self.runtime.restore_local(&address, &snapshot)?;
        // Replay the backlog in arrival order before any new traffic; each
        // replayed deliver still answers its original caller.
        for entry in pending {
            self.deliver_and_answer(entry.caller, entry.delivery)?;
        }
        Ok(())
    }

    fn on_standby(
        &self,
        _sender: NodeId,
        protocol: String,
        address: ActorAddress,
        definition: Definition,
    ) -> Result<()> {
        self.standbys.install(address, protocol, definition);
        Ok(())
    }
}
