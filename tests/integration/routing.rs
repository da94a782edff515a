//! Routing: invokes reach the owner from anywhere, stale views get
//! corrected by forwarding, and a forwarding loop is bounded.

use std::sync::Arc;

use tokio::sync::oneshot::error::TryRecvError;

use trellis_core::codec::JsonCodec;
use trellis_core::config::GridConfig;
use trellis_core::node::{ActorAddress, NodeId};
use trellis_core::protocol::AnswerResult;
use trellis_core::ring::ring_for;
use trellis_grid::router::GridRouter;
use trellis_grid::runtime::{LocalRuntime, MembershipEvent, Transport};

use crate::{address_on, build_grid, def, init_tracing, ClusterNet, MapRuntime};

#[test]
fn start_and_invoke_land_on_the_owner() {
    let net = Arc::new(ClusterNet::default());
    let nodes = build_grid(&net, &["rt-a", "rt-b", "rt-c"], &GridConfig::default());
    let addr = address_on(&nodes, nodes[1].id);

    // Start from a non-owner; the Start frame crosses to the owner.
    nodes[0].router.start_actor(&addr, &def()).unwrap();
    assert!(nodes[1].runtime.has_local(&addr));
    assert!(!nodes[0].runtime.has_local(&addr));

    let mut rx = nodes[0]
        .router
        .invoke(&addr, &def(), "set", serde_json::json!({ "v": 1 }))
        .unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        AnswerResult::Ok(serde_json::json!("ok"))
    );
}

#[test]
fn every_node_reaches_the_same_actor() {
    let net = Arc::new(ClusterNet::default());
    let nodes = build_grid(&net, &["rt-a", "rt-b", "rt-c"], &GridConfig::default());
    let addr = address_on(&nodes, nodes[2].id);
    nodes[2].router.start_actor(&addr, &def()).unwrap();

    for (i, node) in nodes.iter().enumerate() {
        let mut rx = node
            .router
            .invoke(&addr, &def(), "add", serde_json::json!(10))
            .unwrap();
        let expected = 10 * (i as i64 + 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            AnswerResult::Ok(serde_json::json!(expected))
        );
    }
    assert_eq!(
        nodes[2].runtime.state_of(&addr),
        Some(serde_json::json!(30))
    );
}

#[test]
fn stale_view_is_corrected_by_forwarding() {
    let net = Arc::new(ClusterNet::default());
    let nodes = build_grid(&net, &["rt-a", "rt-b", "rt-c"], &GridConfig::default());
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    // Make a's view stale: it never learned that c is a member.
    a.router.handle_membership(MembershipEvent::Left(c.id));

    // An address the cluster places on c but a's stale view places on b.
    let addr = (0..10_000)
        .map(|i| ActorAddress::new(format!("stale-{i}")))
        .find(|addr| {
            b.router.resolve(addr).unwrap() == c.id && a.router.resolve(addr).unwrap() == b.id
        })
        .expect("no address with the needed split placement");

    b.router.start_actor(&addr, &def()).unwrap();
    assert!(c.runtime.has_local(&addr));

    // a sends the deliver to b; b forwards it to c; c answers a directly.
    let mut rx = a
        .router
        .invoke(&addr, &def(), "set", serde_json::json!({ "via": "forward" }))
        .unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        AnswerResult::Ok(serde_json::json!("ok"))
    );
    assert_eq!(
        c.runtime.state_of(&addr),
        Some(serde_json::json!({ "via": "forward" }))
    );
}

#[test]
fn forward_ping_pong_is_bounded_by_the_hop_limit() {
    init_tracing();
    let net = Arc::new(ClusterNet::default());
    let config = GridConfig::default();
    let a_id = NodeId::from_name("pp-a");
    let b_id = NodeId::from_name("pp-b");

    // Pathological membership: each node only knows about the other, so
    // every deliver looks misplaced to whoever holds it.
    let ring_a = ring_for(&config.placement);
    ring_a.include_node(b_id);
    let ring_b = ring_for(&config.placement);
    ring_b.include_node(a_id);

    let transport: Arc<dyn Transport> = net.clone();
    let a = GridRouter::new(
        a_id,
        ring_a,
        Arc::new(JsonCodec),
        transport.clone(),
        Arc::new(MapRuntime::default()),
        &config,
    );
    let b = GridRouter::new(
        b_id,
        ring_b,
        Arc::new(JsonCodec),
        transport,
        Arc::new(MapRuntime::default()),
        &config,
    );
    net.register(a.clone());
    net.register(b);

    // The deliver bounces until the hop budget runs out, then is dropped.
    // No answer ever arrives, and nothing overflows.
    let mut rx = a
        .invoke(
            &ActorAddress::new("nowhere"),
            &def(),
            "get",
            serde_json::json!(null),
        )
        .unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}
