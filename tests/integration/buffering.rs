//! Buffering: traffic for an unreachable node parks, flushes in order on
//! reconnect, and expires instead of accumulating forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use trellis_core::config::GridConfig;
use trellis_core::protocol::AnswerResult;

use crate::{address_on, build_grid, def, ClusterNet};

#[test]
fn down_node_traffic_parks_then_flushes_in_order() {
    let net = Arc::new(ClusterNet::default());
    let nodes = build_grid(&net, &["bf-a", "bf-b"], &GridConfig::default());
    let (a, b) = (&nodes[0], &nodes[1]);
    let addr = address_on(&nodes, b.id);
    a.router.start_actor(&addr, &def()).unwrap();

    net.take_down(b.id);
    let mut receivers = Vec::new();
    for n in [1, 2, 3] {
        receivers.push(
            a.router
                .invoke(&addr, &def(), "add", serde_json::json!(n))
                .unwrap(),
        );
    }
    assert_eq!(a.router.pending_for(b.id), 3);

    net.restore(b.id);
    assert_eq!(a.router.flush(b.id), 3);
    assert_eq!(a.router.pending_for(b.id), 0);

    // Running sums prove the adds arrived in enqueue order.
    let answers: Vec<_> = receivers
        .iter_mut()
        .map(|rx| rx.try_recv().unwrap())
        .collect();
    assert_eq!(
        answers,
        vec![
            AnswerResult::Ok(serde_json::json!(1)),
            AnswerResult::Ok(serde_json::json!(3)),
            AnswerResult::Ok(serde_json::json!(6)),
        ]
    );
}

#[test]
fn expired_backlog_is_reclaimed_not_flushed() {
    let net = Arc::new(ClusterNet::default());
    let mut config = GridConfig::default();
    config.delivery.retention_secs = 0;
    let nodes = build_grid(&net, &["bf-a", "bf-b"], &config);
    let (a, b) = (&nodes[0], &nodes[1]);
    let addr = address_on(&nodes, b.id);
    a.router.start_actor(&addr, &def()).unwrap();

    net.take_down(b.id);
    for n in [1, 2] {
        let _ = a
            .router
            .invoke(&addr, &def(), "add", serde_json::json!(n))
            .unwrap();
    }
    assert_eq!(a.router.pending_for(b.id), 2);
    assert_eq!(a.router.retainer().sweep(Instant::now()), 2);

    net.restore(b.id);
    assert_eq!(a.router.flush(b.id), 0);
    assert_eq!(a.router.pending_for(b.id), 0);
    assert_eq!(b.runtime.state_of(&addr), Some(serde_json::json!(null)));
}

#[tokio::test]
async fn background_sweeper_reclaims_expired_pins() {
    let net = Arc::new(ClusterNet::default());
    let mut config = GridConfig::default();
    config.delivery.retention_secs = 0;
    let nodes = build_grid(&net, &["bf-a", "bf-b"], &config);
    let (a, b) = (&nodes[0], &nodes[1]);
    let addr = address_on(&nodes, b.id);

    net.take_down(b.id);
    let _ = a
        .router
        .invoke(&addr, &def(), "get", serde_json::json!(null))
        .unwrap();
    assert_eq!(a.router.retainer().pinned(), 1);

    let sweeper = a.router.clone().run_sweeper(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(a.router.retainer().pinned(), 0);
    sweeper.abort();
}
