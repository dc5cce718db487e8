//! Integration test: probing a scripted node's graph.
//!
//! The prober pulls the graph and wallet from the node, pathfinds with
//! lnpath-routing, and learns from each failed attempt.

use std::sync::Arc;
use std::time::Duration;

use lnpath_core::{EngineConfig, ProbeConfig};
use lnpath_integration_tests::{channel_ids, diamond, DESTINATION, HEIGHT, LOCAL};
use lnpath_payments::adapters::{ScriptedNode, ScriptedReply};
use lnpath_payments::{
    AttemptFailure, Preimage, ProbeError, ProbeEvent, ProbeRequest, Prober, RawFailure,
    RawPayResponse,
};
use lnpath_routing::IgnoreEntry;

fn failure(code: u16, index: usize) -> ScriptedReply {
    ScriptedReply::Respond(RawPayResponse::failed(RawFailure::new(code, index)))
}

fn scripted(replies: Vec<ScriptedReply>) -> Arc<ScriptedNode> {
    Arc::new(
        ScriptedNode::new(LOCAL, HEIGHT)
            .with_channels(diamond())
            .with_replies(replies),
    )
}

fn prober(node: &Arc<ScriptedNode>) -> Prober {
    Prober::new(node.clone(), node.clone(), node.clone())
}

fn request() -> ProbeRequest {
    ProbeRequest {
        destination: DESTINATION.into(),
        mtokens: 1_000_000,
        ignore: vec![],
    }
}

// =========================================================================
// Ignore list accumulation
// =========================================================================

#[tokio::test]
async fn test_hop_failure_is_ignored_on_next_search() {
    // 02bb cannot forward over 2x1x0, the second hop of the 3-hop route.
    let node = scripted(vec![failure(0x1007, 1), failure(0x400F, 3)]);
    let report = prober(&node).probe(request()).await.unwrap();

    let failed_edge = IgnoreEntry::edge("2x1x0".parse().unwrap(), "02cc");
    assert!(report.ignored.contains(&failed_edge));

    let requests = node.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(channel_ids(&requests[0].route), vec!["1x1x0", "2x1x0", "3x1x0"]);
    assert_eq!(channel_ids(&requests[1].route), vec!["1x1x0", "4x1x0", "5x1x0"]);
    assert_eq!(report.route.as_ref(), Some(&requests[1].route));

    // Probes never reuse a payment id.
    assert_ne!(requests[0].id, requests[1].id);
}

#[tokio::test]
async fn test_final_pair_failure_ignores_terminating_edge() {
    let node = scripted(vec![failure(0x1007, 2), failure(0x1007, 3), failure(0x400F, 2)]);
    let report = prober(&node).probe(request()).await.unwrap();

    assert!(report
        .ignored
        .contains(&IgnoreEntry::edge("3x1x0".parse().unwrap(), DESTINATION)));
    assert!(report
        .ignored
        .contains(&IgnoreEntry::edge("5x1x0".parse().unwrap(), DESTINATION)));
    assert_eq!(channel_ids(report.route.as_ref().unwrap()), vec!["6x1x0", "7x1x0"]);
    assert_eq!(report.failures.len(), 3);
}

#[tokio::test]
async fn test_settled_attempt_keeps_its_route() {
    let preimage = Preimage([1; 32]);
    let node = scripted(vec![
        failure(0x1007, 2),
        ScriptedReply::Respond(RawPayResponse::settled(&preimage)),
    ]);
    let report = prober(&node).probe(request()).await.unwrap();

    let requests = node.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(report.route.as_ref(), Some(&requests[1].route));
    assert_eq!(channel_ids(&requests[1].route), vec!["1x1x0", "4x1x0", "5x1x0"]);
    assert_eq!(report.failures.len(), 1);
    // The settled route's edges stay usable.
    assert!(!report
        .ignored
        .contains(&IgnoreEntry::edge("5x1x0".parse().unwrap(), DESTINATION)));
}

#[tokio::test]
async fn test_probe_exhausts_every_path() {
    let node = Arc::new(
        ScriptedNode::new(LOCAL, HEIGHT)
            .with_channels(diamond())
            .with_responder(|request| {
                let index = request.route.hops.len() - 1;
                failure(0x1007, index)
            }),
    );

    let err = prober(&node).probe(request()).await.unwrap_err();
    assert!(matches!(err, ProbeError::Exhausted { .. }));
    assert_eq!(err.report().unwrap().routes_attempted.len(), 3);
    assert_eq!(node.graph_calls(), 1);
}

// =========================================================================
// Timeouts from configuration
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_configured_timeouts_bound_the_probe() {
    let config: EngineConfig = toml::from_str(
        r#"
        [probe]
        timeout_secs = 15
        path_timeout_secs = 10
        "#,
    )
    .unwrap();
    assert_eq!(config.probe.path_timeout(), Duration::from_secs(10));

    let node = Arc::new(
        ScriptedNode::new(LOCAL, HEIGHT)
            .with_channels(diamond())
            .with_responder(|_| ScriptedReply::Hang),
    );

    let started = tokio::time::Instant::now();
    let err = prober(&node)
        .with_config(config.probe.clone())
        .with_routing_config(&config.routing)
        .probe(request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::TimedOut { .. }));
    assert!(started.elapsed() >= Duration::from_secs(15));
    let report = err.report().unwrap();
    assert_eq!(report.routes_attempted.len(), 2);
    assert!(report.failures.iter().all(|f| *f == AttemptFailure::TimedOut));
}

#[tokio::test(start_paused = true)]
async fn test_subscription_reports_progress_and_cancels() {
    let node = Arc::new(
        ScriptedNode::new(LOCAL, HEIGHT)
            .with_channels(diamond())
            .with_responder(|_| ScriptedReply::Hang),
    );
    let config = ProbeConfig {
        path_timeout_secs: 5,
        ..ProbeConfig::default()
    };

    let mut sub = prober(&node).with_config(config).subscribe_to_probe(request());
    assert!(matches!(sub.next().await, Some(ProbeEvent::Probing { .. })));
    sub.cancel();

    let (events, result) = sub.finish().await;
    assert!(matches!(result.unwrap(), Err(ProbeError::Cancelled)));
    assert!(matches!(events.last(), Some(ProbeEvent::End)));
    assert_eq!(node.requests().await.len(), 1);
}
