//! Integration test: paying over k alternative routes.
//!
//! Routes come from lnpath-routing's k-path finder and are paid through
//! lnpath-payments against a scripted node.

use std::sync::Arc;

use lnpath_core::EngineConfig;
use lnpath_integration_tests::{channel_ids, diamond, DESTINATION, HEIGHT, LOCAL};
use lnpath_payments::adapters::{ScriptedNode, ScriptedReply};
use lnpath_payments::{
    AttemptFailure, FailureCode, PayViaRoutesRequest, PaymentError, PaymentEvent, PaymentExecutor,
    PaymentId, Preimage, RawFailure, RawPayResponse,
};
use lnpath_routing::{
    find_k_paths, route_from_hops, KPathRequest, Route, RouteRequest, DEFAULT_PATH_LIMIT,
};

const MTOKENS: u128 = 1_000_000;

fn candidate_routes() -> Vec<Route> {
    let channels = diamond();
    let config: EngineConfig = toml::from_str("[routing]\npath_limit = 3\n").expect("config");
    find_k_paths(
        &KPathRequest {
            channels: &channels,
            start: LOCAL,
            end: DESTINATION,
            mtokens: MTOKENS,
            ignore: &[],
            limit: DEFAULT_PATH_LIMIT,
        }
        .with_config(&config.routing),
    )
    .into_iter()
    .map(|hops| {
        route_from_hops(&RouteRequest {
            height: HEIGHT,
            hops,
            initial_cltv: 40,
            mtokens: MTOKENS,
        })
        .expect("k path should build")
    })
    .collect()
}

fn failure(code: u16, index: usize) -> ScriptedReply {
    ScriptedReply::Respond(RawPayResponse::failed(RawFailure::new(code, index)))
}

// =========================================================================
// Retrying across routes
// =========================================================================

#[tokio::test]
async fn test_pays_on_third_route_after_two_policy_failures() {
    let routes = candidate_routes();
    assert_eq!(routes.len(), 3);

    let preimage = Preimage([42; 32]);
    let node = Arc::new(ScriptedNode::new(LOCAL, HEIGHT).with_replies([
        failure(0x1007, 1),
        failure(0x100C, 1),
        ScriptedReply::Respond(RawPayResponse::settled(&preimage)),
    ]));
    let executor = PaymentExecutor::new(node.clone(), node.clone());

    let success = executor
        .pay_via_routes(PayViaRoutesRequest {
            id: Some(PaymentId::for_preimage(&preimage)),
            routes: routes.clone(),
        })
        .await
        .expect("third route should settle");

    assert_eq!(success.route, routes[2]);
    assert_eq!(success.fee_mtokens, routes[2].fee_mtokens);
    assert_eq!(success.failures().len(), 2);

    let sent: Vec<Vec<String>> = node
        .requests()
        .await
        .iter()
        .map(|r| channel_ids(&r.route))
        .collect();
    let expected: Vec<Vec<String>> = routes.iter().map(channel_ids).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn test_destination_rejection_skips_remaining_routes() {
    let routes = candidate_routes();
    let node = Arc::new(ScriptedNode::new(LOCAL, HEIGHT).with_replies([failure(0x4010, 3)]));
    let executor = PaymentExecutor::new(node.clone(), node.clone());

    let err = executor
        .pay_via_routes(PayViaRoutesRequest {
            id: None,
            routes,
        })
        .await
        .unwrap_err();

    match &err {
        PaymentError::Rejected { detail, .. } => {
            assert_eq!(detail.code, FailureCode::IncorrectPaymentAmount);
            assert_eq!(detail.public_key.as_deref(), Some(DESTINATION));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(err.class(), 404);
    assert_eq!(err.failures().len(), 1);
    assert_eq!(node.requests().await.len(), 1);
}

#[tokio::test]
async fn test_onion_failure_is_not_retried() {
    let node = Arc::new(ScriptedNode::new(LOCAL, HEIGHT).with_replies([failure(0xC005, 1)]));
    let executor = PaymentExecutor::new(node.clone(), node.clone());

    let err = executor
        .pay_via_routes(PayViaRoutesRequest {
            id: None,
            routes: candidate_routes(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Rejected { .. }));
    assert_eq!(err.class(), 503);
    assert_eq!(node.requests().await.len(), 1);
}

#[tokio::test]
async fn test_every_route_failing_exhausts() {
    let node = Arc::new(
        ScriptedNode::new(LOCAL, HEIGHT).with_responder(|_| failure(0x2002, 1)),
    );
    let executor = PaymentExecutor::new(node.clone(), node.clone());

    let err = executor
        .pay_via_routes(PayViaRoutesRequest {
            id: None,
            routes: candidate_routes(),
        })
        .await
        .unwrap_err();

    let PaymentError::RoutesExhausted { last, failures } = &err else {
        panic!("expected exhaustion, got {:?}", err);
    };
    assert_eq!(failures.len(), 3);
    let AttemptFailure::Routing(detail) = last else {
        panic!("expected routing failure");
    };
    assert_eq!(detail.code, FailureCode::TemporaryNodeFailure);
}

// =========================================================================
// Event stream
// =========================================================================

#[tokio::test]
async fn test_subscription_streams_each_attempt() {
    let routes = candidate_routes();
    let preimage = Preimage([7; 32]);
    let node = Arc::new(ScriptedNode::new(LOCAL, HEIGHT).with_replies([
        failure(0x1007, 2),
        ScriptedReply::Respond(RawPayResponse::errored("timeout_in_flight")),
        ScriptedReply::Respond(RawPayResponse::settled(&preimage)),
    ]));
    let executor = PaymentExecutor::new(node.clone(), node.clone());

    let mut sub = executor.subscribe_to_pay_via_routes(PayViaRoutesRequest {
        id: Some(PaymentId::for_preimage(&preimage)),
        routes: routes.clone(),
    });

    let mut paying = Vec::new();
    let mut routing_failures = 0;
    let mut settled = None;
    while let Some(event) = sub.next().await {
        match event {
            PaymentEvent::Paying { route } => paying.push(route),
            PaymentEvent::RoutingFailure { detail, .. } => {
                assert_eq!(detail.index, 2);
                routing_failures += 1;
            }
            PaymentEvent::Success(success) => settled = Some(success),
            PaymentEvent::Error { message, .. } => panic!("unexpected error: {}", message),
            PaymentEvent::End => break,
        }
    }

    assert_eq!(paying, routes);
    // The no-result attempt advances without a routing failure event.
    assert_eq!(routing_failures, 1);
    let settled = settled.expect("success event");
    assert_eq!(settled.preimage, preimage);
    assert_eq!(settled.failures().len(), 2);

    let (_, result) = sub.finish().await;
    assert!(result.unwrap().is_ok());
}
