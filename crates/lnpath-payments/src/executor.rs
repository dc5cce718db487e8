use std::sync::Arc;

use lnpath_core::{AttemptEvent, AttemptState, AttemptStateMachine, PaymentConfig};
use lnpath_routing::Route;
use tokio::sync::mpsc;

use crate::error::PaymentError;
use crate::events::{CancelHandle, CancelToken, EventSink, PaymentEvent, PaymentSubscription, Subscription};
use crate::failure::{decode_response_with, needs_local_key, PreimageCheck};
use crate::traits::{PaymentRpc, WalletInfo};
use crate::types::{
    AttemptFailure, AttemptOutcome, PayViaRouteRequest, PayViaRoutesRequest, PaymentAttempt,
    PaymentId, PaymentSuccess,
};

/// Lazily fetched local public key, looked up at most once.
#[derive(Default)]
struct LocalKey {
    fetched: bool,
    key: Option<String>,
}

impl LocalKey {
    async fn get(&mut self, wallet: &dyn WalletInfo) -> Option<&str> {
        if !self.fetched {
            self.fetched = true;
            match wallet.get_wallet_info().await {
                Ok(info) => self.key = Some(info.public_key),
                Err(e) => {
                    tracing::warn!(error = %e, "wallet lookup failed, first-hop update left undecoded");
                }
            }
        }
        self.key.as_deref()
    }
}

/// Drives payments over pre-built routes against a remote node.
#[derive(Clone)]
pub struct PaymentExecutor {
    rpc: Arc<dyn PaymentRpc>,
    wallet: Arc<dyn WalletInfo>,
    config: PaymentConfig,
}

impl PaymentExecutor {
    pub fn new(rpc: Arc<dyn PaymentRpc>, wallet: Arc<dyn WalletInfo>) -> Self {
        Self {
            rpc,
            wallet,
            config: PaymentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PaymentConfig) -> Self {
        self.config = config;
        self
    }

    /// Attempt a single route and decode the answer.
    pub async fn pay_via_route(&self, id: PaymentId, route: &Route) -> AttemptOutcome {
        self.pay_via_route_with(id, route, PreimageCheck::MatchId).await
    }

    /// [`pay_via_route`](Self::pay_via_route) with an explicit preimage check.
    pub async fn pay_via_route_with(
        &self,
        id: PaymentId,
        route: &Route,
        check: PreimageCheck,
    ) -> AttemptOutcome {
        let mut local = LocalKey::default();
        self.attempt(&id, route, &mut local, check).await
    }

    async fn attempt(
        &self,
        id: &PaymentId,
        route: &Route,
        local: &mut LocalKey,
        check: PreimageCheck,
    ) -> AttemptOutcome {
        let request = PayViaRouteRequest {
            id: *id,
            route: route.clone(),
        };

        let raw = match self.rpc.pay_via_route(request).await {
            Ok(raw) => raw,
            Err(e) => {
                return AttemptOutcome::Failure(AttemptFailure::Transport {
                    message: e.to_string(),
                })
            }
        };

        let local_key = if needs_local_key(&raw) {
            local.get(self.wallet.as_ref()).await
        } else {
            None
        };

        decode_response_with(id, route, &raw, local_key, check)
    }

    /// Pay over `request.routes` in order until one settles.
    ///
    /// Stops early when a failure cannot be routed around.
    pub async fn pay_via_routes(
        &self,
        request: PayViaRoutesRequest,
    ) -> Result<PaymentSuccess, PaymentError> {
        self.run(request, &EventSink::none(), &CancelToken::never())
            .await
    }

    /// Like [`pay_via_routes`](Self::pay_via_routes) on a spawned task,
    /// streaming [`PaymentEvent`]s.
    pub fn subscribe_to_pay_via_routes(&self, request: PayViaRoutesRequest) -> PaymentSubscription {
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let (cancel, token) = CancelHandle::new();
        let executor = self.clone();

        let task = tokio::spawn(async move {
            let sink = EventSink::channel(tx);
            let result = executor.run(request, &sink, &token).await;
            match &result {
                Ok(success) => sink.emit(PaymentEvent::Success(Box::new(success.clone()))).await,
                Err(e) => {
                    sink.emit(PaymentEvent::Error {
                        class: e.class(),
                        message: e.to_string(),
                    })
                    .await
                }
            }
            sink.emit(PaymentEvent::End).await;
            result
        });

        Subscription::new(rx, cancel, task)
    }

    async fn run(
        &self,
        request: PayViaRoutesRequest,
        sink: &EventSink<PaymentEvent>,
        cancel: &CancelToken,
    ) -> Result<PaymentSuccess, PaymentError> {
        if request.routes.is_empty() {
            return Err(PaymentError::NoRoutes);
        }

        let id = request.id.unwrap_or_else(PaymentId::random);
        let mut state = AttemptState::Idle;
        let mut attempts: Vec<PaymentAttempt> = Vec::with_capacity(request.routes.len());
        let mut local = LocalKey::default();

        for route in request.routes {
            if cancel.is_cancelled() {
                tracing::info!(payment_id = %id, attempts = attempts.len(), "payment cancelled");
                return Err(PaymentError::Cancelled);
            }

            state = AttemptStateMachine::transition(state, AttemptEvent::RouteSubmitted)?;
            sink.emit(PaymentEvent::Paying {
                route: route.clone(),
            })
            .await;
            tracing::info!(
                payment_id = %id,
                attempt = attempts.len() + 1,
                hops = route.hops.len(),
                mtokens = %route.mtokens,
                "paying via route"
            );

            let outcome = self.attempt(&id, &route, &mut local, PreimageCheck::MatchId).await;
            let mut attempt = PaymentAttempt::new(route.clone());
            attempt.resolve(outcome.clone())?;
            attempts.push(attempt);

            match outcome {
                AttemptOutcome::Success { preimage } => {
                    AttemptStateMachine::transition(state, AttemptEvent::PreimageReceived)?;
                    tracing::info!(
                        payment_id = %id,
                        attempts = attempts.len(),
                        fee_mtokens = %route.fee_mtokens,
                        "payment settled"
                    );
                    return Ok(PaymentSuccess {
                        id,
                        preimage,
                        fee: route.fee,
                        fee_mtokens: route.fee_mtokens,
                        mtokens: route.mtokens,
                        tokens: route.tokens,
                        route,
                        attempts,
                    });
                }
                AttemptOutcome::Failure(AttemptFailure::Routing(detail))
                    if detail.is_definitive(&route) =>
                {
                    AttemptStateMachine::transition(state, AttemptEvent::DefinitivelyFailed)?;
                    tracing::warn!(
                        payment_id = %id,
                        code = %detail.code,
                        index = detail.index,
                        "payment rejected"
                    );
                    return Err(PaymentError::Rejected {
                        detail,
                        failures: collect_failures(&attempts),
                    });
                }
                AttemptOutcome::Failure(AttemptFailure::Routing(detail)) => {
                    state = AttemptStateMachine::transition(state, AttemptEvent::RetryableFailed)?;
                    tracing::warn!(
                        payment_id = %id,
                        code = %detail.code,
                        index = detail.index,
                        channel = ?detail.channel,
                        "routing failure, trying next route"
                    );
                    sink.emit(PaymentEvent::RoutingFailure { route, detail }).await;
                }
                AttemptOutcome::Failure(failure) => {
                    state = AttemptStateMachine::transition(state, AttemptEvent::RetryableFailed)?;
                    tracing::warn!(payment_id = %id, failure = %failure, "attempt failed, trying next route");
                }
            }
        }

        AttemptStateMachine::transition(state, AttemptEvent::RoutesExhausted)?;
        let failures = collect_failures(&attempts);
        let last = failures.last().cloned().ok_or(PaymentError::NoRoutes)?;
        tracing::warn!(payment_id = %id, attempts = attempts.len(), "all routes failed");

        Err(PaymentError::RoutesExhausted { last, failures })
    }
}

fn collect_failures(attempts: &[PaymentAttempt]) -> Vec<AttemptFailure> {
    attempts.iter().filter_map(|a| a.failure()).cloned().collect()
}
