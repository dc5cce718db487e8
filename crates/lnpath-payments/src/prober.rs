//! Route discovery by test payments.
//!
//! A probe repeatedly computes the best path under a growing ignore list and
//! tries it with a random payment id nobody can settle. The destination
//! refusing that id proves the route reaches it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lnpath_core::amount::{mtokens_string, Mtokens};
use lnpath_core::{ProbeConfig, RoutingConfig};
use lnpath_routing::{route_from_hops, HopPathfinder, IgnoreEntry, PathRequest, Route, RouteRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ProbeError;
use crate::events::{CancelHandle, CancelToken, EventSink, ProbeEvent, ProbeSubscription, Subscription};
use crate::executor::PaymentExecutor;
use crate::failure::PreimageCheck;
use crate::traits::{ChannelGraphSource, PaymentRpc, WalletInfo};
use crate::types::{AttemptFailure, AttemptOutcome, PaymentId};

/// What to probe for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub destination: String,
    #[serde(with = "mtokens_string")]
    pub mtokens: Mtokens,
    /// Nodes and edges to avoid from the start.
    #[serde(default)]
    pub ignore: Vec<IgnoreEntry>,
}

/// Everything a probe tried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    /// The route that reached the destination, if any.
    pub route: Option<Route>,
    pub routes_attempted: Vec<Route>,
    pub failures: Vec<AttemptFailure>,
    /// The ignore list after the last attempt.
    pub ignored: Vec<IgnoreEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProbeReport {
    fn new(ignored: Vec<IgnoreEntry>) -> Self {
        let now = Utc::now();
        Self {
            route: None,
            routes_attempted: Vec::new(),
            failures: Vec::new(),
            ignored,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self) -> Box<Self> {
        self.finished_at = Utc::now();
        Box::new(self)
    }

    fn ignore(&mut self, entry: IgnoreEntry) {
        if !self.ignored.contains(&entry) {
            self.ignored.push(entry);
        }
    }
}

/// Probes a remote node's view of the network for working routes.
#[derive(Clone)]
pub struct Prober {
    executor: PaymentExecutor,
    wallet: Arc<dyn WalletInfo>,
    graph: Arc<dyn ChannelGraphSource>,
    config: ProbeConfig,
    initial_cltv: u32,
}

impl Prober {
    pub fn new(
        rpc: Arc<dyn PaymentRpc>,
        wallet: Arc<dyn WalletInfo>,
        graph: Arc<dyn ChannelGraphSource>,
    ) -> Self {
        Self {
            executor: PaymentExecutor::new(rpc, wallet.clone()),
            wallet,
            graph,
            config: ProbeConfig::default(),
            initial_cltv: RoutingConfig::default().initial_cltv,
        }
    }

    pub fn with_config(mut self, config: ProbeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_routing_config(mut self, routing: &RoutingConfig) -> Self {
        self.initial_cltv = routing.initial_cltv;
        self
    }

    /// Probe until a route reaches the destination, no path is left, or
    /// the overall timeout passes.
    pub async fn probe(&self, request: ProbeRequest) -> Result<ProbeReport, ProbeError> {
        self.run(request, &EventSink::none(), &CancelToken::never())
            .await
    }

    /// Like [`probe`](Self::probe) on a spawned task, streaming
    /// [`ProbeEvent`]s.
    pub fn subscribe_to_probe(&self, request: ProbeRequest) -> ProbeSubscription {
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let (cancel, token) = CancelHandle::new();
        let prober = self.clone();

        let task = tokio::spawn(async move {
            let sink = EventSink::channel(tx);
            let result = prober.run(request, &sink, &token).await;
            match &result {
                Ok(report) => sink.emit(ProbeEvent::Success(Box::new(report.clone()))).await,
                Err(e) => {
                    sink.emit(ProbeEvent::Error {
                        message: e.to_string(),
                    })
                    .await
                }
            }
            sink.emit(ProbeEvent::End).await;
            result
        });

        Subscription::new(rx, cancel, task)
    }

    async fn run(
        &self,
        request: ProbeRequest,
        sink: &EventSink<ProbeEvent>,
        cancel: &CancelToken,
    ) -> Result<ProbeReport, ProbeError> {
        if request.destination.is_empty() {
            return Err(ProbeError::InvalidRequest("destination is required".into()));
        }
        if request.mtokens == 0 {
            return Err(ProbeError::InvalidRequest("mtokens must be positive".into()));
        }

        let deadline = Instant::now() + self.config.timeout();
        let wallet = self.wallet.get_wallet_info().await?;
        if wallet.public_key == request.destination {
            return Err(ProbeError::InvalidRequest(
                "destination is the local node".into(),
            ));
        }
        let channels = self.graph.get_channels().await?;

        tracing::info!(
            destination = %request.destination,
            mtokens = %request.mtokens,
            channels = channels.len(),
            "starting probe"
        );

        let mut report = ProbeReport::new(request.ignore);

        loop {
            if cancel.is_cancelled() {
                tracing::info!(attempts = report.routes_attempted.len(), "probe cancelled");
                return Err(ProbeError::Cancelled);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(attempts = report.routes_attempted.len(), "probe timed out");
                return Err(ProbeError::TimedOut {
                    report: report.finish(),
                });
            }

            let hops = HopPathfinder::find_path(&PathRequest {
                channels: &channels,
                start: &wallet.public_key,
                end: &request.destination,
                mtokens: request.mtokens,
                ignore: &report.ignored,
            });
            if hops.is_empty() {
                tracing::info!(
                    attempts = report.routes_attempted.len(),
                    ignored = report.ignored.len(),
                    "no paths left to probe"
                );
                return Err(ProbeError::Exhausted {
                    report: report.finish(),
                });
            }

            let route = route_from_hops(&RouteRequest {
                height: wallet.current_block_height,
                hops,
                initial_cltv: self.initial_cltv,
                mtokens: request.mtokens,
            })?;

            sink.emit(ProbeEvent::Probing {
                route: route.clone(),
            })
            .await;
            tracing::debug!(
                hops = route.hops.len(),
                fee_mtokens = %route.fee_mtokens,
                "probing route"
            );

            let allowed = self.config.path_timeout().min(deadline - now);
            // Nobody knows a preimage for a random id, so any preimage at all
            // means the destination accepted.
            let attempt =
                self.executor
                    .pay_via_route_with(PaymentId::random(), &route, PreimageCheck::AnyPreimage);
            let outcome = match tokio::time::timeout(allowed, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => AttemptOutcome::Failure(AttemptFailure::TimedOut),
            };
            report.routes_attempted.push(route.clone());

            match outcome {
                AttemptOutcome::Success { .. } => {
                    tracing::info!(hops = route.hops.len(), "probe payment settled");
                    report.route = Some(route);
                    return Ok(*report.finish());
                }
                AttemptOutcome::Failure(AttemptFailure::Routing(detail))
                    if detail.is_destination_rejection(&route) =>
                {
                    tracing::info!(
                        hops = route.hops.len(),
                        code = %detail.code,
                        "probe reached destination"
                    );
                    report.failures.push(AttemptFailure::Routing(detail));
                    report.route = Some(route);
                    return Ok(*report.finish());
                }
                AttemptOutcome::Failure(AttemptFailure::Routing(detail)) => {
                    tracing::debug!(
                        code = %detail.code,
                        index = detail.index,
                        channel = ?detail.channel,
                        "probe hit routing failure"
                    );
                    if let Some(edge) = detail.failed_edge(&route) {
                        report.ignore(edge);
                    }
                    if detail.index + 1 >= route.hops.len() {
                        if let Some(last) = route.hops.last() {
                            report.ignore(IgnoreEntry::edge(last.channel, last.public_key.clone()));
                        }
                    }
                    report
                        .failures
                        .push(AttemptFailure::Routing(detail.clone()));
                    sink.emit(ProbeEvent::RoutingFailure { route, detail }).await;
                }
                AttemptOutcome::Failure(failure) => {
                    tracing::warn!(failure = %failure, hops = route.hops.len(), "probe attempt stuck, ignoring route");
                    for hop in &route.hops {
                        report.ignore(IgnoreEntry::edge(hop.channel, hop.public_key.clone()));
                    }
                    report.failures.push(failure);
                }
            }
        }
    }
}
