use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lnpath_routing::Channel;
use tokio::sync::Mutex;

use crate::error::RpcError;
use crate::traits::{ChannelGraphSource, PaymentRpc, WalletInfo};
use crate::types::{PayViaRouteRequest, RawPayResponse, WalletInfoSnapshot};

/// One scripted answer to a pay-via-route call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(RawPayResponse),
    Fail(RpcError),
    /// Never answer.
    Hang,
}

type Responder = Box<dyn Fn(&PayViaRouteRequest) -> ScriptedReply + Send + Sync>;

/// In-memory stand-in for a remote Lightning node.
///
/// Answers pay-via-route calls from a queue of scripted replies first, then
/// from an optional responder, and finally with a transport error. Every
/// request is recorded. Useful for tests and for dry runs.
pub struct ScriptedNode {
    wallet: WalletInfoSnapshot,
    channels: Vec<Channel>,
    replies: Mutex<VecDeque<ScriptedReply>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<PayViaRouteRequest>>,
    wallet_calls: AtomicUsize,
    graph_calls: AtomicUsize,
}

impl ScriptedNode {
    pub fn new(public_key: impl Into<String>, current_block_height: u32) -> Self {
        Self {
            wallet: WalletInfoSnapshot {
                public_key: public_key.into(),
                current_block_height,
            },
            channels: Vec::new(),
            replies: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            wallet_calls: AtomicUsize::new(0),
            graph_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    /// Queue replies, answered in order.
    pub fn with_replies(mut self, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        self.replies.get_mut().extend(replies);
        self
    }

    /// Answer calls the queue does not cover.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&PayViaRouteRequest) -> ScriptedReply + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Every pay-via-route request received so far.
    pub async fn requests(&self) -> Vec<PayViaRouteRequest> {
        self.requests.lock().await.clone()
    }

    pub fn wallet_calls(&self) -> usize {
        self.wallet_calls.load(Ordering::SeqCst)
    }

    pub fn graph_calls(&self) -> usize {
        self.graph_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentRpc for ScriptedNode {
    async fn pay_via_route(&self, request: PayViaRouteRequest) -> Result<RawPayResponse, RpcError> {
        let queued = self.replies.lock().await.pop_front();
        let reply = match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(&request),
            (None, None) => ScriptedReply::Fail(RpcError::Unavailable("no scripted reply".into())),
        };

        tracing::debug!(
            payment_id = %request.id,
            hops = request.route.hops.len(),
            reply = ?reply,
            "scripted pay via route"
        );
        self.requests.lock().await.push(request);

        match reply {
            ScriptedReply::Respond(response) => Ok(response),
            ScriptedReply::Fail(error) => Err(error),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl WalletInfo for ScriptedNode {
    async fn get_wallet_info(&self) -> Result<WalletInfoSnapshot, RpcError> {
        self.wallet_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.wallet.clone())
    }
}

#[async_trait]
impl ChannelGraphSource for ScriptedNode {
    async fn get_channels(&self) -> Result<Vec<Channel>, RpcError> {
        self.graph_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.clone())
    }
}
