use async_trait::async_trait;
use lnpath_routing::Channel;

use crate::error::RpcError;
use crate::types::{PayViaRouteRequest, RawPayResponse, WalletInfoSnapshot};

/// Remote node payment interface.
///
/// Implementations submit a single pre-built route and return whatever the
/// node answered, undecoded. They must not retry.
#[async_trait]
pub trait PaymentRpc: Send + Sync {
    async fn pay_via_route(&self, request: PayViaRouteRequest) -> Result<RawPayResponse, RpcError>;
}

/// Local node identity and chain height.
#[async_trait]
pub trait WalletInfo: Send + Sync {
    async fn get_wallet_info(&self) -> Result<WalletInfoSnapshot, RpcError>;
}

/// Snapshot source for the public channel graph.
#[async_trait]
pub trait ChannelGraphSource: Send + Sync {
    async fn get_channels(&self) -> Result<Vec<Channel>, RpcError>;
}
