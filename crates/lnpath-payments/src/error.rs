use lnpath_core::{ChannelId, CoreError};
use lnpath_routing::RoutingError;

use crate::failure::FailureDetail;
use crate::prober::ProbeReport;
use crate::types::AttemptFailure;

/// Errors surfaced by the remote node's RPC layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc unavailable: {0}")]
    Unavailable(String),
}

/// Reasons a channel update could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateDecodeError {
    #[error("channel update is not valid hex")]
    NotHex,

    #[error("channel update truncated at {field}")]
    Truncated { field: &'static str },

    #[error("channel update is for {found}, expected {expected}")]
    ChannelMismatch { expected: ChannelId, found: ChannelId },

    #[error("channel endpoints unknown")]
    UnknownEndpoints,
}

/// Payment execution errors.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("no routes to attempt")]
    NoRoutes,

    #[error("payment rejected: {} at hop index {}", .detail.code, .detail.index)]
    Rejected {
        detail: FailureDetail,
        failures: Vec<AttemptFailure>,
    },

    #[error("all routes failed, last failure: {last}")]
    RoutesExhausted {
        last: AttemptFailure,
        failures: Vec<AttemptFailure>,
    },

    #[error("payment cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PaymentError {
    /// Numeric error class: 400 for bad input, 404 when the destination
    /// refused, 503 for routing trouble and 500 for anything unrecognized.
    pub fn class(&self) -> u16 {
        match self {
            Self::NoRoutes => 400,
            Self::Rejected { detail, .. } => detail.class,
            Self::RoutesExhausted { last, .. } => last.class(),
            Self::Cancelled => 503,
            Self::Core(_) => 500,
        }
    }

    /// Every failed attempt made before the payment gave up.
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            Self::Rejected { failures, .. } | Self::RoutesExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Probe errors.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe request: {0}")]
    InvalidRequest(String),

    #[error("no more paths to probe after {} attempts", .report.routes_attempted.len())]
    Exhausted { report: Box<ProbeReport> },

    #[error("probe timed out after {} attempts", .report.routes_attempted.len())]
    TimedOut { report: Box<ProbeReport> },

    #[error("probe cancelled")]
    Cancelled,

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl ProbeError {
    /// The partial report, when the probe ran at least once.
    pub fn report(&self) -> Option<&ProbeReport> {
        match self {
            Self::Exhausted { report } | Self::TimedOut { report } => Some(report),
            _ => None,
        }
    }
}
