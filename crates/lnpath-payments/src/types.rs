use std::fmt;

use lnpath_core::amount::{mtokens_string, Mtokens};
use lnpath_core::CoreError;
use lnpath_routing::Route;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::failure::FailureDetail;

fn decode_hex32(value: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(value).map_err(|e| format!("invalid hex: {}", e))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

/// Payment identifier: the payment hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentId(pub [u8; 32]);

impl PaymentId {
    /// A fresh random id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The id whose preimage is `preimage`.
    pub fn for_preimage(preimage: &Preimage) -> Self {
        Self(Sha256::digest(preimage.0).into())
    }

    pub fn from_hex(value: &str) -> Result<Self, CoreError> {
        decode_hex32(value)
            .map(Self)
            .map_err(|e| CoreError::ValidationError(format!("payment id: {}", e)))
    }

    /// Whether `preimage` hashes to this id.
    pub fn is_paid_by(&self, preimage: &Preimage) -> bool {
        Self::for_preimage(preimage) == *self
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for PaymentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PaymentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_hex32(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// Secret revealed by the destination on settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preimage(pub [u8; 32]);

impl Preimage {
    pub fn from_hex(value: &str) -> Result<Self, CoreError> {
        decode_hex32(value)
            .map(Self)
            .map_err(|e| CoreError::ValidationError(format!("preimage: {}", e)))
    }
}

impl fmt::Display for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Preimage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Preimage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_hex32(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// Request sent to the remote node for a single route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayViaRouteRequest {
    pub id: PaymentId,
    pub route: Route,
}

/// Response of the remote node's pay-via-route call, as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPayResponse {
    /// Hex preimage on success.
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub failure: Option<RawFailure>,
    /// Textual error such as `unknown_wire_error`.
    #[serde(default)]
    pub error: Option<String>,
}

impl RawPayResponse {
    pub fn settled(preimage: &Preimage) -> Self {
        Self {
            preimage: Some(preimage.to_string()),
            ..Self::default()
        }
    }

    pub fn failed(failure: RawFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Routing failure as reported by the remote node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFailure {
    #[serde(default)]
    pub code: Option<u16>,
    /// Hex channel update attached to the failure.
    #[serde(default)]
    pub channel_update: Option<String>,
    /// Position of the reporting node: 0 is the local node.
    #[serde(default)]
    pub failure_source_index: Option<usize>,
    #[serde(default)]
    pub htlc_mtokens: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RawFailure {
    pub fn new(code: u16, failure_source_index: usize) -> Self {
        Self {
            code: Some(code),
            failure_source_index: Some(failure_source_index),
            ..Self::default()
        }
    }

    pub fn with_channel_update(mut self, update_hex: impl Into<String>) -> Self {
        self.channel_update = Some(update_hex.into());
        self
    }
}

/// Local node identity and chain tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfoSnapshot {
    pub public_key: String,
    pub current_block_height: u32,
}

/// Why a single attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// A node on the route reported a routing failure.
    Routing(FailureDetail),
    /// The remote node could not tell what happened.
    NoResult { reason: String },
    /// The call itself failed or the response made no sense.
    Transport { message: String },
    /// No answer within the allotted time.
    TimedOut,
}

impl AttemptFailure {
    pub fn class(&self) -> u16 {
        match self {
            Self::Routing(detail) => detail.class,
            Self::NoResult { .. } | Self::Transport { .. } | Self::TimedOut => 503,
        }
    }

    pub fn detail(&self) -> Option<&FailureDetail> {
        match self {
            Self::Routing(detail) => Some(detail),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Routing(detail) => write!(f, "{} at hop index {}", detail.code, detail.index),
            Self::NoResult { reason } => write!(f, "no result: {}", reason),
            Self::Transport { message } => write!(f, "transport: {}", message),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Decoded result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success { preimage: Preimage },
    Failure(AttemptFailure),
}

/// State of one route attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Success { preimage: Preimage },
    Failure { failure: AttemptFailure },
}

/// One route tried for a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub route: Route,
    status: AttemptStatus,
}

impl PaymentAttempt {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            status: AttemptStatus::Pending,
        }
    }

    pub fn status(&self) -> &AttemptStatus {
        &self.status
    }

    /// Record the outcome. An attempt resolves exactly once.
    pub fn resolve(&mut self, outcome: AttemptOutcome) -> Result<(), CoreError> {
        if self.status != AttemptStatus::Pending {
            return Err(CoreError::AttemptAlreadyResolved);
        }
        self.status = match outcome {
            AttemptOutcome::Success { preimage } => AttemptStatus::Success { preimage },
            AttemptOutcome::Failure(failure) => AttemptStatus::Failure { failure },
        };
        Ok(())
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.status {
            AttemptStatus::Failure { failure } => Some(failure),
            _ => None,
        }
    }
}

/// Request to pay over a list of candidate routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayViaRoutesRequest {
    /// Payment hash; random when absent.
    #[serde(default)]
    pub id: Option<PaymentId>,
    pub routes: Vec<Route>,
}

/// A settled payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSuccess {
    pub id: PaymentId,
    pub preimage: Preimage,
    /// The route that settled.
    pub route: Route,
    pub fee: u64,
    #[serde(with = "mtokens_string")]
    pub fee_mtokens: Mtokens,
    #[serde(with = "mtokens_string")]
    pub mtokens: Mtokens,
    pub tokens: u64,
    /// Every attempt in order, the settled one last.
    pub attempts: Vec<PaymentAttempt>,
}

impl PaymentSuccess {
    /// Failures of the attempts before the one that settled.
    pub fn failures(&self) -> Vec<&AttemptFailure> {
        self.attempts.iter().filter_map(|a| a.failure()).collect()
    }
}
