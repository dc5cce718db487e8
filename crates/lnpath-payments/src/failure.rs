//! Routing failure classification.
//!
//! Remote responses are decoded here, once, into closed types. Nothing past
//! this module looks at raw codes or hex.

use std::fmt;

use lnpath_core::amount::{parse_mtokens, Mtokens};
use lnpath_core::ChannelId;
use lnpath_routing::{IgnoreEntry, Policy, Route};
use serde::{Deserialize, Serialize};

use crate::error::UpdateDecodeError;
use crate::types::{AttemptFailure, AttemptOutcome, PaymentId, Preimage, RawFailure, RawPayResponse};

/// Failure code flag: the onion could not be parsed.
pub const BADONION: u16 = 0x8000;
/// Failure code flag: permanent failure.
pub const PERM: u16 = 0x4000;
/// Failure code flag: node-level failure.
pub const NODE: u16 = 0x2000;
/// Failure code flag: a channel update is attached.
pub const UPDATE: u16 = 0x1000;

/// Error texts meaning the node could not determine the outcome.
const NO_RESULT_ERRORS: [&str; 2] = ["unknown_wire_error", "timeout_in_flight"];

/// Onion failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum FailureCode {
    InvalidRealm,
    TemporaryNodeFailure,
    PermanentNodeFailure,
    RequiredNodeFeatureMissing,
    InvalidOnionVersion,
    InvalidOnionHmac,
    InvalidOnionKey,
    TemporaryChannelFailure,
    PermanentChannelFailure,
    RequiredChannelFeatureMissing,
    UnknownNextPeer,
    AmountBelowMinimum,
    FeeInsufficient,
    IncorrectCltvExpiry,
    ExpiryTooSoon,
    IncorrectOrUnknownPaymentDetails,
    IncorrectPaymentAmount,
    FinalExpiryTooSoon,
    FinalIncorrectCltvExpiry,
    FinalIncorrectHtlcAmount,
    ChannelDisabled,
    Unknown(u16),
}

/// Coarse grouping of failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureGroup {
    /// The destination refused the payment.
    Destination,
    /// The onion itself was rejected.
    WireProtocol,
    /// A channel's fees, limits or liquidity did not fit.
    Policy,
    /// A node could not forward at all.
    Node,
    Unrecognized,
}

impl From<u16> for FailureCode {
    fn from(code: u16) -> Self {
        match code {
            c if c == PERM | 1 => Self::InvalidRealm,
            c if c == NODE | 2 => Self::TemporaryNodeFailure,
            c if c == PERM | NODE | 2 => Self::PermanentNodeFailure,
            c if c == PERM | NODE | 3 => Self::RequiredNodeFeatureMissing,
            c if c == BADONION | PERM | 4 => Self::InvalidOnionVersion,
            c if c == BADONION | PERM | 5 => Self::InvalidOnionHmac,
            c if c == BADONION | PERM | 6 => Self::InvalidOnionKey,
            c if c == UPDATE | 7 => Self::TemporaryChannelFailure,
            c if c == PERM | 8 => Self::PermanentChannelFailure,
            c if c == PERM | 9 => Self::RequiredChannelFeatureMissing,
            c if c == PERM | 10 => Self::UnknownNextPeer,
            c if c == UPDATE | 11 => Self::AmountBelowMinimum,
            c if c == UPDATE | 12 => Self::FeeInsufficient,
            c if c == UPDATE | 13 => Self::IncorrectCltvExpiry,
            c if c == UPDATE | 14 => Self::ExpiryTooSoon,
            c if c == PERM | 15 => Self::IncorrectOrUnknownPaymentDetails,
            c if c == PERM | 16 => Self::IncorrectPaymentAmount,
            17 => Self::FinalExpiryTooSoon,
            18 => Self::FinalIncorrectCltvExpiry,
            19 => Self::FinalIncorrectHtlcAmount,
            c if c == UPDATE | 20 => Self::ChannelDisabled,
            other => Self::Unknown(other),
        }
    }
}

impl From<FailureCode> for u16 {
    fn from(code: FailureCode) -> Self {
        code.code()
    }
}

impl FailureCode {
    /// The numeric wire code.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidRealm => PERM | 1,
            Self::TemporaryNodeFailure => NODE | 2,
            Self::PermanentNodeFailure => PERM | NODE | 2,
            Self::RequiredNodeFeatureMissing => PERM | NODE | 3,
            Self::InvalidOnionVersion => BADONION | PERM | 4,
            Self::InvalidOnionHmac => BADONION | PERM | 5,
            Self::InvalidOnionKey => BADONION | PERM | 6,
            Self::TemporaryChannelFailure => UPDATE | 7,
            Self::PermanentChannelFailure => PERM | 8,
            Self::RequiredChannelFeatureMissing => PERM | 9,
            Self::UnknownNextPeer => PERM | 10,
            Self::AmountBelowMinimum => UPDATE | 11,
            Self::FeeInsufficient => UPDATE | 12,
            Self::IncorrectCltvExpiry => UPDATE | 13,
            Self::ExpiryTooSoon => UPDATE | 14,
            Self::IncorrectOrUnknownPaymentDetails => PERM | 15,
            Self::IncorrectPaymentAmount => PERM | 16,
            Self::FinalExpiryTooSoon => 17,
            Self::FinalIncorrectCltvExpiry => 18,
            Self::FinalIncorrectHtlcAmount => 19,
            Self::ChannelDisabled => UPDATE | 20,
            Self::Unknown(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRealm => "invalid_realm",
            Self::TemporaryNodeFailure => "temporary_node_failure",
            Self::PermanentNodeFailure => "permanent_node_failure",
            Self::RequiredNodeFeatureMissing => "required_node_feature_missing",
            Self::InvalidOnionVersion => "invalid_onion_version",
            Self::InvalidOnionHmac => "invalid_onion_hmac",
            Self::InvalidOnionKey => "invalid_onion_key",
            Self::TemporaryChannelFailure => "temporary_channel_failure",
            Self::PermanentChannelFailure => "permanent_channel_failure",
            Self::RequiredChannelFeatureMissing => "required_channel_feature_missing",
            Self::UnknownNextPeer => "unknown_next_peer",
            Self::AmountBelowMinimum => "amount_below_minimum",
            Self::FeeInsufficient => "fee_insufficient",
            Self::IncorrectCltvExpiry => "incorrect_cltv_expiry",
            Self::ExpiryTooSoon => "expiry_too_soon",
            Self::IncorrectOrUnknownPaymentDetails => "incorrect_or_unknown_payment_details",
            Self::IncorrectPaymentAmount => "incorrect_payment_amount",
            Self::FinalExpiryTooSoon => "final_expiry_too_soon",
            Self::FinalIncorrectCltvExpiry => "final_incorrect_cltv_expiry",
            Self::FinalIncorrectHtlcAmount => "final_incorrect_htlc_amount",
            Self::ChannelDisabled => "channel_disabled",
            Self::Unknown(_) => "unknown_failure",
        }
    }

    pub fn group(&self) -> FailureGroup {
        match self {
            Self::IncorrectOrUnknownPaymentDetails
            | Self::IncorrectPaymentAmount
            | Self::FinalExpiryTooSoon
            | Self::FinalIncorrectCltvExpiry
            | Self::FinalIncorrectHtlcAmount
            | Self::ExpiryTooSoon => FailureGroup::Destination,

            Self::InvalidRealm
            | Self::InvalidOnionVersion
            | Self::InvalidOnionHmac
            | Self::InvalidOnionKey => FailureGroup::WireProtocol,

            Self::TemporaryChannelFailure
            | Self::AmountBelowMinimum
            | Self::FeeInsufficient
            | Self::IncorrectCltvExpiry
            | Self::ChannelDisabled => FailureGroup::Policy,

            Self::TemporaryNodeFailure
            | Self::PermanentNodeFailure
            | Self::RequiredNodeFeatureMissing
            | Self::PermanentChannelFailure
            | Self::RequiredChannelFeatureMissing
            | Self::UnknownNextPeer => FailureGroup::Node,

            Self::Unknown(_) => FailureGroup::Unrecognized,
        }
    }

    /// Numeric error class: 404, 503 or 500.
    pub fn class(&self) -> u16 {
        match self.group() {
            FailureGroup::Destination => 404,
            FailureGroup::WireProtocol | FailureGroup::Policy | FailureGroup::Node => 503,
            FailureGroup::Unrecognized => 500,
        }
    }

    /// Whether another route might avoid this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self.group(), FailureGroup::Policy | FailureGroup::Node)
    }

    /// Whether the failure message carries a channel update.
    pub fn carries_update(&self) -> bool {
        self.code() & UPDATE != 0 && !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown_failure({:#06x})", code),
            known => write!(f, "{}", known.name()),
        }
    }
}

/// A classified routing failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub code: FailureCode,
    pub class: u16,
    /// Channel the reporting node failed to forward over.
    pub channel: Option<ChannelId>,
    /// Failure source index: 0 is the local node, `i` is route hop `i - 1`.
    pub index: usize,
    /// HTLC amount the reporting node saw, when given.
    pub mtokens: Option<Mtokens>,
    /// Updated policy decoded from the attached channel update.
    pub policy: Option<Policy>,
    /// Reporting node, when known.
    pub public_key: Option<String>,
    pub reason: String,
}

impl FailureDetail {
    /// Whether the destination itself reported the failure.
    pub fn is_from_destination(&self, route: &Route) -> bool {
        self.index >= route.hops.len()
    }

    /// A failure no other route can fix.
    pub fn is_definitive(&self, route: &Route) -> bool {
        self.is_from_destination(route) || !self.code.is_retryable()
    }

    /// The destination refusing the payment terms: proof the route reaches it.
    pub fn is_destination_rejection(&self, route: &Route) -> bool {
        self.is_from_destination(route) && self.code.group() == FailureGroup::Destination
    }

    /// The directed edge that failed, when the failure lies inside the route.
    pub fn failed_edge(&self, route: &Route) -> Option<IgnoreEntry> {
        route
            .hops
            .get(self.index)
            .map(|hop| IgnoreEntry::edge(hop.channel, hop.public_key.clone()))
    }
}

/// A decoded `channel_update` message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpdate {
    pub short_channel_id: ChannelId,
    pub timestamp: u32,
    pub message_flags: u8,
    pub channel_flags: u8,
    pub cltv_expiry_delta: u16,
    pub htlc_minimum_msat: u64,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
    pub htlc_maximum_msat: Option<u64>,
}

/// Message type prefix that may precede an update.
const CHANNEL_UPDATE_TYPE: [u8; 2] = [0x01, 0x02];
const SIGNATURE_LEN: usize = 64;
const CHAIN_HASH_LEN: usize = 32;
/// Update body length without the optional htlc maximum.
const UPDATE_BASE_LEN: usize = SIGNATURE_LEN + CHAIN_HASH_LEN + 8 + 4 + 1 + 1 + 2 + 8 + 4 + 4;
const UPDATE_FULL_LEN: usize = UPDATE_BASE_LEN + 8;

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], UpdateDecodeError> {
        if self.bytes.len() < n {
            return Err(UpdateDecodeError::Truncated { field });
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], UpdateDecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, UpdateDecodeError> {
        Ok(self.array::<1>(field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, UpdateDecodeError> {
        Ok(u16::from_be_bytes(self.array(field)?))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, UpdateDecodeError> {
        Ok(u32::from_be_bytes(self.array(field)?))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, UpdateDecodeError> {
        Ok(u64::from_be_bytes(self.array(field)?))
    }
}

impl ChannelUpdate {
    /// Bit 0 of the channel flags: which endpoint sent the update.
    pub fn direction(&self) -> u8 {
        self.channel_flags & 1
    }

    pub fn is_disabled(&self) -> bool {
        self.channel_flags & 2 != 0
    }

    /// Decode an update body, with or without its type prefix.
    pub fn decode(bytes: &[u8]) -> Result<Self, UpdateDecodeError> {
        let has_prefix = bytes.starts_with(&CHANNEL_UPDATE_TYPE)
            && matches!(bytes.len() - CHANNEL_UPDATE_TYPE.len(), UPDATE_BASE_LEN | UPDATE_FULL_LEN);
        let body = if has_prefix {
            &bytes[CHANNEL_UPDATE_TYPE.len()..]
        } else {
            bytes
        };

        let mut reader = Reader { bytes: body };
        reader.take(SIGNATURE_LEN, "signature")?;
        reader.take(CHAIN_HASH_LEN, "chain_hash")?;
        let short_channel_id = ChannelId::from_number(reader.u64("short_channel_id")?);
        let timestamp = reader.u32("timestamp")?;
        let message_flags = reader.u8("message_flags")?;
        let channel_flags = reader.u8("channel_flags")?;
        let cltv_expiry_delta = reader.u16("cltv_expiry_delta")?;
        let htlc_minimum_msat = reader.u64("htlc_minimum_msat")?;
        let fee_base_msat = reader.u32("fee_base_msat")?;
        let fee_proportional_millionths = reader.u32("fee_proportional_millionths")?;
        let htlc_maximum_msat = if message_flags & 1 != 0 {
            Some(reader.u64("htlc_maximum_msat")?)
        } else {
            None
        };

        Ok(Self {
            short_channel_id,
            timestamp,
            message_flags,
            channel_flags,
            cltv_expiry_delta,
            htlc_minimum_msat,
            fee_base_msat,
            fee_proportional_millionths,
            htlc_maximum_msat,
        })
    }

    /// Encode the update body with a zeroed signature and chain hash.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(UPDATE_FULL_LEN);
        out.extend_from_slice(&[0u8; SIGNATURE_LEN]);
        out.extend_from_slice(&[0u8; CHAIN_HASH_LEN]);
        out.extend_from_slice(&self.short_channel_id.to_number().to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        let message_flags = match self.htlc_maximum_msat {
            Some(_) => self.message_flags | 1,
            None => self.message_flags & !1,
        };
        out.push(message_flags);
        out.push(self.channel_flags);
        out.extend_from_slice(&self.cltv_expiry_delta.to_be_bytes());
        out.extend_from_slice(&self.htlc_minimum_msat.to_be_bytes());
        out.extend_from_slice(&self.fee_base_msat.to_be_bytes());
        out.extend_from_slice(&self.fee_proportional_millionths.to_be_bytes());
        if let Some(max) = self.htlc_maximum_msat {
            out.extend_from_slice(&max.to_be_bytes());
        }
        out
    }

    /// The policy this update announces, owned by the endpoint selected
    /// by the direction bit over the lexicographically ordered keys.
    pub fn to_policy(&self, endpoint_a: &str, endpoint_b: &str) -> Policy {
        let (node_1, node_2) = if endpoint_a <= endpoint_b {
            (endpoint_a, endpoint_b)
        } else {
            (endpoint_b, endpoint_a)
        };
        let owner = if self.direction() == 0 { node_1 } else { node_2 };

        Policy {
            public_key: owner.to_string(),
            base_fee_mtokens: Mtokens::from(self.fee_base_msat),
            fee_rate: u64::from(self.fee_proportional_millionths),
            cltv_delta: u32::from(self.cltv_expiry_delta),
            is_disabled: self.is_disabled(),
            min_htlc_mtokens: Mtokens::from(self.htlc_minimum_msat),
            max_htlc_mtokens: self.htlc_maximum_msat.map(Mtokens::from),
        }
    }
}

/// Decode a hex channel update for `channel` between two endpoints.
pub fn policy_from_update(
    update_hex: &str,
    channel: ChannelId,
    endpoint_a: Option<&str>,
    endpoint_b: Option<&str>,
) -> Result<Policy, UpdateDecodeError> {
    let bytes = hex::decode(update_hex).map_err(|_| UpdateDecodeError::NotHex)?;
    let update = ChannelUpdate::decode(&bytes)?;
    if update.short_channel_id != channel {
        return Err(UpdateDecodeError::ChannelMismatch {
            expected: channel,
            found: update.short_channel_id,
        });
    }
    match (endpoint_a, endpoint_b) {
        (Some(a), Some(b)) => Ok(update.to_policy(a, b)),
        _ => Err(UpdateDecodeError::UnknownEndpoints),
    }
}

/// Whether decoding `raw` will need the local node's key.
///
/// Only an update about the first channel needs it, since the local node
/// is one of that channel's endpoints.
pub fn needs_local_key(raw: &RawPayResponse) -> bool {
    raw.preimage.is_none()
        && raw.failure.as_ref().is_some_and(|f| {
            f.failure_source_index == Some(0)
                && f.channel_update.is_some()
                && f.code.map(FailureCode::from).is_some_and(|c| c.carries_update())
        })
}

fn transport(message: impl Into<String>) -> AttemptOutcome {
    AttemptOutcome::Failure(AttemptFailure::Transport {
        message: message.into(),
    })
}

/// Classify a raw failure against the route it happened on.
pub fn classify_failure(
    raw: &RawFailure,
    route: &Route,
    local_key: Option<&str>,
) -> Result<FailureDetail, String> {
    let code = FailureCode::from(raw.code.ok_or("failure without code")?);
    let index = raw
        .failure_source_index
        .ok_or("failure without source index")?;
    if index > route.hops.len() {
        return Err(format!(
            "failure source index {} beyond route of {} hops",
            index,
            route.hops.len()
        ));
    }

    let mtokens = raw
        .htlc_mtokens
        .as_deref()
        .map(parse_mtokens)
        .transpose()
        .map_err(|e| e.to_string())?;

    let public_key = match index {
        0 => local_key.map(str::to_string),
        i => Some(route.hops[i - 1].public_key.clone()),
    };
    let blamed = route.hops.get(index);

    let policy = match (&raw.channel_update, blamed) {
        (Some(update), Some(hop)) if code.carries_update() => {
            let endpoint = Some(hop.public_key.as_str());
            match policy_from_update(update, hop.channel, public_key.as_deref(), endpoint) {
                Ok(policy) => Some(policy),
                Err(e) => {
                    tracing::warn!(
                        channel = %hop.channel,
                        code = %code,
                        error = %e,
                        "ignoring undecodable channel update"
                    );
                    None
                }
            }
        }
        _ => None,
    };

    Ok(FailureDetail {
        code,
        class: code.class(),
        channel: blamed.map(|hop| hop.channel),
        index,
        mtokens,
        policy,
        public_key,
        reason: raw.reason.clone().unwrap_or_else(|| code.name().to_string()),
    })
}

/// How a returned preimage is checked against the payment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreimageCheck {
    /// The preimage must hash to the payment id.
    MatchId,
    /// Any well-formed preimage counts as settlement. Used for random ids
    /// where a preimage can only mean the destination accepted the HTLC.
    AnyPreimage,
}

/// Decode a pay-via-route response into a closed outcome.
pub fn decode_response(
    id: &PaymentId,
    route: &Route,
    raw: &RawPayResponse,
    local_key: Option<&str>,
) -> AttemptOutcome {
    decode_response_with(id, route, raw, local_key, PreimageCheck::MatchId)
}

/// [`decode_response`] with an explicit preimage check.
pub fn decode_response_with(
    id: &PaymentId,
    route: &Route,
    raw: &RawPayResponse,
    local_key: Option<&str>,
    check: PreimageCheck,
) -> AttemptOutcome {
    if let Some(preimage_hex) = &raw.preimage {
        return match Preimage::from_hex(preimage_hex) {
            Ok(preimage) if check == PreimageCheck::AnyPreimage || id.is_paid_by(&preimage) => {
                AttemptOutcome::Success { preimage }
            }
            Ok(_) => transport("preimage does not match payment id"),
            Err(e) => transport(e.to_string()),
        };
    }

    if let Some(failure) = &raw.failure {
        return match classify_failure(failure, route, local_key) {
            Ok(detail) => AttemptOutcome::Failure(AttemptFailure::Routing(detail)),
            Err(message) => transport(message),
        };
    }

    match raw.error.as_deref() {
        Some(reason) if NO_RESULT_ERRORS.contains(&reason) => {
            AttemptOutcome::Failure(AttemptFailure::NoResult {
                reason: reason.to_string(),
            })
        }
        Some(message) => transport(message),
        None => transport("empty response"),
    }
}
