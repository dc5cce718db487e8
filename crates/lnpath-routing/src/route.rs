use lnpath_core::amount::{
    fee_for_forward, mtokens_string, option_mtokens_string, tokens_from_mtokens, Mtokens,
};
use lnpath_core::ChannelId;
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::graph::{Channel, Policy};

/// One unresolved hop of a path.
///
/// `public_key` is the node this hop delivers to. The fee terms are what
/// that node charges to forward onward; on the final hop they are unused.
/// Every field is optional so that routes assembled by callers can be
/// validated by [`route_from_hops`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    #[serde(default)]
    pub channel: Option<ChannelId>,
    #[serde(default)]
    pub channel_capacity: Option<u64>,
    #[serde(default, with = "option_mtokens_string")]
    pub base_fee_mtokens: Option<Mtokens>,
    #[serde(default)]
    pub fee_rate: Option<u64>,
    #[serde(default)]
    pub cltv_delta: Option<u32>,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl Hop {
    /// A fully populated hop over `channel` to `public_key`, charging `terms`.
    pub fn new(channel: &Channel, public_key: &str, terms: &Policy) -> Self {
        Self {
            channel: Some(channel.id),
            channel_capacity: Some(channel.capacity),
            base_fee_mtokens: Some(terms.base_fee_mtokens),
            fee_rate: Some(terms.fee_rate),
            cltv_delta: Some(terms.cltv_delta),
            public_key: Some(public_key.to_string()),
        }
    }
}

/// A hop with its concrete amounts and timeout resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedHop {
    pub channel: ChannelId,
    pub channel_capacity: Option<u64>,
    /// Fee kept by this hop's node, in tokens (floor).
    pub fee: u64,
    #[serde(with = "mtokens_string")]
    pub fee_mtokens: Mtokens,
    /// Amount this hop's node sends onward, in tokens (floor).
    pub forward: u64,
    #[serde(with = "mtokens_string")]
    pub forward_mtokens: Mtokens,
    pub timeout: u32,
    pub public_key: String,
}

/// A fully resolved, payable route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub hops: Vec<ExecutedHop>,
    pub fee: u64,
    #[serde(with = "mtokens_string")]
    pub fee_mtokens: Mtokens,
    #[serde(with = "mtokens_string")]
    pub mtokens: Mtokens,
    pub timeout: u32,
    pub tokens: u64,
}

impl Route {
    pub fn destination(&self) -> Option<&str> {
        self.hops.last().map(|h| h.public_key.as_str())
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// Input to [`route_from_hops`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Current best block height.
    pub height: u32,
    pub hops: Vec<Hop>,
    /// CLTV buffer for the final hop.
    pub initial_cltv: u32,
    /// Amount to deliver to the destination.
    #[serde(with = "mtokens_string")]
    pub mtokens: Mtokens,
}

/// Derive hops for a chain of channels ending at `destination`.
///
/// Each hop takes the policy its `public_key` holds on the hop's own
/// channel, except the first hop which prefers that node's policy on the
/// second channel when one exists.
pub fn hops_from_channels(channels: &[Channel], destination: &str) -> Result<Vec<Hop>, RoutingError> {
    if channels.is_empty() {
        return Err(RoutingError::EmptyRoute);
    }

    let mut to_nodes: Vec<&str> = vec![""; channels.len()];
    let mut current = destination;
    for (idx, channel) in channels.iter().enumerate().rev() {
        let previous = channel
            .peer_of(current)
            .ok_or_else(|| RoutingError::DisconnectedChannel {
                channel: channel.id,
                expected: current.to_string(),
            })?;
        to_nodes[idx] = current;
        current = previous;
    }

    let mut hops = Vec::with_capacity(channels.len());
    for (idx, (channel, public_key)) in channels.iter().zip(&to_nodes).enumerate() {
        let own = channel
            .policy_of(public_key)
            .ok_or_else(|| RoutingError::MissingPolicy {
                channel: channel.id,
                public_key: public_key.to_string(),
            })?;

        let terms = match channels.get(1) {
            Some(next) if idx == 0 => next.policy_of(public_key).unwrap_or(own),
            _ => own,
        };

        hops.push(Hop::new(channel, public_key, terms));
    }

    tracing::debug!(
        destination = %destination,
        hops = hops.len(),
        "derived hops from channels"
    );

    Ok(hops)
}

/// Fully validated fields of one hop.
struct HopTerms<'a> {
    channel: ChannelId,
    channel_capacity: Option<u64>,
    base_fee_mtokens: Mtokens,
    fee_rate: u64,
    cltv_delta: u32,
    public_key: &'a str,
}

fn validate_hop(index: usize, hop: &Hop) -> Result<HopTerms<'_>, RoutingError> {
    let missing = |field| RoutingError::MissingHopField { index, field };
    Ok(HopTerms {
        base_fee_mtokens: hop.base_fee_mtokens.ok_or_else(|| missing("base_fee_mtokens"))?,
        channel: hop.channel.ok_or_else(|| missing("channel"))?,
        channel_capacity: hop.channel_capacity,
        cltv_delta: hop.cltv_delta.ok_or_else(|| missing("cltv_delta"))?,
        fee_rate: hop.fee_rate.ok_or_else(|| missing("fee_rate"))?,
        public_key: hop.public_key.as_deref().ok_or_else(|| missing("public_key"))?,
    })
}

/// Resolve per-hop amounts and timeouts for delivering `mtokens`.
///
/// Works backward from the destination: the final hop forwards exactly
/// `mtokens` with no fee, and each earlier hop forwards what the next hop
/// forwards plus the next hop's fee.
pub fn route_from_hops(request: &RouteRequest) -> Result<Route, RoutingError> {
    if request.hops.is_empty() {
        return Err(RoutingError::EmptyRoute);
    }

    let terms = request
        .hops
        .iter()
        .enumerate()
        .map(|(index, hop)| validate_hop(index, hop))
        .collect::<Result<Vec<_>, _>>()?;

    let last = terms.len() - 1;
    let final_timeout = request
        .height
        .checked_add(request.initial_cltv)
        .ok_or(RoutingError::TimeoutOverflow { index: last })?;

    let mut forwards: Vec<Mtokens> = vec![0; terms.len()];
    let mut fees: Vec<Mtokens> = vec![0; terms.len()];
    let mut timeouts: Vec<u32> = vec![0; terms.len()];

    forwards[last] = request.mtokens;
    timeouts[last] = final_timeout;

    for i in (0..last).rev() {
        let overflow = RoutingError::AmountOverflow { index: i };
        forwards[i] = forwards[i + 1]
            .checked_add(fees[i + 1])
            .ok_or_else(|| overflow.clone())?;
        fees[i] = fee_for_forward(terms[i].base_fee_mtokens, terms[i].fee_rate, forwards[i])
            .ok_or(overflow)?;

        // The destination's own delta never applies.
        let delta = if i + 1 < last { terms[i + 1].cltv_delta } else { 0 };
        timeouts[i] = timeouts[i + 1]
            .checked_add(delta)
            .ok_or(RoutingError::TimeoutOverflow { index: i })?;
    }

    let first_delta = if last > 0 { terms[0].cltv_delta } else { 0 };
    let timeout = timeouts[0]
        .checked_add(first_delta)
        .ok_or(RoutingError::TimeoutOverflow { index: 0 })?;

    let overflow = RoutingError::AmountOverflow { index: 0 };
    let fee_mtokens = fees
        .iter()
        .try_fold(0, |sum: Mtokens, fee| sum.checked_add(*fee))
        .ok_or_else(|| overflow.clone())?;
    let mtokens = forwards[0]
        .checked_add(fees[0])
        .ok_or_else(|| overflow.clone())?;

    let tokens = |index: usize, mtokens: Mtokens| {
        tokens_from_mtokens(mtokens).ok_or(RoutingError::AmountOverflow { index })
    };

    let hops = terms
        .iter()
        .enumerate()
        .map(|(i, t)| {
            Ok(ExecutedHop {
                channel: t.channel,
                channel_capacity: t.channel_capacity,
                fee: tokens(i, fees[i])?,
                fee_mtokens: fees[i],
                forward: tokens(i, forwards[i])?,
                forward_mtokens: forwards[i],
                timeout: timeouts[i],
                public_key: t.public_key.to_string(),
            })
        })
        .collect::<Result<Vec<_>, RoutingError>>()?;

    let route = Route {
        hops,
        fee: tokens(0, fee_mtokens)?,
        fee_mtokens,
        mtokens,
        timeout,
        tokens: tokens(0, mtokens)?,
    };

    tracing::debug!(
        hops = route.hops.len(),
        mtokens = %route.mtokens,
        fee_mtokens = %route.fee_mtokens,
        timeout = route.timeout,
        "built route"
    );

    Ok(route)
}
