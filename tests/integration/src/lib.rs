//! Shared graph fixtures for the scenario tests.

use lnpath_core::Mtokens;
use lnpath_routing::{Channel, Policy};

/// The paying node in [`diamond`].
pub const LOCAL: &str = "02aa";
/// The payee in [`diamond`].
pub const DESTINATION: &str = "02ee";
pub const HEIGHT: u32 = 700_000;

pub fn policy(public_key: &str, base_fee_mtokens: Mtokens, fee_rate: u64, cltv_delta: u32) -> Policy {
    Policy {
        public_key: public_key.to_string(),
        base_fee_mtokens,
        fee_rate,
        cltv_delta,
        is_disabled: false,
        min_htlc_mtokens: 1_000,
        max_htlc_mtokens: None,
    }
}

pub fn channel(id: &str, capacity: u64, a: Policy, b: Policy) -> Channel {
    Channel {
        id: id.parse().expect("fixture channel id"),
        capacity,
        policies: vec![a, b],
    }
}

/// Three paths from [`LOCAL`] to [`DESTINATION`], cheapest first:
///
/// - `1x1x0` 02bb `2x1x0` 02cc `3x1x0` 02ee
/// - `1x1x0` 02bb `4x1x0` 02dd `5x1x0` 02ee
/// - `6x1x0` 02ff `7x1x0` 02ee
pub fn diamond() -> Vec<Channel> {
    let cap = 5_000_000;
    vec![
        channel("1x1x0", cap, policy(LOCAL, 0, 0, 40), policy("02bb", 1_000, 100, 40)),
        channel("2x1x0", cap, policy("02bb", 1_000, 100, 40), policy("02cc", 1_000, 100, 40)),
        channel("3x1x0", cap, policy("02cc", 1_000, 100, 40), policy(DESTINATION, 0, 0, 40)),
        channel("4x1x0", cap, policy("02bb", 1_000, 100, 40), policy("02dd", 3_000, 100, 40)),
        channel("5x1x0", cap, policy("02dd", 3_000, 100, 40), policy(DESTINATION, 0, 0, 40)),
        channel("6x1x0", cap, policy(LOCAL, 0, 0, 40), policy("02ff", 9_000, 100, 40)),
        channel("7x1x0", cap, policy("02ff", 9_000, 100, 40), policy(DESTINATION, 0, 0, 40)),
    ]
}

/// Channel ids a route traverses, in order.
pub fn channel_ids(route: &lnpath_routing::Route) -> Vec<String> {
    route.hops.iter().map(|h| h.channel.to_string()).collect()
}
