//! Integration test: pathfinding and route building over channel snapshots.
//!
//! Exercises lnpath-routing the way a caller would: channels arrive as JSON,
//! paths are searched, and routes are resolved with lnpath-core amounts.

use lnpath_integration_tests::{channel_ids, diamond, DESTINATION, HEIGHT, LOCAL};
use lnpath_routing::{
    find_k_paths, hops_from_channels, route_from_hops, Channel, HopPathfinder, IgnoreEntry,
    KPathRequest, PathRequest, Route, RouteRequest, DEFAULT_PATH_LIMIT,
};

fn route_for(channels: &[Channel], ignore: &[IgnoreEntry], mtokens: u128) -> Option<Route> {
    let hops = HopPathfinder::find_path(&PathRequest {
        channels,
        start: LOCAL,
        end: DESTINATION,
        mtokens,
        ignore,
    });
    if hops.is_empty() {
        return None;
    }
    Some(
        route_from_hops(&RouteRequest {
            height: HEIGHT,
            hops,
            initial_cltv: 40,
            mtokens,
        })
        .expect("route should build"),
    )
}

// =========================================================================
// Fixture from a JSON channel list
// =========================================================================

#[test]
fn test_json_fixture_reproduces_known_fee() {
    let channels: Vec<Channel> = serde_json::from_value(serde_json::json!([
        {
            "id": "0",
            "capacity": 16777215,
            "policies": [
                {"public_key": "a", "base_fee_mtokens": "1", "fee_rate": 1, "cltv_delta": 144},
                {"public_key": "b", "base_fee_mtokens": "1000", "fee_rate": 2500, "cltv_delta": 40}
            ]
        },
        {
            "id": "1",
            "capacity": 16777215,
            "policies": [
                {"public_key": "b", "base_fee_mtokens": "2", "fee_rate": 3600, "cltv_delta": 144},
                {"public_key": "c", "base_fee_mtokens": "1", "fee_rate": 1, "cltv_delta": 40}
            ]
        }
    ]))
    .expect("channels should parse");

    let route = route_from_hops(&RouteRequest {
        height: 590_318,
        hops: hops_from_channels(&channels, "c").expect("hops should derive"),
        initial_cltv: 40,
        mtokens: 1_000_000,
    })
    .expect("route should build");

    assert_eq!(route.fee, 3);
    assert_eq!(route.fee_mtokens, 3602);

    let json = serde_json::to_value(&route).unwrap();
    assert_eq!(json["fee_mtokens"], "3602");
    assert_eq!(json["mtokens"], "1003602");
    assert_eq!(json["hops"][0]["channel"], "0x0x0");
}

// =========================================================================
// Route invariants
// =========================================================================

#[test]
fn test_cheapest_route_invariants() {
    let channels = diamond();
    let route = route_for(&channels, &[], 1_000_000).expect("diamond is connected");

    assert_eq!(channel_ids(&route), vec!["1x1x0", "2x1x0", "3x1x0"]);
    assert_eq!(route.destination(), Some(DESTINATION));
    assert_eq!(route.fee_mtokens, 2_200);
    assert_eq!(route.mtokens, 1_002_200);

    // Each hop forwards what the next one forwards plus its fee.
    for pair in route.hops.windows(2) {
        assert_eq!(pair[0].forward_mtokens, pair[1].forward_mtokens + pair[1].fee_mtokens);
        assert!(pair[0].timeout >= pair[1].timeout);
    }
    assert!(route.timeout > HEIGHT);
    assert!(route.timeout > route.hops[0].timeout);

    // Hop public keys follow the traversed channels.
    for (hop, expected) in route.hops.iter().zip(["02bb", "02cc", DESTINATION]) {
        assert_eq!(hop.public_key, expected);
    }
}

#[test]
fn test_pathfinding_is_deterministic() {
    let channels = diamond();
    let first = route_for(&channels, &[], 250_000);
    for _ in 0..10 {
        assert_eq!(route_for(&channels, &[], 250_000), first);
    }
}

#[test]
fn test_ignored_edge_forces_alternative() {
    let channels = diamond();
    let ignore = [IgnoreEntry::edge("2x1x0".parse().unwrap(), "02cc")];
    let route = route_for(&channels, &ignore, 1_000_000).unwrap();
    assert_eq!(channel_ids(&route), vec!["1x1x0", "4x1x0", "5x1x0"]);

    let ignore = [IgnoreEntry::node("02bb")];
    let route = route_for(&channels, &ignore, 1_000_000).unwrap();
    assert_eq!(channel_ids(&route), vec!["6x1x0", "7x1x0"]);

    let ignore = [IgnoreEntry::node("02bb"), IgnoreEntry::node("02ff")];
    assert!(route_for(&channels, &ignore, 1_000_000).is_none());
}

#[test]
fn test_capacity_bounds_the_amount() {
    let channels = diamond();
    // 5,000,000 tokens of capacity cannot carry 6,000,000,000 mtokens.
    assert!(route_for(&channels, &[], 6_000_000_000).is_none());
}

// =========================================================================
// K paths
// =========================================================================

#[test]
fn test_k_paths_are_distinct_and_bounded() {
    let channels = diamond();
    let request = KPathRequest {
        channels: &channels,
        start: LOCAL,
        end: DESTINATION,
        mtokens: 1_000_000,
        ignore: &[],
        limit: DEFAULT_PATH_LIMIT,
    };
    let paths = find_k_paths(&request);
    assert_eq!(paths.len(), 3);

    let first = paths[0].iter().map(|h| h.channel.unwrap().to_string()).collect::<Vec<_>>();
    assert_eq!(first, vec!["1x1x0", "2x1x0", "3x1x0"]);

    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            assert_ne!(a, b);
        }
    }

    let limited = find_k_paths(&KPathRequest { limit: 2, ..request });
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[..], paths[..2]);
}
