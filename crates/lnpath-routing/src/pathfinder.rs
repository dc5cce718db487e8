use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use lnpath_core::amount::{fee_for_forward, Mtokens};

use crate::graph::{Channel, ChannelGraph, IgnoreEntry, Ignored, Policy};
use crate::route::Hop;

/// Input to the hop pathfinder.
#[derive(Debug, Clone, Copy)]
pub struct PathRequest<'a> {
    pub channels: &'a [Channel],
    /// Paying node.
    pub start: &'a str,
    /// Destination node.
    pub end: &'a str,
    /// Amount to deliver to `end`.
    pub mtokens: Mtokens,
    pub ignore: &'a [IgnoreEntry],
}

/// One traversed channel, by index into the channel slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Step {
    pub(crate) channel: usize,
    pub(crate) to: String,
}

/// Priority queue entry. Ordered by distance only, lowest first.
#[derive(Debug)]
struct SearchNode<'a> {
    node: &'a str,
    /// Total fee to deliver from `node` to the destination.
    distance: Mtokens,
}

impl PartialEq for SearchNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for SearchNode<'_> {}

impl PartialOrd for SearchNode<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchNode<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the cheapest pops first.
        other.distance.cmp(&self.distance)
    }
}

/// Finds the cheapest route to deliver an amount from one node to another.
///
/// The search runs backward from the destination so that every edge is
/// weighed with the exact amount that must cross it, fees included.
pub struct HopPathfinder;

impl HopPathfinder {
    /// Find the cheapest hop chain from `start` to `end`.
    ///
    /// Returns an empty chain when `start == end` or `end` is unreachable.
    pub fn find_path(request: &PathRequest<'_>) -> Vec<Hop> {
        let graph = ChannelGraph::new(request.channels);
        let ignored = Ignored::from_entries(request.ignore);

        match find_steps(&graph, &ignored, request.start, request.end, request.mtokens) {
            Some(steps) => hops_for_steps(&graph, &steps),
            None => Vec::new(),
        }
    }
}

/// Whether `from` may forward `mtokens` over `channel` toward `to`.
fn edge_usable<'a>(
    channel: &'a Channel,
    from: &str,
    to: &str,
    start: &str,
    mtokens: Mtokens,
    ignored: &Ignored,
) -> Option<&'a Policy> {
    let policy = channel.policy_of(from)?;

    // Senders may always try their own channels.
    if policy.is_disabled && from != start {
        return None;
    }
    if mtokens > channel.capacity_mtokens() || !policy.accepts_htlc(mtokens) {
        return None;
    }
    if ignored.is_node_ignored(from) || ignored.is_node_ignored(to) {
        return None;
    }
    if ignored.is_edge_ignored(channel.id, to) {
        return None;
    }

    Some(policy)
}

/// Backward Dijkstra from `end`; returns the traversed channels from `start`.
pub(crate) fn find_steps(
    graph: &ChannelGraph<'_>,
    ignored: &Ignored,
    start: &str,
    end: &str,
    mtokens: Mtokens,
) -> Option<Vec<Step>> {
    if start == end {
        return None;
    }

    let mut distances: HashMap<&str, Mtokens> = HashMap::new();
    let mut next: HashMap<&str, (usize, &str)> = HashMap::new();
    let mut heap: BinaryHeap<SearchNode<'_>> = BinaryHeap::new();

    distances.insert(end, 0);
    heap.push(SearchNode {
        node: end,
        distance: 0,
    });

    let mut reached = false;
    while let Some(SearchNode { node, distance }) = heap.pop() {
        if node == start {
            reached = true;
            break;
        }
        if distances.get(node).is_some_and(|best| distance > *best) {
            continue;
        }

        // Amount `node` must receive to deliver `mtokens` onward.
        let Some(amount) = mtokens.checked_add(distance) else {
            continue;
        };

        for &idx in graph.channels_of(node) {
            let channel = graph.channel(idx);
            let Some(peer) = channel.peer_of(node) else {
                continue;
            };
            let Some(policy) = edge_usable(channel, peer, node, start, amount, ignored) else {
                continue;
            };

            let fee = if peer == start {
                Some(0)
            } else {
                fee_for_forward(policy.base_fee_mtokens, policy.fee_rate, amount)
            };
            // An edge whose fee cannot be represented is unusable.
            let Some(candidate) = fee.and_then(|fee| distance.checked_add(fee)) else {
                continue;
            };

            let improves = distances.get(peer).map_or(true, |best| candidate < *best);
            if improves {
                distances.insert(peer, candidate);
                next.insert(peer, (idx, node));
                heap.push(SearchNode {
                    node: peer,
                    distance: candidate,
                });
            }
        }
    }

    if !reached {
        tracing::debug!(start = %start, end = %end, "no path found");
        return None;
    }

    let mut steps = Vec::new();
    let mut current = start;
    while current != end {
        let (channel, to) = *next.get(current)?;
        steps.push(Step {
            channel,
            to: to.to_string(),
        });
        current = to;
        if steps.len() > next.len() {
            return None;
        }
    }

    tracing::debug!(
        start = %start,
        end = %end,
        hops = steps.len(),
        fee_mtokens = %distances.get(start).copied().unwrap_or_default(),
        "found path"
    );

    Some(steps)
}

/// Turn traversed channels into hops.
///
/// Each hop carries the fee terms its node charges on the following
/// channel; the final hop carries the destination's own policy.
pub(crate) fn hops_for_steps(graph: &ChannelGraph<'_>, steps: &[Step]) -> Vec<Hop> {
    steps
        .iter()
        .enumerate()
        .map(|(j, step)| {
            let channel = graph.channel(step.channel);
            let terms_channel = steps.get(j + 1).map_or(channel, |s| graph.channel(s.channel));
            match terms_channel.policy_of(&step.to) {
                Some(terms) => Hop::new(channel, &step.to, terms),
                // Final-hop terms are never charged.
                None => Hop::new(channel, &step.to, &zero_policy(&step.to)),
            }
        })
        .collect()
}

fn zero_policy(public_key: &str) -> Policy {
    Policy {
        public_key: public_key.to_string(),
        base_fee_mtokens: 0,
        fee_rate: 0,
        cltv_delta: 0,
        is_disabled: false,
        min_htlc_mtokens: 0,
        max_htlc_mtokens: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{channel, policy};
    use lnpath_core::ChannelId;

    fn keys(hops: &[Hop]) -> Vec<&str> {
        hops.iter().map(|h| h.public_key.as_deref().unwrap()).collect()
    }

    fn ids(hops: &[Hop]) -> Vec<String> {
        hops.iter().map(|h| h.channel.unwrap().to_string()).collect()
    }

    fn request<'a>(channels: &'a [Channel], start: &'a str, end: &'a str) -> PathRequest<'a> {
        PathRequest {
            channels,
            start,
            end,
            mtokens: 100_000,
            ignore: &[],
        }
    }

    /// ```text
    ///        B ---- D
    ///       /        \
    ///   A --          E
    ///       \        /
    ///        C -----
    /// ```
    /// The route through C is cheaper than the one through B and D.
    fn diamond() -> Vec<Channel> {
        vec![
            channel("1x0x0", 1_000, policy("A", 0, 0, 40), policy("B", 1_000, 100, 40)),
            channel("2x0x0", 1_000, policy("B", 1_000, 100, 40), policy("D", 1_000, 100, 40)),
            channel("3x0x0", 1_000, policy("D", 1_000, 100, 40), policy("E", 0, 0, 40)),
            channel("4x0x0", 1_000, policy("A", 0, 0, 40), policy("C", 500, 100, 40)),
            channel("5x0x0", 1_000, policy("C", 500, 100, 40), policy("E", 0, 0, 40)),
        ]
    }

    #[test]
    fn test_finds_cheapest_path() {
        let channels = diamond();
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["C", "E"]);
        assert_eq!(ids(&hops), vec!["4x0x0", "5x0x0"]);
        // C's terms on the next channel.
        assert_eq!(hops[0].base_fee_mtokens, Some(500));
    }

    #[test]
    fn test_same_start_and_end_is_empty() {
        let channels = diamond();
        assert!(HopPathfinder::find_path(&request(&channels, "A", "A")).is_empty());
    }

    #[test]
    fn test_unreachable_is_empty() {
        let channels = diamond();
        assert!(HopPathfinder::find_path(&request(&channels, "A", "Z")).is_empty());
        assert!(HopPathfinder::find_path(&request(&[], "A", "E")).is_empty());
    }

    #[test]
    fn test_ignored_node_is_avoided() {
        let channels = diamond();
        let ignore = [IgnoreEntry::node("C")];
        let hops = HopPathfinder::find_path(&PathRequest {
            ignore: &ignore,
            ..request(&channels, "A", "E")
        });
        assert_eq!(keys(&hops), vec!["B", "D", "E"]);
    }

    #[test]
    fn test_ignored_edge_is_avoided() {
        let channels = diamond();
        let id: ChannelId = "5x0x0".parse().unwrap();
        let ignore = [IgnoreEntry::edge(id, "E")];
        let hops = HopPathfinder::find_path(&PathRequest {
            ignore: &ignore,
            ..request(&channels, "A", "E")
        });
        assert_eq!(keys(&hops), vec!["B", "D", "E"]);

        // The other direction of the same channel stays usable.
        let ignore = [IgnoreEntry::edge(id, "C")];
        let hops = HopPathfinder::find_path(&PathRequest {
            ignore: &ignore,
            ..request(&channels, "A", "E")
        });
        assert_eq!(keys(&hops), vec!["C", "E"]);
    }

    #[test]
    fn test_capacity_limits_amount() {
        let channels = diamond();
        // 1_000 tokens of capacity cannot carry 2_000_000 mtokens.
        let hops = HopPathfinder::find_path(&PathRequest {
            mtokens: 2_000_000,
            ..request(&channels, "A", "E")
        });
        assert!(hops.is_empty());
    }

    #[test]
    fn test_htlc_bounds_reject_edge() {
        let mut channels = diamond();
        channels[4].policies[0].max_htlc_mtokens = Some(50_000);
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["B", "D", "E"]);

        let mut channels = diamond();
        channels[4].policies[0].min_htlc_mtokens = 200_000;
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["B", "D", "E"]);
    }

    #[test]
    fn test_disabled_policy_skipped_except_from_start() {
        let mut channels = diamond();
        channels[4].policies[0].is_disabled = true;
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["B", "D", "E"]);

        let mut channels = diamond();
        channels[3].policies[0].is_disabled = true;
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["C", "E"]);
    }

    #[test]
    fn test_start_pays_no_fee() {
        // The only difference between the two first channels is A's own fee.
        let channels = vec![
            channel("1x0x0", 1_000, policy("A", 90_000, 0, 40), policy("B", 0, 0, 40)),
            channel("2x0x0", 1_000, policy("B", 10, 0, 40), policy("E", 0, 0, 40)),
            channel("3x0x0", 1_000, policy("A", 0, 0, 40), policy("C", 0, 0, 40)),
            channel("4x0x0", 1_000, policy("C", 20, 0, 40), policy("E", 0, 0, 40)),
        ];
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["B", "E"]);
    }

    #[test]
    fn test_unrepresentable_fee_skips_edge() {
        let mut channels = diamond();
        // C's proportional fee on 100_000 mtokens no longer fits in a u128.
        channels[4].policies[0].fee_rate = u64::MAX;
        channels[4].policies[0].base_fee_mtokens = Mtokens::MAX;
        let hops = HopPathfinder::find_path(&request(&channels, "A", "E"));
        assert_eq!(keys(&hops), vec!["B", "D", "E"]);
    }

    #[test]
    fn test_path_matches_traversed_channels() {
        let channels = diamond();
        let hops = HopPathfinder::find_path(&PathRequest {
            ignore: &[IgnoreEntry::node("C")],
            ..request(&channels, "A", "E")
        });
        let mut current = "A";
        for hop in &hops {
            let ch = channels
                .iter()
                .find(|c| Some(c.id) == hop.channel)
                .unwrap();
            assert_eq!(ch.peer_of(current), hop.public_key.as_deref());
            current = hop.public_key.as_deref().unwrap();
        }
        assert_eq!(current, "E");
    }

    #[test]
    fn test_deterministic() {
        let channels = diamond();
        let ignore = [IgnoreEntry::node("D")];
        let req = PathRequest {
            ignore: &ignore,
            ..request(&channels, "A", "E")
        };
        let first = HopPathfinder::find_path(&req);
        for _ in 0..10 {
            assert_eq!(HopPathfinder::find_path(&req), first);
        }
    }
}
