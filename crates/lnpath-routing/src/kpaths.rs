use std::collections::{HashSet, VecDeque};

use lnpath_core::amount::Mtokens;
use lnpath_core::RoutingConfig;

use crate::graph::{Channel, ChannelGraph, IgnoreEntry, Ignored};
use crate::pathfinder::{find_steps, hops_for_steps, Step};
use crate::route::Hop;

/// Default number of alternative paths.
pub const DEFAULT_PATH_LIMIT: usize = 20;

/// Input to the k-path finder.
#[derive(Debug, Clone, Copy)]
pub struct KPathRequest<'a> {
    pub channels: &'a [Channel],
    pub start: &'a str,
    pub end: &'a str,
    pub mtokens: Mtokens,
    pub ignore: &'a [IgnoreEntry],
    /// Maximum number of paths to return.
    pub limit: usize,
}

impl KPathRequest<'_> {
    /// Take the path limit from `config`.
    pub fn with_config(mut self, config: &RoutingConfig) -> Self {
        self.limit = config.path_limit;
        self
    }
}

/// Find up to `limit` distinct paths from `start` to `end`.
///
/// The first path is the cheapest one. Each later path deviates from its
/// predecessor at some spur node. Candidates are accepted in the order
/// they were discovered, not by cost.
pub fn find_k_paths(request: &KPathRequest<'_>) -> Vec<Vec<Hop>> {
    if request.limit == 0 {
        return Vec::new();
    }

    let graph = ChannelGraph::new(request.channels);
    let base = Ignored::from_entries(request.ignore);

    let Some(first) = find_steps(&graph, &base, request.start, request.end, request.mtokens) else {
        return Vec::new();
    };

    let mut seen: HashSet<Vec<Step>> = HashSet::new();
    seen.insert(first.clone());
    let mut accepted: Vec<Vec<Step>> = vec![first];
    let mut candidates: VecDeque<Vec<Step>> = VecDeque::new();

    while accepted.len() < request.limit {
        let previous = accepted[accepted.len() - 1].clone();

        for spur_index in 0..previous.len() {
            let root = &previous[..spur_index];
            let spur_node = root.last().map_or(request.start, |s| s.to.as_str());

            let mut ignored = base.clone();
            for path in &accepted {
                if path.len() > spur_index && path[..spur_index] == *root {
                    let step = &path[spur_index];
                    ignored.add_edge(graph.channel(step.channel).id, &step.to);
                }
            }
            if spur_index > 0 {
                ignored.add_node(request.start);
            }
            for step in root.iter().take(spur_index.saturating_sub(1)) {
                ignored.add_node(&step.to);
            }

            let Some(spur) = find_steps(&graph, &ignored, spur_node, request.end, request.mtokens)
            else {
                continue;
            };

            let mut candidate = root.to_vec();
            candidate.extend(spur);
            if seen.insert(candidate.clone()) {
                candidates.push_back(candidate);
            }
        }

        match candidates.pop_front() {
            Some(next) => accepted.push(next),
            None => break,
        }
    }

    tracing::debug!(
        start = %request.start,
        end = %request.end,
        paths = accepted.len(),
        limit = request.limit,
        "k-path search finished"
    );

    accepted
        .iter()
        .map(|steps| hops_for_steps(&graph, steps))
        .collect()
}
