use std::collections::{HashMap, HashSet};

use lnpath_core::amount::{mtokens_string, option_mtokens_string, Mtokens, MTOKENS_PER_TOKEN};
use lnpath_core::ChannelId;
use serde::{Deserialize, Serialize};

/// One endpoint's directional forwarding policy on a channel.
///
/// The policy belongs to the node that forwards *out of* the channel in
/// this direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub public_key: String,
    #[serde(with = "mtokens_string")]
    pub base_fee_mtokens: Mtokens,
    /// Proportional fee in parts per million.
    pub fee_rate: u64,
    pub cltv_delta: u32,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default, with = "mtokens_string")]
    pub min_htlc_mtokens: Mtokens,
    #[serde(default, with = "option_mtokens_string")]
    pub max_htlc_mtokens: Option<Mtokens>,
}

impl Policy {
    /// Whether an HTLC of `mtokens` fits inside this policy's HTLC bounds.
    pub fn accepts_htlc(&self, mtokens: Mtokens) -> bool {
        if mtokens < self.min_htlc_mtokens {
            return false;
        }
        match self.max_htlc_mtokens {
            Some(max) => mtokens <= max,
            None => true,
        }
    }
}

/// A channel snapshot with one policy per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    /// Capacity in tokens.
    pub capacity: u64,
    pub policies: Vec<Policy>,
}

impl Channel {
    /// The policy owned by `public_key`, if it is an endpoint.
    pub fn policy_of(&self, public_key: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.public_key == public_key)
    }

    /// The endpoint on the other side from `public_key`.
    pub fn peer_of(&self, public_key: &str) -> Option<&str> {
        if self.policy_of(public_key).is_none() {
            return None;
        }
        self.policies
            .iter()
            .map(|p| p.public_key.as_str())
            .find(|key| *key != public_key)
    }

    pub fn connects(&self, public_key: &str) -> bool {
        self.policy_of(public_key).is_some()
    }

    pub fn capacity_mtokens(&self) -> Mtokens {
        Mtokens::from(self.capacity) * MTOKENS_PER_TOKEN
    }
}

/// An entry excluded from pathfinding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IgnoreEntry {
    /// Never route through this node.
    Node { public_key: String },
    /// Never use the direction of `channel` that delivers to `public_key`.
    Edge {
        channel: ChannelId,
        public_key: String,
    },
}

impl IgnoreEntry {
    pub fn node(public_key: impl Into<String>) -> Self {
        Self::Node {
            public_key: public_key.into(),
        }
    }

    pub fn edge(channel: ChannelId, public_key: impl Into<String>) -> Self {
        Self::Edge {
            channel,
            public_key: public_key.into(),
        }
    }
}

/// Set form of an ignore list for constant-time lookups.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ignored {
    nodes: HashSet<String>,
    edges: HashSet<(ChannelId, String)>,
}

impl Ignored {
    pub(crate) fn from_entries(entries: &[IgnoreEntry]) -> Self {
        let mut ignored = Self::default();
        for entry in entries {
            match entry {
                IgnoreEntry::Node { public_key } => ignored.add_node(public_key),
                IgnoreEntry::Edge {
                    channel,
                    public_key,
                } => ignored.add_edge(*channel, public_key),
            }
        }
        ignored
    }

    pub(crate) fn add_node(&mut self, public_key: &str) {
        self.nodes.insert(public_key.to_string());
    }

    pub(crate) fn add_edge(&mut self, channel: ChannelId, public_key: &str) {
        self.edges.insert((channel, public_key.to_string()));
    }

    pub(crate) fn is_node_ignored(&self, public_key: &str) -> bool {
        self.nodes.contains(public_key)
    }

    pub(crate) fn is_edge_ignored(&self, channel: ChannelId, to: &str) -> bool {
        self.edges.contains(&(channel, to.to_string()))
    }
}

/// Read-only per-call view over a channel snapshot, indexed by node.
///
/// Channel indexes are positions in the slice; each node's channel list
/// keeps input order.
pub(crate) struct ChannelGraph<'a> {
    channels: &'a [Channel],
    by_node: HashMap<&'a str, Vec<usize>>,
}

impl<'a> ChannelGraph<'a> {
    pub(crate) fn new(channels: &'a [Channel]) -> Self {
        let mut by_node: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (idx, channel) in channels.iter().enumerate() {
            for policy in &channel.policies {
                by_node.entry(policy.public_key.as_str()).or_default().push(idx);
            }
        }
        Self { channels, by_node }
    }

    pub(crate) fn channel(&self, idx: usize) -> &'a Channel {
        &self.channels[idx]
    }

    pub(crate) fn channels_of(&self, public_key: &str) -> &[usize] {
        self.by_node
            .get(public_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
