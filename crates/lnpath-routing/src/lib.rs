//! lnpath routing: route computation over a channel graph snapshot.
//!
//! This crate provides:
//! - [`Channel`] and [`Policy`]: the read-only graph model, plus [`IgnoreEntry`].
//! - [`HopPathfinder`]: the cheapest route for an amount, found by a
//!   backward fee-weighted Dijkstra.
//! - [`find_k_paths`]: alternative paths by spur deviation.
//! - [`hops_from_channels`] and [`route_from_hops`]: resolving hops into a
//!   payable [`Route`] with exact fees and timeouts.

pub mod error;
pub mod graph;
pub mod kpaths;
pub mod pathfinder;
pub mod route;

// Re-exports for convenience.
pub use error::RoutingError;
pub use graph::{Channel, IgnoreEntry, Policy};
pub use kpaths::{find_k_paths, KPathRequest, DEFAULT_PATH_LIMIT};
pub use pathfinder::{HopPathfinder, PathRequest};
pub use route::{hops_from_channels, route_from_hops, ExecutedHop, Hop, Route, RouteRequest};
