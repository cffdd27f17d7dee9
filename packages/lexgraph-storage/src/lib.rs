pub mod db;
pub mod kv;
pub mod memory;
pub mod passages;
pub mod schema;

mod error;

pub use error::Error;

use std::{future::Future, pin::Pin};

use serde::Serialize;
use serde_json::Value;
use time::Duration;

use lexgraph_domain::{Neighbor, Passage};

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphStats {
	pub node_count: u64,
	pub relationship_count: u64,
	pub avg_connections: f64,
}
impl GraphStats {
	pub fn from_counts(node_count: u64, relationship_count: u64) -> Self {
		let avg_connections = if node_count == 0 {
			0.0
		} else {
			((relationship_count as f64 / node_count as f64) * 100.0).round() / 100.0
		};

		Self { node_count, relationship_count, avg_connections }
	}
}

/// Read-only access to a namespaced passage graph.
pub trait GraphStore
where
	Self: Send + Sync,
{
	/// Returns passages whose normalized text contains at least one token, in ascending
	/// insertion order.
	fn scan_matching<'a>(
		&'a self,
		namespace: &'a str,
		tokens: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Passage>>>;

	/// Returns passages within `1..=hop_depth` undirected hops of each seed, excluding the seeds
	/// and empty-text passages, ordered by `(seed_id, hops, id)` with at most `limit_per_seed`
	/// rows per seed.
	fn neighbors<'a>(
		&'a self,
		namespace: &'a str,
		seed_ids: &'a [String],
		hop_depth: u32,
		limit_per_seed: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>>;

	fn stats<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, Result<GraphStats>>;

	fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

/// Transient key-value state such as archived query sessions.
pub trait KvStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: Option<Duration>,
	) -> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stats_round_average_connections() {
		let stats = GraphStats::from_counts(3, 2);

		assert!((stats.avg_connections - 0.67).abs() < 1e-9);
		assert_eq!(GraphStats::from_counts(0, 5).avg_connections, 0.0);
	}
}
