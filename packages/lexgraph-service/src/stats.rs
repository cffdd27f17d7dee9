use std::{collections::VecDeque, sync::Mutex};

use serde::Serialize;

use lexgraph_storage::GraphStats;

use crate::{LexGraphService, Result};

pub const LATENCY_WINDOW: usize = 100;

/// Latencies at or above this are treated as stalled runs and left out of the average.
const MAX_RECORDED_LATENCY_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
	#[serde(flatten)]
	pub graph: GraphStats,
	/// Mean latency of the most recent finished queries, `None` until one has finished.
	pub avg_response_time_ms: Option<f64>,
	pub recorded_queries: usize,
}

/// Rolling window over the latencies of the most recently finished queries.
#[derive(Debug)]
pub struct LatencyWindow {
	capacity: usize,
	samples: Mutex<VecDeque<u64>>,
}
impl LatencyWindow {
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self { capacity, samples: Mutex::new(VecDeque::with_capacity(capacity)) }
	}

	pub fn record(&self, latency_ms: u64) {
		if latency_ms >= MAX_RECORDED_LATENCY_MS {
			return;
		}

		let mut samples = self.samples.lock().unwrap_or_else(|err| err.into_inner());

		if samples.len() == self.capacity {
			samples.pop_front();
		}

		samples.push_back(latency_ms);
	}

	pub fn len(&self) -> usize {
		self.samples.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Average in milliseconds, rounded to two decimals.
	pub fn average_ms(&self) -> Option<f64> {
		let samples = self.samples.lock().unwrap_or_else(|err| err.into_inner());

		if samples.is_empty() {
			return None;
		}

		let total: u64 = samples.iter().sum();
		let average = total as f64 / samples.len() as f64;

		Some((average * 100.0).round() / 100.0)
	}
}
impl Default for LatencyWindow {
	fn default() -> Self {
		Self::new(LATENCY_WINDOW)
	}
}

impl LexGraphService {
	/// Graph counts for a namespace plus the rolling query latency.
	pub async fn graph_stats(&self, namespace: Option<&str>) -> Result<SystemStats> {
		let namespace = self.resolve_namespace(namespace)?;
		let graph = self.store.stats(namespace).await?;

		Ok(SystemStats {
			graph,
			avg_response_time_ms: self.latencies.average_ms(),
			recorded_queries: self.latencies.len(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn window_keeps_only_the_latest_samples() {
		let window = LatencyWindow::new(3);

		assert_eq!(window.average_ms(), None);

		for latency in [100, 200, 300, 400] {
			window.record(latency);
		}

		assert_eq!(window.len(), 3);
		assert_eq!(window.average_ms(), Some(300.0));
	}

	#[test]
	fn stalled_runs_are_not_recorded() {
		let window = LatencyWindow::new(10);

		window.record(MAX_RECORDED_LATENCY_MS);
		window.record(10);
		window.record(15);

		assert_eq!(window.len(), 2);
		assert_eq!(window.average_ms(), Some(12.5));
	}

	#[test]
	fn stats_flatten_graph_counts() {
		let stats = SystemStats {
			graph: GraphStats::from_counts(4, 2),
			avg_response_time_ms: None,
			recorded_queries: 0,
		};
		let json = serde_json::to_value(stats).expect("serialize failed");

		assert_eq!(json["node_count"], 4);
		assert_eq!(json["avg_connections"], 0.5);
		assert!(json["avg_response_time_ms"].is_null());
	}
}
