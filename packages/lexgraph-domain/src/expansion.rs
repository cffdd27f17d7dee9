use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use crate::model::{GraphContextEntry, Neighbor, ScoredCandidate, preview};

pub const GRAPH_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ExpansionPolicy {
	pub limit_per_seed: usize,
	pub discount: f32,
	pub margin: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Expansion {
	pub candidates: Vec<ScoredCandidate>,
	pub graph_context: Vec<GraphContextEntry>,
}

/// Score assigned to every expanded candidate. Always strictly below `min_seed_score`.
pub fn expanded_score(min_seed_score: f32, policy: &ExpansionPolicy) -> f32 {
	if min_seed_score > 0.0 {
		min_seed_score * policy.discount
	} else {
		min_seed_score - policy.margin
	}
}

/// Turns traversal rows into expanded candidates.
///
/// Rows are grouped by seed in seed order, ordered by `(hops, id)` and capped at
/// `limit_per_seed`. Seeds themselves, empty-text passages and rows for unknown seeds are skipped.
/// A passage reachable from several seeds becomes one candidate attributed to the first seed.
pub fn expand_from_neighbors(
	seeds: &[ScoredCandidate],
	neighbors: Vec<Neighbor>,
	policy: &ExpansionPolicy,
) -> Expansion {
	let Some(min_seed_score) =
		seeds.iter().map(|seed| seed.score).min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
	else {
		return Expansion::default();
	};

	if policy.limit_per_seed == 0 {
		return Expansion::default();
	}

	let score = expanded_score(min_seed_score, policy);
	let seed_ids: HashSet<&str> = seeds.iter().map(ScoredCandidate::id).collect();
	let mut by_seed: HashMap<String, Vec<Neighbor>> = HashMap::new();

	for neighbor in neighbors {
		if seed_ids.contains(neighbor.passage.id.as_str())
			|| !seed_ids.contains(neighbor.seed_id.as_str())
			|| neighbor.passage.text.trim().is_empty()
			|| neighbor.hops == 0
		{
			continue;
		}

		by_seed.entry(neighbor.seed_id.clone()).or_default().push(neighbor);
	}

	let mut out = Expansion::default();
	let mut emitted = HashSet::new();

	for seed in seeds {
		let Some(mut rows) = by_seed.remove(seed.id()) else {
			continue;
		};

		rows.sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.passage.id.cmp(&b.passage.id)));

		let mut seen = HashSet::new();

		rows.retain(|row| seen.insert(row.passage.id.clone()));
		rows.truncate(policy.limit_per_seed);

		for row in rows {
			out.graph_context.push(GraphContextEntry {
				seed_id: row.seed_id.clone(),
				node_id: row.passage.id.clone(),
				relationship: row.relationship.clone(),
				text_preview: preview(&row.passage.text, GRAPH_PREVIEW_CHARS),
				hops: row.hops,
			});

			if emitted.insert(row.passage.id.clone()) {
				out.candidates.push(ScoredCandidate::expanded(
					row.passage,
					score,
					row.relationship,
					row.seed_id,
				));
			}
		}
	}

	out
}
