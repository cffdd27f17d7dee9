use std::{cmp::Ordering, collections::HashSet};

use crate::model::{RetrievalResult, ScoredCandidate};

/// Merges seeds and expanded candidates into one ranked result.
///
/// A passage present in both lists keeps its seed entry; within a list the first occurrence wins.
/// Ordering is score descending, then seeds before expanded, then id ascending.
pub fn combine(
	seeds: Vec<ScoredCandidate>,
	expanded: Vec<ScoredCandidate>,
	top_k: usize,
) -> RetrievalResult {
	let mut seen = HashSet::new();
	let mut merged = Vec::with_capacity(seeds.len() + expanded.len());

	for candidate in seeds.into_iter().chain(expanded) {
		if seen.insert(candidate.passage.id.clone()) {
			merged.push(candidate);
		}
	}

	merged.sort_by(compare_candidates);
	merged.truncate(top_k);

	RetrievalResult::from_candidates(merged)
}

fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
	b.score
		.partial_cmp(&a.score)
		.unwrap_or(Ordering::Equal)
		.then_with(|| a.provenance.order().cmp(&b.provenance.order()))
		.then_with(|| a.passage.id.cmp(&b.passage.id))
}
