use std::cmp::Ordering;

use crate::model::{Passage, ScoredCandidate};

/// Cosine similarity in `[-1, 1]`. Zero-norm vectors score `0.0`; mismatched lengths yield `None`.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return Some(0.0);
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

/// Narrows candidates to at most `top_k` seeds ordered by cosine similarity to the query.
///
/// Candidates without an embedding, or whose dimension differs from the query, are dropped.
pub fn rerank_by_embedding(
	query_embedding: &[f32],
	candidates: Vec<Passage>,
	top_k: usize,
) -> Vec<ScoredCandidate> {
	let mut scored: Vec<ScoredCandidate> = candidates
		.into_iter()
		.filter_map(|passage| {
			let score = cosine_similarity(query_embedding, passage.embedding.as_deref()?)?;

			Some(ScoredCandidate::seed(passage, score))
		})
		.collect();

	scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
	scored.truncate(top_k);

	scored
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_handles_degenerate_vectors() {
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
		assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
		assert_eq!(cosine_similarity(&[], &[]), None);
	}

	#[test]
	fn opposite_vectors_score_negative_one() {
		let score = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).expect("score expected");

		assert!((score + 1.0).abs() < 1e-6);
	}

	#[test]
	fn drops_missing_and_mismatched_embeddings_without_padding() {
		let candidates = vec![
			Passage::new("a", "a").with_embedding(vec![1.0, 0.0]),
			Passage::new("b", "b"),
			Passage::new("c", "c").with_embedding(vec![1.0, 0.0, 0.0]),
			Passage::new("d", "d").with_embedding(vec![0.6, 0.8]),
		];
		let seeds = rerank_by_embedding(&[1.0, 0.0], candidates, 5);
		let ids: Vec<&str> = seeds.iter().map(ScoredCandidate::id).collect();

		assert_eq!(ids, vec!["a", "d"]);
		assert!(seeds[0].score > seeds[1].score);
	}

	#[test]
	fn equal_scores_keep_input_order() {
		let candidates = vec![
			Passage::new("x", "x").with_embedding(vec![1.0, 1.0]),
			Passage::new("y", "y").with_embedding(vec![1.0, 1.0]),
		];
		let seeds = rerank_by_embedding(&[1.0, 1.0], candidates, 1);

		assert_eq!(seeds.len(), 1);
		assert_eq!(seeds[0].id(), "x");
	}
}
