use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use lexgraph_domain::Passage;

use crate::{Error, LexGraphService, Result};

pub const DEFAULT_TOP_N: u32 = 5;
pub const MAX_TOP_N: u32 = 20;
const FALLBACK_SCORE_STEP: f32 = 0.1;

#[derive(Debug, Clone, Deserialize)]
pub struct RerankChunk {
	pub id: Option<String>,
	pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankRequest {
	pub query: String,
	#[serde(default)]
	pub chunks: Vec<RerankChunk>,
	pub top_n: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankedChunk {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub text: String,
	pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankResponse {
	pub reranked_chunks: Vec<RerankedChunk>,
	pub scores: Vec<f32>,
	pub fallback: bool,
}

/// Cross-encoder output. `passages` and `scores` are index-aligned and sorted by score.
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
	pub passages: Vec<Passage>,
	pub scores: Vec<f32>,
	pub fallback: bool,
}

impl LexGraphService {
	pub async fn rerank(&self, req: RerankRequest) -> Result<RerankResponse> {
		let top_n = req.top_n.unwrap_or(DEFAULT_TOP_N);

		if !(1..=MAX_TOP_N).contains(&top_n) {
			return Err(Error::InvalidRequest {
				message: format!("top_n must be between 1 and {MAX_TOP_N}."),
			});
		}

		let (query, _) = self.prepare_query(&req.query)?;
		let ids: Vec<Option<String>> = req.chunks.iter().map(|chunk| chunk.id.clone()).collect();
		let passages = req
			.chunks
			.into_iter()
			.enumerate()
			.map(|(idx, chunk)| Passage::new(idx.to_string(), chunk.text))
			.collect();
		let outcome = self.rerank_passages(&query, passages, top_n as usize).await;
		let reranked_chunks = outcome
			.passages
			.into_iter()
			.zip(outcome.scores.iter())
			.map(|(passage, score)| RerankedChunk {
				id: passage.id.parse::<usize>().ok().and_then(|idx| ids.get(idx).cloned().flatten()),
				text: passage.text,
				score: *score,
			})
			.collect();

		Ok(RerankResponse { reranked_chunks, scores: outcome.scores, fallback: outcome.fallback })
	}

	/// Scores passages against the query with the cross-encoder and keeps the best `top_n`.
	///
	/// Empty input never reaches the model. A failing model keeps the input order with
	/// descending synthetic scores and sets `fallback`.
	pub async fn rerank_passages(
		&self,
		query: &str,
		passages: Vec<Passage>,
		top_n: usize,
	) -> RerankOutcome {
		if passages.is_empty() || top_n == 0 {
			return RerankOutcome::default();
		}

		let docs: Vec<String> = passages.iter().map(|passage| passage.text.clone()).collect();
		let scores = match self.providers.rerank.rerank(&self.cfg.providers.rerank, query, &docs).await
		{
			Ok(scores) if scores.len() == passages.len() => scores,
			Ok(scores) => {
				tracing::warn!(
					expected = passages.len(),
					got = scores.len(),
					"Rerank score count mismatch. Keeping retrieval order."
				);

				return fallback_order(passages, top_n);
			},
			Err(err) => {
				tracing::warn!(error = %err, "Cross-encoder failed. Keeping retrieval order.");

				return fallback_order(passages, top_n);
			},
		};
		let mut scored: Vec<(usize, Passage, f32)> = passages
			.into_iter()
			.zip(scores)
			.enumerate()
			.map(|(idx, (passage, score))| (idx, passage, score))
			.collect();

		scored.sort_by(|a, b| {
			b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
		});
		scored.truncate(top_n);

		let (passages, scores) = scored.into_iter().map(|(_, passage, score)| (passage, score)).unzip();

		RerankOutcome { passages, scores, fallback: false }
	}
}

fn fallback_order(mut passages: Vec<Passage>, top_n: usize) -> RerankOutcome {
	passages.truncate(top_n);

	let scores =
		(0..passages.len()).map(|idx| 1.0 - FALLBACK_SCORE_STEP * idx as f32).collect();

	RerankOutcome { passages, scores, fallback: true }
}
