use std::time::Instant;

use serde::{Deserialize, Serialize};

use lexgraph_domain::{
	ExpansionPolicy, GraphContextEntry, Passage, RetrievalResult, ScoredCandidate, combine,
	expand_from_neighbors, model::preview, rank_lexical, rerank_by_embedding, tokenize_query,
};

use crate::{Error, LexGraphService, Result};

pub const DEFAULT_TOP_K: u32 = 10;
pub const MAX_TOP_K: u32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
	Vector,
	#[default]
	Graph,
}
impl RetrievalMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vector => "vector",
			Self::Graph => "graph",
		}
	}
}

/// Label describing which signals produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
	/// Graph expansion was requested but contributed nothing because the store failed.
	WordMatch,
	HybridWordMatchEmbeddingGraph,
	WordMatchGraph,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveRequest {
	pub query: String,
	pub top_k: Option<u32>,
	#[serde(default = "vector_mode")]
	pub mode: RetrievalMode,
	pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkView {
	pub id: String,
	pub text: String,
	pub score: f32,
	pub provenance: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub relationship: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResponse {
	pub chunks: Vec<ChunkView>,
	pub source_ids: Vec<String>,
	pub scores: Vec<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub graph_context: Option<Vec<GraphContextEntry>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strategy: Option<Strategy>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub embedding_used: Option<bool>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<String>,
}

/// Everything one run of the retrieval pipeline produced, including degradations.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
	pub result: RetrievalResult,
	pub graph_context: Vec<GraphContextEntry>,
	pub strategy: Option<Strategy>,
	pub embedding_used: bool,
	pub warnings: Vec<String>,
	pub lexical_count: usize,
	pub seed_count: usize,
	pub graph_nodes_used: usize,
	pub graph_hops: u32,
	pub graph_failed: bool,
	/// Set when the passage store could not be scanned. The result is then empty but not a
	/// genuine "no match".
	pub retrieval_error: Option<String>,
}

pub(crate) struct PipelineInput<'a> {
	pub(crate) namespace: &'a str,
	pub(crate) query: &'a str,
	pub(crate) mode: RetrievalMode,
	pub(crate) top_k: usize,
	pub(crate) query_embedding: Option<&'a [f32]>,
}

fn vector_mode() -> RetrievalMode {
	RetrievalMode::Vector
}

impl LexGraphService {
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<RetrieveResponse> {
		let top_k = req.top_k.unwrap_or(DEFAULT_TOP_K);

		if !(1..=MAX_TOP_K).contains(&top_k) {
			return Err(Error::InvalidRequest {
				message: format!("top_k must be between 1 and {MAX_TOP_K}."),
			});
		}

		let namespace = self.resolve_namespace(req.namespace.as_deref())?;
		let (query, truncated) = self.prepare_query(&req.query)?;
		let mut warnings = Vec::new();

		if truncated {
			warnings.push(format!(
				"Query truncated to {} characters.",
				self.cfg.retrieval.max_query_chars
			));
		}

		let embedding = match (req.mode, self.embed_query(&query).await) {
			(_, Ok(vector)) => Some(vector),
			(RetrievalMode::Graph, Err(err)) => {
				tracing::warn!(error = %err, "Embedding failed. Falling back to word-match seeds.");
				warnings.push(format!("Embedding unavailable, word-match seeds used: {err}"));

				None
			},
			(RetrievalMode::Vector, Err(err)) => return Err(err),
		};
		let mut outcome = self
			.run_retrieval(PipelineInput {
				namespace,
				query: &query,
				mode: req.mode,
				top_k: top_k as usize,
				query_embedding: embedding.as_deref(),
			})
			.await?;

		warnings.append(&mut outcome.warnings);

		let graph = req.mode == RetrievalMode::Graph;

		Ok(RetrieveResponse {
			chunks: outcome.result.chunks().iter().map(chunk_view).collect(),
			source_ids: outcome.result.source_ids().to_vec(),
			scores: outcome.result.scores().to_vec(),
			graph_context: graph.then_some(outcome.graph_context),
			strategy: if graph { outcome.strategy } else { None },
			embedding_used: graph.then_some(outcome.embedding_used),
			warnings,
		})
	}

	/// Trims the query and caps it at `max_query_chars` characters.
	pub(crate) fn prepare_query(&self, raw: &str) -> Result<(String, bool)> {
		let trimmed = raw.trim();

		if trimmed.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let max_chars = self.cfg.retrieval.max_query_chars as usize;

		if trimmed.chars().count() > max_chars {
			return Ok((preview(trimmed, max_chars), true));
		}

		Ok((trimmed.to_string(), false))
	}

	/// Lexical seeding, embedding rerank, optional graph expansion, and score combination.
	pub(crate) async fn run_retrieval(&self, input: PipelineInput<'_>) -> Result<RetrievalOutcome> {
		let started = Instant::now();
		let retrieval = &self.cfg.retrieval;
		let embedding_used = input.query_embedding.is_some();
		let mut outcome = RetrievalOutcome {
			embedding_used,
			strategy: (input.mode == RetrievalMode::Graph).then_some(if embedding_used {
				Strategy::HybridWordMatchEmbeddingGraph
			} else {
				Strategy::WordMatchGraph
			}),
			..Default::default()
		};
		let tokens = tokenize_query(input.query);
		let scanned = match self.store.scan_matching(input.namespace, &tokens).await {
			Ok(scanned) => scanned,
			Err(err) => {
				tracing::warn!(
					namespace = input.namespace,
					mode = input.mode.as_str(),
					error = %err,
					"Lexical scan failed. Returning an empty result."
				);
				outcome.strategy = None;
				outcome.warnings.push(format!("Passage store unavailable: {err}"));
				outcome.retrieval_error = Some(Error::from(err).to_string());

				return Ok(outcome);
			},
		};
		let lexical = rank_lexical(&tokens, scanned, retrieval.lexical_candidates as usize);

		outcome.lexical_count = lexical.len();

		if lexical.is_empty() {
			tracing::info!(namespace = input.namespace, "No lexical matches.");

			return Ok(outcome);
		}

		let seeds = match input.query_embedding {
			Some(query_embedding) => rerank_by_embedding(
				query_embedding,
				lexical.into_iter().map(|(passage, _)| passage).collect(),
				retrieval.seed_top_k as usize,
			),
			None => word_match_seeds(lexical, tokens.len(), retrieval.seed_top_k as usize),
		};

		outcome.seed_count = seeds.len();

		if seeds.is_empty() {
			outcome.warnings.push("No lexical candidates carry a usable embedding.".to_string());

			return Ok(outcome);
		}

		let mut expanded = Vec::new();

		if input.mode == RetrievalMode::Graph {
			let seed_ids: Vec<String> = seeds.iter().map(|seed| seed.passage.id.clone()).collect();

			match self
				.store
				.neighbors(input.namespace, &seed_ids, retrieval.hop_depth, retrieval.limit_per_seed)
				.await
			{
				Ok(neighbors) => {
					let expansion = expand_from_neighbors(
						&seeds,
						neighbors,
						&ExpansionPolicy {
							limit_per_seed: retrieval.limit_per_seed as usize,
							discount: retrieval.expansion_discount,
							margin: retrieval.expansion_margin,
						},
					);

					outcome.graph_hops =
						expansion.graph_context.iter().map(|entry| entry.hops).max().unwrap_or(0);
					outcome.graph_context = expansion.graph_context;
					expanded = expansion.candidates;
				},
				Err(err) => {
					tracing::warn!(
						namespace = input.namespace,
						error = %err,
						"Graph expansion failed. Using seeds only."
					);
					outcome.graph_failed = true;
					outcome.strategy = Some(Strategy::WordMatch);
					outcome.warnings.push(format!("Graph expansion unavailable: {err}"));
				},
			}
		}

		outcome.result = combine(seeds, expanded, input.top_k);
		outcome.graph_nodes_used = outcome.result.expanded_count();

		tracing::info!(
			namespace = input.namespace,
			mode = input.mode.as_str(),
			lexical = outcome.lexical_count,
			seeds = outcome.seed_count,
			expanded = outcome.graph_nodes_used,
			latency_ms = started.elapsed().as_millis() as u64,
			"Retrieval finished."
		);

		Ok(outcome)
	}
}

/// Seeds scored by the share of query tokens each passage matched, for use without embeddings.
fn word_match_seeds(
	lexical: Vec<(Passage, usize)>,
	token_count: usize,
	seed_top_k: usize,
) -> Vec<ScoredCandidate> {
	let denominator = token_count.max(1) as f32;

	lexical
		.into_iter()
		.take(seed_top_k)
		.map(|(passage, count)| ScoredCandidate::seed(passage, count as f32 / denominator))
		.collect()
}

pub(crate) fn chunk_view(candidate: &ScoredCandidate) -> ChunkView {
	ChunkView {
		id: candidate.passage.id.clone(),
		text: candidate.passage.text.clone(),
		score: candidate.score,
		provenance: candidate.provenance.as_str(),
		relationship: candidate.relationship.clone(),
	}
}
