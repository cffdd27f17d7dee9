use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use lexgraph_domain::{GraphContextEntry, Passage, ScoredCandidate, model::preview};

use crate::{
	Error, LexGraphService, Result, RetrievalMode, Strategy, prompt,
	retrieval::{PipelineInput, RetrievalOutcome},
	tools,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
	Idle,
	Embedding,
	Retrieving,
	Reranking,
	Generating,
	Done,
	Failed,
	Cancelled,
}
impl QueryState {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Failed | Self::Cancelled)
	}

	pub fn can_transition_to(self, next: Self) -> bool {
		match (self, next) {
			(Self::Idle, Self::Embedding)
			| (Self::Embedding, Self::Retrieving)
			| (Self::Retrieving, Self::Reranking)
			| (Self::Reranking, Self::Generating)
			| (Self::Generating, Self::Done) => true,
			(from, Self::Failed | Self::Cancelled) => from != Self::Idle && !from.is_terminal(),
			_ => false,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
	pub question: String,
	#[serde(default)]
	pub mode: RetrievalMode,
	#[serde(default = "default_stream")]
	pub stream: bool,
	pub namespace: Option<String>,
}
impl QueryRequest {
	pub fn new(question: impl Into<String>, mode: RetrievalMode) -> Self {
		Self { question: question.into(), mode, stream: false, namespace: None }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceView {
	pub id: String,
	pub text: String,
	pub score: f32,
	pub provenance: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub relationship: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub document_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
	pub latency_ms: u64,
	pub chunks_used: usize,
	pub graph_nodes_used: usize,
	pub graph_hops: u32,
	pub embedding_used: bool,
	pub retrieval_fallback: bool,
	pub graph_fallback: bool,
	pub rerank_fallback: bool,
	pub generation_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryEvent {
	Status {
		state: QueryState,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tool: Option<String>,
	},
	Context {
		sources: Vec<SourceView>,
		graph_context: Vec<GraphContextEntry>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		strategy: Option<Strategy>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		warnings: Vec<String>,
	},
	AnswerDelta {
		delta: String,
	},
	Done {
		session_id: Uuid,
		answer: String,
		metrics: QueryMetrics,
		error: bool,
	},
	Error {
		code: String,
		message: String,
	},
}
impl QueryEvent {
	/// Event name used on the wire.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Status { .. } => "status",
			Self::Context { .. } => "context",
			Self::AnswerDelta { .. } => "answer_delta",
			Self::Done { .. } => "done",
			Self::Error { .. } => "error",
		}
	}
}

/// One question moving through the pipeline. Archived once its run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySession {
	pub id: Uuid,
	pub question: String,
	pub mode: RetrievalMode,
	pub namespace: String,
	pub state: QueryState,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	pub answer: String,
	pub sources: Vec<SourceView>,
	pub graph_context: Vec<GraphContextEntry>,
	pub strategy: Option<Strategy>,
	pub warnings: Vec<String>,
	pub metrics: Option<QueryMetrics>,
	/// Every emitted event except answer deltas, which are folded into `answer`.
	pub events: Vec<QueryEvent>,
	pub error: Option<String>,
}
impl QuerySession {
	fn new(question: String, mode: RetrievalMode, namespace: String) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			id: Uuid::new_v4(),
			question,
			mode,
			namespace,
			state: QueryState::Idle,
			created_at: now,
			updated_at: now,
			answer: String::new(),
			sources: Vec::new(),
			graph_context: Vec::new(),
			strategy: None,
			warnings: Vec::new(),
			metrics: None,
			events: Vec::new(),
			error: None,
		}
	}
}

/// Aggregated result of a non-streaming query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
	pub session_id: Uuid,
	pub answer: String,
	pub sources: Vec<SourceView>,
	pub metrics: QueryMetrics,
	pub graph_context: Vec<GraphContextEntry>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strategy: Option<Strategy>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

pub struct QueryStream {
	pub session_id: Uuid,
	pub events: mpsc::Receiver<QueryEvent>,
}

enum Finish {
	Done,
	Cancelled,
	Failed(Error),
}

struct Run<'a> {
	service: &'a LexGraphService,
	session: QuerySession,
	sender: Option<mpsc::Sender<QueryEvent>>,
	started: Instant,
	metrics: QueryMetrics,
}
impl<'a> Run<'a> {
	fn new(
		service: &'a LexGraphService,
		session: QuerySession,
		sender: Option<mpsc::Sender<QueryEvent>>,
	) -> Self {
		Self { service, session, sender, started: Instant::now(), metrics: QueryMetrics::default() }
	}

	fn transition(&mut self, next: QueryState) {
		if !self.session.state.can_transition_to(next) {
			tracing::warn!(from = ?self.session.state, to = ?next, "Ignoring invalid state transition.");

			return;
		}

		self.session.state = next;
		self.session.updated_at = OffsetDateTime::now_utc();
	}

	/// Sends an event to the caller. Returns `false` once the caller has gone away.
	async fn emit(&mut self, event: QueryEvent) -> bool {
		if !matches!(event, QueryEvent::AnswerDelta { .. }) {
			self.session.events.push(event.clone());
		}

		let Some(sender) = self.sender.as_ref() else {
			return true;
		};

		if sender.send(event).await.is_err() {
			tracing::info!(session_id = %self.session.id, "Client disconnected. Cancelling query.");

			if !self.session.state.is_terminal() {
				self.transition(QueryState::Cancelled);
			}

			return false;
		}

		true
	}

	async fn enter(&mut self, state: QueryState, tool: Option<&str>) -> bool {
		self.transition(state);
		self.emit(QueryEvent::Status { state, tool: tool.map(str::to_string) }).await
	}

	async fn fail(&mut self, err: Error) -> Finish {
		tracing::warn!(session_id = %self.session.id, error = %err, "Query failed.");

		self.session.error = Some(err.to_string());
		self.transition(QueryState::Failed);

		let _ = self
			.emit(QueryEvent::Error { code: err.code().to_string(), message: err.to_string() })
			.await;

		Finish::Failed(err)
	}

	async fn drive(&mut self) -> Finish {
		let service = self.service;

		if !self.enter(QueryState::Embedding, None).await {
			return Finish::Cancelled;
		}

		let embedded = service.embed_query(&self.session.question).await;
		let embedding = match embedded {
			Ok(embedding) => embedding,
			Err(err) => return self.fail(err).await,
		};

		self.metrics.embedding_used = true;

		if !self.enter(QueryState::Retrieving, Some(tools::retrieval_tool(self.session.mode))).await {
			return Finish::Cancelled;
		}

		let retrieved = service
			.run_retrieval(PipelineInput {
				namespace: &self.session.namespace,
				query: &self.session.question,
				mode: self.session.mode,
				top_k: service.cfg.retrieval.top_k as usize,
				query_embedding: Some(&embedding),
			})
			.await;
		let outcome = match retrieved {
			Ok(outcome) => outcome,
			Err(err) => return self.fail(err).await,
		};

		self.record_retrieval(&outcome);

		if !self.enter(QueryState::Reranking, Some(tools::RERANK_RESULTS)).await {
			return Finish::Cancelled;
		}

		let final_n = service
			.cfg
			.retrieval
			.rerank_top_n
			.min(service.cfg.generation.max_context_passages) as usize;
		let candidates = outcome.result.chunks().to_vec();
		let reranked = service
			.rerank_passages(&self.session.question, outcome.result.passages(), final_n)
			.await;

		self.metrics.rerank_fallback = reranked.fallback;
		self.session.sources = source_views(
			&reranked.passages,
			&reranked.scores,
			&candidates,
			service.cfg.generation.source_preview_chars as usize,
		);
		self.metrics.chunks_used = reranked.passages.len();
		self.metrics.graph_nodes_used = self
			.session
			.sources
			.iter()
			.filter(|source| source.provenance == "expanded")
			.count();

		let context = QueryEvent::Context {
			sources: self.session.sources.clone(),
			graph_context: self.session.graph_context.clone(),
			strategy: self.session.strategy,
			warnings: self.session.warnings.clone(),
		};

		if !self.emit(context).await {
			return Finish::Cancelled;
		}
		if !self.enter(QueryState::Generating, Some(tools::GENERATE_ANSWER)).await {
			return Finish::Cancelled;
		}
		if !self.generate(&reranked.passages).await {
			return Finish::Cancelled;
		}

		self.metrics.latency_ms = self.started.elapsed().as_millis() as u64;
		self.session.metrics = Some(self.metrics.clone());
		self.transition(QueryState::Done);

		let done = QueryEvent::Done {
			session_id: self.session.id,
			answer: self.session.answer.clone(),
			metrics: self.metrics.clone(),
			error: self.metrics.retrieval_fallback || self.metrics.generation_fallback,
		};

		if !self.emit(done).await {
			return Finish::Cancelled;
		}

		tracing::info!(
			session_id = %self.session.id,
			mode = self.session.mode.as_str(),
			chunks = self.metrics.chunks_used,
			expanded = self.metrics.graph_nodes_used,
			latency_ms = self.metrics.latency_ms,
			"Query finished."
		);

		Finish::Done
	}

	fn record_retrieval(&mut self, outcome: &RetrievalOutcome) {
		self.session.graph_context = outcome.graph_context.clone();
		self.session.strategy = outcome.strategy;
		self.session.warnings.extend(outcome.warnings.iter().cloned());
		self.metrics.graph_hops = outcome.graph_hops;
		self.metrics.graph_fallback = outcome.graph_failed;

		if let Some(message) = &outcome.retrieval_error {
			self.metrics.retrieval_fallback = true;
			self.session.error = Some(message.clone());
		}
	}

	/// Produces the answer text. Returns `false` if the caller disconnected mid-stream.
	async fn generate(&mut self, passages: &[Passage]) -> bool {
		let service = self.service;

		if passages.is_empty() {
			let answer = if self.metrics.retrieval_fallback {
				prompt::RETRIEVAL_UNAVAILABLE_ANSWER
			} else {
				prompt::NO_CONTEXT_ANSWER
			};

			return self.push_delta(answer.to_string()).await;
		}

		let messages = prompt::build_messages(
			service.cfg.generation.system_prompt.as_deref(),
			&self.session.question,
			passages,
			service.cfg.generation.max_context_passages as usize,
			service.cfg.generation.max_passage_chars as usize,
		);
		let generation_cfg = &service.cfg.providers.generation;

		if self.sender.is_none() {
			return match service.providers.generation.generate(generation_cfg, &messages).await {
				Ok(answer) => self.push_delta(answer).await,
				Err(err) => self.generation_fallback(passages, err).await,
			};
		}

		let mut stream =
			match service.providers.generation.generate_stream(generation_cfg, &messages).await {
				Ok(stream) => stream,
				Err(err) => return self.generation_fallback(passages, err).await,
			};

		while let Some(item) = stream.next().await {
			match item {
				Ok(delta) =>
					if !self.push_delta(delta).await {
						return false;
					},
				Err(err) => return self.generation_fallback(passages, err).await,
			}
		}

		true
	}

	async fn generation_fallback(&mut self, passages: &[Passage], err: Error) -> bool {
		tracing::warn!(session_id = %self.session.id, error = %err, "Generation failed. Using fallback answer.");

		self.metrics.generation_fallback = true;
		self.session.error = Some(err.to_string());

		let mut text = prompt::fallback_answer(
			passages,
			self.service.cfg.generation.source_preview_chars as usize,
		);

		if !self.session.answer.is_empty() {
			text.insert_str(0, "\n\n");
		}

		self.push_delta(text).await
	}

	async fn push_delta(&mut self, delta: String) -> bool {
		self.session.answer.push_str(&delta);
		self.emit(QueryEvent::AnswerDelta { delta }).await
	}
}

fn default_stream() -> bool {
	true
}

fn source_views(
	passages: &[Passage],
	scores: &[f32],
	candidates: &[ScoredCandidate],
	preview_chars: usize,
) -> Vec<SourceView> {
	passages
		.iter()
		.zip(scores)
		.map(|(passage, score)| {
			let candidate = candidates.iter().find(|candidate| candidate.passage.id == passage.id);

			SourceView {
				id: passage.id.clone(),
				text: preview(&passage.text, preview_chars),
				score: *score,
				provenance: candidate
					.map(|candidate| candidate.provenance.as_str())
					.unwrap_or("seed")
					.to_string(),
				relationship: candidate.and_then(|candidate| candidate.relationship.clone()),
				document_id: passage.document_id.clone(),
			}
		})
		.collect()
}

impl LexGraphService {
	pub(crate) fn open_session(&self, req: &QueryRequest) -> Result<QuerySession> {
		let namespace = self.resolve_namespace(req.namespace.as_deref())?.to_string();
		let (question, truncated) = self.prepare_query(&req.question)?;
		let mut session = QuerySession::new(question, req.mode, namespace);

		if truncated {
			session.warnings.push(format!(
				"Question truncated to {} characters.",
				self.cfg.retrieval.max_query_chars
			));
		}

		Ok(session)
	}

	async fn finish_run(&self, run: Run<'_>, finish: Finish) -> (QuerySession, QueryMetrics, Finish) {
		let Run { session, metrics, .. } = run;

		if session.state == QueryState::Done {
			self.latencies.record(metrics.latency_ms);
		}

		self.archive_session(&session).await;

		(session, metrics, finish)
	}

	/// Runs a question to completion and returns the aggregated answer.
	pub async fn query(&self, req: QueryRequest) -> Result<QueryOutcome> {
		let session = self.open_session(&req)?;

		self.run_session(session, None).await
	}

	/// Drives an opened session without a caller stream.
	///
	/// With a `limit`, a run still going when it expires is failed and archived like any other
	/// failure.
	pub(crate) async fn run_session(
		&self,
		session: QuerySession,
		limit: Option<Duration>,
	) -> Result<QueryOutcome> {
		let mut run = Run::new(self, session, None);
		let finish = match limit {
			Some(limit) => {
				let timed = tokio::time::timeout(limit, run.drive()).await;

				match timed {
					Ok(finish) => finish,
					Err(_) => {
						let message = format!(
							"{} query exceeded {} ms.",
							run.session.mode.as_str(),
							limit.as_millis()
						);

						run.fail(Error::Timeout { message }).await
					},
				}
			},
			None => run.drive().await,
		};
		let (session, metrics, finish) = self.finish_run(run, finish).await;

		match finish {
			Finish::Failed(err) => Err(err),
			Finish::Done | Finish::Cancelled => Ok(QueryOutcome {
				session_id: session.id,
				answer: session.answer,
				sources: session.sources,
				metrics,
				graph_context: session.graph_context,
				strategy: session.strategy,
				warnings: session.warnings,
				error: session.error,
			}),
		}
	}

	/// Starts a question in the background and returns its event stream.
	///
	/// Dropping the receiver cancels the run at its next event.
	pub fn stream_query(self: &Arc<Self>, req: QueryRequest) -> Result<QueryStream> {
		let session = self.open_session(&req)?;
		let session_id = session.id;
		let (sender, events) = mpsc::channel(self.cfg.orchestrator.event_buffer as usize);
		let service = Arc::clone(self);

		tokio::spawn(async move {
			let mut run = Run::new(&service, session, Some(sender));
			let finish = run.drive().await;
			let _ = service.finish_run(run, finish).await;
		});

		Ok(QueryStream { session_id, events })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn state_machine_only_moves_forward() {
		assert!(QueryState::Idle.can_transition_to(QueryState::Embedding));
		assert!(QueryState::Reranking.can_transition_to(QueryState::Generating));
		assert!(!QueryState::Idle.can_transition_to(QueryState::Failed));
		assert!(!QueryState::Done.can_transition_to(QueryState::Failed));
		assert!(!QueryState::Retrieving.can_transition_to(QueryState::Embedding));
		assert!(QueryState::Generating.can_transition_to(QueryState::Cancelled));
	}

	#[test]
	fn events_serialize_with_type_tag() {
		let json = serde_json::to_value(QueryEvent::AnswerDelta { delta: "Theo".to_string() })
			.expect("serialize failed");

		assert_eq!(json, serde_json::json!({ "type": "answer_delta", "delta": "Theo" }));
	}

	#[test]
	fn metrics_use_camel_case() {
		let json = serde_json::to_value(QueryMetrics { graph_nodes_used: 2, ..Default::default() })
			.expect("serialize failed");

		assert_eq!(json["graphNodesUsed"], 2);
		assert_eq!(json["retrievalFallback"], false);
		assert!(json.get("latencyMs").is_some());
	}
}
