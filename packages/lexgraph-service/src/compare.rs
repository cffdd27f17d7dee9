use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use lexgraph_domain::GraphContextEntry;

use crate::{
	LexGraphService, QueryMetrics, QueryOutcome, QueryRequest, Result, RetrievalMode, SourceView,
	Strategy,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
	pub question: String,
	pub namespace: Option<String>,
}

/// One retrieval mode's answer inside a comparison.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompareLeg {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_id: Option<Uuid>,
	pub answer: String,
	pub sources: Vec<SourceView>,
	pub metrics: QueryMetrics,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub graph_context: Vec<GraphContextEntry>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strategy: Option<Strategy>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl CompareLeg {
	fn failed(session_id: Option<Uuid>, message: String) -> Self {
		Self { session_id, error: Some(message), ..Default::default() }
	}
}
impl From<QueryOutcome> for CompareLeg {
	fn from(outcome: QueryOutcome) -> Self {
		Self {
			session_id: Some(outcome.session_id),
			answer: outcome.answer,
			sources: outcome.sources,
			metrics: outcome.metrics,
			graph_context: outcome.graph_context,
			strategy: outcome.strategy,
			warnings: outcome.warnings,
			error: outcome.error,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
	pub question_id: Uuid,
	pub question: String,
	pub vector: CompareLeg,
	pub graph: CompareLeg,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
}

impl LexGraphService {
	/// Answers the same question in vector and graph mode concurrently.
	///
	/// A failing or slow leg is reported in its `error` field and never fails the other leg.
	pub async fn compare(&self, req: CompareRequest) -> Result<CompareResponse> {
		self.resolve_namespace(req.namespace.as_deref())?;

		let (question, _) = self.prepare_query(&req.question)?;
		let timeout = Duration::from_millis(self.cfg.orchestrator.compare_timeout_ms);
		let (vector, graph) = tokio::join!(
			self.compare_leg(&question, req.namespace.as_deref(), RetrievalMode::Vector, timeout),
			self.compare_leg(&question, req.namespace.as_deref(), RetrievalMode::Graph, timeout),
		);

		Ok(CompareResponse {
			question_id: Uuid::new_v4(),
			question,
			vector,
			graph,
			timestamp: OffsetDateTime::now_utc(),
		})
	}

	async fn compare_leg(
		&self,
		question: &str,
		namespace: Option<&str>,
		mode: RetrievalMode,
		timeout: Duration,
	) -> CompareLeg {
		let mut req = QueryRequest::new(question, mode);

		req.namespace = namespace.map(str::to_string);

		let session = match self.open_session(&req) {
			Ok(session) => session,
			Err(err) => return CompareLeg::failed(None, err.to_string()),
		};
		let session_id = session.id;
		let ran = self.run_session(session, Some(timeout)).await;

		match ran {
			Ok(outcome) => outcome.into(),
			Err(err) => {
				tracing::warn!(
					mode = mode.as_str(),
					%session_id,
					error = %err,
					"Comparison leg failed."
				);

				CompareLeg::failed(Some(session_id), err.to_string())
			},
		}
	}
}
