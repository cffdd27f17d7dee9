use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Error, LexGraphService, QueryMetrics, QuerySession, QueryState, Result, RetrievalMode,
	SourceView,
};

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
	pub session_id: Uuid,
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
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metrics: Option<QueryMetrics>,
	pub events: Vec<&'static str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl From<QuerySession> for SessionSummary {
	fn from(session: QuerySession) -> Self {
		Self {
			session_id: session.id,
			question: session.question,
			mode: session.mode,
			namespace: session.namespace,
			state: session.state,
			created_at: session.created_at,
			updated_at: session.updated_at,
			answer: session.answer,
			sources: session.sources,
			metrics: session.metrics,
			events: session.events.iter().map(|event| event.name()).collect(),
			error: session.error,
		}
	}
}

fn session_key(id: Uuid) -> String {
	format!("session:{id}")
}

impl LexGraphService {
	/// Stores a finished session. Failures are logged and never surface to the caller.
	pub(crate) async fn archive_session(&self, session: &QuerySession) {
		let value = match serde_json::to_value(session) {
			Ok(value) => value,
			Err(err) => {
				tracing::warn!(session_id = %session.id, error = %err, "Failed to encode session.");

				return;
			},
		};
		let ttl = self.cfg.orchestrator.history_ttl_secs.map(|secs| Duration::seconds(secs as i64));

		if let Err(err) = self.kv.set(&session_key(session.id), value, ttl).await {
			tracing::warn!(session_id = %session.id, error = %err, "Failed to archive session.");
		}
	}

	pub async fn session(&self, id: Uuid) -> Result<SessionSummary> {
		let value = self
			.kv
			.get(&session_key(id))
			.await
			.map_err(|err| Error::Storage { message: err.to_string() })?
			.ok_or_else(|| Error::NotFound { message: format!("Session {id} was not found.") })?;
		let session: QuerySession = serde_json::from_value(value)
			.map_err(|err| Error::Storage { message: format!("Archived session is invalid: {err}") })?;

		Ok(session.into())
	}
}
