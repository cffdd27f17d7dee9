use std::convert::Infallible;

use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use uuid::Uuid;

use lexgraph_service::{
	CompareRequest, CompareResponse, Error, QueryEvent, QueryRequest, RerankRequest,
	RerankResponse, RetrieveRequest, RetrieveResponse, SessionSummary, SystemStats,
	ToolsResponse,
};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct StatsParams {
	namespace: Option<String>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/rag/retrieve", post(retrieve))
		.route("/v1/rag/rerank", post(rerank))
		.route("/v1/rag/query", post(query))
		.route("/v1/rag/compare", post(compare))
		.route("/v1/rag/tools", get(tools))
		.route("/v1/rag/sessions/{id}", get(session))
		.route("/v1/graph/stats", get(graph_stats))
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> StatusCode {
	match state.service.health().await {
		Ok(()) => StatusCode::OK,
		Err(err) => {
			tracing::warn!(error = %err, "Health check failed.");

			StatusCode::SERVICE_UNAVAILABLE
		},
	}
}

async fn retrieve(
	State(state): State<AppState>,
	Json(payload): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ApiError> {
	let response = state.service.retrieve(payload).await?;

	Ok(Json(response))
}

async fn rerank(
	State(state): State<AppState>,
	Json(payload): Json<RerankRequest>,
) -> Result<Json<RerankResponse>, ApiError> {
	let response = state.service.rerank(payload).await?;

	Ok(Json(response))
}

async fn query(
	State(state): State<AppState>,
	Json(payload): Json<QueryRequest>,
) -> Result<Response, ApiError> {
	if !payload.stream {
		let outcome = state.service.query(payload).await?;

		return Ok(Json(outcome).into_response());
	}

	let stream = state.service.stream_query(payload)?;
	let events = ReceiverStream::new(stream.events).map(sse_event);

	Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

fn sse_event(event: QueryEvent) -> Result<Event, Infallible> {
	let name = event.name();

	Ok(Event::default().event(name).json_data(&event).unwrap_or_else(|err| {
		tracing::warn!(event = name, error = %err, "Failed to encode stream event.");

		Event::default().event("error").data(r#"{"code":"ENCODING_ERROR"}"#)
	}))
}

async fn compare(
	State(state): State<AppState>,
	Json(payload): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, ApiError> {
	let response = state.service.compare(payload).await?;

	Ok(Json(response))
}

async fn tools(State(state): State<AppState>) -> Json<ToolsResponse> {
	Json(state.service.tools())
}

async fn session(
	State(state): State<AppState>,
	Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, ApiError> {
	let response = state.service.session(id).await?;

	Ok(Json(response))
}

async fn graph_stats(
	State(state): State<AppState>,
	Query(params): Query<StatsParams>,
) -> Result<Json<SystemStats>, ApiError> {
	let response = state.service.graph_stats(params.namespace.as_deref()).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let status = match &err {
			Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
			Error::NamespaceDenied { .. } => StatusCode::FORBIDDEN,
			Error::NotFound { .. } => StatusCode::NOT_FOUND,
			Error::RetrievalUnavailable { .. }
			| Error::EmbeddingUnavailable { .. }
			| Error::RerankUnavailable { .. }
			| Error::GenerationUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			Error::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let fields = match &err {
			Error::NamespaceDenied { .. } => Some(vec!["$.namespace".to_string()]),
			_ => None,
		};

		if status.is_server_error() {
			tracing::error!(error = %err, "Request failed.");
		}

		ApiError::new(status, err.code(), err.to_string(), fields)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
