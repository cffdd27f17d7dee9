use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use lexgraph_api::{routes, state::AppState};
use lexgraph_config::{EmbeddingProviderConfig, GenerationProviderConfig, ProviderConfig};
use lexgraph_domain::{Passage, Relationship};
use lexgraph_service::{
	BoxFuture, ChatMessage, DeltaStream, EmbeddingProvider, GenerationProvider, LexGraphService,
	Providers, RerankProvider, Result,
};
use lexgraph_storage::{kv::MemoryKvStore, memory::MemoryGraphStore};

const CONFIG: &str = r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "info"

[storage]
backend = "memory"

[providers.embedding]
provider_id = "test"
api_base    = "http://127.0.0.1:1"
api_key     = "test-key"
path        = "/v1/embeddings"
model       = "test"
dimensions  = 2
timeout_ms  = 1000

[providers.rerank]
provider_id = "test"
api_base    = "http://127.0.0.1:1"
api_key     = "test-key"
path        = "/v1/rerank"
model       = "test"
timeout_ms  = 1000

[providers.generation]
provider_id = "test"
api_base    = "http://127.0.0.1:1"
api_key     = "test-key"
path        = "/v1/chat/completions"
model       = "test"
temperature = 0.0
timeout_ms  = 1000

[retrieval]
default_namespace = "tax_law"
namespaces        = ["tax_law"]
"#;

struct StubEmbedding;
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let vectors = texts.iter().map(|_| vec![1.0, 0.0]).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

struct StubRerank;
impl RerankProvider for StubRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		let scores = vec![0.5; docs.len()];

		Box::pin(async move { Ok(scores) })
	}
}

struct StubGeneration;
impl GenerationProvider for StubGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok("Exempt under Article 5 [Source 1].".to_string()) })
	}

	fn generate_stream<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<DeltaStream>> {
		use futures::StreamExt;

		Box::pin(async move {
			let deltas = vec![Ok("Exempt ".to_string()), Ok("under Article 5.".to_string())];

			Ok(futures::stream::iter(deltas).boxed())
		})
	}
}

fn test_state() -> AppState {
	let cfg = lexgraph_config::parse(CONFIG).expect("Failed to parse test config.");
	let store = MemoryGraphStore::new().with_namespace(
		"tax_law",
		vec![
			Passage::new("art-5", "Article 5. Goods exempt from value added tax")
				.with_embedding(vec![1.0, 0.0]),
			Passage::new("art-9", "Article 9. Zero rate for exported goods")
				.with_embedding(vec![0.0, 1.0]),
			Passage::new("decree-4", "Guidance on the exemption list").with_embedding(vec![0.5, 0.5]),
		],
		vec![Relationship {
			source_id: "decree-4".to_string(),
			target_id: "art-5".to_string(),
			rel_type: "GUIDES".to_string(),
		}],
	);
	let providers =
		Providers::new(Arc::new(StubEmbedding), Arc::new(StubRerank), Arc::new(StubGeneration));

	AppState::from_service(LexGraphService::with_providers(
		cfg,
		Arc::new(store),
		Arc::new(MemoryKvStore::new()),
		providers,
	))
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(payload.to_string()))
		.expect("Failed to build request.")
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).expect("Failed to build request.")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
	let response = app.oneshot(request).await.expect("Failed to call router.");
	let status = response.status();
	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body.");

	(status, bytes.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
	let (status, bytes) = send(app, request).await;
	let json = serde_json::from_slice(&bytes).expect("Response is not JSON.");

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let (status, _) = send(routes::router(test_state()), get("/health")).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn retrieve_in_graph_mode_reports_context() {
	let (status, json) = send_json(
		routes::router(test_state()),
		post_json("/v1/rag/retrieve", json!({ "query": "article 5 goods", "mode": "graph" })),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["source_ids"][0], "art-5");
	assert_eq!(json["strategy"], "hybrid_word_match_embedding_graph");
	assert_eq!(json["embedding_used"], true);
	assert!(json["graph_context"].is_array());
}

#[tokio::test]
async fn retrieve_rejects_out_of_range_top_k() {
	let (status, json) = send_json(
		routes::router(test_state()),
		post_json("/v1/rag/retrieve", json!({ "query": "goods", "top_k": 0 })),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn unknown_namespace_is_forbidden() {
	let (status, json) = send_json(
		routes::router(test_state()),
		post_json("/v1/rag/retrieve", json!({ "query": "goods", "namespace": "labor_law" })),
	)
	.await;

	assert_eq!(status, StatusCode::FORBIDDEN);
	assert_eq!(json["error_code"], "NAMESPACE_DENIED");
	assert_eq!(json["fields"][0], "$.namespace");
}

#[tokio::test]
async fn rerank_with_no_chunks_is_empty() {
	let (status, json) = send_json(
		routes::router(test_state()),
		post_json("/v1/rag/rerank", json!({ "query": "goods", "chunks": [] })),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["reranked_chunks"], json!([]));
	assert_eq!(json["scores"], json!([]));
}

#[tokio::test]
async fn query_without_stream_returns_aggregate_and_archives_session() {
	let state = test_state();
	let (status, json) = send_json(
		routes::router(state.clone()),
		post_json("/v1/rag/query", json!({ "question": "goods exempt", "stream": false })),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["answer"], "Exempt under Article 5 [Source 1].");
	assert!(json["metrics"]["latencyMs"].is_u64());
	assert_eq!(json["metrics"]["graphNodesUsed"], 0);

	let session_id = json["session_id"].as_str().expect("Missing session_id.");
	let (status, session) =
		send_json(routes::router(state), get(&format!("/v1/rag/sessions/{session_id}"))).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(session["state"], "done");
	assert_eq!(session["question"], "goods exempt");
}

#[tokio::test]
async fn query_streams_server_sent_events() {
	let response = routes::router(test_state())
		.oneshot(post_json("/v1/rag/query", json!({ "question": "goods exempt" })))
		.await
		.expect("Failed to call router.");

	assert_eq!(response.status(), StatusCode::OK);
	assert!(
		response
			.headers()
			.get(header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.is_some_and(|value| value.starts_with("text/event-stream"))
	);

	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body.");
	let text = String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8.");
	let status_at = text.find("event: status").expect("Missing status event.");
	let context_at = text.find("event: context").expect("Missing context event.");
	let delta_at = text.find("event: answer_delta").expect("Missing answer_delta event.");
	let done_at = text.find("event: done").expect("Missing done event.");

	assert!(status_at < context_at && context_at < delta_at && delta_at < done_at);
	assert!(text.contains(r#""type":"answer_delta","delta":"Exempt ""#));
}

#[tokio::test]
async fn missing_session_is_not_found() {
	let (status, json) = send_json(
		routes::router(test_state()),
		get("/v1/rag/sessions/00000000-0000-0000-0000-000000000000"),
	)
	.await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(json["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn compare_returns_both_legs() {
	let (status, json) = send_json(
		routes::router(test_state()),
		post_json("/v1/rag/compare", json!({ "question": "goods exempt" })),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert!(json["question_id"].is_string());
	assert!(json["timestamp"].is_string());
	assert!(json["vector"]["metrics"]["chunksUsed"].is_u64());
	assert!(json["graph"]["metrics"]["graphHops"].is_u64());
	assert!(json["vector"].get("error").is_none());
}

#[tokio::test]
async fn tools_and_stats_are_listed() {
	let state = test_state();
	let (status, tools) = send_json(routes::router(state.clone()), get("/v1/rag/tools")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(tools["tools"].as_array().map(Vec::len), Some(4));

	let (status, stats) = send_json(routes::router(state), get("/v1/graph/stats")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(stats["node_count"], 3);
	assert_eq!(stats["relationship_count"], 1);
	assert_eq!(stats["avg_connections"], 0.33);
	assert!(stats["avg_response_time_ms"].is_null());
	assert_eq!(stats["recorded_queries"], 0);
}
