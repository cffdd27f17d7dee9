use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	#[serde(default)]
	pub generation: Generation,
	#[serde(default)]
	pub orchestrator: Orchestrator,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	/// Either "postgres" or "memory".
	pub backend: String,
	pub postgres: Option<Postgres>,
	pub memory: Option<MemoryCorpus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryCorpus {
	/// JSON file holding `{ "passages": [...], "relationships": [...] }` per namespace.
	pub corpus_path: Option<String>,
	/// Upper bound on archived sessions kept in process memory.
	#[serde(default = "default_kv_max_entries")]
	pub kv_max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub generation: GenerationProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	pub default_namespace: String,
	/// Allow-list of namespaces a request may target.
	pub namespaces: Vec<String>,
	#[serde(default = "default_lexical_candidates")]
	pub lexical_candidates: u32,
	#[serde(default = "default_seed_top_k")]
	pub seed_top_k: u32,
	#[serde(default = "default_top_k")]
	pub top_k: u32,
	#[serde(default = "default_hop_depth")]
	pub hop_depth: u32,
	#[serde(default = "default_limit_per_seed")]
	pub limit_per_seed: u32,
	/// Multiplier applied to the lowest seed score to score expanded neighbours.
	#[serde(default = "default_expansion_discount")]
	pub expansion_discount: f32,
	/// Subtracted from the lowest seed score when that score is not positive.
	#[serde(default = "default_expansion_margin")]
	pub expansion_margin: f32,
	#[serde(default = "default_rerank_top_n")]
	pub rerank_top_n: u32,
	#[serde(default = "default_max_query_chars")]
	pub max_query_chars: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Generation {
	pub max_context_passages: u32,
	pub max_passage_chars: u32,
	pub source_preview_chars: u32,
	pub system_prompt: Option<String>,
}
impl Default for Generation {
	fn default() -> Self {
		Self {
			max_context_passages: 5,
			max_passage_chars: 800,
			source_preview_chars: 300,
			system_prompt: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Orchestrator {
	pub event_buffer: u32,
	pub compare_timeout_ms: u64,
	pub history_ttl_secs: Option<u64>,
}
impl Default for Orchestrator {
	fn default() -> Self {
		Self { event_buffer: 64, compare_timeout_ms: 120_000, history_ttl_secs: None }
	}
}

fn default_kv_max_entries() -> usize {
	10_000
}

fn default_max_tokens() -> u32 {
	1_024
}

fn default_lexical_candidates() -> u32 {
	20
}

fn default_seed_top_k() -> u32 {
	5
}

fn default_top_k() -> u32 {
	20
}

fn default_hop_depth() -> u32 {
	1
}

fn default_limit_per_seed() -> u32 {
	10
}

fn default_expansion_discount() -> f32 {
	0.8
}

fn default_expansion_margin() -> f32 {
	0.05
}

fn default_rerank_top_n() -> u32 {
	5
}

fn default_max_query_chars() -> u32 {
	10_000
}
