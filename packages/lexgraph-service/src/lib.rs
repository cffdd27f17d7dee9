pub mod compare;
pub mod history;
pub mod orchestrator;
pub mod prompt;
pub mod rerank;
pub mod retrieval;
pub mod stats;
pub mod time_serde;
pub mod tools;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

use futures::{StreamExt, stream::BoxStream};

pub use compare::{CompareLeg, CompareRequest, CompareResponse};
pub use error::{Error, Result};
pub use history::SessionSummary;
pub use orchestrator::{
	QueryEvent, QueryMetrics, QueryOutcome, QueryRequest, QuerySession, QueryState, QueryStream,
	SourceView,
};
pub use rerank::{RerankChunk, RerankOutcome, RerankRequest, RerankResponse, RerankedChunk};
pub use retrieval::{
	ChunkView, RetrievalMode, RetrievalOutcome, RetrieveRequest, RetrieveResponse, Strategy,
};
pub use stats::{LatencyWindow, SystemStats};
pub use tools::{ToolSpec, ToolsResponse};

use lexgraph_config::{
	Config, EmbeddingProviderConfig, GenerationProviderConfig, ProviderConfig,
};
use lexgraph_providers::{embedding, generation, rerank as rerank_http};
use lexgraph_storage::{GraphStore, KvStore};

pub use lexgraph_providers::generation::ChatMessage;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type DeltaStream = BoxStream<'static, Result<String>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<String>>;

	fn generate_stream<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<DeltaStream>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, rerank, generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), rerank: provider.clone(), generation: provider }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding::embed(cfg, texts)
				.await
				.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })
		})
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move {
			rerank_http::rerank(cfg, query, docs)
				.await
				.map_err(|err| Error::RerankUnavailable { message: err.to_string() })
		})
	}
}
impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			generation::generate(cfg, messages)
				.await
				.map_err(|err| Error::GenerationUnavailable { message: err.to_string() })
		})
	}

	fn generate_stream<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<DeltaStream>> {
		Box::pin(async move {
			let stream = generation::generate_stream(cfg, messages)
				.await
				.map_err(|err| Error::GenerationUnavailable { message: err.to_string() })?;

			Ok(stream
				.map(|item| {
					item.map_err(|err| Error::GenerationUnavailable { message: err.to_string() })
				})
				.boxed())
		})
	}
}

/// Hybrid retrieval and answer service shared by every request handler.
pub struct LexGraphService {
	pub cfg: Config,
	pub store: Arc<dyn GraphStore>,
	pub kv: Arc<dyn KvStore>,
	pub providers: Providers,
	latencies: LatencyWindow,
}
impl LexGraphService {
	pub fn new(cfg: Config, store: Arc<dyn GraphStore>, kv: Arc<dyn KvStore>) -> Self {
		Self::with_providers(cfg, store, kv, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn GraphStore>,
		kv: Arc<dyn KvStore>,
		providers: Providers,
	) -> Self {
		Self { cfg, store, kv, providers, latencies: LatencyWindow::default() }
	}

	pub async fn health(&self) -> Result<()> {
		self.store.ping().await?;

		Ok(())
	}

	pub(crate) fn resolve_namespace<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
		use lexgraph_domain::namespace::{NamespaceReject, resolve_namespace};

		resolve_namespace(
			requested,
			&self.cfg.retrieval.default_namespace,
			&self.cfg.retrieval.namespaces,
		)
		.map_err(|reject| match reject {
			NamespaceReject::Empty => Error::InvalidRequest {
				message: "namespace must be non-empty when provided.".to_string(),
			},
			NamespaceReject::InvalidIdentifier => Error::InvalidRequest {
				message: "namespace must be a lowercase identifier.".to_string(),
			},
			NamespaceReject::NotAllowed => Error::NamespaceDenied {
				message: "namespace is not in the allow-list.".to_string(),
			},
		})
	}

	pub(crate) async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let texts = [query.to_string()];
		let vectors = self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.providers.embedding.dimensions as usize {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}
}
