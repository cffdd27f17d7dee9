use std::{path::Path, sync::Arc};

use lexgraph_config::Config;
use lexgraph_service::LexGraphService;
use lexgraph_storage::{
	GraphStore, KvStore,
	db::Db,
	kv::{self, MemoryKvStore, PgKvStore},
	memory::MemoryGraphStore,
	passages::PgGraphStore,
};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LexGraphService>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let (store, kv): (Arc<dyn GraphStore>, Arc<dyn KvStore>) =
			match (config.storage.backend.as_str(), config.storage.postgres.as_ref()) {
				("postgres", Some(postgres)) => {
					let db = Db::connect(postgres).await?;

					db.ensure_schema().await?;

					(
						Arc::new(PgGraphStore::new(db.pool.clone())),
						Arc::new(PgKvStore::new(db.pool)),
					)
				},
				_ => {
					let memory = config.storage.memory.as_ref();
					let corpus_path = memory.and_then(|memory| memory.corpus_path.as_deref());
					let kv_max_entries = memory
						.map(|memory| memory.kv_max_entries)
						.unwrap_or(kv::DEFAULT_MAX_ENTRIES);
					let store = match corpus_path {
						Some(path) => MemoryGraphStore::from_path(Path::new(path))?,
						None => {
							tracing::warn!("No corpus_path configured. Serving an empty corpus.");

							MemoryGraphStore::new()
						},
					};

					(Arc::new(store), Arc::new(MemoryKvStore::with_capacity(kv_max_entries)))
				},
			};

		tracing::info!(backend = config.storage.backend.as_str(), "Storage ready.");

		Ok(Self::from_service(LexGraphService::new(config, store, kv)))
	}

	pub fn from_service(service: LexGraphService) -> Self {
		Self { service: Arc::new(service) }
	}
}
