mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Generation, GenerationProviderConfig, MemoryCorpus,
	Orchestrator, Postgres, ProviderConfig, Providers, Retrieval, Service, Storage,
};

use std::{fs, path::Path};

pub const MAX_HOP_DEPTH: u32 = 4;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}

	match cfg.storage.backend.as_str() {
		"postgres" => {
			let Some(postgres) = cfg.storage.postgres.as_ref() else {
				return Err(Error::Validation {
					message: "storage.postgres is required when storage.backend is postgres."
						.to_string(),
				});
			};

			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
		},
		"memory" =>
			if cfg.storage.memory.as_ref().is_some_and(|memory| memory.kv_max_entries == 0) {
				return Err(Error::Validation {
					message: "storage.memory.kv_max_entries must be greater than zero.".to_string(),
				});
			},
		_ => {
			return Err(Error::Validation {
				message: "storage.backend must be one of postgres or memory.".to_string(),
			});
		},
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
		("generation", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if !cfg.providers.generation.temperature.is_finite()
		|| cfg.providers.generation.temperature < 0.0
	{
		return Err(Error::Validation {
			message: "providers.generation.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	validate_retrieval(&cfg.retrieval)?;

	if cfg.generation.max_context_passages == 0 {
		return Err(Error::Validation {
			message: "generation.max_context_passages must be greater than zero.".to_string(),
		});
	}
	if cfg.generation.max_passage_chars == 0 {
		return Err(Error::Validation {
			message: "generation.max_passage_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.orchestrator.event_buffer == 0 {
		return Err(Error::Validation {
			message: "orchestrator.event_buffer must be greater than zero.".to_string(),
		});
	}
	if cfg.orchestrator.compare_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "orchestrator.compare_timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_retrieval(retrieval: &Retrieval) -> Result<()> {
	if retrieval.namespaces.is_empty() {
		return Err(Error::Validation {
			message: "retrieval.namespaces must be non-empty.".to_string(),
		});
	}
	if !retrieval.namespaces.iter().any(|namespace| namespace == &retrieval.default_namespace) {
		return Err(Error::Validation {
			message: "retrieval.default_namespace must be listed in retrieval.namespaces."
				.to_string(),
		});
	}

	for (label, value) in [
		("retrieval.lexical_candidates", retrieval.lexical_candidates),
		("retrieval.seed_top_k", retrieval.seed_top_k),
		("retrieval.top_k", retrieval.top_k),
		("retrieval.hop_depth", retrieval.hop_depth),
		("retrieval.rerank_top_n", retrieval.rerank_top_n),
		("retrieval.max_query_chars", retrieval.max_query_chars),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	if retrieval.hop_depth > MAX_HOP_DEPTH {
		return Err(Error::Validation {
			message: format!("retrieval.hop_depth must be {MAX_HOP_DEPTH} or less."),
		});
	}
	if retrieval.seed_top_k > retrieval.lexical_candidates {
		return Err(Error::Validation {
			message: "retrieval.seed_top_k must not exceed retrieval.lexical_candidates."
				.to_string(),
		});
	}
	if !retrieval.expansion_discount.is_finite()
		|| retrieval.expansion_discount <= 0.0
		|| retrieval.expansion_discount >= 1.0
	{
		return Err(Error::Validation {
			message: "retrieval.expansion_discount must be in the open range 0.0-1.0.".to_string(),
		});
	}
	if !retrieval.expansion_margin.is_finite() || retrieval.expansion_margin <= 0.0 {
		return Err(Error::Validation {
			message: "retrieval.expansion_margin must be a finite number greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.backend = cfg.storage.backend.trim().to_ascii_lowercase();
	cfg.retrieval.default_namespace = cfg.retrieval.default_namespace.trim().to_string();

	for namespace in &mut cfg.retrieval.namespaces {
		*namespace = namespace.trim().to_string();
	}

	if let Some(memory) = cfg.storage.memory.as_mut()
		&& memory.corpus_path.as_deref().map(|path| path.trim().is_empty()).unwrap_or(false)
	{
		memory.corpus_path = None;
	}
	if cfg
		.generation
		.system_prompt
		.as_deref()
		.map(|prompt| prompt.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.generation.system_prompt = None;
	}
}
