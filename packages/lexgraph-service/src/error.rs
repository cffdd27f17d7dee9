pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Namespace denied: {message}")]
	NamespaceDenied { message: String },
	#[error("Retrieval unavailable: {message}")]
	RetrievalUnavailable { message: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Rerank unavailable: {message}")]
	RerankUnavailable { message: String },
	#[error("Generation unavailable: {message}")]
	GenerationUnavailable { message: String },
	#[error("Timed out: {message}")]
	Timeout { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Stable machine-readable code shared by HTTP bodies and stream error events.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "INVALID_REQUEST",
			Self::NamespaceDenied { .. } => "NAMESPACE_DENIED",
			Self::RetrievalUnavailable { .. } => "RETRIEVAL_UNAVAILABLE",
			Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
			Self::RerankUnavailable { .. } => "RERANK_UNAVAILABLE",
			Self::GenerationUnavailable { .. } => "GENERATION_UNAVAILABLE",
			Self::Timeout { .. } => "TIMEOUT",
			Self::NotFound { .. } => "NOT_FOUND",
			Self::Storage { .. } => "STORAGE_ERROR",
		}
	}
}

impl From<lexgraph_storage::Error> for Error {
	fn from(err: lexgraph_storage::Error) -> Self {
		match err {
			lexgraph_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::RetrievalUnavailable { message: other.to_string() },
		}
	}
}
