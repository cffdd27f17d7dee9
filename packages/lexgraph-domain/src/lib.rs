pub mod combine;
pub mod expansion;
pub mod lexical;
pub mod model;
pub mod namespace;
pub mod similarity;

pub use combine::combine;
pub use expansion::{Expansion, ExpansionPolicy, expand_from_neighbors};
pub use lexical::{rank_lexical, tokenize_query};
pub use model::{
	GraphContextEntry, Neighbor, Passage, Provenance, Relationship, RetrievalResult,
	ScoredCandidate,
};
pub use similarity::{cosine_similarity, rerank_by_embedding};
