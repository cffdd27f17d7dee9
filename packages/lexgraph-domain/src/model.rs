use serde::{Deserialize, Serialize};

/// A retrievable unit of corpus text, a node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
	pub id: String,
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub embedding: Option<Vec<f32>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub document_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hierarchy_path: Option<String>,
}
impl Passage {
	pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			text: text.into(),
			embedding: None,
			document_id: None,
			hierarchy_path: None,
		}
	}

	pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
		self.embedding = Some(embedding);

		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
	pub source_id: String,
	pub target_id: String,
	pub rel_type: String,
}

/// One row of a traversal: `passage` is reachable from `seed_id` in `hops` steps, and
/// `relationship` is the type of the first edge on that path.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
	pub seed_id: String,
	pub passage: Passage,
	pub relationship: String,
	pub hops: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
	Seed,
	Expanded,
}
impl Provenance {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Seed => "seed",
			Self::Expanded => "expanded",
		}
	}

	/// Seeds sort before expanded candidates on equal score.
	pub(crate) fn order(self) -> u8 {
		match self {
			Self::Seed => 0,
			Self::Expanded => 1,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
	pub passage: Passage,
	pub score: f32,
	pub provenance: Provenance,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub relationship: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub via_seed: Option<String>,
}
impl ScoredCandidate {
	pub fn seed(passage: Passage, score: f32) -> Self {
		Self { passage, score, provenance: Provenance::Seed, relationship: None, via_seed: None }
	}

	pub fn expanded(passage: Passage, score: f32, relationship: String, via_seed: String) -> Self {
		Self {
			passage,
			score,
			provenance: Provenance::Expanded,
			relationship: Some(relationship),
			via_seed: Some(via_seed),
		}
	}

	pub fn id(&self) -> &str {
		self.passage.id.as_str()
	}
}

/// Records which seed produced which related node, for citation display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphContextEntry {
	pub seed_id: String,
	pub node_id: String,
	pub relationship: String,
	pub text_preview: String,
	pub hops: u32,
}

/// Ranked, de-duplicated retrieval output. The three vectors are index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
	chunks: Vec<ScoredCandidate>,
	source_ids: Vec<String>,
	scores: Vec<f32>,
}
impl RetrievalResult {
	pub fn empty() -> Self {
		Self::default()
	}

	/// Builds a result from candidates, dropping later duplicates of an already present id.
	pub fn from_candidates(candidates: Vec<ScoredCandidate>) -> Self {
		let mut seen = std::collections::HashSet::new();
		let mut out = Self::default();

		for candidate in candidates {
			if !seen.insert(candidate.passage.id.clone()) {
				continue;
			}

			out.source_ids.push(candidate.passage.id.clone());
			out.scores.push(candidate.score);
			out.chunks.push(candidate);
		}

		out
	}

	pub fn chunks(&self) -> &[ScoredCandidate] {
		&self.chunks
	}

	pub fn source_ids(&self) -> &[String] {
		&self.source_ids
	}

	pub fn scores(&self) -> &[f32] {
		&self.scores
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn passages(&self) -> Vec<Passage> {
		self.chunks.iter().map(|candidate| candidate.passage.clone()).collect()
	}

	pub fn expanded_count(&self) -> usize {
		self.chunks.iter().filter(|candidate| candidate.provenance == Provenance::Expanded).count()
	}

	pub fn into_chunks(self) -> Vec<ScoredCandidate> {
		self.chunks
	}
}

/// Returns at most `max_chars` characters of `text`, never splitting a code point.
pub fn preview(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((byte_idx, _)) => text[..byte_idx].to_string(),
		None => text.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn result_vectors_stay_aligned_and_unique() {
		let result = RetrievalResult::from_candidates(vec![
			ScoredCandidate::seed(Passage::new("a", "alpha"), 0.9),
			ScoredCandidate::seed(Passage::new("b", "beta"), 0.5),
			ScoredCandidate::seed(Passage::new("a", "alpha again"), 0.1),
		]);

		assert_eq!(result.len(), 2);
		assert_eq!(result.source_ids(), ["a".to_string(), "b".to_string()]);
		assert_eq!(result.scores(), [0.9, 0.5]);
		assert_eq!(result.chunks()[0].passage.text, "alpha");
	}

	#[test]
	fn preview_respects_char_boundaries() {
		assert_eq!(preview("Điều 3 Luật Giá", 5), "Điều ");
		assert_eq!(preview("short", 100), "short");
	}

	#[test]
	fn provenance_serializes_snake_case() {
		let json = serde_json::to_value(Provenance::Expanded).expect("serialize failed");

		assert_eq!(json, serde_json::json!("expanded"));
	}
}
