use serde::Serialize;

use crate::{LexGraphService, RetrievalMode};

pub const RETRIEVE_FROM_DATABASE: &str = "retrieve_from_database";
pub const RETRIEVE_WITH_GRAPH_CONTEXT: &str = "retrieve_with_graph_context";
pub const RERANK_RESULTS: &str = "rerank_results";
pub const GENERATE_ANSWER: &str = "generate_answer";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolSpec {
	pub name: &'static str,
	pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
	pub tools: Vec<ToolSpec>,
}

pub const TOOLS: [ToolSpec; 4] = [
	ToolSpec {
		name: RETRIEVE_FROM_DATABASE,
		description: "Word-match candidates narrowed by embedding similarity.",
	},
	ToolSpec {
		name: RETRIEVE_WITH_GRAPH_CONTEXT,
		description: "Word-match and embedding seeds expanded through related passages in the knowledge graph.",
	},
	ToolSpec {
		name: RERANK_RESULTS,
		description: "Cross-encoder reranking of retrieved passages against the question.",
	},
	ToolSpec {
		name: GENERATE_ANSWER,
		description: "Streams a cited answer grounded in the reranked passages.",
	},
];

/// Tool that performs retrieval for the given mode.
pub fn retrieval_tool(mode: RetrievalMode) -> &'static str {
	match mode {
		RetrievalMode::Vector => RETRIEVE_FROM_DATABASE,
		RetrievalMode::Graph => RETRIEVE_WITH_GRAPH_CONTEXT,
	}
}

impl LexGraphService {
	pub fn tools(&self) -> ToolsResponse {
		ToolsResponse { tools: TOOLS.to_vec() }
	}
}
