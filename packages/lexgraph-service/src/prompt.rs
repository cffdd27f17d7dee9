use lexgraph_domain::{Passage, model::preview};

use crate::ChatMessage;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert in statutory and regulatory law. Answer the user's question using only the \
numbered sources provided.

Rules:
1. Answer in the language of the question, clearly and precisely.
2. Cite the specific article, clause or point of each source you rely on, as [Source N].
3. If the sources do not contain enough information, say so explicitly.
4. Never invent provisions that do not appear in the sources.";

pub const NO_CONTEXT_ANSWER: &str =
	"No passages in the corpus match this question, so no grounded answer can be given.";

pub const RETRIEVAL_UNAVAILABLE_ANSWER: &str =
	"The passage store could not be searched right now, so no grounded answer can be given. \
Please try again later.";

/// Renders passages as numbered sources, each truncated to `max_passage_chars`.
pub fn render_sources(passages: &[Passage], max_passages: usize, max_passage_chars: usize) -> String {
	passages
		.iter()
		.take(max_passages)
		.enumerate()
		.map(|(idx, passage)| {
			format!(
				"[Source {}] {}\n(ID: {})",
				idx + 1,
				preview(&passage.text, max_passage_chars),
				passage.id
			)
		})
		.collect::<Vec<_>>()
		.join("\n\n")
}

pub fn build_messages(
	system_prompt: Option<&str>,
	question: &str,
	passages: &[Passage],
	max_passages: usize,
	max_passage_chars: usize,
) -> Vec<ChatMessage> {
	let sources = render_sources(passages, max_passages, max_passage_chars);

	vec![
		ChatMessage::system(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
		ChatMessage::user(format!("## Sources\n{sources}\n\n## Question\n{question}\n\n## Answer")),
	]
}

/// Answer used when the generation model fails. Still lists what was retrieved.
pub fn fallback_answer(passages: &[Passage], preview_chars: usize) -> String {
	let mut out = String::from(
		"The answer could not be generated right now. The most relevant passages found were:\n",
	);

	for (idx, passage) in passages.iter().enumerate() {
		out.push_str(&format!(
			"\n[Source {}] ({}) {}",
			idx + 1,
			passage.id,
			preview(&passage.text, preview_chars)
		));
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sources_are_numbered_and_truncated() {
		let passages = vec![
			Passage::new("art-1", "abcdefghij"),
			Passage::new("art-2", "short"),
			Passage::new("art-3", "dropped"),
		];
		let rendered = render_sources(&passages, 2, 4);

		assert_eq!(rendered, "[Source 1] abcd\n(ID: art-1)\n\n[Source 2] shor\n(ID: art-2)");
	}

	#[test]
	fn custom_system_prompt_replaces_default() {
		let messages = build_messages(Some("Be brief."), "q?", &[], 5, 800);

		assert_eq!(messages[0].content, "Be brief.");
		assert!(messages[1].content.ends_with("## Question\nq?\n\n## Answer"));
	}

	#[test]
	fn fallback_lists_citations() {
		let answer = fallback_answer(&[Passage::new("vat-5", "Goods not subject to VAT")], 10);

		assert!(answer.contains("[Source 1] (vat-5) Goods not"));
	}
}
