use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::model::Passage;

/// Lowercased NFC form used on both sides of a lexical comparison.
pub fn normalize_text(text: &str) -> String {
	text.nfc().collect::<String>().to_lowercase()
}

/// Splits a query into distinct lowercase word tokens, keeping first-seen order.
pub fn tokenize_query(query: &str) -> Vec<String> {
	let normalized = normalize_text(query);
	let mut seen = HashSet::new();
	let mut tokens = Vec::new();

	for word in normalized.unicode_words() {
		if seen.insert(word) {
			tokens.push(word.to_string());
		}
	}

	tokens
}

/// Counts how many distinct tokens occur as substrings of the passage text.
pub fn match_count(tokens: &[String], text: &str) -> usize {
	if tokens.is_empty() {
		return 0;
	}

	let haystack = normalize_text(text);

	tokens.iter().filter(|token| haystack.contains(token.as_str())).count()
}

/// Ranks passages by descending match count.
///
/// Input order is the store scan order and is preserved among equal counts. Zero-match passages are
/// dropped and the output is truncated to `top_k`.
pub fn rank_lexical(tokens: &[String], passages: Vec<Passage>, top_k: usize) -> Vec<(Passage, usize)> {
	if tokens.is_empty() || top_k == 0 {
		return Vec::new();
	}

	let mut matched: Vec<(Passage, usize)> = passages
		.into_iter()
		.filter_map(|passage| {
			let count = match_count(tokens, &passage.text);

			(count > 0).then_some((passage, count))
		})
		.collect();

	matched.sort_by(|a, b| b.1.cmp(&a.1));
	matched.truncate(top_k);

	matched
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_are_lowercase_unique_words() {
		let tokens = tokenize_query("Thuế GTGT, thuế suất 10%?");

		assert_eq!(tokens, vec!["thuế", "gtgt", "suất", "10"]);
	}

	#[test]
	fn decomposed_input_matches_composed_text() {
		let decomposed = "Thue\u{0302}\u{0301}";
		let tokens = tokenize_query(decomposed);

		assert_eq!(match_count(&tokens, "THUẾ thu nhập"), 1);
	}

	#[test]
	fn ranking_is_stable_on_scan_order() {
		let tokens = tokenize_query("tax exemption");
		let passages = vec![
			Passage::new("p1", "tax rate"),
			Passage::new("p2", "nothing relevant"),
			Passage::new("p3", "tax exemption rules"),
			Passage::new("p4", "exemption list"),
		];
		let ranked = rank_lexical(&tokens, passages, 10);
		let ids: Vec<&str> = ranked.iter().map(|(passage, _)| passage.id.as_str()).collect();

		assert_eq!(ids, vec!["p3", "p1", "p4"]);
		assert_eq!(ranked[0].1, 2);
	}

	#[test]
	fn empty_query_matches_nothing() {
		let ranked = rank_lexical(&tokenize_query("  ,. "), vec![Passage::new("p1", "text")], 5);

		assert!(ranked.is_empty());
	}
}
