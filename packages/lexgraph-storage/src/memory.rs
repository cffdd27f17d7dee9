use std::{
	collections::{BTreeMap, HashMap, HashSet},
	fs,
	path::Path,
};

use serde::Deserialize;

use lexgraph_domain::{Neighbor, Passage, Relationship, lexical};

use crate::{BoxFuture, Error, GraphStats, GraphStore, Result};

/// On-disk corpus layout: one entry per namespace.
#[derive(Debug, Default, Deserialize)]
pub struct CorpusFile {
	#[serde(default)]
	pub namespaces: BTreeMap<String, NamespaceCorpus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceCorpus {
	#[serde(default)]
	pub passages: Vec<Passage>,
	#[serde(default)]
	pub relationships: Vec<Relationship>,
}

#[derive(Debug, Default)]
struct Namespace {
	passages: Vec<Passage>,
	index: HashMap<String, usize>,
	adjacency: HashMap<String, Vec<(String, String)>>,
	relationship_count: u64,
}
impl Namespace {
	fn insert_passage(&mut self, passage: Passage) {
		match self.index.get(&passage.id) {
			Some(&idx) => self.passages[idx] = passage,
			None => {
				self.index.insert(passage.id.clone(), self.passages.len());
				self.passages.push(passage);
			},
		}
	}

	fn insert_relationship(&mut self, relationship: Relationship) {
		let Relationship { source_id, target_id, rel_type } = relationship;

		self.adjacency
			.entry(source_id.clone())
			.or_default()
			.push((target_id.clone(), rel_type.clone()));

		if source_id != target_id {
			self.adjacency.entry(target_id).or_default().push((source_id, rel_type));
		}

		self.relationship_count += 1;
	}

	fn passage(&self, id: &str) -> Option<&Passage> {
		self.index.get(id).map(|&idx| &self.passages[idx])
	}

	/// Breadth-first walk from one seed. Each node keeps its shortest hop count and, among the
	/// shortest paths, the lexically smallest first-edge relationship.
	fn walk(&self, seed_id: &str, hop_depth: u32) -> Vec<(String, String, u32)> {
		let mut visited: HashSet<String> = HashSet::from([seed_id.to_string()]);
		let mut frontier: BTreeMap<String, Option<String>> = BTreeMap::from([(seed_id.to_string(), None)]);
		let mut out = Vec::new();

		for hops in 1..=hop_depth {
			let mut next: BTreeMap<String, Option<String>> = BTreeMap::new();

			for (node_id, first_rel) in &frontier {
				let Some(edges) = self.adjacency.get(node_id) else {
					continue;
				};

				for (to_id, rel_type) in edges {
					if visited.contains(to_id) {
						continue;
					}

					let candidate = first_rel.clone().unwrap_or_else(|| rel_type.clone());
					let slot = next.entry(to_id.clone()).or_insert_with(|| Some(candidate.clone()));

					if slot.as_ref().map(|current| &candidate < current).unwrap_or(true) {
						*slot = Some(candidate);
					}
				}
			}

			if next.is_empty() {
				break;
			}

			for (node_id, rel) in &next {
				visited.insert(node_id.clone());
				out.push((node_id.clone(), rel.clone().unwrap_or_default(), hops));
			}

			frontier = next;
		}

		out
	}
}

/// Graph store held in process, loaded from a JSON corpus file or built in code.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
	namespaces: HashMap<String, Namespace>,
}
impl MemoryGraphStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_path(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path)
			.map_err(|err| Error::ReadCorpus { path: path.to_path_buf(), source: err })?;

		Self::from_json(&raw)
	}

	pub fn from_json(raw: &str) -> Result<Self> {
		let corpus: CorpusFile = serde_json::from_str(raw)?;
		let mut store = Self::new();

		for (namespace, content) in corpus.namespaces {
			store.insert(&namespace, content.passages, content.relationships);
		}

		Ok(store)
	}

	/// Appends passages and relationships to a namespace. Passages keep insertion order.
	pub fn insert(
		&mut self,
		namespace: &str,
		passages: Vec<Passage>,
		relationships: Vec<Relationship>,
	) {
		let entry = self.namespaces.entry(namespace.to_string()).or_default();

		for passage in passages {
			entry.insert_passage(passage);
		}
		for relationship in relationships {
			entry.insert_relationship(relationship);
		}
	}

	pub fn with_namespace(
		mut self,
		namespace: &str,
		passages: Vec<Passage>,
		relationships: Vec<Relationship>,
	) -> Self {
		self.insert(namespace, passages, relationships);

		self
	}

	fn scan(&self, namespace: &str, tokens: &[String]) -> Vec<Passage> {
		let Some(entry) = self.namespaces.get(namespace) else {
			return Vec::new();
		};

		entry
			.passages
			.iter()
			.filter(|passage| lexical::match_count(tokens, &passage.text) > 0)
			.cloned()
			.collect()
	}

	fn traverse(
		&self,
		namespace: &str,
		seed_ids: &[String],
		hop_depth: u32,
		limit_per_seed: u32,
	) -> Vec<Neighbor> {
		let Some(entry) = self.namespaces.get(namespace) else {
			return Vec::new();
		};
		let seeds: HashSet<&str> = seed_ids.iter().map(String::as_str).collect();
		let mut ordered_seeds: Vec<&str> = seeds.iter().copied().collect();
		let mut out = Vec::new();

		ordered_seeds.sort_unstable();

		for seed_id in ordered_seeds {
			let mut rows: Vec<Neighbor> = entry
				.walk(seed_id, hop_depth)
				.into_iter()
				.filter(|(node_id, _, _)| !seeds.contains(node_id.as_str()))
				.filter_map(|(node_id, relationship, hops)| {
					let passage = entry.passage(&node_id)?;

					(!passage.text.trim().is_empty()).then(|| Neighbor {
						seed_id: seed_id.to_string(),
						passage: passage.clone(),
						relationship,
						hops,
					})
				})
				.collect();

			rows.sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.passage.id.cmp(&b.passage.id)));
			rows.truncate(limit_per_seed as usize);
			out.extend(rows);
		}

		out
	}
}
impl GraphStore for MemoryGraphStore {
	fn scan_matching<'a>(
		&'a self,
		namespace: &'a str,
		tokens: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Passage>>> {
		Box::pin(async move { Ok(self.scan(namespace, tokens)) })
	}

	fn neighbors<'a>(
		&'a self,
		namespace: &'a str,
		seed_ids: &'a [String],
		hop_depth: u32,
		limit_per_seed: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(async move { Ok(self.traverse(namespace, seed_ids, hop_depth, limit_per_seed)) })
	}

	fn stats<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, Result<GraphStats>> {
		Box::pin(async move {
			let stats = self
				.namespaces
				.get(namespace)
				.map(|entry| {
					GraphStats::from_counts(entry.passages.len() as u64, entry.relationship_count)
				})
				.unwrap_or_else(|| GraphStats::from_counts(0, 0));

			Ok(stats)
		})
	}

	fn ping(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rel(source: &str, target: &str, rel_type: &str) -> Relationship {
		Relationship {
			source_id: source.to_string(),
			target_id: target.to_string(),
			rel_type: rel_type.to_string(),
		}
	}

	fn store() -> MemoryGraphStore {
		MemoryGraphStore::new().with_namespace(
			"tax_law",
			vec![
				Passage::new("A", "Article A"),
				Passage::new("B", "Article B"),
				Passage::new("C", "Article C"),
				Passage::new("D", "   "),
			],
			vec![rel("A", "B", "CITES"), rel("C", "B", "AMENDS"), rel("A", "D", "CITES")],
		)
	}

	#[test]
	fn walks_edges_in_both_directions() {
		let rows = store().traverse("tax_law", &["B".to_string()], 1, 10);
		let ids: Vec<&str> = rows.iter().map(|row| row.passage.id.as_str()).collect();

		assert_eq!(ids, vec!["A", "C"]);
		assert_eq!(rows[1].relationship, "AMENDS");
	}

	#[test]
	fn two_hops_keep_first_edge_and_skip_blank_text() {
		let rows = store().traverse("tax_law", &["C".to_string()], 2, 10);
		let summary: Vec<(&str, &str, u32)> = rows
			.iter()
			.map(|row| (row.passage.id.as_str(), row.relationship.as_str(), row.hops))
			.collect();

		assert_eq!(summary, vec![("B", "AMENDS", 1), ("A", "AMENDS", 2)]);
	}

	#[test]
	fn unknown_namespace_is_empty() {
		assert!(store().scan("customs_law", &["article".to_string()]).is_empty());
	}
}
