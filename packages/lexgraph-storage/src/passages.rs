use sqlx::PgPool;

use lexgraph_domain::{Neighbor, Passage, Relationship};

use crate::{BoxFuture, GraphStats, GraphStore, Result};

#[derive(Debug, sqlx::FromRow)]
struct PassageRow {
	id: String,
	text: String,
	embedding: Option<Vec<f32>>,
	document_id: Option<String>,
	hierarchy_path: Option<String>,
}
impl From<PassageRow> for Passage {
	fn from(row: PassageRow) -> Self {
		Self {
			id: row.id,
			text: row.text,
			embedding: row.embedding,
			document_id: row.document_id,
			hierarchy_path: row.hierarchy_path,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
struct NeighborRow {
	seed_id: String,
	id: String,
	text: String,
	embedding: Option<Vec<f32>>,
	document_id: Option<String>,
	hierarchy_path: Option<String>,
	relationship: String,
	hops: i32,
}
impl From<NeighborRow> for Neighbor {
	fn from(row: NeighborRow) -> Self {
		Self {
			seed_id: row.seed_id,
			passage: Passage {
				id: row.id,
				text: row.text,
				embedding: row.embedding,
				document_id: row.document_id,
				hierarchy_path: row.hierarchy_path,
			},
			relationship: row.relationship,
			hops: row.hops.max(0) as u32,
		}
	}
}

/// Escapes `LIKE` metacharacters and wraps the token for a substring match.
pub fn like_pattern(token: &str) -> String {
	let mut out = String::with_capacity(token.len() + 2);

	out.push('%');

	for ch in token.chars() {
		if matches!(ch, '%' | '_' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out.push('%');

	out
}

pub struct PgGraphStore {
	pool: PgPool,
}
impl PgGraphStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Inserts passages in order, replacing text and metadata of existing ids.
	pub async fn upsert_passages(&self, namespace: &str, passages: &[Passage]) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		for passage in passages {
			sqlx::query(
				"\
INSERT INTO passages (namespace, id, text, embedding, document_id, hierarchy_path)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (namespace, id) DO UPDATE
SET
	text = EXCLUDED.text,
	embedding = EXCLUDED.embedding,
	document_id = EXCLUDED.document_id,
	hierarchy_path = EXCLUDED.hierarchy_path",
			)
			.bind(namespace)
			.bind(passage.id.as_str())
			.bind(passage.text.as_str())
			.bind(passage.embedding.as_deref())
			.bind(passage.document_id.as_deref())
			.bind(passage.hierarchy_path.as_deref())
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;

		Ok(())
	}

	pub async fn insert_relationships(
		&self,
		namespace: &str,
		relationships: &[Relationship],
	) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		for relationship in relationships {
			sqlx::query(
				"\
INSERT INTO relationships (namespace, source_id, target_id, rel_type)
VALUES ($1, $2, $3, $4)
ON CONFLICT DO NOTHING",
			)
			.bind(namespace)
			.bind(relationship.source_id.as_str())
			.bind(relationship.target_id.as_str())
			.bind(relationship.rel_type.as_str())
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;

		Ok(())
	}

	async fn scan_matching_inner(&self, namespace: &str, tokens: &[String]) -> Result<Vec<Passage>> {
		if tokens.is_empty() {
			return Ok(Vec::new());
		}

		let patterns: Vec<String> = tokens.iter().map(|token| like_pattern(token)).collect();
		let rows: Vec<PassageRow> = sqlx::query_as(
			"\
SELECT id, text, embedding, document_id, hierarchy_path
FROM passages
WHERE namespace = $1
	AND lower(normalize(text, NFC)) LIKE ANY($2)
ORDER BY ordinal ASC",
		)
		.bind(namespace)
		.bind(&patterns)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(Passage::from).collect())
	}

	async fn neighbors_inner(
		&self,
		namespace: &str,
		seed_ids: &[String],
		hop_depth: u32,
		limit_per_seed: u32,
	) -> Result<Vec<Neighbor>> {
		if seed_ids.is_empty() || hop_depth == 0 || limit_per_seed == 0 {
			return Ok(Vec::new());
		}

		let rows: Vec<NeighborRow> = sqlx::query_as(
			"\
WITH RECURSIVE edges AS (
	SELECT source_id AS from_id, target_id AS to_id, rel_type
	FROM relationships
	WHERE namespace = $1
	UNION ALL
	SELECT target_id AS from_id, source_id AS to_id, rel_type
	FROM relationships
	WHERE namespace = $1
),
walk AS (
	SELECT
		e.from_id AS seed_id,
		e.to_id AS node_id,
		e.rel_type AS relationship,
		1 AS hops,
		ARRAY[e.from_id, e.to_id] AS path
	FROM edges e
	WHERE e.from_id = ANY($2)
	UNION ALL
	SELECT w.seed_id, e.to_id, w.relationship, w.hops + 1, w.path || e.to_id
	FROM walk w
	JOIN edges e ON e.from_id = w.node_id
	WHERE w.hops < $3 AND NOT (e.to_id = ANY(w.path))
),
shortest AS (
	SELECT DISTINCT ON (seed_id, node_id) seed_id, node_id, relationship, hops
	FROM walk
	ORDER BY seed_id, node_id, hops ASC, relationship ASC
),
ranked AS (
	SELECT
		s.seed_id,
		p.id,
		p.text,
		p.embedding,
		p.document_id,
		p.hierarchy_path,
		s.relationship,
		s.hops,
		row_number() OVER (PARTITION BY s.seed_id ORDER BY s.hops ASC, p.id ASC) AS rn
	FROM shortest s
	JOIN passages p ON p.namespace = $1 AND p.id = s.node_id
	WHERE NOT (s.node_id = ANY($2)) AND btrim(p.text) <> ''
)
SELECT seed_id, id, text, embedding, document_id, hierarchy_path, relationship, hops
FROM ranked
WHERE rn <= $4
ORDER BY seed_id ASC, hops ASC, id ASC",
		)
		.bind(namespace)
		.bind(seed_ids)
		.bind(hop_depth as i32)
		.bind(i64::from(limit_per_seed))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(Neighbor::from).collect())
	}

	async fn stats_inner(&self, namespace: &str) -> Result<GraphStats> {
		let (node_count, relationship_count): (i64, i64) = sqlx::query_as(
			"\
SELECT
	(SELECT count(*) FROM passages WHERE namespace = $1),
	(SELECT count(*) FROM relationships WHERE namespace = $1)",
		)
		.bind(namespace)
		.fetch_one(&self.pool)
		.await?;

		Ok(GraphStats::from_counts(node_count.max(0) as u64, relationship_count.max(0) as u64))
	}
}
impl GraphStore for PgGraphStore {
	fn scan_matching<'a>(
		&'a self,
		namespace: &'a str,
		tokens: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Passage>>> {
		Box::pin(self.scan_matching_inner(namespace, tokens))
	}

	fn neighbors<'a>(
		&'a self,
		namespace: &'a str,
		seed_ids: &'a [String],
		hop_depth: u32,
		limit_per_seed: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(self.neighbors_inner(namespace, seed_ids, hop_depth, limit_per_seed))
	}

	fn stats<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, Result<GraphStats>> {
		Box::pin(self.stats_inner(namespace))
	}

	fn ping(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			sqlx::query("SELECT 1").execute(&self.pool).await?;

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn like_patterns_escape_metacharacters() {
		assert_eq!(like_pattern("thuế"), "%thuế%");
		assert_eq!(like_pattern("10%_x\\"), "%10\\%\\_x\\\\%");
	}
}
