pub const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS passages (
	ordinal bigserial NOT NULL,
	namespace text NOT NULL,
	id text NOT NULL,
	text text NOT NULL,
	embedding real[] NULL,
	document_id text NULL,
	hierarchy_path text NULL,
	PRIMARY KEY (namespace, id)
);
CREATE INDEX IF NOT EXISTS idx_passages_namespace_ordinal ON passages (namespace, ordinal);
CREATE TABLE IF NOT EXISTS relationships (
	namespace text NOT NULL,
	source_id text NOT NULL,
	target_id text NOT NULL,
	rel_type text NOT NULL,
	PRIMARY KEY (namespace, source_id, target_id, rel_type)
);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships (namespace, target_id);
CREATE TABLE IF NOT EXISTS kv_entries (
	key text PRIMARY KEY,
	value jsonb NOT NULL,
	expires_at timestamptz NULL,
	updated_at timestamptz NOT NULL DEFAULT now()
)";

pub fn statements() -> impl Iterator<Item = &'static str> {
	SCHEMA_SQL.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_into_non_empty_statements() {
		let statements: Vec<&str> = statements().collect();

		assert_eq!(statements.len(), 5);
		assert!(statements.iter().all(|statement| statement.starts_with("CREATE")));
	}
}
