use serde_json::json;

use lexgraph_config::Postgres;
use lexgraph_domain::{Passage, Relationship, tokenize_query};
use lexgraph_storage::{
	GraphStore, KvStore, db::Db, kv::PgKvStore, passages::PgGraphStore,
};
use lexgraph_testkit::TestDatabase;

fn rel(source: &str, target: &str, rel_type: &str) -> Relationship {
	Relationship {
		source_id: source.to_string(),
		target_id: target.to_string(),
		rel_type: rel_type.to_string(),
	}
}

async fn seeded_store(test_db: &TestDatabase) -> (Db, PgGraphStore) {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let store = PgGraphStore::new(db.pool.clone());

	store
		.upsert_passages(
			"tax_law",
			&[
				Passage::new("A", "Exemption for agricultural products").with_embedding(vec![1.0, 0.0]),
				Passage::new("B", "Tax rates for services").with_embedding(vec![0.0, 1.0]),
				Passage::new("C", "Goods not subject to tax"),
				Passage::new("D", " "),
			],
		)
		.await
		.expect("Failed to insert passages.");
	store
		.insert_relationships(
			"tax_law",
			&[rel("A", "C", "CITES"), rel("B", "C", "AMENDS"), rel("D", "A", "CITES")],
		)
		.await
		.expect("Failed to insert relationships.");

	(db, store)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXGRAPH_PG_DSN to run."]
async fn scan_and_traversal_follow_store_order() {
	let Some(base_dsn) = lexgraph_testkit::env_dsn() else {
		eprintln!("Skipping scan_and_traversal_follow_store_order; set LEXGRAPH_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let (db, store) = seeded_store(&test_db).await;
	let tokens = tokenize_query("tax exemption");
	let scanned = store.scan_matching("tax_law", &tokens).await.expect("Failed to scan.");
	let ids: Vec<&str> = scanned.iter().map(|passage| passage.id.as_str()).collect();

	assert_eq!(ids, vec!["A", "B", "C"]);
	assert_eq!(scanned[0].embedding.as_deref(), Some(&[1.0_f32, 0.0][..]));

	let seeds = vec!["A".to_string()];
	let rows = store.neighbors("tax_law", &seeds, 2, 10).await.expect("Failed to traverse.");
	let summary: Vec<(&str, &str, u32)> = rows
		.iter()
		.map(|row| (row.passage.id.as_str(), row.relationship.as_str(), row.hops))
		.collect();

	assert_eq!(summary, vec![("C", "CITES", 1), ("B", "CITES", 2)]);

	let stats = store.stats("tax_law").await.expect("Failed to read stats.");

	assert_eq!(stats.node_count, 4);
	assert_eq!(stats.relationship_count, 3);

	db.pool.close().await;

	assert!(test_db.cleanup().await.is_ok(), "Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LEXGRAPH_PG_DSN to run."]
async fn kv_entries_persist_until_deleted() {
	let Some(base_dsn) = lexgraph_testkit::env_dsn() else {
		eprintln!("Skipping kv_entries_persist_until_deleted; set LEXGRAPH_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let (db, _) = seeded_store(&test_db).await;
	let kv = PgKvStore::new(db.pool.clone());

	kv.set("session:abc", json!({ "state": "done" }), None).await.expect("Failed to set value.");

	assert_eq!(
		kv.get("session:abc").await.expect("Failed to get value."),
		Some(json!({ "state": "done" }))
	);
	assert!(kv.delete("session:abc").await.expect("Failed to delete value."));
	assert_eq!(kv.get("session:abc").await.expect("Failed to get value."), None);

	db.pool.close().await;

	assert!(test_db.cleanup().await.is_ok(), "Failed to cleanup test database.");
}
