// Integration tests for the legacy schema upgrade

use std::sync::Arc;
use store_manager::maintenance::sqlite::{upgrade_script, CURRENT_VERSION, LEGACY_VERSION};
use store_manager::maintenance::{JobPhase, MaintenanceError, RelationalConnection};
use store_manager::storage::node::{hash_text, triple_hash};
use store_manager::storage::Node;
use store_manager::{MaintenanceConfig, SqliteConnection, StoreUpgrader};

mod common;
use common::{seed, RecordingSink};

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

fn seed_legacy(conn: &SqliteConnection) {
	seed::graph(conn, 1, "urn:g");
	seed::ns_uri(conn, 1, "http://example.org/");
	seed::node(conn, 1, 1, "http://example.org/s");
	seed::node(conn, 2, 1, "http://example.org/p");
	seed::node(conn, 3, 2, &format!("\"hello\"^^{XSD_STRING}"));
	seed::node(conn, 4, 2, "\"bonjour\"@fr");
	seed::node(conn, 5, 0, "_:b1");
	seed::triple(conn, 1, 1, 2, 3);
	seed::triple(conn, 2, 5, 2, 4);
	seed::link(conn, 1, 1);
	seed::link(conn, 1, 2);
}

fn scalar(conn: &SqliteConnection, sql: &str) -> i64 {
	conn.execute_scalar(sql).unwrap().as_i64().unwrap_or_else(|| panic!("No value for {sql}"))
}

fn node_hash(conn: &SqliteConnection, id: i64) -> i64 {
	scalar(conn, &format!("SELECT nodeHash FROM NODES WHERE nodeID = {id}"))
}

#[test]
fn test_upgrade_backfills_every_table() {
	let (_dir, _path, conn) = common::create_store(LEGACY_VERSION);
	seed_legacy(&conn);

	let sink = Arc::new(RecordingSink::default());
	let mut upgrader = StoreUpgrader::new(conn, MaintenanceConfig::default(), sink.clone()).unwrap();
	assert!(upgrader.upgrade_required());

	let required = upgrader.operations_required().unwrap();
	assert_eq!(required, 1 + 1 + 1 + 5 + 2);
	assert_eq!(upgrader.upgrade().unwrap(), required);
	assert_eq!(sink.ticks(), (1..=required).collect::<Vec<_>>());
	assert_eq!(
		sink.phases(),
		vec![
			JobPhase::Migrating,
			JobPhase::BackfillingGraphs,
			JobPhase::BackfillingNamespaces,
			JobPhase::BackfillingNodes,
			JobPhase::BackfillingTriples,
			JobPhase::Done,
		]
	);

	let conn = upgrader.into_connection();
	assert_eq!(conn.version().unwrap(), CURRENT_VERSION);
	assert_eq!(scalar(&conn, "SELECT graphHash FROM GRAPHS WHERE graphID = 1"), hash_text("urn:g") as i64);
	assert_eq!(
		scalar(&conn, "SELECT nsUriHash FROM NS_URIS WHERE nsUriID = 1"),
		hash_text("http://example.org/") as i64
	);
	assert_eq!(node_hash(&conn, 3), Node::typed("hello", XSD_STRING).stable_hash() as i64);
	assert_eq!(node_hash(&conn, 4), Node::lang("bonjour", "fr").stable_hash() as i64);
	assert_eq!(node_hash(&conn, 5), Node::blank("b1").stable_hash() as i64);

	let expected = triple_hash(node_hash(&conn, 1), node_hash(&conn, 2), node_hash(&conn, 3));
	assert_eq!(scalar(&conn, "SELECT tripleHash FROM TRIPLES WHERE tripleID = 1"), expected as i64);
}

#[test]
fn test_triple_hashes_use_backfilled_node_hashes() {
	let (_dir, _path, conn) = common::create_store(LEGACY_VERSION);
	seed_legacy(&conn);

	// The migration leaves a stale hash on every node; the node step must replace it
	let config = MaintenanceConfig {
		migration_script: Some(format!("{}\nUPDATE NODES SET nodeHash = 0;", upgrade_script(CURRENT_VERSION))),
		..MaintenanceConfig::default()
	};
	let mut upgrader = StoreUpgrader::new(conn, config, Arc::new(RecordingSink::default())).unwrap();
	upgrader.upgrade().unwrap();

	let conn = upgrader.into_connection();
	let stale = triple_hash(0, 0, 0) as i64;
	let expected = triple_hash(
		Node::blank("b1").stable_hash() as i64,
		Node::uri("http://example.org/p").stable_hash() as i64,
		Node::lang("bonjour", "fr").stable_hash() as i64,
	) as i64;
	let actual = scalar(&conn, "SELECT tripleHash FROM TRIPLES WHERE tripleID = 2");
	assert_ne!(actual, stale);
	assert_eq!(actual, expected);
}

#[test]
fn test_unknown_node_type_fails_without_rollback() {
	let (_dir, _path, conn) = common::create_store(LEGACY_VERSION);
	seed_legacy(&conn);
	seed::node(&conn, 6, 7, "mystery");

	let sink = Arc::new(RecordingSink::default());
	let mut upgrader = StoreUpgrader::new(conn, MaintenanceConfig::default(), sink.clone()).unwrap();
	let err = upgrader.upgrade().unwrap_err();
	assert!(matches!(err, MaintenanceError::UnknownNodeType { node_id: 6, node_type: 7 }));
	assert_eq!(upgrader.status().phase(), JobPhase::Failed);
	assert_eq!(sink.errors().len(), 1);

	// Steps already applied stay applied
	let conn = upgrader.into_connection();
	assert_eq!(conn.version().unwrap(), CURRENT_VERSION);
	assert_eq!(scalar(&conn, "SELECT graphHash FROM GRAPHS WHERE graphID = 1"), hash_text("urn:g") as i64);
	assert!(conn.execute_scalar("SELECT tripleHash FROM TRIPLES WHERE tripleID = 1").unwrap().is_null());
}

#[tokio::test]
async fn test_start_validates_before_spawning() {
	let (_dir, _path, conn) = common::create_store(CURRENT_VERSION);
	let sink = Arc::new(RecordingSink::default());
	let upgrader = StoreUpgrader::new(conn, MaintenanceConfig::default(), sink.clone()).unwrap();
	assert!(!upgrader.upgrade_required());

	let err = upgrader.start().err().unwrap();
	assert!(matches!(err, MaintenanceError::UpgradeNotRequired { ref version } if version == CURRENT_VERSION));
	assert!(err.is_validation());
	assert!(sink.phases().is_empty());
}

#[tokio::test]
async fn test_foreign_database_is_rejected() {
	let dir = common::setup_temp_dir();
	let conn = SqliteConnection::open(dir.path().join("other.db")).unwrap();
	conn.execute_non_query("CREATE TABLE people (id INTEGER PRIMARY KEY)").unwrap();

	let upgrader = StoreUpgrader::new(conn, MaintenanceConfig::default(), Arc::new(RecordingSink::default())).unwrap();
	assert_eq!(upgrader.version(), None);
	assert!(matches!(upgrader.start().err(), Some(MaintenanceError::NotAStore)));
}

#[tokio::test]
async fn test_background_upgrade() {
	let (_dir, path, conn) = common::create_store(LEGACY_VERSION);
	seed_legacy(&conn);

	let sink = Arc::new(RecordingSink::default());
	let upgrader = StoreUpgrader::new(conn, MaintenanceConfig::default(), sink.clone()).unwrap();
	let status = upgrader.status();
	let upgrader = upgrader.start().unwrap().await.unwrap();

	assert_eq!(status.phase(), JobPhase::Done);
	assert_eq!(upgrader.version(), Some(CURRENT_VERSION));
	drop(upgrader);

	let reopened = SqliteConnection::open(&path).unwrap();
	assert_eq!(reopened.version().unwrap(), CURRENT_VERSION);
	assert_eq!(sink.ticks().len(), 10);
}
