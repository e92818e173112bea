//! Common test utilities for the store-manager library

#![allow(unused_imports, dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use store_manager::maintenance::{JobPhase, MaintenanceError, ProgressSink, RelationalConnection};
use store_manager::storage::{
	DatasetWriter, Graph, Node, QueryResult, ResultSet, StorageProvider, StorageServer,
	StoreTemplate, Triple,
};
use store_manager::{SqliteConnection, Task, TaskRegistry};
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Create a temporary directory for testing
pub fn setup_temp_dir() -> TempDir {
	TempDir::new().expect("Failed to create temp directory")
}

/// Create an on-disk store at `version` inside a fresh temp directory
pub fn create_store(version: &str) -> (TempDir, PathBuf, SqliteConnection) {
	let dir = setup_temp_dir();
	let path = dir.path().join("store.db");
	let conn = SqliteConnection::open(&path).expect("Failed to open store");
	conn.install_schema(version).expect("Failed to install schema");
	(dir, path, conn)
}

/// Row-level seeding helpers
pub mod seed {
	use super::*;

	pub fn graph(conn: &SqliteConnection, id: i64, uri: &str) {
		exec(conn, &format!("INSERT INTO GRAPHS(graphID, graphUri) VALUES ({id}, '{uri}')"));
	}

	pub fn node(conn: &SqliteConnection, id: i64, node_type: i64, value: &str) {
		let value = value.replace('\'', "''");
		exec(
			conn,
			&format!("INSERT INTO NODES(nodeID, nodeType, nodeValue) VALUES ({id}, {node_type}, '{value}')"),
		);
	}

	pub fn triple(conn: &SqliteConnection, id: i64, s: i64, p: i64, o: i64) {
		exec(
			conn,
			&format!(
				"INSERT INTO TRIPLES(tripleID, tripleSubject, triplePredicate, tripleObject) \
				VALUES ({id}, {s}, {p}, {o})"
			),
		);
	}

	pub fn link(conn: &SqliteConnection, graph: i64, triple: i64) {
		exec(conn, &format!("INSERT INTO GRAPH_TRIPLES(graphID, tripleID) VALUES ({graph}, {triple})"));
	}

	pub fn prefix(conn: &SqliteConnection, id: i64, prefix: &str) {
		exec(conn, &format!("INSERT INTO NS_PREFIXES(nsPrefixID, nsPrefix) VALUES ({id}, '{prefix}')"));
	}

	pub fn ns_uri(conn: &SqliteConnection, id: i64, uri: &str) {
		exec(conn, &format!("INSERT INTO NS_URIS(nsUriID, nsUri) VALUES ({id}, '{uri}')"));
	}

	pub fn namespace(conn: &SqliteConnection, id: i64, graph: i64, prefix: i64, uri: i64) {
		exec(
			conn,
			&format!(
				"INSERT INTO NAMESPACES(nsID, graphID, nsPrefixID, nsUriID) \
				VALUES ({id}, {graph}, {prefix}, {uri})"
			),
		);
	}

	fn exec(conn: &SqliteConnection, sql: &str) {
		conn.execute_non_query(sql).unwrap_or_else(|e| panic!("Seeding failed for {sql}: {e}"));
	}
}

/// Count rows in a table
pub fn rows(conn: &SqliteConnection, table: &str) -> u64 {
	conn.count(&format!("SELECT COUNT(*) FROM {table}")).expect("Failed to count rows")
}

/// Progress sink that records everything it receives
#[derive(Default)]
pub struct RecordingSink {
	pub ticks: Mutex<Vec<u64>>,
	pub errors: Mutex<Vec<String>>,
	pub phases: Mutex<Vec<JobPhase>>,
}

impl RecordingSink {
	pub fn ticks(&self) -> Vec<u64> {
		self.ticks.lock().unwrap().clone()
	}

	pub fn errors(&self) -> Vec<String> {
		self.errors.lock().unwrap().clone()
	}

	pub fn phases(&self) -> Vec<JobPhase> {
		self.phases.lock().unwrap().clone()
	}
}

impl ProgressSink for RecordingSink {
	fn progress(&self, completed: u64) {
		self.ticks.lock().unwrap().push(completed);
	}

	fn error(&self, error: &MaintenanceError) {
		self.errors.lock().unwrap().push(error.to_string());
	}

	fn phase(&self, phase: JobPhase) {
		self.phases.lock().unwrap().push(phase);
	}
}

pub fn triple(s: &str, p: &str, o: &str) -> Triple {
	Triple::new(Node::uri(s), Node::uri(p), Node::plain(o))
}

/// In-memory store keyed by graph name
#[derive(Default)]
pub struct MemoryProvider {
	pub name: String,
	pub graphs: Mutex<BTreeMap<Option<String>, Vec<Triple>>>,
	pub not_ready: bool,
	pub append_calls: AtomicUsize,
	pub page_calls: AtomicUsize,
	pub server: Option<Arc<MemoryServer>>,
}

impl MemoryProvider {
	pub fn named(name: &str) -> Self {
		Self { name: name.to_string(), ..Default::default() }
	}

	pub fn with_graph(self, uri: Option<&str>, triples: Vec<Triple>) -> Self {
		self.graphs.lock().unwrap().insert(uri.map(str::to_string), triples);
		self
	}

	pub fn graph(&self, uri: Option<&str>) -> Option<Vec<Triple>> {
		self.graphs.lock().unwrap().get(&uri.map(str::to_string)).cloned()
	}

	fn all_rows(&self) -> Vec<BTreeMap<String, Node>> {
		self.graphs
			.lock()
			.unwrap()
			.values()
			.flatten()
			.map(|t| {
				BTreeMap::from([
					("s".to_string(), t.subject.clone()),
					("p".to_string(), t.predicate.clone()),
					("o".to_string(), t.object.clone()),
				])
			})
			.collect()
	}

	fn variables() -> Vec<String> {
		vec!["s".to_string(), "p".to_string(), "o".to_string()]
	}
}

#[async_trait]
impl StorageProvider for MemoryProvider {
	fn describe(&self) -> String {
		format!("memory store '{}'", self.name)
	}

	fn is_ready(&self) -> bool {
		!self.not_ready
	}

	async fn list_graphs(&self) -> anyhow::Result<Vec<Option<String>>> {
		Ok(self.graphs.lock().unwrap().keys().cloned().collect())
	}

	async fn load_graph(&self, uri: Option<&str>) -> anyhow::Result<Graph> {
		let triples = self
			.graph(uri)
			.ok_or_else(|| anyhow::anyhow!("Graph {} does not exist", Graph::display_name(uri)))?;
		Ok(Graph { uri: uri.map(str::to_string), triples })
	}

	async fn save_graph(&self, graph: &Graph) -> anyhow::Result<()> {
		self.graphs.lock().unwrap().insert(graph.uri.clone(), graph.triples.clone());
		Ok(())
	}

	async fn append_triples(&self, uri: Option<&str>, triples: &[Triple]) -> anyhow::Result<()> {
		self.append_calls.fetch_add(1, Ordering::SeqCst);
		self.graphs
			.lock()
			.unwrap()
			.entry(uri.map(str::to_string))
			.or_default()
			.extend_from_slice(triples);
		Ok(())
	}

	async fn delete_graph(&self, uri: Option<&str>) -> anyhow::Result<()> {
		self.graphs.lock().unwrap().remove(&uri.map(str::to_string));
		Ok(())
	}

	async fn query(&self, sparql: &str) -> anyhow::Result<QueryResult> {
		if sparql.starts_with("ASK") {
			return Ok(QueryResult::Boolean(!self.all_rows().is_empty()));
		}
		Ok(QueryResult::Bindings(ResultSet { variables: Self::variables(), rows: self.all_rows() }))
	}

	async fn query_page(&self, sparql: &str, limit: usize, offset: usize) -> anyhow::Result<QueryResult> {
		self.page_calls.fetch_add(1, Ordering::SeqCst);
		if sparql.starts_with("ASK") {
			return self.query(sparql).await;
		}
		let rows = self.all_rows().into_iter().skip(offset).take(limit).collect();
		Ok(QueryResult::Bindings(ResultSet { variables: Self::variables(), rows }))
	}

	async fn update(&self, sparql: &str) -> anyhow::Result<()> {
		if sparql.trim().is_empty() {
			anyhow::bail!("Empty update");
		}
		Ok(())
	}

	fn server(&self) -> Option<Arc<dyn StorageServer>> {
		self.server.clone().map(|server| server as Arc<dyn StorageServer>)
	}
}

/// In-memory server hosting named stores
#[derive(Default)]
pub struct MemoryServer {
	pub stores: Mutex<BTreeMap<String, Arc<MemoryProvider>>>,
}

#[async_trait]
impl StorageServer for MemoryServer {
	fn describe(&self) -> String {
		"memory server".to_string()
	}

	async fn list_stores(&self) -> anyhow::Result<Vec<String>> {
		Ok(self.stores.lock().unwrap().keys().cloned().collect())
	}

	async fn get_store(&self, id: &str) -> anyhow::Result<Arc<dyn StorageProvider>> {
		let store = self.stores.lock().unwrap().get(id).cloned();
		let store = store.ok_or_else(|| anyhow::anyhow!("Store {id} does not exist"))?;
		Ok(store as Arc<dyn StorageProvider>)
	}

	async fn create_store(&self, template: &StoreTemplate) -> anyhow::Result<bool> {
		let mut stores = self.stores.lock().unwrap();
		if stores.contains_key(&template.id) {
			return Ok(false);
		}
		stores.insert(template.id.clone(), Arc::new(MemoryProvider::named(&template.id)));
		Ok(true)
	}

	async fn delete_store(&self, id: &str) -> anyhow::Result<()> {
		self.stores
			.lock()
			.unwrap()
			.remove(id)
			.map(|_| ())
			.ok_or_else(|| anyhow::anyhow!("Store {id} does not exist"))
	}
}

/// Dataset writer collecting graphs in memory
#[derive(Clone, Default)]
pub struct CollectingWriter {
	pub graphs: Arc<Mutex<Vec<Graph>>>,
	pub finished: Arc<Mutex<bool>>,
	pub fail_writes: bool,
}

impl DatasetWriter for CollectingWriter {
	fn write_graph(&mut self, graph: &Graph) -> anyhow::Result<()> {
		if self.fail_writes {
			anyhow::bail!("Disk full");
		}
		self.graphs.lock().unwrap().push(graph.clone());
		Ok(())
	}

	fn finish(&mut self) -> anyhow::Result<()> {
		*self.finished.lock().unwrap() = true;
		Ok(())
	}
}

/// Register a task and wait for its completion callback
pub async fn run_to_end(registry: &TaskRegistry, task: Task) -> Arc<Task> {
	let (tx, rx) = oneshot::channel();
	let id = registry
		.add(task, move |_| {
			let _ = tx.send(());
		})
		.expect("Failed to add task");
	rx.await.expect("Task callback was not invoked");
	registry.get(id).expect("Task was evicted")
}
