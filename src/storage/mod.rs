//! Storage collaborators consumed by store-operation tasks
//!
//! The concrete store protocols live outside this crate. Tasks only see the
//! traits below and treat every call as "a function that may fail".

pub mod node;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub use node::{Node, NodeType};

/// A single RDF statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
	pub subject: Node,
	pub predicate: Node,
	pub object: Node,
}

impl Triple {
	pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
		Self { subject, predicate, object }
	}
}

/// A named (or default, when `uri` is `None`) graph with its triples
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
	pub uri: Option<String>,
	pub triples: Vec<Triple>,
}

impl Graph {
	pub fn new(uri: Option<String>) -> Self {
		Self { uri, triples: Vec::new() }
	}

	pub fn len(&self) -> usize {
		self.triples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.triples.is_empty()
	}

	/// The same triples under a different graph name
	pub fn rehome(mut self, uri: Option<String>) -> Self {
		self.uri = uri;
		self
	}

	/// Display name used in task names and information strings
	pub fn display_name(uri: Option<&str>) -> String {
		uri.map(str::to_string).unwrap_or_else(|| "Default Graph".to_string())
	}
}

/// Tabular SPARQL results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
	pub variables: Vec<String>,
	pub rows: Vec<BTreeMap<String, Node>>,
}

/// Result of a SPARQL query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResult {
	Graph(Graph),
	Bindings(ResultSet),
	Boolean(bool),
}

impl QueryResult {
	/// Number of rows (or triples) in the result; ASK results count as one
	pub fn len(&self) -> usize {
		match self {
			QueryResult::Graph(graph) => graph.len(),
			QueryResult::Bindings(set) => set.rows.len(),
			QueryResult::Boolean(_) => 1,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Template for creating a new child store on a server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTemplate {
	pub id: String,
	pub properties: BTreeMap<String, String>,
}

impl StoreTemplate {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), properties: BTreeMap::new() }
	}
}

/// Raised by default trait methods for capabilities a store lacks
#[derive(Error, Debug)]
#[error("{store} does not support {operation}")]
pub struct UnsupportedOperation {
	pub store: String,
	pub operation: &'static str,
}

/// A connection to one triple store
#[async_trait]
pub trait StorageProvider: Send + Sync {
	/// Human-readable description of the store
	fn describe(&self) -> String;

	/// Whether the store is ready to accept requests
	fn is_ready(&self) -> bool {
		true
	}

	async fn list_graphs(&self) -> anyhow::Result<Vec<Option<String>>>;

	async fn load_graph(&self, uri: Option<&str>) -> anyhow::Result<Graph>;

	/// Replace the graph named by `graph.uri` with the given triples
	async fn save_graph(&self, graph: &Graph) -> anyhow::Result<()>;

	/// Add triples to a graph, creating it if missing
	async fn append_triples(&self, uri: Option<&str>, triples: &[Triple]) -> anyhow::Result<()>;

	async fn delete_graph(&self, uri: Option<&str>) -> anyhow::Result<()>;

	async fn query(&self, _sparql: &str) -> anyhow::Result<QueryResult> {
		Err(self.unsupported("query").into())
	}

	/// One page of a query's results
	async fn query_page(
		&self, _sparql: &str, _limit: usize, _offset: usize,
	) -> anyhow::Result<QueryResult> {
		Err(self.unsupported("paged query").into())
	}

	async fn update(&self, _sparql: &str) -> anyhow::Result<()> {
		Err(self.unsupported("update").into())
	}

	/// The server hosting this store, if it can manage child stores
	fn server(&self) -> Option<Arc<dyn StorageServer>> {
		None
	}

	fn unsupported(&self, operation: &'static str) -> UnsupportedOperation {
		UnsupportedOperation { store: self.describe(), operation }
	}
}

/// A server hosting several stores
#[async_trait]
pub trait StorageServer: Send + Sync {
	fn describe(&self) -> String;

	async fn list_stores(&self) -> anyhow::Result<Vec<String>>;

	async fn get_store(&self, id: &str) -> anyhow::Result<Arc<dyn StorageProvider>>;

	/// Returns whether the store was created
	async fn create_store(&self, template: &StoreTemplate) -> anyhow::Result<bool>;

	async fn delete_store(&self, id: &str) -> anyhow::Result<()>;
}

/// Parsed triples to import, produced by an external RDF parser
pub type TripleSource = Box<dyn Iterator<Item = anyhow::Result<Triple>> + Send>;

/// Serializer for exported graphs, provided by an external RDF writer
pub trait DatasetWriter: Send {
	fn write_graph(&mut self, graph: &Graph) -> anyhow::Result<()>;

	/// Called exactly once per export, including after a failed or cancelled one
	fn finish(&mut self) -> anyhow::Result<()> {
		Ok(())
	}
}
