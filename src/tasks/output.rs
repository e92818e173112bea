//! Closed set of task kinds and their result payloads

use crate::storage::{Graph, QueryResult, StorageProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which store operation a task performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
	ListGraphs,
	ListStores,
	ViewGraph,
	PreviewGraph,
	CountTriples,
	DeleteGraph,
	Query { page_size: Option<usize> },
	Update,
	Import,
	Export,
	CopyGraph,
	MoveGraph,
	RenameGraph,
	GetStore,
	CreateStore,
	DeleteStore,
	/// Work supplied directly by the caller
	Custom { cancellable: bool },
}

impl TaskKind {
	/// Whether tasks of this kind observe cancellation requests
	pub fn is_cancellable(&self) -> bool {
		match self {
			TaskKind::Query { page_size } => page_size.is_some(),
			TaskKind::Import
			| TaskKind::Export
			| TaskKind::CopyGraph
			| TaskKind::MoveGraph
			| TaskKind::RenameGraph => true,
			TaskKind::Custom { cancellable } => *cancellable,
			_ => false,
		}
	}
}

/// Handle to a store opened by a `GetStore` task
#[derive(Clone)]
pub struct StoreHandle(pub Arc<dyn StorageProvider>);

impl fmt::Debug for StoreHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("StoreHandle").field(&self.0.describe()).finish()
	}
}

/// Result payload of a completed task
#[derive(Debug, Clone)]
pub enum TaskOutput {
	Graphs(Vec<Option<String>>),
	Stores(Vec<String>),
	Graph(Graph),
	Count(usize),
	Query(QueryResult),
	Store(StoreHandle),
	/// Whether a store was created
	Created(bool),
	/// Number of triples written by an import or export
	Transferred(usize),
	Done,
}

impl TaskOutput {
	pub fn as_graph(&self) -> Option<&Graph> {
		match self {
			TaskOutput::Graph(graph) => Some(graph),
			_ => None,
		}
	}

	pub fn as_count(&self) -> Option<usize> {
		match self {
			TaskOutput::Count(count) | TaskOutput::Transferred(count) => Some(*count),
			_ => None,
		}
	}
}
