//! Store statistics

use crate::maintenance::connection::RelationalConnection;
use crate::maintenance::error::MaintenanceResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of a relational store's contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
	pub is_store: bool,
	pub version: Option<String>,
	pub graphs: u64,
	pub graph_triples: u64,
	pub unique_triples: u64,
	pub unique_nodes: u64,
}

impl StoreInfo {
	/// Read-only. Counts are left at zero when the database is not a store.
	pub fn collect(connection: &impl RelationalConnection) -> MaintenanceResult<Self> {
		if !connection.is_store()? {
			return Ok(Self::default());
		}

		Ok(Self {
			is_store: true,
			version: Some(connection.version()?),
			graphs: connection.count("SELECT COUNT(*) FROM GRAPHS")?,
			graph_triples: connection.count("SELECT COUNT(*) FROM GRAPH_TRIPLES")?,
			unique_triples: connection.count("SELECT COUNT(*) FROM TRIPLES")?,
			unique_nodes: connection.count("SELECT COUNT(*) FROM NODES")?,
		})
	}
}

impl fmt::Display for StoreInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if !self.is_store {
			return write!(f, "Not a recognized store");
		}
		writeln!(f, "Version:        {}", self.version.as_deref().unwrap_or("unknown"))?;
		writeln!(f, "Graphs:         {}", self.graphs)?;
		writeln!(f, "Graph Triples:  {}", self.graph_triples)?;
		writeln!(f, "Unique Triples: {}", self.unique_triples)?;
		write!(f, "Unique Nodes:   {}", self.unique_nodes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::maintenance::sqlite::{SqliteConnection, CURRENT_VERSION};

	#[test]
	fn test_collect_counts() {
		let conn = SqliteConnection::open_in_memory().unwrap();
		conn.install_schema(CURRENT_VERSION).unwrap();
		conn.execute_non_query(
			"INSERT INTO GRAPHS(graphID, graphUri) VALUES (1, 'urn:g');
			INSERT INTO NODES(nodeID, nodeType, nodeValue) VALUES (1, 1, 'urn:s'), (2, 1, 'urn:p');
			INSERT INTO TRIPLES(tripleID, tripleSubject, triplePredicate, tripleObject) VALUES (1, 1, 2, 1);
			INSERT INTO GRAPH_TRIPLES(graphID, tripleID) VALUES (1, 1);",
		)
		.unwrap();

		let info = StoreInfo::collect(&conn).unwrap();
		assert!(info.is_store);
		assert_eq!(info.version.as_deref(), Some(CURRENT_VERSION));
		assert_eq!((info.graphs, info.graph_triples, info.unique_triples, info.unique_nodes), (1, 1, 1, 2));
	}

	#[test]
	fn test_foreign_database() {
		let conn = SqliteConnection::open_in_memory().unwrap();
		let info = StoreInfo::collect(&conn).unwrap();
		assert!(!info.is_store);
		assert_eq!(info.to_string(), "Not a recognized store");
	}
}
