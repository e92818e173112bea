//! SQLite-backed relational connection
//!
//! Provides the store schema scripts for both known versions and a
//! [`RelationalConnection`] implementation over `rusqlite`.

use crate::maintenance::connection::{RelationalConnection, Row, SqlValue};
use crate::maintenance::error::{MaintenanceError, MaintenanceResult};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// Schema version without hash columns
pub const LEGACY_VERSION: &str = "0.1.0";

/// Schema version with hash columns
pub const CURRENT_VERSION: &str = "0.1.1";

/// Tables that identify a database as a store
pub const STORE_TABLES: [&str; 8] = [
	"GRAPHS",
	"GRAPH_TRIPLES",
	"TRIPLES",
	"NODES",
	"NAMESPACES",
	"NS_PREFIXES",
	"NS_URIS",
	"STORE_VERSION",
];

const LEGACY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS STORE_VERSION (
  version TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS GRAPHS (
  graphID INTEGER PRIMARY KEY,
  graphUri TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS GRAPH_TRIPLES (
  graphID INTEGER NOT NULL,
  tripleID INTEGER NOT NULL,
  PRIMARY KEY (graphID, tripleID)
);

CREATE TABLE IF NOT EXISTS NODES (
  nodeID INTEGER PRIMARY KEY,
  nodeType INTEGER NOT NULL,
  nodeValue TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS TRIPLES (
  tripleID INTEGER PRIMARY KEY,
  tripleSubject INTEGER NOT NULL,
  triplePredicate INTEGER NOT NULL,
  tripleObject INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS NS_PREFIXES (
  nsPrefixID INTEGER PRIMARY KEY,
  nsPrefix TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS NS_URIS (
  nsUriID INTEGER PRIMARY KEY,
  nsUri TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS NAMESPACES (
  nsID INTEGER PRIMARY KEY,
  graphID INTEGER NOT NULL,
  nsPrefixID INTEGER NOT NULL,
  nsUriID INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_graph_triples_triple ON GRAPH_TRIPLES(tripleID);
"#;

/// Migration from the legacy layout to `version`: adds the hash columns and
/// their indexes, then stamps the new version.
pub fn upgrade_script(version: &str) -> String {
	format!(
		r#"
ALTER TABLE GRAPHS ADD COLUMN graphHash INTEGER;
ALTER TABLE NS_URIS ADD COLUMN nsUriHash INTEGER;
ALTER TABLE NODES ADD COLUMN nodeHash INTEGER;
ALTER TABLE TRIPLES ADD COLUMN tripleHash INTEGER;

CREATE INDEX IF NOT EXISTS idx_graphs_hash ON GRAPHS(graphHash);
CREATE INDEX IF NOT EXISTS idx_ns_uris_hash ON NS_URIS(nsUriHash);
CREATE INDEX IF NOT EXISTS idx_nodes_hash ON NODES(nodeHash);
CREATE INDEX IF NOT EXISTS idx_triples_hash ON TRIPLES(tripleHash);

UPDATE STORE_VERSION SET version = '{}';
"#,
		escape(version)
	)
}

pub(crate) fn escape(value: &str) -> String {
	value.replace('\'', "''")
}

/// A [`RelationalConnection`] over a single SQLite database
#[derive(Debug)]
pub struct SqliteConnection {
	conn: Connection,
}

impl SqliteConnection {
	pub fn open(path: impl AsRef<Path>) -> MaintenanceResult<Self> {
		let conn = Connection::open(path)?;
		Ok(Self { conn })
	}

	pub fn open_in_memory() -> MaintenanceResult<Self> {
		Ok(Self { conn: Connection::open_in_memory()? })
	}

	pub fn from_connection(conn: Connection) -> Self {
		Self { conn }
	}

	pub fn inner(&self) -> &Connection {
		&self.conn
	}

	/// Create an empty store at the given schema version
	pub fn install_schema(&self, version: &str) -> MaintenanceResult<()> {
		self.conn.execute_batch(LEGACY_SCHEMA)?;
		self.conn.execute(
			"INSERT INTO STORE_VERSION(version) SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM STORE_VERSION)",
			[LEGACY_VERSION],
		)?;
		if version != LEGACY_VERSION {
			self.conn.execute_batch(&upgrade_script(version))?;
		}
		debug!("Installed store schema version {}", version);
		Ok(())
	}
}

fn to_sql_value(value: ValueRef<'_>) -> SqlValue {
	match value {
		ValueRef::Null => SqlValue::Null,
		ValueRef::Integer(v) => SqlValue::Integer(v),
		ValueRef::Real(v) => SqlValue::Real(v),
		ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
			SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
		}
	}
}

impl RelationalConnection for SqliteConnection {
	fn execute_scalar(&self, sql: &str) -> MaintenanceResult<SqlValue> {
		let value = self
			.conn
			.query_row(sql, [], |row| row.get_ref(0).map(to_sql_value))
			.optional()?;
		Ok(value.unwrap_or(SqlValue::Null))
	}

	fn execute_non_query(&self, sql: &str) -> MaintenanceResult<()> {
		self.conn.execute_batch(sql)?;
		Ok(())
	}

	fn execute_query(&self, sql: &str) -> MaintenanceResult<Vec<Row>> {
		let mut stmt = self.conn.prepare(sql)?;
		let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
		let mut rows = stmt.query([])?;
		let mut results = Vec::new();
		while let Some(row) = rows.next()? {
			let mut result = Row::new();
			for (index, name) in names.iter().enumerate() {
				result.insert(name, to_sql_value(row.get_ref(index)?));
			}
			results.push(result);
		}
		Ok(results)
	}

	fn is_store(&self) -> MaintenanceResult<bool> {
		let list = STORE_TABLES.iter().map(|t| format!("'{t}'")).collect::<Vec<_>>().join(", ");
		let sql = format!("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ({list})");
		Ok(self.count(&sql)? == STORE_TABLES.len() as u64)
	}

	fn version(&self) -> MaintenanceResult<String> {
		if !self.is_store()? {
			return Err(MaintenanceError::NotAStore);
		}
		self.execute_scalar("SELECT version FROM STORE_VERSION LIMIT 1")?
			.as_text()
			.ok_or(MaintenanceError::NotAStore)
	}
}
