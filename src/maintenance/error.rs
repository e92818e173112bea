//! Error types for maintenance jobs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaintenanceError {
	#[error("SQLite error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("Query failed: {sql} - {reason}")]
	Query { sql: String, reason: String },

	#[error("Column '{column}' is missing or has the wrong type")]
	Column { column: String },

	#[error("Connection is not a recognized store")]
	NotAStore,

	#[error("No upgrade is required for a store at version {version}")]
	UpgradeNotRequired { version: String },

	#[error("Node {node_id} has unknown node type {node_type}")]
	UnknownNodeType { node_id: i64, node_type: i64 },

	#[error("{job} is already running")]
	AlreadyRunning { job: &'static str },

	#[error("{job} has already finished; create a new job to run it again")]
	AlreadyCompleted { job: &'static str },

	#[error("Invalid configuration: {0}")]
	InvalidConfiguration(String),
}

impl MaintenanceError {
	/// Validation errors are raised before any store mutation takes place
	pub fn is_validation(&self) -> bool {
		matches!(
			self,
			MaintenanceError::NotAStore
				| MaintenanceError::UpgradeNotRequired { .. }
				| MaintenanceError::AlreadyRunning { .. }
				| MaintenanceError::AlreadyCompleted { .. }
				| MaintenanceError::InvalidConfiguration(_)
		)
	}

	pub fn query(sql: &str, reason: impl ToString) -> Self {
		MaintenanceError::Query { sql: sql.to_string(), reason: reason.to_string() }
	}

	pub fn column(column: &str) -> Self {
		MaintenanceError::Column { column: column.to_string() }
	}
}

pub type MaintenanceResult<T> = Result<T, MaintenanceError>;
