//! Relational connection contract used by the compacter and upgrader

use crate::maintenance::error::{MaintenanceError, MaintenanceResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
	Null,
	Integer(i64),
	Real(f64),
	Text(String),
}

impl SqlValue {
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			SqlValue::Integer(v) => Some(*v),
			SqlValue::Real(v) => Some(*v as i64),
			SqlValue::Text(v) => v.trim().parse().ok(),
			SqlValue::Null => None,
		}
	}

	pub fn as_text(&self) -> Option<String> {
		match self {
			SqlValue::Text(v) => Some(v.clone()),
			SqlValue::Integer(v) => Some(v.to_string()),
			SqlValue::Real(v) => Some(v.to_string()),
			SqlValue::Null => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, SqlValue::Null)
	}
}

/// A result row with named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
	columns: BTreeMap<String, SqlValue>,
}

impl Row {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, column: &str, value: SqlValue) -> Self {
		self.insert(column, value);
		self
	}

	pub fn insert(&mut self, column: &str, value: SqlValue) {
		self.columns.insert(column.to_string(), value);
	}

	pub fn get(&self, column: &str) -> Option<&SqlValue> {
		self.columns.get(column)
	}

	pub fn get_i64(&self, column: &str) -> MaintenanceResult<i64> {
		self.get(column).and_then(SqlValue::as_i64).ok_or_else(|| MaintenanceError::column(column))
	}

	pub fn get_text(&self, column: &str) -> MaintenanceResult<String> {
		self.get(column).and_then(SqlValue::as_text).ok_or_else(|| MaintenanceError::column(column))
	}
}

/// Narrow view of a relational store connection.
///
/// Implementations own any locking needed if a connection is shared between jobs.
pub trait RelationalConnection: Send {
	/// Run a query returning a single value (first column of the first row)
	fn execute_scalar(&self, sql: &str) -> MaintenanceResult<SqlValue>;

	/// Run one or more statements with no result
	fn execute_non_query(&self, sql: &str) -> MaintenanceResult<()>;

	/// Run a query returning rows
	fn execute_query(&self, sql: &str) -> MaintenanceResult<Vec<Row>>;

	/// Whether the connected database has this application's schema
	fn is_store(&self) -> MaintenanceResult<bool>;

	/// Schema version of the connected store
	fn version(&self) -> MaintenanceResult<String>;

	/// Run a `COUNT` style query and read the result as an integer
	fn count(&self, sql: &str) -> MaintenanceResult<u64> {
		let value = self.execute_scalar(sql)?;
		value
			.as_i64()
			.map(|v| v.max(0) as u64)
			.ok_or_else(|| MaintenanceError::query(sql, format!("expected a count, got {value:?}")))
	}
}

impl<C: RelationalConnection + ?Sized> RelationalConnection for Box<C> {
	fn execute_scalar(&self, sql: &str) -> MaintenanceResult<SqlValue> {
		(**self).execute_scalar(sql)
	}

	fn execute_non_query(&self, sql: &str) -> MaintenanceResult<()> {
		(**self).execute_non_query(sql)
	}

	fn execute_query(&self, sql: &str) -> MaintenanceResult<Vec<Row>> {
		(**self).execute_query(sql)
	}

	fn is_store(&self) -> MaintenanceResult<bool> {
		(**self).is_store()
	}

	fn version(&self) -> MaintenanceResult<String> {
		(**self).version()
	}
}
