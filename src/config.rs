//! Configuration for the task registry and maintenance jobs
//!
//! Every job takes its settings explicitly through its constructor; there is no
//! process-wide settings object.

use crate::error::{Result, StoreManagerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Retention policy for the task registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
	/// Number of entries kept before old completed tasks are evicted
	pub retention: usize,

	/// Whether completed tasks are evicted at all
	pub evict_completed: bool,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self { retention: 10, evict_completed: true }
	}
}

impl RegistryConfig {
	/// Registry that never forgets a task
	pub fn keep_all() -> Self {
		Self { evict_completed: false, ..Default::default() }
	}

	pub fn validate(&self) -> std::result::Result<(), String> {
		if self.evict_completed && self.retention == 0 {
			return Err("Retention must be greater than 0 when eviction is enabled".to_string());
		}
		Ok(())
	}
}

/// Schema versions and migration script used by the upgrader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
	/// The oldest schema version, the only one that can be upgraded
	pub legacy_version: String,

	/// The schema version written by a successful upgrade
	pub current_version: String,

	/// Migration script run before the hash backfill.
	/// `None` uses the built-in SQLite script.
	pub migration_script: Option<String>,
}

impl Default for MaintenanceConfig {
	fn default() -> Self {
		Self {
			legacy_version: crate::maintenance::sqlite::LEGACY_VERSION.to_string(),
			current_version: crate::maintenance::sqlite::CURRENT_VERSION.to_string(),
			migration_script: None,
		}
	}
}

impl MaintenanceConfig {
	/// The script the upgrader will execute
	pub fn migration_script(&self) -> String {
		match &self.migration_script {
			Some(script) => script.clone(),
			None => crate::maintenance::sqlite::upgrade_script(&self.current_version),
		}
	}

	pub fn validate(&self) -> std::result::Result<(), String> {
		if self.legacy_version.trim().is_empty() {
			return Err("Legacy version must not be empty".to_string());
		}
		if self.current_version.trim().is_empty() {
			return Err("Current version must not be empty".to_string());
		}
		if self.legacy_version == self.current_version {
			return Err("Legacy and current versions must differ".to_string());
		}
		if matches!(&self.migration_script, Some(script) if script.trim().is_empty()) {
			return Err("Migration script must not be empty".to_string());
		}
		Ok(())
	}
}

/// Top-level configuration for a store manager session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
	pub registry: RegistryConfig,
	pub maintenance: MaintenanceConfig,

	/// Number of triples kept by a graph preview
	pub preview_size: usize,

	/// Page size for queries; `None` runs queries in one request
	pub default_page_size: Option<usize>,

	/// Triples written per batch during import
	pub import_batch_size: usize,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			registry: RegistryConfig::default(),
			maintenance: MaintenanceConfig::default(),
			preview_size: 100,
			default_page_size: None,
			import_batch_size: 1000,
		}
	}
}

impl ManagerConfig {
	/// Load a configuration from a JSON file; missing fields take their defaults
	pub fn from_json_file(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&text)?;
		config
			.validate()
			.map_err(|reason| StoreManagerError::configuration_error("config", &reason, "valid", "invalid"))?;
		Ok(config)
	}

	pub fn validate(&self) -> std::result::Result<(), String> {
		self.registry.validate()?;
		self.maintenance.validate()?;

		if self.preview_size == 0 {
			return Err("Preview size must be greater than 0".to_string());
		}

		if self.import_batch_size == 0 {
			return Err("Import batch size must be greater than 0".to_string());
		}

		if self.default_page_size == Some(0) {
			return Err("Page size must be greater than 0 when set".to_string());
		}

		Ok(())
	}
}
