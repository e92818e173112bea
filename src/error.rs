use thiserror::Error;

/// Crate-level error types
///
/// Module-specific errors are defined in their respective modules:
/// - Maintenance errors: `crate::maintenance::MaintenanceError`
/// - Captured task failures: `crate::tasks::TaskError`
#[derive(Error, Debug)]
pub enum StoreManagerError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON serialization error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Task {id} is not registered")]
	UnknownTask { id: u64 },

	#[error("Task '{name}' has already been started and cannot run again")]
	TaskAlreadyStarted { name: String },

	#[error("No tokio runtime is available to run task '{name}'")]
	NoRuntime { name: String },

	#[error(
		"Configuration error: {parameter} - {reason} (expected: {expected}, actual: {actual})"
	)]
	ConfigurationError {
		parameter: String,
		reason: String,
		expected: String,
		actual: String,
	},

	#[error("Maintenance error: {0}")]
	Maintenance(#[from] Box<crate::maintenance::MaintenanceError>),
}

impl StoreManagerError {
	/// Check if this error is related to configuration issues
	pub fn is_configuration_error(&self) -> bool {
		match self {
			StoreManagerError::ConfigurationError { .. } => true,
			StoreManagerError::Maintenance(err) => err.is_validation(),
			_ => false,
		}
	}

	/// Get error category for logging
	pub fn category(&self) -> &'static str {
		match self {
			StoreManagerError::Io(_) => "io",
			StoreManagerError::Json(_) => "serialization",
			StoreManagerError::UnknownTask { .. } => "registry",
			StoreManagerError::TaskAlreadyStarted { .. } => "task",
			StoreManagerError::NoRuntime { .. } => "runtime",
			StoreManagerError::ConfigurationError { .. } => "configuration",
			StoreManagerError::Maintenance(_) => "maintenance",
		}
	}

	/// Create a configuration error
	pub fn configuration_error(
		parameter: &str, reason: &str, expected: &str, actual: &str,
	) -> Self {
		StoreManagerError::ConfigurationError {
			parameter: parameter.to_string(),
			reason: reason.to_string(),
			expected: expected.to_string(),
			actual: actual.to_string(),
		}
	}
}

// Custom From implementation for boxed maintenance errors
impl From<crate::maintenance::MaintenanceError> for StoreManagerError {
	fn from(err: crate::maintenance::MaintenanceError) -> Self {
		StoreManagerError::Maintenance(Box::new(err))
	}
}

pub type Result<T> = std::result::Result<T, StoreManagerError>;
