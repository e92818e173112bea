//! Task lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// `NotRun -> Running -> Completed | CompletedWithErrors | Cancelled`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
	#[default]
	NotRun,
	Running,
	Completed,
	CompletedWithErrors,
	Cancelled,
}

impl TaskState {
	/// Display string shown in task lists
	pub fn description(self) -> &'static str {
		match self {
			TaskState::NotRun => "Not Run",
			TaskState::Running => "Running",
			TaskState::Completed => "Completed",
			TaskState::CompletedWithErrors => "Completed with Errors",
			TaskState::Cancelled => "Cancelled",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			TaskState::Completed | TaskState::CompletedWithErrors | TaskState::Cancelled
		)
	}

	/// States the registry may evict
	pub fn is_evictable(self) -> bool {
		matches!(self, TaskState::Completed | TaskState::CompletedWithErrors)
	}
}

impl fmt::Display for TaskState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.description())
	}
}
