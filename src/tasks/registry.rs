//! Registry of dispatched tasks
//!
//! Owns every task it starts, keyed by a monotonically increasing ID. State
//! changes are mirrored onto a broadcast channel so a display can follow along
//! without holding references into the registry.

use crate::config::RegistryConfig;
use crate::error::{Result, StoreManagerError};
use crate::tasks::output::TaskKind;
use crate::tasks::runner::TaskRunner;
use crate::tasks::state::TaskState;
use crate::tasks::task::Task;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

/// Notifications published by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
	Added { id: u64, name: String },
	StateChanged { id: u64, state: TaskState },
	Evicted { id: u64 },
}

/// Display row for one registered task
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
	pub id: u64,
	pub name: String,
	pub kind: TaskKind,
	pub state: TaskState,
	pub information: String,
	pub elapsed_ms: Option<u64>,
	pub started_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
}

impl TaskSummary {
	fn of(id: u64, task: &Task) -> Self {
		Self {
			id,
			name: task.name().to_string(),
			kind: task.kind().clone(),
			state: task.state(),
			information: task.information(),
			elapsed_ms: task.elapsed().map(|d| d.as_millis() as u64),
			started_at: task.started_at(),
			error: task.error().map(|err| err.full_message()),
		}
	}
}

struct RegistryInner {
	next_id: u64,
	tasks: BTreeMap<u64, Arc<Task>>,
	config: RegistryConfig,
}

/// Ordered collection of dispatched tasks with a retention policy
pub struct TaskRegistry {
	runner: TaskRunner,
	inner: Mutex<RegistryInner>,
	events: broadcast::Sender<RegistryEvent>,
}

impl TaskRegistry {
	pub fn new(runner: TaskRunner, config: RegistryConfig) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			runner,
			inner: Mutex::new(RegistryInner { next_id: 0, tasks: BTreeMap::new(), config }),
			events,
		}
	}

	/// Registry on the current tokio runtime
	pub fn with_config(config: RegistryConfig) -> Result<Self> {
		config.validate().map_err(|reason| {
			StoreManagerError::configuration_error(
				"registry.retention",
				&reason,
				">= 1",
				&config.retention.to_string(),
			)
		})?;
		Ok(Self::new(TaskRunner::current()?, config))
	}

	pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
		self.events.subscribe()
	}

	/// Register `task`, evict old completed entries if over capacity, then start it.
	///
	/// Returns the assigned ID. `callback` runs once when the task ends.
	pub fn add<F>(&self, task: Task, callback: F) -> Result<u64>
	where
		F: FnOnce(&Task) + Send + 'static,
	{
		// Rejected before anything is registered, evicted or published
		if !task.has_work() {
			return Err(StoreManagerError::TaskAlreadyStarted { name: task.name().to_string() });
		}

		let task = Arc::new(task);
		let id = {
			let mut inner = self.lock();
			inner.next_id += 1;
			let id = inner.next_id;
			inner.tasks.insert(id, task.clone());
			id
		};

		let events = self.events.clone();
		task.subscribe(move |t| {
			// No receivers is fine
			let _ = events.send(RegistryEvent::StateChanged { id, state: t.state() });
		});
		let _ = self.events.send(RegistryEvent::Added { id, name: task.name().to_string() });
		info!("Task {} registered: {}", id, task.name());

		self.evict();

		if let Err(err) = self.runner.run(task, callback) {
			self.lock().tasks.remove(&id);
			let _ = self.events.send(RegistryEvent::Evicted { id });
			return Err(err);
		}
		Ok(id)
	}

	/// Snapshot of all tasks, most recent first
	pub fn list(&self) -> Vec<TaskSummary> {
		self.lock().tasks.iter().rev().map(|(id, task)| TaskSummary::of(*id, task)).collect()
	}

	pub fn get(&self, id: u64) -> Option<Arc<Task>> {
		self.lock().tasks.get(&id).cloned()
	}

	pub fn len(&self) -> usize {
		self.lock().tasks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Request cancellation; returns whether the task accepted the request
	pub fn cancel(&self, id: u64) -> Result<bool> {
		let task = self.get(id).ok_or(StoreManagerError::UnknownTask { id })?;
		Ok(task.cancel())
	}

	/// Toggle eviction of old completed tasks
	pub fn set_eviction(&self, enabled: bool) {
		self.lock().config.evict_completed = enabled;
	}

	pub fn eviction_enabled(&self) -> bool {
		self.lock().config.evict_completed
	}

	// Oldest first, completed entries only, until back within retention
	fn evict(&self) {
		let evicted = {
			let mut inner = self.lock();
			if !inner.config.evict_completed || inner.tasks.len() <= inner.config.retention {
				return;
			}

			let excess = inner.tasks.len() - inner.config.retention;
			let candidates: Vec<u64> = inner
				.tasks
				.iter()
				.filter(|(_, task)| task.state().is_evictable())
				.map(|(id, _)| *id)
				.take(excess)
				.collect();
			for id in &candidates {
				inner.tasks.remove(id);
			}
			candidates
		};

		for id in evicted {
			debug!("Evicted task {}", id);
			let _ = self.events.send(RegistryEvent::Evicted { id });
		}
	}

	fn lock(&self) -> MutexGuard<'_, RegistryInner> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}
}
