//! A single unit of asynchronous store work and its observable state

use crate::tasks::output::{TaskKind, TaskOutput};
use crate::tasks::state::TaskState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<TaskOutput>> + Send>>;
pub(crate) type TaskWork = Box<dyn FnOnce(TaskContext) -> TaskFuture + Send>;
type Subscriber = Box<dyn Fn(&Task) + Send + Sync>;

/// Captured failure of a task's work function
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct TaskError {
	pub message: String,
	/// Underlying causes, outermost first
	pub causes: Vec<String>,
}

impl TaskError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), causes: Vec::new() }
	}

	pub(crate) fn panicked(detail: &str) -> Self {
		Self::new(format!("task panicked: {detail}"))
	}

	/// Message followed by every cause, suitable for direct display
	pub fn full_message(&self) -> String {
		std::iter::once(self.message.as_str())
			.chain(self.causes.iter().map(String::as_str))
			.collect::<Vec<_>>()
			.join(": ")
	}
}

impl From<&anyhow::Error> for TaskError {
	fn from(err: &anyhow::Error) -> Self {
		Self {
			message: err.to_string(),
			causes: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
		}
	}
}

/// Returned by a work function that stopped early on request
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("task was cancelled")]
pub struct TaskCancelled;

/// Handle passed into a work function
#[derive(Clone)]
pub struct TaskContext {
	cancel: Option<Arc<AtomicBool>>,
	information: Arc<RwLock<String>>,
}

impl TaskContext {
	pub fn is_cancel_requested(&self) -> bool {
		self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
	}

	/// Bail out with [`TaskCancelled`] if cancellation was requested.
	/// Work functions call this at every row/batch/page boundary.
	pub fn check_cancelled(&self) -> anyhow::Result<()> {
		if self.is_cancel_requested() {
			return Err(TaskCancelled.into());
		}
		Ok(())
	}

	pub fn set_information(&self, information: impl Into<String>) {
		*self.information.write().unwrap_or_else(|e| e.into_inner()) = information.into();
	}
}

#[derive(Default)]
struct TaskInner {
	state: TaskState,
	started: Option<Instant>,
	finished: Option<Instant>,
	started_at: Option<DateTime<Utc>>,
	result: Option<TaskOutput>,
	error: Option<TaskError>,
}

/// How a run ended, as decided by the runner
pub(crate) enum TaskOutcome {
	Completed(TaskOutput),
	Failed(TaskError),
	Cancelled,
}

/// A named unit of store work that runs at most once
pub struct Task {
	name: String,
	kind: TaskKind,
	cancel: Option<Arc<AtomicBool>>,
	information: Arc<RwLock<String>>,
	inner: RwLock<TaskInner>,
	work: Mutex<Option<TaskWork>>,
	subscribers: RwLock<Vec<Subscriber>>,
}

impl Task {
	/// Create a task; whether it can be cancelled follows from its kind
	pub fn new<F, Fut>(name: impl Into<String>, kind: TaskKind, work: F) -> Self
	where
		F: FnOnce(TaskContext) -> Fut + Send + 'static,
		Fut: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
	{
		let cancel = kind.is_cancellable().then(|| Arc::new(AtomicBool::new(false)));
		let work: TaskWork = Box::new(move |ctx| Box::pin(work(ctx)));
		Self {
			name: name.into(),
			kind,
			cancel,
			information: Arc::new(RwLock::new(String::new())),
			inner: RwLock::new(TaskInner::default()),
			work: Mutex::new(Some(work)),
			subscribers: RwLock::new(Vec::new()),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> &TaskKind {
		&self.kind
	}

	pub fn state(&self) -> TaskState {
		self.read().state
	}

	pub fn information(&self) -> String {
		self.information.read().unwrap_or_else(|e| e.into_inner()).clone()
	}

	pub fn set_information(&self, information: impl Into<String>) {
		self.context().set_information(information);
	}

	/// Time since the task started, frozen once it finishes; `None` before it starts
	pub fn elapsed(&self) -> Option<Duration> {
		let inner = self.read();
		let started = inner.started?;
		Some(inner.finished.map_or_else(|| started.elapsed(), |finished| finished - started))
	}

	/// Wall-clock start time
	pub fn started_at(&self) -> Option<DateTime<Utc>> {
		self.read().started_at
	}

	/// Present only once the task has `Completed`
	pub fn result(&self) -> Option<TaskOutput> {
		self.read().result.clone()
	}

	/// Present only once the task has `CompletedWithErrors`
	pub fn error(&self) -> Option<TaskError> {
		self.read().error.clone()
	}

	pub fn is_cancellable(&self) -> bool {
		self.cancel.is_some()
	}

	pub fn is_cancel_requested(&self) -> bool {
		self.context().is_cancel_requested()
	}

	/// Ask the work function to stop at its next check.
	///
	/// Returns whether the request was recorded. On a non-cancellable or
	/// finished task this does nothing.
	pub fn cancel(&self) -> bool {
		match &self.cancel {
			Some(flag) if !self.state().is_terminal() => {
				debug!("Cancellation requested for task '{}'", self.name);
				flag.store(true, Ordering::SeqCst);
				true
			}
			_ => false,
		}
	}

	/// Register a callback fired on every state transition, on the thread making it
	pub fn subscribe<F>(&self, subscriber: F)
	where
		F: Fn(&Task) + Send + Sync + 'static,
	{
		self.subscribers.write().unwrap_or_else(|e| e.into_inner()).push(Box::new(subscriber));
	}

	pub(crate) fn context(&self) -> TaskContext {
		TaskContext { cancel: self.cancel.clone(), information: self.information.clone() }
	}

	pub(crate) fn has_work(&self) -> bool {
		self.work.lock().unwrap_or_else(|e| e.into_inner()).is_some()
	}

	pub(crate) fn take_work(&self) -> Option<TaskWork> {
		self.work.lock().unwrap_or_else(|e| e.into_inner()).take()
	}

	/// `NotRun -> Running`
	pub(crate) fn begin(&self) {
		{
			let mut inner = self.write();
			inner.state = TaskState::Running;
			inner.result = None;
			inner.error = None;
			inner.started = Some(Instant::now());
			inner.finished = None;
			inner.started_at = Some(Utc::now());
		}
		self.notify();
	}

	/// `Running -> terminal`
	pub(crate) fn complete(&self, outcome: TaskOutcome) {
		{
			let mut inner = self.write();
			inner.finished = Some(Instant::now());
			match outcome {
				TaskOutcome::Completed(output) => {
					inner.state = TaskState::Completed;
					inner.result = Some(output);
				}
				TaskOutcome::Failed(err) => {
					inner.state = TaskState::CompletedWithErrors;
					inner.error = Some(err);
				}
				TaskOutcome::Cancelled => {
					inner.state = TaskState::Cancelled;
				}
			}
		}
		self.notify();
	}

	fn notify(&self) {
		let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
		for subscriber in subscribers.iter() {
			subscriber(self);
		}
	}

	fn read(&self) -> RwLockReadGuard<'_, TaskInner> {
		self.inner.read().unwrap_or_else(|e| e.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, TaskInner> {
		self.inner.write().unwrap_or_else(|e| e.into_inner())
	}
}

impl std::fmt::Debug for Task {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Task")
			.field("name", &self.name)
			.field("kind", &self.kind)
			.field("state", &self.state())
			.field("information", &self.information())
			.finish()
	}
}
