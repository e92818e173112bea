//! Progress reporting for long-running maintenance jobs
//!
//! Jobs receive their sink through the constructor. Ticks are delivered on the
//! job's worker thread, strictly in order.

use crate::maintenance::error::MaintenanceError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Lifecycle phases shared by the compacter and upgrader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
	Idle,
	Counting,
	Compacting,
	Migrating,
	BackfillingGraphs,
	BackfillingNamespaces,
	BackfillingNodes,
	BackfillingTriples,
	Done,
	Failed,
}

impl JobPhase {
	pub fn is_terminal(self) -> bool {
		matches!(self, JobPhase::Done | JobPhase::Failed)
	}

	pub fn is_active(self) -> bool {
		!matches!(self, JobPhase::Idle) && !self.is_terminal()
	}
}

/// Receiver of job progress
pub trait ProgressSink: Send + Sync {
	/// Called once per completed operation with the cumulative count
	fn progress(&self, completed: u64);

	/// Called at most once, when the job fails
	fn error(&self, error: &MaintenanceError);

	fn phase(&self, _phase: JobPhase) {}
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
	pub phase: JobPhase,
	pub completed: u64,
	pub required: Option<u64>,
	pub error: Option<String>,
}

impl Default for JobSnapshot {
	fn default() -> Self {
		Self { phase: JobPhase::Idle, completed: 0, required: None, error: None }
	}
}

/// Shared, observable status of a running job.
///
/// Cloning yields another handle onto the same status.
#[derive(Debug, Clone, Default)]
pub struct JobStatus {
	inner: Arc<Mutex<JobSnapshot>>,
}

impl JobStatus {
	pub fn snapshot(&self) -> JobSnapshot {
		self.lock().clone()
	}

	pub fn phase(&self) -> JobPhase {
		self.lock().phase
	}

	pub fn completed(&self) -> u64 {
		self.lock().completed
	}

	pub fn required(&self) -> Option<u64> {
		self.lock().required
	}

	/// Whether the job has started and not yet reached `Done` or `Failed`
	pub fn is_running(&self) -> bool {
		self.phase().is_active()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, JobSnapshot> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}
}

/// Drives a job's status and sink together so they never disagree
pub(crate) struct JobReporter {
	job: &'static str,
	status: JobStatus,
	sink: Arc<dyn ProgressSink>,
}

impl JobReporter {
	pub(crate) fn new(job: &'static str, sink: Arc<dyn ProgressSink>) -> Self {
		Self { job, status: JobStatus::default(), sink }
	}

	pub(crate) fn status(&self) -> &JobStatus {
		&self.status
	}

	pub(crate) fn enter(&self, phase: JobPhase) {
		self.status.lock().phase = phase;
		debug!("{} entering {:?}", self.job, phase);
		self.sink.phase(phase);
	}

	pub(crate) fn set_required(&self, required: u64) {
		self.status.lock().required = Some(required);
	}

	/// Count one completed operation and report the new total
	pub(crate) fn tick(&self) {
		let completed = {
			let mut status = self.status.lock();
			status.completed += 1;
			status.completed
		};
		self.sink.progress(completed);
	}

	pub(crate) fn finish(&self) {
		let snapshot = self.status.snapshot();
		if let Some(required) = snapshot.required {
			if required != snapshot.completed {
				warn!(
					"{} finished after {} operations but {} were counted up front",
					self.job, snapshot.completed, required
				);
			}
		}
		self.enter(JobPhase::Done);
	}

	pub(crate) fn fail(&self, err: &MaintenanceError) {
		self.status.lock().error = Some(err.to_string());
		error!("{} failed: {}", self.job, err);
		self.enter(JobPhase::Failed);
		self.sink.error(err);
	}
}

/// Events forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
	Phase(JobPhase),
	Progress(u64),
	Error(String),
}

/// Forwards job events into a tokio channel so an async consumer can listen
#[derive(Debug, Clone)]
pub struct ChannelSink {
	sender: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelSink {
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self { sender }, receiver)
	}

	fn send(&self, event: JobEvent) {
		// A dropped receiver only means nobody is watching anymore
		if self.sender.send(event).is_err() {
			debug!("Job event receiver dropped");
		}
	}
}

impl ProgressSink for ChannelSink {
	fn progress(&self, completed: u64) {
		self.send(JobEvent::Progress(completed));
	}

	fn error(&self, error: &MaintenanceError) {
		self.send(JobEvent::Error(error.to_string()));
	}

	fn phase(&self, phase: JobPhase) {
		self.send(JobEvent::Phase(phase));
	}
}

/// Logs job progress through `tracing`
#[derive(Debug)]
pub struct TracingSink {
	job: &'static str,
	required: Mutex<Option<u64>>,
}

impl TracingSink {
	pub fn new(job: &'static str) -> Self {
		Self { job, required: Mutex::new(None) }
	}

	/// Total used to render "n/total" in progress lines
	pub fn set_required(&self, required: u64) {
		*self.required.lock().unwrap_or_else(|e| e.into_inner()) = Some(required);
	}
}

impl ProgressSink for TracingSink {
	fn progress(&self, completed: u64) {
		match *self.required.lock().unwrap_or_else(|e| e.into_inner()) {
			Some(required) => debug!("{}: {}/{} operations", self.job, completed, required),
			None => debug!("{}: {} operations", self.job, completed),
		}
	}

	// Failures are already logged by the job itself
	fn error(&self, _err: &MaintenanceError) {}

	fn phase(&self, phase: JobPhase) {
		info!("{}: {:?}", self.job, phase);
	}
}
