//! Executes tasks off the calling thread

use crate::error::{Result, StoreManagerError};
use crate::tasks::task::{Task, TaskCancelled, TaskError, TaskOutcome};
use std::any::Any;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns task work onto a tokio runtime
#[derive(Debug, Clone)]
pub struct TaskRunner {
	handle: Handle,
}

impl TaskRunner {
	pub fn new(handle: Handle) -> Self {
		Self { handle }
	}

	/// Runner bound to the runtime of the calling context
	pub fn current() -> Result<Self> {
		Handle::try_current()
			.map(Self::new)
			.map_err(|_| StoreManagerError::NoRuntime { name: "task runner".to_string() })
	}

	/// Start `task` without blocking and invoke `callback` exactly once when it ends.
	///
	/// The task is `Running` when this returns. Errors and panics from the work
	/// function end up on the task; the only error returned here is for a task
	/// that was already started.
	pub fn run<F>(&self, task: Arc<Task>, callback: F) -> Result<JoinHandle<()>>
	where
		F: FnOnce(&Task) + Send + 'static,
	{
		let work = task
			.take_work()
			.ok_or_else(|| StoreManagerError::TaskAlreadyStarted { name: task.name().to_string() })?;

		task.begin();
		debug!("Task '{}' started", task.name());

		let ctx = task.context();
		let inner = self.handle.clone();
		Ok(self.handle.spawn(async move {
			// Separate task so a panicking work function cannot take the callback down with it
			let outcome = match inner.spawn(work(ctx)).await {
				Ok(Ok(output)) => TaskOutcome::Completed(output),
				Ok(Err(err)) if err.is::<TaskCancelled>() && task.is_cancellable() => {
					TaskOutcome::Cancelled
				}
				Ok(Err(err)) => TaskOutcome::Failed(TaskError::from(&err)),
				Err(join_err) if join_err.is_panic() => {
					TaskOutcome::Failed(TaskError::panicked(&panic_detail(join_err.into_panic())))
				}
				Err(join_err) => TaskOutcome::Failed(TaskError::new(join_err.to_string())),
			};

			match &outcome {
				TaskOutcome::Completed(_) => info!("Task '{}' completed", task.name()),
				TaskOutcome::Failed(err) => {
					warn!("Task '{}' completed with errors: {}", task.name(), err.full_message())
				}
				TaskOutcome::Cancelled => info!("Task '{}' cancelled", task.name()),
			}

			// Terminal notification fires before the callback
			task.complete(outcome);
			callback(&task);
		}))
	}
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tasks::output::{TaskKind, TaskOutput};
	use crate::tasks::state::TaskState;
	use std::sync::Mutex;
	use tokio::sync::oneshot;

	#[tokio::test]
	async fn test_success_sets_result() {
		let runner = TaskRunner::current().unwrap();
		let task = Arc::new(Task::new("Count", TaskKind::CountTriples, |ctx| async move {
			ctx.set_information("Graph contains 3 Triple(s)");
			Ok(TaskOutput::Count(3))
		}));

		runner.run(task.clone(), |_| {}).unwrap().await.unwrap();
		assert_eq!(task.state(), TaskState::Completed);
		assert_eq!(task.result().and_then(|r| r.as_count()), Some(3));
		assert!(task.error().is_none());
		assert_eq!(task.information(), "Graph contains 3 Triple(s)");
	}

	#[tokio::test]
	async fn test_error_is_captured() {
		let runner = TaskRunner::current().unwrap();
		let task = Arc::new(Task::new("Delete", TaskKind::DeleteGraph, |_ctx| async {
			Err(anyhow::anyhow!("graph is locked"))
		}));

		runner.run(task.clone(), |_| {}).unwrap().await.unwrap();
		assert_eq!(task.state(), TaskState::CompletedWithErrors);
		assert!(task.result().is_none());
		assert_eq!(task.error().unwrap().message, "graph is locked");
	}

	#[tokio::test]
	async fn test_panic_is_captured() {
		let runner = TaskRunner::current().unwrap();
		let task = Arc::new(Task::new("Panic", TaskKind::Update, |_ctx| async {
			if true {
				panic!("update exploded");
			}
			Ok(TaskOutput::Done)
		}));

		runner.run(task.clone(), |_| {}).unwrap().await.unwrap();
		assert_eq!(task.state(), TaskState::CompletedWithErrors);
		assert!(task.error().unwrap().message.contains("update exploded"));
	}

	#[tokio::test]
	async fn test_terminal_notification_precedes_callback() {
		let runner = TaskRunner::current().unwrap();
		let order = Arc::new(Mutex::new(Vec::new()));
		let task = Arc::new(Task::new("List", TaskKind::ListGraphs, |_ctx| async {
			Ok(TaskOutput::Graphs(Vec::new()))
		}));

		let seen = order.clone();
		task.subscribe(move |t| seen.lock().unwrap().push(format!("state:{}", t.state())));
		let (tx, rx) = oneshot::channel();
		let seen = order.clone();
		runner
			.run(task.clone(), move |t| {
				seen.lock().unwrap().push(format!("callback:{}", t.state()));
				let _ = tx.send(());
			})
			.unwrap();
		rx.await.unwrap();

		assert_eq!(
			*order.lock().unwrap(),
			vec!["state:Running", "state:Completed", "callback:Completed"]
		);
	}

	#[tokio::test]
	async fn test_task_runs_once() {
		let runner = TaskRunner::current().unwrap();
		let task = Arc::new(Task::new("Once", TaskKind::ListGraphs, |_ctx| async { Ok(TaskOutput::Done) }));
		runner.run(task.clone(), |_| {}).unwrap().await.unwrap();
		assert!(matches!(
			runner.run(task.clone(), |_| {}),
			Err(StoreManagerError::TaskAlreadyStarted { .. })
		));
		assert_eq!(task.state(), TaskState::Completed);
	}

	#[tokio::test]
	async fn test_cooperative_cancellation() {
		let runner = TaskRunner::current().unwrap();
		let (started_tx, started_rx) = oneshot::channel::<()>();
		let task = Arc::new(Task::new("Import", TaskKind::Import, move |ctx| async move {
			let _ = started_tx.send(());
			while !ctx.is_cancel_requested() {
				tokio::task::yield_now().await;
			}
			ctx.check_cancelled()?;
			Ok(TaskOutput::Done)
		}));

		let handle = runner.run(task.clone(), |_| {}).unwrap();
		started_rx.await.unwrap();
		assert!(task.cancel());
		handle.await.unwrap();
		assert_eq!(task.state(), TaskState::Cancelled);
		assert!(task.result().is_none());
		assert!(task.error().is_none());
	}
}
