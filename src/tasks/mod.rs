//! Background task framework
//!
//! A [`Task`] wraps one asynchronous store operation. The [`TaskRunner`]
//! executes it on the tokio runtime, and the [`TaskRegistry`] numbers, lists
//! and retains dispatched tasks for display.

pub mod impls;
pub mod output;
pub mod registry;
pub mod runner;
pub mod state;
pub mod task;

pub use impls::StoreTasks;
pub use output::{StoreHandle, TaskKind, TaskOutput};
pub use registry::{RegistryEvent, TaskRegistry, TaskSummary};
pub use runner::TaskRunner;
pub use state::TaskState;
pub use task::{Task, TaskCancelled, TaskContext, TaskError, TaskFuture};
