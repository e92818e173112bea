//! Relational store maintenance jobs
//!
//! Long-running jobs that operate on a store's relational tables directly:
//! compaction of orphaned rows and the legacy schema upgrade. Both own their
//! connection for the duration of a run and report through a [`ProgressSink`].

pub mod compacter;
pub mod connection;
pub mod error;
pub mod progress;
pub mod sqlite;
pub mod stats;
pub mod upgrader;

pub use compacter::StoreCompacter;
pub use connection::{RelationalConnection, Row, SqlValue};
pub use error::{MaintenanceError, MaintenanceResult};
pub use progress::{ChannelSink, JobEvent, JobPhase, JobSnapshot, JobStatus, ProgressSink, TracingSink};
pub use sqlite::SqliteConnection;
pub use stats::StoreInfo;
pub use upgrader::StoreUpgrader;
