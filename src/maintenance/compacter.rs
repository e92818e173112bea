//! Store compaction
//!
//! Removes rows orphaned by earlier deletions, in dependency order:
//! unused triples, then unused nodes, then (full compaction only) unused
//! namespace prefixes, unused namespace URIs and empty graphs.
//!
//! The operation total is counted before anything is deleted and exactly that
//! many progress ticks are emitted while compacting. The node sweep cannot be
//! counted before the triples are gone, so it is budgeted as a single tick.

use crate::maintenance::connection::RelationalConnection;
use crate::maintenance::error::{MaintenanceError, MaintenanceResult};
use crate::maintenance::progress::{JobPhase, JobReporter, JobStatus, ProgressSink};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

const UNUSED_TRIPLES: &str =
	"FROM TRIPLES WHERE tripleID NOT IN (SELECT tripleID FROM GRAPH_TRIPLES)";
const UNUSED_PREFIXES: &str =
	"FROM NS_PREFIXES WHERE nsPrefixID NOT IN (SELECT nsPrefixID FROM NAMESPACES)";
const UNUSED_URIS: &str = "FROM NS_URIS WHERE nsUriID NOT IN (SELECT nsUriID FROM NAMESPACES)";
const EMPTY_GRAPHS: &str = "FROM GRAPHS WHERE graphID NOT IN (SELECT graphID FROM GRAPH_TRIPLES)";

const DELETE_UNUSED_NODES: &str = "DELETE FROM NODES WHERE nodeID NOT IN (\
	SELECT tripleSubject FROM TRIPLES \
	UNION SELECT triplePredicate FROM TRIPLES \
	UNION SELECT tripleObject FROM TRIPLES)";

const JOB_NAME: &str = "Store compaction";

/// Orphan detector and remover for a relational store
pub struct StoreCompacter<C: RelationalConnection> {
	connection: C,
	full: bool,
	required: Option<u64>,
	reporter: JobReporter,
}

impl<C: RelationalConnection + 'static> StoreCompacter<C> {
	/// `full` also purges unused namespaces and empty graphs
	pub fn new(connection: C, full: bool, sink: Arc<dyn ProgressSink>) -> Self {
		Self { connection, full, required: None, reporter: JobReporter::new(JOB_NAME, sink) }
	}

	pub fn is_full(&self) -> bool {
		self.full
	}

	/// Observable status handle; stays valid after the compacter moves to a worker thread
	pub fn status(&self) -> JobStatus {
		self.reporter.status().clone()
	}

	pub fn is_running(&self) -> bool {
		self.reporter.status().is_running()
	}

	pub fn connection(&self) -> &C {
		&self.connection
	}

	pub fn into_connection(self) -> C {
		self.connection
	}

	/// Count the operations a compaction will perform.
	///
	/// Read-only. The result is cached and used as the progress total. Counting
	/// on its own leaves the job idle, so `start()` may follow.
	pub fn operations_required(&mut self) -> MaintenanceResult<u64> {
		let required = self.counted()?;
		if self.reporter.status().phase() == JobPhase::Counting {
			self.reporter.enter(JobPhase::Idle);
		}
		Ok(required)
	}

	fn counted(&mut self) -> MaintenanceResult<u64> {
		if let Some(required) = self.required {
			return Ok(required);
		}

		if self.reporter.status().phase() != JobPhase::Counting {
			self.reporter.enter(JobPhase::Counting);
		}
		match self.count_operations() {
			Ok(required) => {
				self.required = Some(required);
				self.reporter.set_required(required);
				Ok(required)
			}
			Err(err) => {
				self.reporter.fail(&err);
				Err(err)
			}
		}
	}

	fn count_operations(&self) -> MaintenanceResult<u64> {
		let mut required = self.connection.count(&format!("SELECT COUNT(*) {UNUSED_TRIPLES}"))?;

		// Node sweep
		required += 1;

		if self.full {
			for source in [UNUSED_PREFIXES, UNUSED_URIS, EMPTY_GRAPHS] {
				required += self.connection.count(&format!("SELECT COUNT(*) {source}"))?;
			}
		}
		Ok(required)
	}

	/// Run the compaction on the calling thread.
	///
	/// Returns the number of completed operations. On error the job halts
	/// immediately, reports `Failed` and the error goes to the sink as well.
	pub fn compact(&mut self) -> MaintenanceResult<u64> {
		if self.reporter.status().phase().is_terminal() {
			return Err(MaintenanceError::AlreadyCompleted { job: JOB_NAME });
		}

		let required = self.counted()?;
		info!("Compacting store (full: {}, {} operations)", self.full, required);

		self.reporter.enter(JobPhase::Compacting);
		match self.run_deletions() {
			Ok(()) => {
				self.reporter.finish();
				Ok(self.reporter.status().completed())
			}
			Err(err) => {
				self.reporter.fail(&err);
				Err(err)
			}
		}
	}

	/// Validate, then count and compact on a blocking worker thread.
	///
	/// Only in-memory checks happen on the calling thread. Progress and errors
	/// arrive through the sink, the total through [`JobStatus::required`]; the
	/// handle returns the compacter (and its connection) once the job is over.
	pub fn start(mut self) -> MaintenanceResult<JoinHandle<Self>> {
		if self.is_running() {
			return Err(MaintenanceError::AlreadyRunning { job: JOB_NAME });
		}
		if self.reporter.status().phase().is_terminal() {
			return Err(MaintenanceError::AlreadyCompleted { job: JOB_NAME });
		}
		self.reporter.enter(JobPhase::Counting);

		Ok(tokio::task::spawn_blocking(move || {
			// Outcome is carried by the status and the sink
			let _ = self.compact();
			self
		}))
	}

	fn run_deletions(&self) -> MaintenanceResult<()> {
		self.delete_each(UNUSED_TRIPLES, "tripleID", |id| {
			format!("DELETE FROM TRIPLES WHERE tripleID = {id}")
		})?;

		self.connection.execute_non_query(DELETE_UNUSED_NODES)?;
		self.reporter.tick();

		if self.full {
			self.delete_each(UNUSED_PREFIXES, "nsPrefixID", |id| {
				format!("DELETE FROM NS_PREFIXES WHERE nsPrefixID = {id}")
			})?;
			self.delete_each(UNUSED_URIS, "nsUriID", |id| {
				format!("DELETE FROM NS_URIS WHERE nsUriID = {id}")
			})?;
			self.delete_each(EMPTY_GRAPHS, "graphID", |id| {
				format!(
					"DELETE FROM NAMESPACES WHERE graphID = {id}; DELETE FROM GRAPHS WHERE graphID = {id};"
				)
			})?;
		}
		Ok(())
	}

	// One tick per deleted row
	fn delete_each(
		&self, source: &str, id_column: &str, delete: impl Fn(i64) -> String,
	) -> MaintenanceResult<()> {
		let rows =
			self.connection.execute_query(&format!("SELECT {id_column} {source} ORDER BY {id_column}"))?;
		for row in rows {
			let id = row.get_i64(id_column)?;
			self.connection.execute_non_query(&delete(id))?;
			self.reporter.tick();
		}
		Ok(())
	}
}
