//! Store schema upgrade
//!
//! Moves a legacy store to the current schema: runs the migration script, then
//! backfills hash codes for graphs, namespace URIs, nodes and triples in that
//! order. Triple hashes are derived from node hashes, so nodes must be done first.
//!
//! There is no transaction around the sequence. A failure part way leaves the
//! steps already applied in place.

use crate::config::MaintenanceConfig;
use crate::maintenance::connection::RelationalConnection;
use crate::maintenance::error::{MaintenanceError, MaintenanceResult};
use crate::maintenance::progress::{JobPhase, JobReporter, JobStatus, ProgressSink};
use crate::storage::node::{hash_text, triple_hash, Node, NodeType};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const JOB_NAME: &str = "Store upgrade";

const TRIPLE_NODES_JOIN: &str = "FROM TRIPLES T \
	INNER JOIN NODES S ON T.tripleSubject = S.nodeID \
	INNER JOIN NODES P ON T.triplePredicate = P.nodeID \
	INNER JOIN NODES O ON T.tripleObject = O.nodeID";

/// Versioned schema migration with hash backfill
pub struct StoreUpgrader<C: RelationalConnection> {
	connection: C,
	config: MaintenanceConfig,
	is_store: bool,
	version: Option<String>,
	required: Option<u64>,
	reporter: JobReporter,
}

impl<C: RelationalConnection + 'static> StoreUpgrader<C> {
	/// Inspect the connected store. Fails only if the store cannot be read.
	///
	/// This is the only store I/O outside the job itself; `start()` validates
	/// against what was read here.
	pub fn new(
		connection: C, config: MaintenanceConfig, sink: Arc<dyn ProgressSink>,
	) -> MaintenanceResult<Self> {
		config.validate().map_err(MaintenanceError::InvalidConfiguration)?;

		let is_store = connection.is_store()?;
		let version = if is_store { Some(connection.version()?) } else { None };
		debug!("Upgrader attached to store (recognized: {}, version: {:?})", is_store, version);

		Ok(Self {
			connection,
			config,
			is_store,
			version,
			required: None,
			reporter: JobReporter::new(JOB_NAME, sink),
		})
	}

	/// Detected schema version, `None` when the database is not a store
	pub fn version(&self) -> Option<&str> {
		self.version.as_deref()
	}

	/// True iff the store belongs to this schema family and is at the legacy version
	pub fn upgrade_required(&self) -> bool {
		self.is_store && self.version.as_deref() == Some(self.config.legacy_version.as_str())
	}

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

	/// Number of progress ticks the upgrade will emit:
	/// the migration script plus one per graph, namespace URI, node and triple
	pub fn operations_required(&mut self) -> MaintenanceResult<u64> {
		if let Some(required) = self.required {
			return Ok(required);
		}
		self.validate()?;

		let mut required = 1;
		for sql in [
			"SELECT COUNT(*) FROM GRAPHS".to_string(),
			"SELECT COUNT(*) FROM NS_URIS".to_string(),
			"SELECT COUNT(*) FROM NODES".to_string(),
			format!("SELECT COUNT(*) {TRIPLE_NODES_JOIN}"),
		] {
			required += self.connection.count(&sql)?;
		}

		self.required = Some(required);
		self.reporter.set_required(required);
		Ok(required)
	}

	fn validate(&self) -> MaintenanceResult<()> {
		if self.is_running() {
			return Err(MaintenanceError::AlreadyRunning { job: JOB_NAME });
		}
		if self.reporter.status().phase().is_terminal() {
			return Err(MaintenanceError::AlreadyCompleted { job: JOB_NAME });
		}
		if !self.is_store {
			return Err(MaintenanceError::NotAStore);
		}
		if !self.upgrade_required() {
			return Err(MaintenanceError::UpgradeNotRequired {
				version: self.version.clone().unwrap_or_default(),
			});
		}
		Ok(())
	}

	/// Run the upgrade on the calling thread, returning the completed operation count.
	///
	/// Validation failures return before anything is touched; failures after
	/// that move the job to `Failed` and are also delivered to the sink.
	pub fn upgrade(&mut self) -> MaintenanceResult<u64> {
		self.operations_required()?;
		self.validate()?;

		info!(
			"Upgrading store from {} to {}",
			self.config.legacy_version, self.config.current_version
		);
		match self.run_steps() {
			Ok(version) => {
				if version != self.config.current_version {
					warn!(
						"Store reports version {} after upgrading, expected {}",
						version, self.config.current_version
					);
				}
				self.version = Some(version);
				self.reporter.finish();
				Ok(self.reporter.status().completed())
			}
			Err(err) => {
				self.reporter.fail(&err);
				Err(err)
			}
		}
	}

	/// Validate synchronously, then count and upgrade on a blocking worker thread.
	///
	/// Validation reads only what `new()` detected; the total is published
	/// through [`JobStatus::required`] once the worker has counted it.
	pub fn start(mut self) -> MaintenanceResult<JoinHandle<Self>> {
		self.validate()?;

		Ok(tokio::task::spawn_blocking(move || {
			// Outcome is carried by the status and the sink
			let _ = self.upgrade();
			self
		}))
	}

	// Returns the version the store reports once every step has run
	fn run_steps(&self) -> MaintenanceResult<String> {
		self.reporter.enter(JobPhase::Migrating);
		self.connection.execute_non_query(&self.config.migration_script())?;
		self.reporter.tick();

		self.reporter.enter(JobPhase::BackfillingGraphs);
		for row in self.connection.execute_query("SELECT graphID, graphUri FROM GRAPHS ORDER BY graphID")? {
			let hash = hash_text(&row.get_text("graphUri")?);
			let id = row.get_i64("graphID")?;
			self.connection
				.execute_non_query(&format!("UPDATE GRAPHS SET graphHash = {hash} WHERE graphID = {id}"))?;
			self.reporter.tick();
		}

		self.reporter.enter(JobPhase::BackfillingNamespaces);
		for row in self.connection.execute_query("SELECT nsUriID, nsUri FROM NS_URIS ORDER BY nsUriID")? {
			let hash = hash_text(&row.get_text("nsUri")?);
			let id = row.get_i64("nsUriID")?;
			self.connection
				.execute_non_query(&format!("UPDATE NS_URIS SET nsUriHash = {hash} WHERE nsUriID = {id}"))?;
			self.reporter.tick();
		}

		self.reporter.enter(JobPhase::BackfillingNodes);
		for row in self
			.connection
			.execute_query("SELECT nodeID, nodeType, nodeValue FROM NODES ORDER BY nodeID")?
		{
			let id = row.get_i64("nodeID")?;
			let code = row.get_i64("nodeType")?;
			let node_type = NodeType::from_code(code)
				.ok_or(MaintenanceError::UnknownNodeType { node_id: id, node_type: code })?;
			let hash = Node::decode(node_type, &row.get_text("nodeValue")?).stable_hash();
			self.connection
				.execute_non_query(&format!("UPDATE NODES SET nodeHash = {hash} WHERE nodeID = {id}"))?;
			self.reporter.tick();
		}

		// Node hashes are read back here, after their own backfill has completed
		self.reporter.enter(JobPhase::BackfillingTriples);
		let triples = self.connection.execute_query(&format!(
			"SELECT T.tripleID AS tripleID, S.nodeHash AS subjectHash, \
			P.nodeHash AS predicateHash, O.nodeHash AS objectHash \
			{TRIPLE_NODES_JOIN} ORDER BY T.tripleID"
		))?;
		for row in triples {
			let hash = triple_hash(
				row.get_i64("subjectHash")?,
				row.get_i64("predicateHash")?,
				row.get_i64("objectHash")?,
			);
			let id = row.get_i64("tripleID")?;
			self.connection
				.execute_non_query(&format!("UPDATE TRIPLES SET tripleHash = {hash} WHERE tripleID = {id}"))?;
			self.reporter.tick();
		}

		self.connection.version()
	}
}
