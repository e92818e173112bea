use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use store_manager::maintenance::sqlite::{CURRENT_VERSION, LEGACY_VERSION};
use store_manager::maintenance::{ChannelSink, JobEvent, JobStatus};
use store_manager::{ManagerConfig, SqliteConnection, StoreCompacter, StoreInfo, StoreUpgrader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "store-manager")]
#[command(about = "Inspect, compact and upgrade relational triple stores")]
struct Cli {
	/// Path to the store database
	database: PathBuf,

	/// Enable verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// JSON configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Show store version and row counts
	Info,

	/// Create an empty store
	Init {
		/// Create the store at the legacy schema version
		#[arg(long)]
		legacy: bool,
	},

	/// Remove orphaned triples and nodes
	Compact {
		/// Also remove unused namespaces and empty graphs
		#[arg(long)]
		full: bool,
	},

	/// Upgrade a legacy store to the current schema
	Upgrade,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
	tracing_subscriber::fmt().with_max_level(level).init();

	let config = match &cli.config {
		Some(path) => ManagerConfig::from_json_file(path)?,
		None => ManagerConfig::default(),
	};

	let connection = SqliteConnection::open(&cli.database)?;
	info!("Opened {:?}", cli.database);

	match cli.command {
		Command::Info => {
			println!("{}", StoreInfo::collect(&connection)?);
		}
		Command::Init { legacy } => {
			let version = if legacy { LEGACY_VERSION } else { CURRENT_VERSION };
			connection.install_schema(version)?;
			info!("Created store at version {}", version);
		}
		Command::Compact { full } => {
			let (sink, events) = ChannelSink::channel();
			let compacter = StoreCompacter::new(connection, full, Arc::new(sink));
			let status = compacter.status();
			let handle = compacter.start()?;
			watch("Compaction", status, events, handle).await?;
		}
		Command::Upgrade => {
			let (sink, events) = ChannelSink::channel();
			// Detection reads the store, so keep it off the runtime threads
			let upgrader = tokio::task::spawn_blocking(move || {
				StoreUpgrader::new(connection, config.maintenance, Arc::new(sink))
			})
			.await??;
			let status = upgrader.status();
			let handle = upgrader.start()?;
			watch("Upgrade", status, events, handle).await?;
		}
	}

	Ok(())
}

/// Follow a job's events until it finishes; an interrupt does not stop the job
async fn watch<T>(
	job: &str, status: JobStatus, mut events: UnboundedReceiver<JobEvent>,
	mut handle: JoinHandle<T>,
) -> anyhow::Result<()> {
	let mut last_percent = None;
	let mut interrupted = false;
	loop {
		tokio::select! {
			Some(event) = events.recv() => report(job, &status, event, &mut last_percent),
			joined = &mut handle => {
				joined?;
				break;
			}
			_ = tokio::signal::ctrl_c(), if !interrupted => {
				interrupted = true;
				warn!("{} cannot be interrupted safely; waiting for it to finish", job);
			}
		}
	}
	while let Ok(event) = events.try_recv() {
		report(job, &status, event, &mut last_percent);
	}

	let snapshot = status.snapshot();
	match snapshot.error {
		Some(message) => anyhow::bail!("{} failed: {}", job, message),
		None => {
			info!("{} finished after {} operations", job, snapshot.completed);
			Ok(())
		}
	}
}

fn report(job: &str, status: &JobStatus, event: JobEvent, last_percent: &mut Option<u64>) {
	match event {
		JobEvent::Phase(phase) => info!("{}: {:?}", job, phase),
		JobEvent::Progress(completed) => {
			let Some(required) = status.required().filter(|r| *r > 0) else {
				return;
			};
			let percent = completed * 100 / required;
			if *last_percent != Some(percent) {
				*last_percent = Some(percent);
				info!("{}: {}% ({}/{})", job, percent, completed, required);
			}
		}
		JobEvent::Error(message) => error!("{} failed: {}", job, message),
	}
}
