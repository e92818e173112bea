mod config;
mod error;
pub mod maintenance;
pub mod storage;
pub mod tasks;

pub use config::{MaintenanceConfig, ManagerConfig, RegistryConfig};
pub use error::{Result, StoreManagerError};
pub use maintenance::{
	MaintenanceError, ProgressSink, SqliteConnection, StoreCompacter, StoreInfo, StoreUpgrader,
};
pub use storage::{Graph, Node, StorageProvider, StorageServer, Triple};
pub use tasks::{Task, TaskKind, TaskOutput, TaskRegistry, TaskRunner, TaskState};
