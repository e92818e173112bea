//! Concrete store-operation tasks
//!
//! Each constructor wraps one storage call sequence in a [`Task`] of the
//! matching [`TaskKind`]. [`StoreTasks`] binds a provider to the session
//! configuration so callers don't have to thread preview/page/batch sizes
//! through every call.

use crate::config::ManagerConfig;
use crate::storage::{
	DatasetWriter, Graph, QueryResult, StorageProvider, StorageServer, StoreTemplate, TripleSource,
};
use crate::tasks::output::{StoreHandle, TaskKind, TaskOutput};
use crate::tasks::task::Task;
use anyhow::{bail, Context};
use std::sync::Arc;
use tracing::debug;

pub fn list_graphs(provider: Arc<dyn StorageProvider>) -> Task {
	Task::new("List Graphs", TaskKind::ListGraphs, move |ctx| async move {
		let graphs = provider.list_graphs().await.context("Unable to list graphs")?;
		ctx.set_information(format!("{} Graph(s) listed", graphs.len()));
		Ok(TaskOutput::Graphs(graphs))
	})
}

pub fn list_stores(server: Arc<dyn StorageServer>) -> Task {
	Task::new("List Stores", TaskKind::ListStores, move |ctx| async move {
		let stores = server.list_stores().await.context("Unable to list stores")?;
		ctx.set_information(format!("{} Store(s) listed", stores.len()));
		Ok(TaskOutput::Stores(stores))
	})
}

pub fn view_graph(provider: Arc<dyn StorageProvider>, uri: Option<String>) -> Task {
	let name = format!("View Graph {}", Graph::display_name(uri.as_deref()));
	Task::new(name, TaskKind::ViewGraph, move |ctx| async move {
		let graph = provider.load_graph(uri.as_deref()).await.context("Unable to load graph")?;
		ctx.set_information(format!("Graph contains {} Triple(s)", graph.len()));
		Ok(TaskOutput::Graph(graph))
	})
}

/// Load a graph but keep only its first `preview_size` triples
pub fn preview_graph(
	provider: Arc<dyn StorageProvider>, uri: Option<String>, preview_size: usize,
) -> Task {
	let name = format!("Preview Graph {}", Graph::display_name(uri.as_deref()));
	Task::new(name, TaskKind::PreviewGraph, move |ctx| async move {
		let mut graph = provider.load_graph(uri.as_deref()).await.context("Unable to load graph")?;
		let total = graph.len();
		graph.triples.truncate(preview_size);
		ctx.set_information(format!("Previewing {} of {} Triple(s)", graph.len(), total));
		Ok(TaskOutput::Graph(graph))
	})
}

pub fn count_triples(provider: Arc<dyn StorageProvider>, uri: Option<String>) -> Task {
	let name = format!("Count Triples {}", Graph::display_name(uri.as_deref()));
	Task::new(name, TaskKind::CountTriples, move |ctx| async move {
		let graph = provider.load_graph(uri.as_deref()).await.context("Unable to load graph")?;
		ctx.set_information(format!("Graph contains {} Triple(s)", graph.len()));
		Ok(TaskOutput::Count(graph.len()))
	})
}

pub fn delete_graph(provider: Arc<dyn StorageProvider>, uri: Option<String>) -> Task {
	let display = Graph::display_name(uri.as_deref());
	Task::new(format!("Delete Graph {display}"), TaskKind::DeleteGraph, move |ctx| async move {
		provider.delete_graph(uri.as_deref()).await.context("Unable to delete graph")?;
		ctx.set_information(format!("Deleted Graph {display} OK"));
		Ok(TaskOutput::Done)
	})
}

/// Run a SPARQL query. With a page size the results are fetched page by page
/// and the task can be cancelled between pages.
pub fn query(provider: Arc<dyn StorageProvider>, sparql: String, page_size: Option<usize>) -> Task {
	Task::new("SPARQL Query", TaskKind::Query { page_size }, move |ctx| async move {
		ensure_ready(provider.as_ref())?;

		let Some(limit) = page_size else {
			let result = provider.query(&sparql).await.context("Query failed")?;
			ctx.set_information(format!("Query returned {} Result(s)", result.len()));
			return Ok(TaskOutput::Query(result));
		};
		if limit == 0 {
			bail!("Page size must be greater than zero");
		}

		let mut offset = 0;
		let mut merged: Option<QueryResult> = None;
		loop {
			ctx.check_cancelled()?;
			let page = provider
				.query_page(&sparql, limit, offset)
				.await
				.with_context(|| format!("Query failed at offset {offset}"))?;
			if let QueryResult::Boolean(_) = page {
				ctx.set_information("Query returned a boolean result");
				return Ok(TaskOutput::Query(page));
			}

			let fetched = page.len();
			merged = Some(match merged {
				None => page,
				Some(acc) => merge_page(acc, page)?,
			});
			offset += fetched;

			let total = merged.as_ref().map_or(0, QueryResult::len);
			ctx.set_information(format!("Retrieved {total} Result(s) so far..."));
			debug!("Query page at offset {} returned {} result(s)", offset - fetched, fetched);
			if fetched < limit {
				break;
			}
		}

		let result = merged.unwrap_or(QueryResult::Boolean(false));
		ctx.set_information(format!("Query returned {} Result(s)", result.len()));
		Ok(TaskOutput::Query(result))
	})
}

fn merge_page(acc: QueryResult, page: QueryResult) -> anyhow::Result<QueryResult> {
	match (acc, page) {
		(QueryResult::Graph(mut acc), QueryResult::Graph(page)) => {
			acc.triples.extend(page.triples);
			Ok(QueryResult::Graph(acc))
		}
		(QueryResult::Bindings(mut acc), QueryResult::Bindings(page)) => {
			for variable in page.variables {
				if !acc.variables.contains(&variable) {
					acc.variables.push(variable);
				}
			}
			acc.rows.extend(page.rows);
			Ok(QueryResult::Bindings(acc))
		}
		_ => bail!("Query pages returned inconsistent result types"),
	}
}

pub fn update(provider: Arc<dyn StorageProvider>, sparql: String) -> Task {
	Task::new("SPARQL Update", TaskKind::Update, move |ctx| async move {
		ensure_ready(provider.as_ref())?;
		provider.update(&sparql).await.context("Update failed")?;
		ctx.set_information("Updates completed successfully");
		Ok(TaskOutput::Done)
	})
}

/// Import parsed triples into `target`, writing them in batches of `batch_size`
pub fn import(
	provider: Arc<dyn StorageProvider>, source_name: &str, source: TripleSource,
	target: Option<String>, batch_size: usize,
) -> Task {
	let batch_size = batch_size.max(1);
	Task::new(format!("Import {source_name}"), TaskKind::Import, move |ctx| async move {
		ensure_ready(provider.as_ref())?;

		let mut total = 0;
		let mut batch = Vec::with_capacity(batch_size);
		for triple in source {
			batch.push(triple.context("Unable to parse import data")?);
			if batch.len() >= batch_size {
				ctx.check_cancelled()?;
				provider
					.append_triples(target.as_deref(), &batch)
					.await
					.context("Unable to write import batch")?;
				total += batch.len();
				batch.clear();
				ctx.set_information(format!("Imported {total} Triple(s) so far..."));
			}
		}

		if !batch.is_empty() {
			ctx.check_cancelled()?;
			provider
				.append_triples(target.as_deref(), &batch)
				.await
				.context("Unable to write import batch")?;
			total += batch.len();
		}

		ctx.set_information(format!(
			"Imported {total} Triple(s) into {}",
			Graph::display_name(target.as_deref())
		));
		Ok(TaskOutput::Transferred(total))
	})
}

/// Write every graph of the store through `writer`
pub fn export(
	provider: Arc<dyn StorageProvider>, destination: &str, mut writer: Box<dyn DatasetWriter>,
) -> Task {
	Task::new(format!("Export to {destination}"), TaskKind::Export, move |ctx| async move {
		let written = async {
			let graphs = provider.list_graphs().await.context("Unable to list graphs")?;
			let mut total = 0;
			for (index, uri) in graphs.iter().enumerate() {
				ctx.check_cancelled()?;
				let graph = provider.load_graph(uri.as_deref()).await.with_context(|| {
					format!("Unable to load graph {}", Graph::display_name(uri.as_deref()))
				})?;
				writer.write_graph(&graph)?;
				total += graph.len();
				ctx.set_information(format!("Exported {} of {} Graph(s)...", index + 1, graphs.len()));
			}
			anyhow::Ok((total, graphs.len()))
		}
		.await;

		// Partial output is closed too; a write failure takes precedence over a close failure
		let finished = writer.finish().context("Unable to finish export");
		let (total, graph_count) = written?;
		finished?;

		ctx.set_information(format!("Exported {total} Triple(s) from {graph_count} Graph(s)"));
		Ok(TaskOutput::Transferred(total))
	})
}

#[derive(Clone, Copy)]
enum Transfer {
	Copy,
	Move,
	Rename,
}

impl Transfer {
	fn kind(self) -> TaskKind {
		match self {
			Transfer::Copy => TaskKind::CopyGraph,
			Transfer::Move => TaskKind::MoveGraph,
			Transfer::Rename => TaskKind::RenameGraph,
		}
	}

	fn verb(self) -> (&'static str, &'static str) {
		match self {
			Transfer::Copy => ("Copy", "Copied"),
			Transfer::Move => ("Move", "Moved"),
			Transfer::Rename => ("Rename", "Renamed"),
		}
	}
}

pub fn copy_graph(
	source: Arc<dyn StorageProvider>, target: Arc<dyn StorageProvider>, source_uri: Option<String>,
	target_uri: Option<String>,
) -> Task {
	transfer(Transfer::Copy, source, target, source_uri, target_uri)
}

pub fn move_graph(
	source: Arc<dyn StorageProvider>, target: Arc<dyn StorageProvider>, source_uri: Option<String>,
	target_uri: Option<String>,
) -> Task {
	transfer(Transfer::Move, source, target, source_uri, target_uri)
}

pub fn rename_graph(
	provider: Arc<dyn StorageProvider>, uri: Option<String>, new_uri: Option<String>,
) -> Task {
	transfer(Transfer::Rename, provider.clone(), provider, uri, new_uri)
}

fn same_store(a: &Arc<dyn StorageProvider>, b: &Arc<dyn StorageProvider>) -> bool {
	std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn transfer(
	mode: Transfer, source: Arc<dyn StorageProvider>, target: Arc<dyn StorageProvider>,
	source_uri: Option<String>, target_uri: Option<String>,
) -> Task {
	let (verb, past) = mode.verb();
	let from = Graph::display_name(source_uri.as_deref());
	let to = Graph::display_name(target_uri.as_deref());
	Task::new(format!("{verb} Graph {from}"), mode.kind(), move |ctx| async move {
		if same_store(&source, &target) && source_uri == target_uri {
			bail!("Cannot {} graph {from} onto itself", verb.to_lowercase());
		}

		ctx.check_cancelled()?;
		let graph = source.load_graph(source_uri.as_deref()).await.context("Unable to load source graph")?;
		let triples = graph.len();

		ctx.check_cancelled()?;
		target
			.save_graph(&graph.rehome(target_uri.clone()))
			.await
			.context("Unable to save target graph")?;

		// Past this point the copy exists; a move finishes rather than leaving two graphs
		if !matches!(mode, Transfer::Copy) {
			source
				.delete_graph(source_uri.as_deref())
				.await
				.context("Graph was copied but the source graph could not be deleted")?;
		}

		ctx.set_information(format!("{past} {triples} Triple(s) from {from} to {to}"));
		Ok(TaskOutput::Transferred(triples))
	})
}

pub fn get_store(server: Arc<dyn StorageServer>, id: String) -> Task {
	Task::new(format!("Get Store {id}"), TaskKind::GetStore, move |ctx| async move {
		let store = server.get_store(&id).await.with_context(|| format!("Unable to open store {id}"))?;
		ctx.set_information(format!("Opened store {id}: {}", store.describe()));
		Ok(TaskOutput::Store(StoreHandle(store)))
	})
}

pub fn create_store(server: Arc<dyn StorageServer>, template: StoreTemplate) -> Task {
	Task::new(format!("Create Store {}", template.id), TaskKind::CreateStore, move |ctx| async move {
		let created = server
			.create_store(&template)
			.await
			.with_context(|| format!("Unable to create store {}", template.id))?;
		if created {
			ctx.set_information(format!("Store {} created", template.id));
		} else {
			ctx.set_information(format!("Store {} was not created", template.id));
		}
		Ok(TaskOutput::Created(created))
	})
}

pub fn delete_store(server: Arc<dyn StorageServer>, id: String) -> Task {
	Task::new(format!("Delete Store {id}"), TaskKind::DeleteStore, move |ctx| async move {
		server.delete_store(&id).await.with_context(|| format!("Unable to delete store {id}"))?;
		ctx.set_information(format!("Store {id} deleted"));
		Ok(TaskOutput::Done)
	})
}

fn ensure_ready(provider: &dyn StorageProvider) -> anyhow::Result<()> {
	if !provider.is_ready() {
		bail!("Store {} is not ready", provider.describe());
	}
	Ok(())
}

/// Task constructors bound to one store and the session configuration
#[derive(Clone)]
pub struct StoreTasks {
	provider: Arc<dyn StorageProvider>,
	config: ManagerConfig,
}

impl StoreTasks {
	pub fn new(provider: Arc<dyn StorageProvider>, config: ManagerConfig) -> Self {
		Self { provider, config }
	}

	pub fn provider(&self) -> &Arc<dyn StorageProvider> {
		&self.provider
	}

	fn server(&self) -> anyhow::Result<Arc<dyn StorageServer>> {
		self.provider
			.server()
			.ok_or_else(|| self.provider.unsupported("store management").into())
	}

	pub fn list_graphs(&self) -> Task {
		list_graphs(self.provider.clone())
	}

	pub fn view_graph(&self, uri: Option<String>) -> Task {
		view_graph(self.provider.clone(), uri)
	}

	pub fn preview_graph(&self, uri: Option<String>) -> Task {
		preview_graph(self.provider.clone(), uri, self.config.preview_size)
	}

	pub fn count_triples(&self, uri: Option<String>) -> Task {
		count_triples(self.provider.clone(), uri)
	}

	pub fn delete_graph(&self, uri: Option<String>) -> Task {
		delete_graph(self.provider.clone(), uri)
	}

	/// Query using the configured default page size
	pub fn query(&self, sparql: impl Into<String>) -> Task {
		query(self.provider.clone(), sparql.into(), self.config.default_page_size)
	}

	pub fn update(&self, sparql: impl Into<String>) -> Task {
		update(self.provider.clone(), sparql.into())
	}

	pub fn import(&self, source_name: &str, source: TripleSource, target: Option<String>) -> Task {
		import(self.provider.clone(), source_name, source, target, self.config.import_batch_size)
	}

	pub fn export(&self, destination: &str, writer: Box<dyn DatasetWriter>) -> Task {
		export(self.provider.clone(), destination, writer)
	}

	pub fn copy_graph_to(
		&self, target: Arc<dyn StorageProvider>, uri: Option<String>, target_uri: Option<String>,
	) -> Task {
		copy_graph(self.provider.clone(), target, uri, target_uri)
	}

	pub fn move_graph_to(
		&self, target: Arc<dyn StorageProvider>, uri: Option<String>, target_uri: Option<String>,
	) -> Task {
		move_graph(self.provider.clone(), target, uri, target_uri)
	}

	pub fn rename_graph(&self, uri: Option<String>, new_uri: Option<String>) -> Task {
		rename_graph(self.provider.clone(), uri, new_uri)
	}

	/// Store management tasks need a provider that exposes its server
	pub fn list_stores(&self) -> anyhow::Result<Task> {
		Ok(list_stores(self.server()?))
	}

	pub fn get_store(&self, id: impl Into<String>) -> anyhow::Result<Task> {
		Ok(get_store(self.server()?, id.into()))
	}

	pub fn create_store(&self, template: StoreTemplate) -> anyhow::Result<Task> {
		Ok(create_store(self.server()?, template))
	}

	pub fn delete_store(&self, id: impl Into<String>) -> anyhow::Result<Task> {
		Ok(delete_store(self.server()?, id.into()))
	}
}
