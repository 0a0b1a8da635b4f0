//! # Terracarta
//!
//! A Terraform/OpenTofu configuration indexer and block reference mapper.
//!
//! Terracarta walks a tree of `.tf`/`.tf.json` files, extracts every
//! declared block (resource, data source, module, variable, output,
//! locals) into a normalized, queryable index, and infers a directed
//! dependency graph between blocks by scanning each block's source text
//! for symbolic references.
//!
//! ## Features
//!
//! - **Block index**: all declarations with file locations and module
//!   scope, plus by-kind and by-file views with stable orderings
//! - **Reference graph**: lexical best-effort edges (`var.x`,
//!   `type.name.attr`, `data.type.name`, `local.x`, `module.x`) plus
//!   structural module containment
//! - **Module resolution**: local paths and `.terraform`-cached modules
//!   are followed and indexed under their module scope
//! - **Incremental updates**: debounced change batches narrow re-indexing
//!   to the affected files
//! - **Worker offload**: large builds run on a dedicated thread with
//!   progress reporting and cooperative cancellation
//!
//! ## Example
//!
//! ```rust,no_run
//! use terracarta::{Config, IndexSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut session = IndexSession::new(config);
//!
//!     let result = session.build_dir("./terraform".as_ref(), None).await?;
//!     println!("indexed {} blocks", result.stats.total_blocks);
//!
//!     for edge in session.index().refs.iter().flatten() {
//!         println!("{} -> {} ({})", edge.from, edge.to, edge.reference);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, missing_docs, rust_2018_idioms)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod index;
pub mod parser;
pub mod report;
pub mod resolver;
pub mod types;
pub mod watch;

pub mod cli;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Result, TerracartaError};
pub use types::{
    Block, BlockKind, BuildResult, BuildStats, ChangeBatch, Edge, EdgeKind, GraphFormat,
    IndexEvent, ProjectIndex, ReferenceKind, ReportFormat,
};

use crate::index::{
    spawn_build, BuildUpdate, IncrementalUpdater, IndexBuilder, ProgressFn, UpdateOutcome,
    WorkerHandle,
};
use crate::parser::{CacheStats, ParseCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One indexing session over a workspace.
///
/// The session owns the configuration, the injected parse cache, the
/// current [`ProjectIndex`], and the event channel the presentation layer
/// subscribes to. There are no process-wide singletons: two sessions with
/// separate caches can coexist.
///
/// Only one worker-backed build is in flight per session at a time;
/// starting a new one cancels the previous one first (bounded by the
/// configured cancel timeout).
pub struct IndexSession {
    config: Config,
    cache: Arc<ParseCache>,
    index: ProjectIndex,
    events: broadcast::Sender<IndexEvent>,
    in_flight: Option<WorkerHandle>,
}

impl IndexSession {
    /// Create a session with a cache built from the configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(ParseCache::new(&config.cache));
        Self::with_cache(config, cache)
    }

    /// Create a session around an existing cache instance.
    #[must_use]
    pub fn with_cache(config: Config, cache: Arc<ParseCache>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            cache,
            index: ProjectIndex::new(),
            events,
            in_flight: None,
        }
    }

    /// The current index snapshot.
    ///
    /// Readers must treat this as read-only between updates and must not
    /// assume block identity is stable across an update.
    #[must_use]
    pub fn index(&self) -> &ProjectIndex {
        &self.index
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to index lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Parse cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Discover files under `root` and build the index.
    ///
    /// # Errors
    ///
    /// Returns an error when the root is missing or the offloaded build
    /// fails; soft per-file problems are collected in the result instead.
    pub async fn build_dir(
        &mut self,
        root: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<BuildResult> {
        if !root.exists() {
            return Err(crate::err!(DirectoryNotFound {
                path: root.to_path_buf(),
            }));
        }
        let files = discovery::find_files(root, &self.config.scan);
        self.build(files, progress).await
    }

    /// Build the index from an explicit file list.
    ///
    /// Batches above the configured offload threshold run on a worker
    /// thread; smaller ones run inline (acceptable on a cooperative event
    /// loop). On a worker failure the session keeps an empty-but-valid
    /// index so consumers can always render "no blocks found".
    ///
    /// # Errors
    ///
    /// Returns `Worker`/`Cancelled` errors from the offloaded path.
    pub async fn build(
        &mut self,
        files: Vec<PathBuf>,
        progress: Option<&ProgressFn>,
    ) -> Result<BuildResult> {
        // Single in-flight build: cancel whatever a dropped caller left
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!("Cancelling previous in-flight build");
            previous.cancel().await;
        }

        let result = if files.len() > self.config.index.offload_threshold {
            tracing::info!(
                files = files.len(),
                threshold = self.config.index.offload_threshold,
                "Offloading build to worker thread"
            );
            self.build_offloaded(files, progress).await
        } else {
            let builder = IndexBuilder::new(&self.config, &self.cache);
            Ok(builder.build_with(&files, None, progress))
        };

        match result {
            Ok(result) => {
                self.index = result.index.clone();
                self.emit(IndexEvent::IndexBuilt);
                if !result.errors.is_empty() {
                    self.emit(IndexEvent::ParseErrors(result.errors.clone()));
                }
                Ok(result)
            }
            Err(e) => {
                self.index = ProjectIndex::new();
                self.emit(IndexEvent::IndexBuilt);
                Err(e)
            }
        }
    }

    async fn build_offloaded(
        &mut self,
        files: Vec<PathBuf>,
        progress: Option<&ProgressFn>,
    ) -> Result<BuildResult> {
        self.in_flight = Some(spawn_build(
            self.config.clone(),
            Arc::clone(&self.cache),
            files,
        ));

        loop {
            let update = match self.in_flight.as_mut() {
                Some(handle) => handle.recv().await,
                None => return Err(crate::err!(Cancelled {})),
            };

            match update {
                Some(BuildUpdate::Progress {
                    processed,
                    total,
                    current_file,
                }) => {
                    if let Some(report) = progress {
                        report(processed, total, &current_file);
                    }
                }
                Some(BuildUpdate::Done(result)) => {
                    self.in_flight = None;
                    return Ok(*result);
                }
                Some(BuildUpdate::Failed(message)) => {
                    self.in_flight = None;
                    return Err(crate::err!(Worker { message: message }));
                }
                None => {
                    self.in_flight = None;
                    return Err(crate::err!(Cancelled {}));
                }
            }
        }
    }

    /// Apply one debounced change batch to the index.
    pub fn apply_changes(&mut self, batch: &ChangeBatch) -> UpdateOutcome {
        let updater = IncrementalUpdater::new(&self.config, &self.cache);
        let outcome = updater.apply(&mut self.index, batch);

        if !outcome.deleted_files.is_empty() {
            self.emit(IndexEvent::FilesDeleted(outcome.deleted_files.clone()));
        }
        if !outcome.updated_files.is_empty() {
            self.emit(IndexEvent::FilesUpdated(outcome.updated_files.clone()));
        }
        if !outcome.added_files.is_empty() {
            self.emit(IndexEvent::FilesAdded(outcome.added_files.clone()));
        }
        if !outcome.errors.is_empty() {
            self.emit(IndexEvent::ParseErrors(outcome.errors.clone()));
        }

        outcome
    }

    fn emit(&self, event: IndexEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
