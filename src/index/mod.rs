//! Index construction and maintenance.
//!
//! [`IndexBuilder`] turns a batch of file paths into a [`crate::types::ProjectIndex`]:
//! every file is parsed (through the parse cache), local module sources are
//! expanded and indexed under their module scope, the two derived lookup
//! maps are built with deterministic orderings, and reference extraction
//! runs once over the final block list.
//!
//! Large batches are offloaded to a dedicated worker thread via
//! [`worker::spawn_build`] so the embedding host's event loop stays
//! responsive; the worker communicates through fire-and-forget progress
//! messages and a single terminal result, and is cancelled cooperatively
//! with a bounded timeout.
//!
//! [`IncrementalUpdater`] re-enters the pipeline on a narrow file subset
//! whenever the watcher reports changes.

mod builder;
mod update;
pub mod worker;

pub use builder::{IndexBuilder, ProgressFn};
pub use update::{IncrementalUpdater, UpdateOutcome};
pub use worker::{spawn_build, BuildUpdate, WorkerHandle};
