//! Dependency graph module.
//!
//! This module turns an indexed block list into a directed dependency
//! graph. Edge discovery is **lexical**: each block's source slice is
//! scanned for reference-shaped patterns (`var.x`, `type.name.attr`,
//! `data.type.name`, `local.x`, `module.x`) and every pattern hit that
//! resolves to an indexed block becomes an edge. No expression evaluation
//! happens, so the result both under-matches (`for_each`/`count` expansion
//! is invisible) and over-matches (anything shaped like `ident.ident.` can
//! misfire); every edge records which pattern produced it so consumers can
//! judge confidence.
//!
//! # Edge derivation order
//!
//! 1. Module containment (structural, from module paths and source dirs)
//! 2. Module-to-module references
//! 3. Per-block reference scans
//!
//! The order is load-bearing: edges are deduplicated by (from, to) address
//! pair and the first extracted edge wins, so earlier phases decide the
//! recorded reference kind for overlapping pairs.
//!
//! The [`DependencyGraph`] wrapper builds a petgraph view over the
//! extracted edges for traversal queries and export (DOT, JSON, Mermaid).

mod export;
mod refs;
mod types;

pub use export::export_graph;
pub use refs::ReferenceExtractor;
pub use types::DependencyGraph;
