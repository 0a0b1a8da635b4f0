//! Core data types used throughout Terracarta.
//!
//! This module defines the fundamental data structures for representing:
//! - Declared Terraform/OpenTofu blocks and their file locations
//! - The project-wide block index with its derived lookup maps
//! - Reference edges between blocks
//! - Build statistics and incremental change batches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;

/// The kind of a declared top-level block.
///
/// This is a closed set: anything else in a configuration file (e.g.
/// `terraform`, `provider` blocks) is ignored by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// A `resource "type" "name"` block
    Resource,
    /// A `data "type" "name"` block
    Data,
    /// A `module "name"` block
    Module,
    /// A `variable "name"` block
    Variable,
    /// An `output "name"` block
    Output,
    /// A `locals { ... }` block (unnamed)
    Locals,
}

impl BlockKind {
    /// The keyword as it appears in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Data => "data",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Output => "output",
            Self::Locals => "locals",
        }
    }

    /// All kinds, in declaration-keyword order.
    pub const ALL: [Self; 6] = [
        Self::Resource,
        Self::Data,
        Self::Module,
        Self::Variable,
        Self::Output,
        Self::Locals,
    ];
}

impl Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A half-open range into a file's decoded text.
///
/// Offsets are **character indices** into the decoded (UTF-8) text, not raw
/// byte offsets. For ASCII files the two coincide; for files containing
/// multi-byte characters every consumer must index by `chars()`. This keeps
/// reveal-in-editor positioning consistent regardless of encoding width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl TextRange {
    /// Create a new range.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length in characters.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// True for the degenerate fallback ranges produced when header
    /// anchoring fails. Callers must tolerate these.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// One declared configuration block.
///
/// A `Block` captures everything the indexer knows about a single
/// declaration: its kind, labels, enclosing module scope, and where in
/// which file it lives.
///
/// # Example HCL
///
/// ```hcl
/// resource "aws_instance" "web" {
///   ami = "ami-123456"
/// }
/// ```
///
/// parses to `kind=Resource, resource_type=aws_instance, name=web,
/// provider=aws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block kind
    pub kind: BlockKind,

    /// The resource/data type (e.g. `aws_instance`); `None` for other kinds
    pub resource_type: Option<String>,

    /// The declared label; `None` for `locals` blocks
    pub name: Option<String>,

    /// Provider hint derived from the type prefix before the first
    /// underscore (e.g. `aws_instance` -> `aws`)
    pub provider: Option<String>,

    /// Enclosing module scope, outer-to-inner (e.g. `["module.vpc"]`);
    /// empty for root-level blocks
    #[serde(default)]
    pub module_path: Vec<String>,

    /// For module blocks only: the literal `source` attribute value
    pub source: Option<String>,

    /// Absolute path of the defining file
    pub file: PathBuf,

    /// Location of the block body within the file text
    pub range: TextRange,
}

impl Block {
    /// Derive the provider hint from a resource/data type string.
    #[must_use]
    pub fn provider_hint(resource_type: &str) -> Option<String> {
        resource_type
            .split('_')
            .next()
            .filter(|p| !p.is_empty())
            .map(String::from)
    }

    /// The fully qualified address of this block.
    ///
    /// Built as the module path segments followed by a kind-specific
    /// suffix, all period-joined. Addresses are the sole identity used for
    /// edge deduplication and graph lookups; object identity is never
    /// relied upon, since incremental updates replace blocks wholesale.
    #[must_use]
    pub fn address(&self) -> String {
        let name = self.name.as_deref().unwrap_or_default();
        let suffix = match self.kind {
            BlockKind::Resource => {
                format!("{}.{name}", self.resource_type.as_deref().unwrap_or_default())
            }
            BlockKind::Data => {
                format!("data.{}.{name}", self.resource_type.as_deref().unwrap_or_default())
            }
            BlockKind::Module => format!("module.{name}"),
            BlockKind::Variable => format!("var.{name}"),
            BlockKind::Output => name.to_string(),
            // locals blocks carry no per-entry label; see ReferenceExtractor
            BlockKind::Locals => format!("local.{}", self.name.as_deref().unwrap_or("locals")),
        };

        if self.module_path.is_empty() {
            suffix
        } else {
            format!("{}.{suffix}", self.module_path.join("."))
        }
    }

    /// Sort key used for the `by_type` map: (name, type, file), with
    /// absent labels treated as empty strings.
    #[must_use]
    pub fn type_sort_key(&self) -> (String, String, String) {
        (
            self.name.clone().unwrap_or_default(),
            self.resource_type.clone().unwrap_or_default(),
            self.file.to_string_lossy().into_owned(),
        )
    }
}

/// A soft parse diagnostic attached to a file or block.
///
/// These never abort an indexing run; they accumulate and are surfaced to
/// the caller alongside whatever was successfully parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Human-readable message
    pub message: String,
    /// File the error occurred in
    pub file: PathBuf,
    /// Line number, when the decoder provided one
    pub line: Option<usize>,
    /// Column number, when the decoder provided one
    pub column: Option<usize>,
    /// Text range, when known
    pub range: Option<TextRange>,
}

/// The outcome of parsing a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Blocks declared in the file, in declaration order
    pub blocks: Vec<Block>,
    /// Soft diagnostics collected while parsing
    pub errors: Vec<ParseError>,
}

/// A directed dependency edge between two blocks, identified by address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Address of the referencing block
    pub from: String,
    /// Address of the referenced block
    pub to: String,
    /// Structural relationship
    pub kind: EdgeKind,
    /// Which scan pattern produced this edge
    pub reference: ReferenceKind,
    /// Attribute name on the target, when the reference captured one
    pub attribute: Option<String>,
}

/// Structural classification of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// A symbolic read of the target
    Reference,
    /// Module-to-internal-block containment
    Contains,
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Contains => write!(f, "contains"),
        }
    }
}

/// The scan pattern that produced an edge.
///
/// Recorded per edge so a future semantic layer could be swapped in
/// without changing the edge shape. The extraction is lexical and
/// best-effort; this tag is the provenance consumers need to judge
/// confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `var.NAME`
    Var,
    /// Generic `type.name.` resource reference
    Resource,
    /// `data.TYPE.NAME`
    Data,
    /// Module reference inside another block's body
    Module,
    /// `local.NAME`
    Local,
    /// Structural module-to-child containment
    ModuleContainment,
    /// `module.NAME[.ATTR]` inside another module block
    ModuleReference,
}

impl Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Var => "var",
            Self::Resource => "resource",
            Self::Data => "data",
            Self::Module => "module",
            Self::Local => "local",
            Self::ModuleContainment => "module_containment",
            Self::ModuleReference => "module_reference",
        };
        write!(f, "{s}")
    }
}

/// The aggregate index of every block across the scanned tree.
///
/// Two derived maps re-partition `blocks` for lookup; after every build or
/// incremental update they must cover exactly the same multiset of blocks
/// (no filtering, no staleness). Consumers treat the whole structure as a
/// read-only snapshot between updates and must not assume object identity
/// is stable across an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectIndex {
    /// All blocks, in deterministic processing order
    pub blocks: Vec<Block>,

    /// Blocks grouped by kind keyword, each group sorted by
    /// (name, type, file)
    pub by_type: HashMap<String, Vec<Block>>,

    /// Blocks grouped by defining file, each group sorted by
    /// (range.start, range.end)
    pub by_file: HashMap<PathBuf, Vec<Block>>,

    /// Reference edges; `None` until extraction has run
    pub refs: Option<Vec<Edge>>,
}

impl ProjectIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive `by_type` and `by_file` from `blocks`.
    ///
    /// Rebuilding from scratch is deliberately preferred over incremental
    /// map surgery; the sort invariants make patching error-prone.
    pub fn rebuild_maps(&mut self) {
        let mut by_type: HashMap<String, Vec<Block>> = HashMap::new();
        let mut by_file: HashMap<PathBuf, Vec<Block>> = HashMap::new();

        for block in &self.blocks {
            by_type
                .entry(block.kind.as_str().to_string())
                .or_default()
                .push(block.clone());
            by_file
                .entry(block.file.clone())
                .or_default()
                .push(block.clone());
        }

        for group in by_type.values_mut() {
            group.sort_by_key(Block::type_sort_key);
        }
        for group in by_file.values_mut() {
            group.sort_by_key(|b| (b.range.start, b.range.end));
        }

        self.by_type = by_type;
        self.by_file = by_file;
    }

    /// Remove every block belonging to one of `files`. Does not touch the
    /// derived maps; callers follow up with [`Self::rebuild_maps`].
    pub fn remove_files(&mut self, files: &[PathBuf]) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|b| !files.contains(&b.file));
        before - self.blocks.len()
    }

    /// Total number of indexed blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when no blocks are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Verify the map-completeness invariant. Used by tests and debug
    /// assertions after updates.
    #[must_use]
    pub fn maps_consistent(&self) -> bool {
        let type_total: usize = self.by_type.values().map(Vec::len).sum();
        let file_total: usize = self.by_file.values().map(Vec::len).sum();
        type_total == self.blocks.len() && file_total == self.blocks.len()
    }
}

/// Statistics emitted by a full index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStats {
    /// Files processed (including files with errors)
    pub files_processed: usize,
    /// Files that produced at least one error
    pub files_with_errors: usize,
    /// Total blocks indexed
    pub total_blocks: usize,
    /// Block count per kind keyword
    pub blocks_by_type: HashMap<String, usize>,
    /// Block count per file
    pub blocks_by_file: HashMap<PathBuf, usize>,
    /// Wall-clock duration of the build in milliseconds
    pub duration_ms: u64,
    /// When the build started
    pub started_at: DateTime<Utc>,
    /// When the build finished
    pub finished_at: DateTime<Utc>,
}

/// The outcome of a full index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    /// The built index (empty but valid on hard failure)
    pub index: ProjectIndex,
    /// Build statistics
    pub stats: BuildStats,
    /// Soft diagnostics accumulated across all files
    pub errors: Vec<ParseError>,
}

/// A debounced, deduplicated batch of filesystem changes.
///
/// Produced by the watch debouncer (or any external watcher honoring the
/// same contract) and consumed by the incremental updater. Paths are
/// absolute and appear at most once across the three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Files whose content changed
    pub changed: Vec<PathBuf>,
    /// Files newly created
    pub created: Vec<PathBuf>,
    /// Files removed
    pub deleted: Vec<PathBuf>,
}

impl ChangeBatch {
    /// True when the batch carries no paths at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.created.is_empty() && self.deleted.is_empty()
    }

    /// Total number of paths in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len() + self.created.len() + self.deleted.len()
    }
}

/// Events broadcast by an index session to its subscribers.
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// A full build completed
    IndexBuilt,
    /// Changed files were reparsed
    FilesUpdated(Vec<PathBuf>),
    /// Created files were indexed
    FilesAdded(Vec<PathBuf>),
    /// Deleted files were removed from the index
    FilesDeleted(Vec<PathBuf>),
    /// Soft diagnostics were collected during an update
    ParseErrors(Vec<ParseError>),
}

/// Output format for scan reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// Human-readable table output
    Text,
    /// Machine-readable JSON
    Json,
}

/// Output format for graph exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GraphFormat {
    /// Graphviz DOT
    Dot,
    /// JSON nodes/edges document
    Json,
    /// Mermaid flowchart
    Mermaid,
}
