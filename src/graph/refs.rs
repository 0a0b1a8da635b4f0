//! Reference extraction.
//!
//! Scans every indexed block's source text for symbolic references and
//! resolves them against the index, producing the deduplicated edge list.

use crate::types::{Block, BlockKind, Edge, EdgeKind, ProjectIndex, ReferenceKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// Reference-shaped patterns over un-evaluated HCL text.
static VAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bvar\.([A-Za-z_][A-Za-z0-9_-]*)").expect("Invalid regex")
});

static DATA_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdata\.([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_-]*)(?:\.([A-Za-z_][A-Za-z0-9_-]*))?")
        .expect("Invalid regex")
});

static LOCAL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\blocal\.([A-Za-z_][A-Za-z0-9_-]*)").expect("Invalid regex")
});

static MODULE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bmodule\.([A-Za-z_][A-Za-z0-9_-]*)(?:\.([A-Za-z_][A-Za-z0-9_-]*))?")
        .expect("Invalid regex")
});

// Generic `type.name.attr` resource reference. Leading identifiers owned by
// the dedicated patterns (and language keywords that look alike) are
// filtered out after matching.
static RESOURCE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_-]*)")
        .expect("Invalid regex")
});

/// Leading identifiers the generic resource pattern must not claim.
const RESERVED_LEADING: &[&str] = &["var", "local", "data", "module", "each", "count", "self", "path", "terraform"];

/// Extracts the deduplicated edge list from a built index.
///
/// Block source slices are re-read from disk at extraction time (file text
/// is cached per run); files that can no longer be read simply contribute
/// no edges.
#[derive(Debug, Default)]
pub struct ReferenceExtractor {
    texts: HashMap<PathBuf, Option<String>>,
}

impl ReferenceExtractor {
    /// Create a new extractor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract all edges from `index`.
    pub fn extract(&mut self, index: &ProjectIndex) -> Vec<Edge> {
        let mut edges = EdgeSet::default();

        self.extract_containment(index, &mut edges);
        self.extract_module_references(index, &mut edges);
        self.extract_block_references(index, &mut edges);

        tracing::debug!(edges = edges.edges.len(), "Reference extraction complete");
        edges.edges
    }

    /// Phase 1: module -> contained block edges.
    ///
    /// Three fallback strategies per module block, first non-empty wins:
    /// exact last module-path segment, segment anywhere in the path, and
    /// (for local sources) file-path containment of the source directory.
    fn extract_containment(&mut self, index: &ProjectIndex, edges: &mut EdgeSet) {
        for module in blocks_of(index, BlockKind::Module) {
            let Some(name) = module.name.as_deref() else {
                continue;
            };
            let segment = format!("module.{name}");
            let module_address = module.address();

            let exact: Vec<&Block> = index
                .blocks
                .iter()
                .filter(|b| b.module_path.last().map(String::as_str) == Some(segment.as_str()))
                .collect();

            let contained = if exact.is_empty() {
                let anywhere: Vec<&Block> = index
                    .blocks
                    .iter()
                    .filter(|b| b.module_path.iter().any(|s| s == &segment))
                    .collect();
                if anywhere.is_empty() {
                    self.by_source_dir(index, module)
                } else {
                    anywhere
                }
            } else {
                exact
            };

            for block in contained {
                let to = block.address();
                if to == module_address {
                    continue;
                }
                edges.push(Edge {
                    from: module_address.clone(),
                    to,
                    kind: EdgeKind::Contains,
                    reference: ReferenceKind::ModuleContainment,
                    attribute: None,
                });
            }
        }
    }

    /// Containment fallback: match blocks whose file path contains the
    /// module's local source directory.
    fn by_source_dir<'a>(&self, index: &'a ProjectIndex, module: &Block) -> Vec<&'a Block> {
        let Some(source) = module.source.as_deref() else {
            return Vec::new();
        };
        if !source.starts_with("./") && !source.starts_with("../") {
            return Vec::new();
        }
        let fragment = source.trim_start_matches("./");
        if fragment.is_empty() {
            return Vec::new();
        }

        let module_file = module.file.clone();
        index
            .blocks
            .iter()
            .filter(|b| b.file != module_file && b.file.to_string_lossy().contains(fragment))
            .collect()
    }

    /// Phase 2: module-to-module `module.NAME[.ATTR]` references.
    fn extract_module_references(&mut self, index: &ProjectIndex, edges: &mut EdgeSet) {
        let modules: Vec<Block> = blocks_of(index, BlockKind::Module).cloned().collect();

        for module in &modules {
            let Some(slice) = self.slice(module) else {
                continue;
            };

            for caps in MODULE_REF.captures_iter(&slice) {
                let target_name = &caps[1];
                let attribute = caps.get(2).map(|m| m.as_str().to_string());

                // Same module-path depth and content; external/registry
                // targets simply don't resolve.
                let target = modules.iter().find(|t| {
                    t.name.as_deref() == Some(target_name)
                        && t.module_path == module.module_path
                        && t.address() != module.address()
                });

                if let Some(target) = target {
                    edges.push(Edge {
                        from: module.address(),
                        to: target.address(),
                        kind: EdgeKind::Reference,
                        reference: ReferenceKind::ModuleReference,
                        attribute,
                    });
                }
            }
        }
    }

    /// Phase 3: per-block reference scan.
    ///
    /// Variables and outputs cannot contain further references in this
    /// model, so only resource/data/module/locals blocks are scanned.
    fn extract_block_references(&mut self, index: &ProjectIndex, edges: &mut EdgeSet) {
        let scannable: Vec<Block> = index
            .blocks
            .iter()
            .filter(|b| {
                matches!(
                    b.kind,
                    BlockKind::Resource | BlockKind::Data | BlockKind::Module | BlockKind::Locals
                )
            })
            .cloned()
            .collect();

        for block in &scannable {
            let Some(slice) = self.slice(block) else {
                continue;
            };
            let from = block.address();

            // var.NAME -> same-scope variable
            for caps in VAR_REF.captures_iter(&slice) {
                let name = &caps[1];
                let target = index.blocks.iter().find(|t| {
                    t.kind == BlockKind::Variable
                        && t.name.as_deref() == Some(name)
                        && t.module_path == block.module_path
                });
                if let Some(target) = target {
                    edges.push(Edge {
                        from: from.clone(),
                        to: target.address(),
                        kind: EdgeKind::Reference,
                        reference: ReferenceKind::Var,
                        attribute: None,
                    });
                }
            }

            // data.TYPE.NAME[.ATTR]
            for caps in DATA_REF.captures_iter(&slice) {
                let rtype = &caps[1];
                let name = &caps[2];
                let attribute = caps.get(3).map(|m| m.as_str().to_string());
                let target = index.blocks.iter().find(|t| {
                    t.kind == BlockKind::Data
                        && t.resource_type.as_deref() == Some(rtype)
                        && t.name.as_deref() == Some(name)
                });
                if let Some(target) = target {
                    edges.push(Edge {
                        from: from.clone(),
                        to: target.address(),
                        kind: EdgeKind::Reference,
                        reference: ReferenceKind::Data,
                        attribute,
                    });
                }
            }

            // local.NAME -> same-scope locals block (coarse-grained: locals
            // blocks carry no per-entry identity, so any local.* reference
            // points at the nearest locals block in scope)
            for caps in LOCAL_REF.captures_iter(&slice) {
                let _name = &caps[1];
                let target = index.blocks.iter().find(|t| {
                    t.kind == BlockKind::Locals && t.module_path == block.module_path
                });
                if let Some(target) = target {
                    let to = target.address();
                    if to == from {
                        continue;
                    }
                    edges.push(Edge {
                        from: from.clone(),
                        to,
                        kind: EdgeKind::Reference,
                        reference: ReferenceKind::Local,
                        attribute: None,
                    });
                }
            }

            // module.NAME[.ATTR] from non-module blocks (module blocks were
            // handled in phase 2)
            if block.kind != BlockKind::Module {
                for caps in MODULE_REF.captures_iter(&slice) {
                    let name = &caps[1];
                    let attribute = caps.get(2).map(|m| m.as_str().to_string());
                    let target = index.blocks.iter().find(|t| {
                        t.kind == BlockKind::Module
                            && t.name.as_deref() == Some(name)
                            && t.module_path == block.module_path
                    });
                    if let Some(target) = target {
                        edges.push(Edge {
                            from: from.clone(),
                            to: target.address(),
                            kind: EdgeKind::Reference,
                            reference: ReferenceKind::Module,
                            attribute,
                        });
                    }
                }
            }

            // Generic TYPE.NAME.ATTR resource reference
            for caps in RESOURCE_REF.captures_iter(&slice) {
                let full = caps.get(0).unwrap();
                // Skip matches that are the tail of a longer dotted chain
                // (e.g. the `aws_x.y.attr` inside `data.aws_x.y.attr`)
                if preceded_by_dot(&slice, full.start()) {
                    continue;
                }

                let rtype = &caps[1];
                if RESERVED_LEADING.contains(&rtype) {
                    continue;
                }
                let name = &caps[2];
                let attribute = caps.get(3).map(|m| m.as_str().to_string());

                let target = index.blocks.iter().find(|t| {
                    t.kind == BlockKind::Resource
                        && t.resource_type.as_deref() == Some(rtype)
                        && t.name.as_deref() == Some(name)
                });
                if let Some(target) = target {
                    let to = target.address();
                    if to == from {
                        continue;
                    }
                    edges.push(Edge {
                        from: from.clone(),
                        to,
                        kind: EdgeKind::Reference,
                        reference: ReferenceKind::Resource,
                        attribute,
                    });
                }
            }
        }
    }

    /// The block's own source slice, re-read from disk and cached per run.
    /// Returns `None` when the file cannot be read (no edges from it).
    fn slice(&mut self, block: &Block) -> Option<String> {
        let text = self
            .texts
            .entry(block.file.clone())
            .or_insert_with(|| read_text(&block.file))
            .as_deref()?;

        let chars: Vec<char> = text.chars().collect();
        let start = block.range.start.min(chars.len());
        let end = block.range.end.min(chars.len());
        Some(chars[start..end].iter().collect())
    }
}

fn read_text(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!(file = %path.display(), error = %e, "Cannot re-read file for reference scan");
            None
        }
    }
}

fn blocks_of(index: &ProjectIndex, kind: BlockKind) -> impl Iterator<Item = &Block> {
    index.blocks.iter().filter(move |b| b.kind == kind)
}

/// True when the character before `byte_idx` is a `.`, i.e. the match is
/// mid-chain.
fn preceded_by_dot(text: &str, byte_idx: usize) -> bool {
    text[..byte_idx].chars().next_back() == Some('.')
}

/// Insertion-ordered edge list deduplicated by (from, to) address pair.
#[derive(Debug, Default)]
struct EdgeSet {
    edges: Vec<Edge>,
    seen: HashSet<(String, String)>,
}

impl EdgeSet {
    fn push(&mut self, edge: Edge) {
        let key = (edge.from.clone(), edge.to.clone());
        if self.seen.insert(key) {
            self.edges.push(edge);
        }
    }
}
