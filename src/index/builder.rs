//! Index builder implementation.

use crate::config::Config;
use crate::error::TerracartaError;
use crate::graph::ReferenceExtractor;
use crate::parser::{BlockParser, ParseCache};
use crate::resolver::ModuleResolver;
use crate::types::{
    Block, BlockKind, BuildResult, BuildStats, ParseError, ParseResult, ProjectIndex,
};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Progress callback: (processed, total, current file).
pub type ProgressFn = dyn Fn(usize, usize, &Path) + Send + Sync;

/// Builds a complete [`ProjectIndex`] from a batch of file paths.
///
/// File processing order is always the sorted path order, which keeps edge
/// attribution deterministic: the derived maps are fully re-sorted anyway,
/// but the first-seen-wins edge deduplication is order-sensitive.
pub struct IndexBuilder<'a> {
    config: &'a Config,
    cache: &'a ParseCache,
    parser: BlockParser,
    resolver: ModuleResolver,
}

impl<'a> IndexBuilder<'a> {
    /// Create a builder over a config and an injected parse cache.
    #[must_use]
    pub fn new(config: &'a Config, cache: &'a ParseCache) -> Self {
        Self {
            config,
            cache,
            parser: BlockParser::new(&config.index),
            resolver: ModuleResolver::new(),
        }
    }

    /// Build an index from `files` sequentially.
    #[must_use]
    pub fn build(&self, files: &[PathBuf]) -> BuildResult {
        self.build_with(files, None, None)
    }

    /// Build an index with optional cancellation and progress reporting.
    ///
    /// On cancellation the partial result accumulated so far is returned;
    /// the caller (the worker wrapper) decides whether to discard it.
    #[must_use]
    pub fn build_with(
        &self,
        files: &[PathBuf],
        cancel: Option<&AtomicBool>,
        progress: Option<&ProgressFn>,
    ) -> BuildResult {
        let started_at = Utc::now();
        let start = Instant::now();

        let files = sorted_unique(files);
        let total = files.len();
        tracing::info!(files = total, "Starting index build");

        let mut blocks: Vec<Block> = Vec::new();
        let mut errors: Vec<ParseError> = Vec::new();
        let mut files_with_errors: HashSet<PathBuf> = HashSet::new();
        let mut parsed_files: HashSet<PathBuf> = HashSet::new();

        for (i, path) in files.iter().enumerate() {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                tracing::info!(processed = i, total, "Build cancelled");
                break;
            }
            if let Some(report) = progress {
                report(i, total, path);
            }

            parsed_files.insert(path.clone());
            match self.parse_root_file(path) {
                Ok(result) => {
                    if !result.errors.is_empty() {
                        files_with_errors.insert(path.clone());
                    }
                    errors.extend(result.errors);
                    blocks.extend(result.blocks);
                }
                Err(e) => {
                    files_with_errors.insert(path.clone());
                    errors.push(file_level_error(path, &e));
                    if !self.config.scan.continue_on_error {
                        tracing::error!(file = %path.display(), error = %e, "Halting build");
                        break;
                    }
                    tracing::warn!(file = %path.display(), "failed to parse file, continuing: {e}");
                }
            }
        }

        self.expand_modules(&mut blocks, &mut errors, &mut parsed_files);

        self.finish(blocks, errors, files_with_errors.len(), total, started_at, start)
    }

    /// Build an index from `files` using a rayon worker pool for the parse
    /// phase. Output is identical to [`Self::build_with`]: results are
    /// reassembled in sorted path order before accumulation, so map
    /// contents and edge attribution do not depend on scheduling.
    #[must_use]
    pub fn build_parallel(
        &self,
        files: &[PathBuf],
        cancel: Option<&AtomicBool>,
        progress: Option<&ProgressFn>,
    ) -> BuildResult {
        let started_at = Utc::now();
        let start = Instant::now();

        let files = sorted_unique(files);
        let total = files.len();
        tracing::info!(files = total, "Starting parallel index build");

        let processed = AtomicUsize::new(0);
        let parsed: Vec<(PathBuf, crate::Result<ParseResult>)> = files
            .par_iter()
            .map(|path| {
                if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                    return (path.clone(), Err(crate::err!(Cancelled {})));
                }
                let result = self.parse_root_file(path);
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(report) = progress {
                    report(done, total, path);
                }
                (path.clone(), result)
            })
            .collect();

        let mut blocks: Vec<Block> = Vec::new();
        let mut errors: Vec<ParseError> = Vec::new();
        let mut files_with_errors: HashSet<PathBuf> = HashSet::new();
        let mut parsed_files: HashSet<PathBuf> = HashSet::new();

        for (path, result) in parsed {
            parsed_files.insert(path.clone());
            match result {
                Ok(result) => {
                    if !result.errors.is_empty() {
                        files_with_errors.insert(path.clone());
                    }
                    errors.extend(result.errors);
                    blocks.extend(result.blocks);
                }
                Err(TerracartaError::Cancelled { .. }) => break,
                Err(e) => {
                    files_with_errors.insert(path.clone());
                    errors.push(file_level_error(&path, &e));
                    if !self.config.scan.continue_on_error {
                        break;
                    }
                }
            }
        }

        self.expand_modules(&mut blocks, &mut errors, &mut parsed_files);

        self.finish(blocks, errors, files_with_errors.len(), total, started_at, start)
    }

    /// Parse one root-scope file through the cache.
    fn parse_root_file(&self, path: &Path) -> crate::Result<ParseResult> {
        if self.config.index.use_cache {
            if let Some(hit) = self.cache.get(path) {
                tracing::trace!(file = %path.display(), "Parse cache hit");
                return Ok(hit);
            }
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| TerracartaError::io(path, e, file!(), line!()))?;
        let result = self.parser.parse(path, &text, &[])?;

        if self.config.index.use_cache {
            self.cache.set(path, &result);
        }
        Ok(result)
    }

    /// Resolve local module sources and index their files under the proper
    /// module scope.
    ///
    /// Files already parsed in this build keep their original scope (the
    /// source-dir containment fallback covers them); module-scoped results
    /// are never cached, since the cache is keyed by path alone and stores
    /// root-scope results.
    fn expand_modules(
        &self,
        blocks: &mut Vec<Block>,
        errors: &mut Vec<ParseError>,
        parsed_files: &mut HashSet<PathBuf>,
    ) {
        let mut queue: Vec<Block> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Module && b.source.is_some())
            .cloned()
            .collect();
        let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

        while let Some(module) = queue.pop() {
            let Some(source) = module.source.as_deref() else {
                continue;
            };
            let base_dir = module.file.parent().unwrap_or_else(|| Path::new("."));
            let resolution = self.resolver.resolve(source, base_dir);
            let Some(dir) = resolution.path else {
                if let Some(reason) = resolution.error {
                    tracing::debug!(
                        module = module.name.as_deref().unwrap_or_default(),
                        source,
                        reason,
                        "Module source not locally resolvable"
                    );
                }
                continue;
            };
            if !visited_dirs.insert(dir.clone()) {
                continue;
            }

            let mut child_scope = module.module_path.clone();
            child_scope.push(format!(
                "module.{}",
                module.name.as_deref().unwrap_or_default()
            ));

            for file in self.resolver.find_module_files(&dir) {
                if !parsed_files.insert(file.clone()) {
                    continue;
                }
                let text = match std::fs::read_to_string(&file) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "Skipping unreadable module file");
                        continue;
                    }
                };
                match self.parser.parse(&file, &text, &child_scope) {
                    Ok(result) => {
                        queue.extend(
                            result
                                .blocks
                                .iter()
                                .filter(|b| b.kind == BlockKind::Module && b.source.is_some())
                                .cloned(),
                        );
                        errors.extend(result.errors);
                        blocks.extend(result.blocks);
                    }
                    Err(e) => {
                        errors.push(file_level_error(&file, &e));
                    }
                }
            }
        }
    }

    /// Assemble maps, extract references, and emit stats.
    fn finish(
        &self,
        blocks: Vec<Block>,
        errors: Vec<ParseError>,
        files_with_errors: usize,
        files_processed: usize,
        started_at: chrono::DateTime<Utc>,
        start: Instant,
    ) -> BuildResult {
        let mut index = ProjectIndex::new();
        index.blocks = blocks;
        index.rebuild_maps();
        index.refs = Some(ReferenceExtractor::new().extract(&index));

        let mut blocks_by_type: HashMap<String, usize> = HashMap::new();
        let mut blocks_by_file: HashMap<PathBuf, usize> = HashMap::new();
        for block in &index.blocks {
            *blocks_by_type
                .entry(block.kind.as_str().to_string())
                .or_default() += 1;
            *blocks_by_file.entry(block.file.clone()).or_default() += 1;
        }

        let finished_at = Utc::now();
        let stats = BuildStats {
            files_processed,
            files_with_errors,
            total_blocks: index.blocks.len(),
            blocks_by_type,
            blocks_by_file,
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
            finished_at,
        };

        tracing::info!(
            blocks = stats.total_blocks,
            edges = index.refs.as_ref().map_or(0, Vec::len),
            errors = errors.len(),
            duration_ms = stats.duration_ms,
            "Index build complete"
        );

        BuildResult {
            index,
            stats,
            errors,
        }
    }
}

/// Convert a hard per-file failure into its soft diagnostic record.
fn file_level_error(path: &Path, error: &TerracartaError) -> ParseError {
    ParseError {
        message: error.to_string(),
        file: path.to_path_buf(),
        line: None,
        column: None,
        range: None,
    }
}

fn sorted_unique(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = files.to_vec();
    files.sort();
    files.dedup();
    files
}
