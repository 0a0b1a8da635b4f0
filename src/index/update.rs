//! Incremental index updates.
//!
//! Consumes debounced change batches from the watcher contract and
//! narrows re-indexing to the affected files. The two derived maps are
//! always rebuilt from scratch afterwards, and references are re-extracted
//! in full: a single renamed block can invalidate edges anywhere in the
//! project, so `refs` is derived-and-rebuilt, never patched.

use crate::config::Config;
use crate::graph::ReferenceExtractor;
use crate::parser::{BlockParser, ParseCache};
use crate::types::{ChangeBatch, ParseError, ProjectIndex};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Summary of one applied change batch.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Blocks removed (deleted files plus superseded reparses)
    pub blocks_removed: usize,
    /// Blocks added from reparsed files
    pub blocks_added: usize,
    /// Files that were reparsed because they changed
    pub updated_files: Vec<PathBuf>,
    /// Files that were indexed for the first time
    pub added_files: Vec<PathBuf>,
    /// Files removed from the index
    pub deleted_files: Vec<PathBuf>,
    /// Soft diagnostics collected while reparsing
    pub errors: Vec<ParseError>,
}

/// Applies change batches to a [`ProjectIndex`] in place.
pub struct IncrementalUpdater<'a> {
    config: &'a Config,
    cache: &'a ParseCache,
    parser: BlockParser,
}

impl<'a> IncrementalUpdater<'a> {
    /// Create an updater over a config and the session's parse cache.
    #[must_use]
    pub fn new(config: &'a Config, cache: &'a ParseCache) -> Self {
        Self {
            config,
            cache,
            parser: BlockParser::new(&config.index),
        }
    }

    /// Apply one debounced batch.
    ///
    /// Old blocks for a reparsed file are discarded wholesale and replaced,
    /// never patched in place; consumers must not hold on to block
    /// identity across an update.
    pub fn apply(&self, index: &mut ProjectIndex, batch: &ChangeBatch) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        // Deletion pass
        if !batch.deleted.is_empty() {
            for path in &batch.deleted {
                self.cache.evict(path);
            }
            outcome.blocks_removed += index.remove_files(&batch.deleted);
            outcome.deleted_files = batch.deleted.clone();
            tracing::debug!(
                files = batch.deleted.len(),
                blocks = outcome.blocks_removed,
                "Removed deleted files from index"
            );
        }

        // Change/creation pass: changed files are evicted first so the
        // cache miss forces a fresh parse
        let affected: BTreeSet<PathBuf> = batch
            .changed
            .iter()
            .chain(batch.created.iter())
            .cloned()
            .collect();

        for path in &affected {
            let was_indexed = index.by_file.contains_key(path);
            if was_indexed {
                self.cache.evict(path);
            }

            // Keep the module scope the file was previously indexed under
            let scope = index
                .by_file
                .get(path)
                .and_then(|blocks| blocks.first())
                .map(|b| b.module_path.clone())
                .unwrap_or_default();

            let removed = index.remove_files(std::slice::from_ref(path));
            outcome.blocks_removed += removed;

            match self.reparse(path, &scope) {
                Ok(mut result) => {
                    outcome.blocks_added += result.blocks.len();
                    outcome.errors.append(&mut result.errors);
                    index.blocks.append(&mut result.blocks);
                    if was_indexed {
                        outcome.updated_files.push(path.clone());
                    } else {
                        outcome.added_files.push(path.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Reparse failed during update");
                    outcome.errors.push(ParseError {
                        message: e.to_string(),
                        file: path.clone(),
                        line: None,
                        column: None,
                        range: None,
                    });
                }
            }
        }

        index.rebuild_maps();
        index.refs = Some(ReferenceExtractor::new().extract(index));
        debug_assert!(index.maps_consistent());

        tracing::info!(
            updated = outcome.updated_files.len(),
            added = outcome.added_files.len(),
            deleted = outcome.deleted_files.len(),
            blocks = index.blocks.len(),
            "Incremental update applied"
        );

        outcome
    }

    /// Reparse one file, through the cache for root-scope files only (the
    /// cache is keyed by path alone and stores root-scope results).
    fn reparse(&self, path: &Path, scope: &[String]) -> crate::Result<crate::types::ParseResult> {
        let cacheable = scope.is_empty() && self.config.index.use_cache;

        if cacheable {
            if let Some(hit) = self.cache.get(path) {
                return Ok(hit);
            }
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::TerracartaError::io(path, e, file!(), line!()))?;
        let result = self.parser.parse(path, &text, scope)?;

        if cacheable {
            self.cache.set(path, &result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;
    use crate::index::IndexBuilder;
    use crate::types::BlockKind;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn built_index(config: &Config, cache: &ParseCache, files: &[PathBuf]) -> ProjectIndex {
        IndexBuilder::new(config, cache).build(files).index
    }

    #[test]
    fn test_deletion_keeps_maps_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.tf", "resource \"aws_vpc\" \"main\" {}\n");
        let b = write(
            dir.path(),
            "b.tf",
            "resource \"aws_subnet\" \"public\" { vpc_id = aws_vpc.main.id }\n",
        );

        let config = Config::default();
        let cache = ParseCache::new(&CacheOptions::default());
        let mut index = built_index(&config, &cache, &[a.clone(), b]);
        assert_eq!(index.blocks.len(), 2);

        std::fs::remove_file(&a).unwrap();
        let batch = ChangeBatch {
            deleted: vec![a.clone()],
            ..Default::default()
        };
        let outcome = IncrementalUpdater::new(&config, &cache).apply(&mut index, &batch);

        assert_eq!(outcome.blocks_removed, 1);
        assert_eq!(index.blocks.len(), 1);
        assert!(index.maps_consistent());
        assert!(!index.by_file.contains_key(&a));

        // no edges may reference the deleted block
        let deleted_address = "aws_vpc.main";
        let refs = index.refs.as_ref().unwrap();
        assert!(refs
            .iter()
            .all(|e| e.from != deleted_address && e.to != deleted_address));
    }

    #[test]
    fn test_change_replaces_blocks_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.tf", "resource \"aws_vpc\" \"main\" {}\n");

        let config = Config::default();
        let cache = ParseCache::new(&CacheOptions::default());
        let mut index = built_index(&config, &cache, std::slice::from_ref(&a));

        write(
            dir.path(),
            "a.tf",
            "resource \"aws_vpc\" \"renamed\" {}\n\nvariable \"region\" {}\n",
        );
        let batch = ChangeBatch {
            changed: vec![a.clone()],
            ..Default::default()
        };
        let outcome = IncrementalUpdater::new(&config, &cache).apply(&mut index, &batch);

        assert_eq!(outcome.blocks_removed, 1);
        assert_eq!(outcome.blocks_added, 2);
        assert_eq!(outcome.updated_files, vec![a]);
        assert!(index.maps_consistent());
        assert!(index
            .blocks
            .iter()
            .any(|b| b.name.as_deref() == Some("renamed")));
        assert!(!index
            .blocks
            .iter()
            .any(|b| b.name.as_deref() == Some("main")));
    }

    #[test]
    fn test_created_file_is_added() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.tf", "resource \"aws_vpc\" \"main\" {}\n");

        let config = Config::default();
        let cache = ParseCache::new(&CacheOptions::default());
        let mut index = built_index(&config, &cache, std::slice::from_ref(&a));

        let b = write(
            dir.path(),
            "b.tf",
            "resource \"aws_subnet\" \"public\" { vpc_id = aws_vpc.main.id }\n",
        );
        let batch = ChangeBatch {
            created: vec![b.clone()],
            ..Default::default()
        };
        let outcome = IncrementalUpdater::new(&config, &cache).apply(&mut index, &batch);

        assert_eq!(outcome.added_files, vec![b]);
        assert_eq!(index.blocks.len(), 2);
        // edges are re-derived in full after the update
        let refs = index.refs.as_ref().unwrap();
        assert!(refs
            .iter()
            .any(|e| e.from == "aws_subnet.public" && e.to == "aws_vpc.main"));
    }

    #[test]
    fn test_module_scope_preserved_on_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(
            dir.path(),
            "main.tf",
            "module \"vpc\" {\n  source = \"./modules/vpc\"\n}\n",
        );
        let inner = write(
            dir.path(),
            "modules/vpc/main.tf",
            "resource \"aws_vpc\" \"main\" {}\n",
        )
        .canonicalize()
        .unwrap();

        let config = Config::default();
        let cache = ParseCache::new(&CacheOptions::default());
        let mut index = built_index(&config, &cache, &[root]);

        write(
            dir.path(),
            "modules/vpc/main.tf",
            "resource \"aws_vpc\" \"renamed\" {}\n",
        );
        let batch = ChangeBatch {
            changed: vec![inner],
            ..Default::default()
        };
        IncrementalUpdater::new(&config, &cache).apply(&mut index, &batch);

        let renamed = index
            .blocks
            .iter()
            .find(|b| b.name.as_deref() == Some("renamed"))
            .unwrap();
        assert_eq!(renamed.module_path, vec!["module.vpc".to_string()]);
    }

    #[test]
    fn test_unreadable_changed_file_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.tf", "resource \"aws_vpc\" \"main\" {}\n");

        let config = Config::default();
        let cache = ParseCache::new(&CacheOptions::default());
        let mut index = built_index(&config, &cache, std::slice::from_ref(&a));

        // changed event arrives but the file is already gone
        std::fs::remove_file(&a).unwrap();
        let batch = ChangeBatch {
            changed: vec![a],
            ..Default::default()
        };
        let outcome = IncrementalUpdater::new(&config, &cache).apply(&mut index, &batch);

        assert_eq!(outcome.errors.len(), 1);
        assert!(index.is_empty());
        assert!(index.maps_consistent());
    }

    #[test]
    fn test_empty_batch_is_noop_but_rederives() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.tf", "variable \"region\" {}\n");

        let config = Config::default();
        let cache = ParseCache::new(&CacheOptions::default());
        let mut index = built_index(&config, &cache, &[a]);
        let blocks_before = index.blocks.clone();

        let outcome =
            IncrementalUpdater::new(&config, &cache).apply(&mut index, &ChangeBatch::default());

        assert_eq!(outcome.blocks_removed, 0);
        assert_eq!(outcome.blocks_added, 0);
        assert_eq!(index.blocks, blocks_before);
        assert!(index
            .blocks
            .iter()
            .all(|b| b.kind == BlockKind::Variable));
    }
}
