//! Workspace file discovery.
//!
//! Walks a root directory and produces the sorted, deduplicated list of
//! Terraform files that a build will index. The `.terraform` module cache
//! is excluded by default (it duplicates what module resolution reaches on
//! demand and is expensive to walk); hidden directories and configured
//! ignore globs are always excluded.

use crate::config::ScanOptions;
use crate::parser::{SKIP_DIRS, TERRAFORM_EXTENSIONS};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find all Terraform files under `root`, honoring the scan options.
///
/// Returns absolute paths, sorted and deduplicated.
#[must_use]
pub fn find_files(root: &Path, options: &ScanOptions) -> Vec<PathBuf> {
    let patterns: Vec<glob::Pattern> = options
        .ignore
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "Ignoring invalid glob pattern");
                None
            }
        })
        .collect();

    let mut files = BTreeSet::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .max_depth(options.max_depth)
        .into_iter()
        // never prune the root itself, whatever it is named
        .filter_entry(|e| e.depth() == 0 || !should_skip(e.path(), options, &patterns))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read directory entry");
                continue;
            }
        };

        let path = entry.path();
        if path.is_dir() {
            continue;
        }

        let path_str = path.to_string_lossy();
        if !TERRAFORM_EXTENSIONS.iter().any(|ext| path_str.ends_with(ext)) {
            continue;
        }

        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        files.insert(absolute);
    }

    files.into_iter().collect()
}

/// Check if a path should be pruned from the walk.
fn should_skip(path: &Path, options: &ScanOptions, patterns: &[glob::Pattern]) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // Hidden files/directories, except the cache when opted in
    if file_name.starts_with('.') {
        if file_name == ".terraform" && options.include_terraform_cache {
            return false;
        }
        tracing::trace!(path = %path.display(), "Skipping hidden path");
        return true;
    }

    if SKIP_DIRS.iter().any(|s| file_name == *s) {
        return true;
    }

    if patterns
        .iter()
        .any(|p| p.matches(&path.to_string_lossy()) || p.matches(file_name))
    {
        tracing::debug!(path = %path.display(), "Skipping ignored path");
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "locals {}").unwrap();
    }

    #[test]
    fn test_finds_tf_and_json_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b/main.tf"));
        touch(&dir.path().join("a/vars.tf.json"));
        touch(&dir.path().join("a/readme.md"));

        let files = find_files(dir.path(), &ScanOptions::default());
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
        assert!(files.iter().all(|f| f.is_absolute()));
    }

    #[test]
    fn test_terraform_cache_excluded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("main.tf"));
        touch(&dir.path().join(".terraform/modules/vpc/main.tf"));

        let files = find_files(dir.path(), &ScanOptions::default());
        assert_eq!(files.len(), 1);

        let opted_in = ScanOptions {
            include_terraform_cache: true,
            ..Default::default()
        };
        let files = find_files(dir.path(), &opted_in);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_ignore_globs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("main.tf"));
        touch(&dir.path().join("examples/demo.tf"));

        let options = ScanOptions {
            ignore: vec!["examples".to_string()],
            ..Default::default()
        };
        let files = find_files(dir.path(), &options);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.tf"));
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let files = find_files(dir.path(), &ScanOptions::default());
        assert!(files.is_empty());
    }
}
