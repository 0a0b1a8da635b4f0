//! Module source resolution.
//!
//! Maps a module block's `source` string to a local directory. Only local
//! paths and modules already materialized in a `.terraform` cache resolve;
//! registry and git sources are classified and reported as unresolved,
//! which is an expected, informational outcome rather than an error.

use crate::parser::{SKIP_DIRS, TERRAFORM_EXTENSIONS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How a source string was (or wasn't) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// A `./`, `../`, or absolute path
    Local,
    /// Found in a `.terraform/modules/modules.json` manifest
    CachedModule,
    /// A registry-shaped source (`namespace/name/provider`)
    Registry,
    /// A git source (`git::` prefix or URL scheme)
    Git,
    /// Anything else
    Unknown,
}

/// The outcome of resolving a module source.
#[derive(Debug, Clone)]
pub struct ModuleResolution {
    /// Whether a local directory was found
    pub resolved: bool,
    /// The resolved directory, when `resolved`
    pub path: Option<PathBuf>,
    /// Classification of the source string
    pub resolution_type: ResolutionType,
    /// Informational message for unresolved sources; consumed only for
    /// diagnostics, never surfaced as a failure
    pub error: Option<String>,
}

impl ModuleResolution {
    fn resolved(path: PathBuf, resolution_type: ResolutionType) -> Self {
        Self {
            resolved: true,
            path: Some(path),
            resolution_type,
            error: None,
        }
    }

    fn unresolved(resolution_type: ResolutionType, error: impl Into<String>) -> Self {
        Self {
            resolved: false,
            path: None,
            resolution_type,
            error: Some(error.into()),
        }
    }
}

/// Terraform's `.terraform/modules/modules.json` manifest.
#[derive(Debug, Deserialize)]
struct ModulesManifest {
    #[serde(rename = "Modules", default)]
    modules: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "Key", default)]
    key: String,
    #[serde(rename = "Source", default)]
    source: String,
    #[serde(rename = "Dir", default)]
    dir: String,
    #[serde(rename = "Version", default)]
    _version: Option<String>,
}

/// Resolves module source strings to local directories.
#[derive(Debug, Default)]
pub struct ModuleResolver;

impl ModuleResolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve `source` relative to `base_dir` (the directory of the file
    /// declaring the module).
    #[must_use]
    pub fn resolve(&self, source: &str, base_dir: &Path) -> ModuleResolution {
        let source = source.trim();

        if is_local_path(source) {
            return resolve_local(source, base_dir);
        }

        if let Some(resolution) = resolve_cached(source, base_dir) {
            return resolution;
        }

        classify_remote(source)
    }

    /// Collect every Terraform file under `dir`, recursively.
    ///
    /// Cache/VCS/dependency directories are skipped by name; unreadable
    /// entries are logged and skipped rather than aborting the walk.
    #[must_use]
    pub fn find_module_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e.path()))
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
            if TERRAFORM_EXTENSIONS.iter().any(|ext| path_str.ends_with(ext)) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        files
    }
}

/// Check if a source string is a local file path.
fn is_local_path(source: &str) -> bool {
    source.starts_with("./") || source.starts_with("../") || source.starts_with('/')
}

fn resolve_local(source: &str, base_dir: &Path) -> ModuleResolution {
    let candidate = if source.starts_with('/') {
        PathBuf::from(source)
    } else {
        base_dir.join(source)
    };

    match candidate.canonicalize() {
        Ok(path) if path.is_dir() => ModuleResolution::resolved(path, ResolutionType::Local),
        Ok(path) => ModuleResolution::unresolved(
            ResolutionType::Local,
            format!("resolved path '{}' is not a directory", path.display()),
        ),
        Err(e) => ModuleResolution::unresolved(
            ResolutionType::Local,
            format!(
                "computed path '{}' does not exist: {e}",
                candidate.display()
            ),
        ),
    }
}

/// Walk upward from `base_dir` looking for a `.terraform` cache with a
/// module manifest that knows this source. `None` when no cache root is
/// found at all (not an error; the caller falls through to classification).
fn resolve_cached(source: &str, base_dir: &Path) -> Option<ModuleResolution> {
    for dir in base_dir.ancestors() {
        let cache_root = dir.join(".terraform");
        if !cache_root.is_dir() {
            continue;
        }

        let manifest_path = cache_root.join("modules").join("modules.json");
        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(
                    manifest = %manifest_path.display(),
                    error = %e,
                    "No readable module manifest in cache root"
                );
                return None;
            }
        };

        let manifest: ModulesManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    manifest = %manifest_path.display(),
                    error = %e,
                    "Malformed module manifest"
                );
                return None;
            }
        };

        let entry = manifest
            .modules
            .iter()
            .find(|m| m.source == source || m.key == source)?;

        // Dir is recorded relative to the directory that owns .terraform
        let module_dir = dir.join(&entry.dir);
        return Some(if module_dir.is_dir() {
            ModuleResolution::resolved(module_dir, ResolutionType::CachedModule)
        } else {
            ModuleResolution::unresolved(
                ResolutionType::CachedModule,
                format!(
                    "manifest entry '{}' points at missing directory '{}'",
                    entry.key,
                    module_dir.display()
                ),
            )
        });
    }

    None
}

/// Classify a source that did not resolve locally.
fn classify_remote(source: &str) -> ModuleResolution {
    if source.starts_with("git::") || source.contains("://") {
        return ModuleResolution::unresolved(
            ResolutionType::Git,
            format!("git source '{source}' is not fetched locally"),
        );
    }
    if source.contains('/') {
        return ModuleResolution::unresolved(
            ResolutionType::Registry,
            format!("registry source '{source}' is not fetched locally"),
        );
    }
    ModuleResolution::unresolved(
        ResolutionType::Unknown,
        format!("unrecognized module source '{source}'"),
    )
}

/// Check if a directory should be skipped by the module file walk.
fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| SKIP_DIRS.iter().any(|s| name == *s))
}
