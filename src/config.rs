//! Configuration module for Terracarta.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`terracarta.yaml`)
//! - Environment variables
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # terracarta.yaml
//!
//! # Scanning options
//! scan:
//!   ignore:
//!     - "**/examples/**"
//!   include_terraform_cache: false
//!   continue_on_error: true
//!
//! # Indexing options
//! index:
//!   include_data_sources: true
//!   include_variables: true
//!   include_outputs: true
//!   include_locals: true
//!   use_cache: true
//!   offload_threshold: 500
//!
//! # Parse cache options
//! cache:
//!   capacity: 1000
//!   max_age_secs: 300
//!
//! # Watch options
//! watch:
//!   debounce_ms: 250
//!
//! # Output options
//! output:
//!   colored: true
//!   pretty: true
//! ```

use crate::error::{Result, TerracartaError};
use serde::{Deserialize, Serialize};

/// Scanning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Glob patterns to exclude from discovery.
    pub ignore: Vec<String>,

    /// Whether the local `.terraform` module cache participates in
    /// discovery. Off by default: walking the cache is expensive and its
    /// contents duplicate what [`crate::resolver::ModuleResolver`] reaches
    /// on demand.
    pub include_terraform_cache: bool,

    /// Continue indexing even if some files fail to parse.
    pub continue_on_error: bool,

    /// Maximum depth for recursive directory scanning.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            include_terraform_cache: false,
            continue_on_error: true,
            max_depth: default_max_depth(),
        }
    }
}

/// Indexing options consumed by the block parser and index builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Emit `data` blocks.
    #[serde(default = "default_true")]
    pub include_data_sources: bool,

    /// Emit `variable` blocks.
    #[serde(default = "default_true")]
    pub include_variables: bool,

    /// Emit `output` blocks.
    #[serde(default = "default_true")]
    pub include_outputs: bool,

    /// Emit `locals` blocks.
    #[serde(default = "default_true")]
    pub include_locals: bool,

    /// Read parse results through the cache.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// File-count threshold above which a build is offloaded to a worker
    /// thread instead of running inline.
    #[serde(default = "default_offload_threshold")]
    pub offload_threshold: usize,

    /// How long to wait for a cancelled worker to acknowledge before
    /// detaching from it, in milliseconds.
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_ms: u64,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            include_data_sources: true,
            include_variables: true,
            include_outputs: true,
            include_locals: true,
            use_cache: true,
            offload_threshold: default_offload_threshold(),
            cancel_timeout_ms: default_cancel_timeout(),
        }
    }
}

/// Parse cache options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of cached parse results.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entries older than this are treated as expired even when the file
    /// identity still matches.
    #[serde(default = "default_cache_max_age")]
    pub max_age_secs: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            max_age_secs: default_cache_max_age(),
        }
    }
}

/// Watch/debounce options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Quiet period before a batch of accumulated changes is delivered.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Use colored output.
    #[serde(default = "default_true")]
    pub colored: bool,

    /// Verbose output mode.
    pub verbose: bool,

    /// Pretty-print JSON output.
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            colored: true,
            verbose: false,
            pretty: true,
        }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanning options
    pub scan: ScanOptions,

    /// Indexing options
    pub index: IndexOptions,

    /// Parse cache options
    pub cache: CacheOptions,

    /// Watch options
    pub watch: WatchOptions,

    /// Output options
    pub output: OutputOptions,
}

fn default_max_depth() -> usize {
    100
}

fn default_offload_threshold() -> usize {
    500
}

fn default_cancel_timeout() -> u64 {
    1000
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_max_age() -> u64 {
    300
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        // First, expand environment variables
        let expanded = expand_env_vars(content);

        let config: Config =
            serde_yaml::from_str(&expanded).map_err(|e| TerracartaError::ConfigParse {
                message: e.to_string(),
                source: None,
                src_path: file!(),
                src_line: line!(),
            })?;

        tracing::debug!(
            ignore_patterns = config.scan.ignore.len(),
            continue_on_error = config.scan.continue_on_error,
            offload_threshold = config.index.offload_threshold,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# Terracarta Configuration File

# Scanning options
scan:
  # Glob patterns to exclude from discovery
  ignore:
    - "**/examples/**"

  # Whether .terraform module caches participate in discovery
  # (expensive; module resolution reads them on demand anyway)
  include_terraform_cache: false

  # Continue indexing even if some files fail to parse
  continue_on_error: true

  # Maximum depth for recursive directory scanning
  max_depth: 100

# Indexing options
index:
  # Per-kind emission toggles
  include_data_sources: true
  include_variables: true
  include_outputs: true
  include_locals: true

  # Read parse results through the cache
  use_cache: true

  # File-count threshold above which builds run on a worker thread
  offload_threshold: 500

  # How long to wait for a cancelled worker before detaching (ms)
  cancel_timeout_ms: 1000

# Parse cache options
cache:
  # Maximum number of cached parse results
  capacity: 1000

  # Entries older than this are expired even if the file is unchanged
  max_age_secs: 300

# Watch options
watch:
  # Quiet period before accumulated changes are delivered as one batch (ms)
  debounce_ms: 250

# Output options
output:
  # Use colored output in terminal
  colored: true

  # Enable verbose output
  verbose: false

  # Pretty-print JSON output
  pretty: true
"#
        .to_string()
    }

    /// Merge CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &crate::cli::ScanArgs) {
        if !args.ignore.is_empty() {
            self.scan.ignore.extend(args.ignore.iter().cloned());
        }
        if args.include_terraform_cache {
            self.scan.include_terraform_cache = true;
        }
        if args.fail_fast {
            self.scan.continue_on_error = false;
        }
        if args.no_cache {
            self.index.use_cache = false;
        }
        if let Some(threshold) = args.offload_threshold {
            self.index.offload_threshold = threshold;
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    // Find all ${VAR} patterns
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    // Find all $VAR patterns (word boundary)
    let re = regex::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
