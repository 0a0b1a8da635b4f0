//! Error types for Terracarta.
//!
//! This module defines a comprehensive error hierarchy using `thiserror`
//! for proper error handling throughout the application. All errors
//! include context and can be easily propagated using the `?` operator.
//!
//! # Error Categories
//!
//! - **Parse errors**: whole-file HCL/JSON decode failures
//! - **IO errors**: file system operations
//! - **Config errors**: invalid configuration files
//! - **Worker errors**: offloaded build crashes and timeouts
//!
//! Note the distinction from [`crate::types::ParseError`]: that type is a
//! soft, collected diagnostic; this enum is for failures that terminate an
//! operation.

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Usage:
/// ```ignore
/// return Err(err!(ConfigMissing { key: "scan.ignore".to_string() }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident: $value:expr),* $(,)? }) => {
        $crate::error::TerracartaError::$variant {
            $($field: $value,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for Terracarta operations.
pub type Result<T> = std::result::Result<T, TerracartaError>;

/// The main error type for Terracarta.
///
/// This enum covers all hard error conditions that can occur during
/// discovery, indexing, incremental updates, and graph export.
#[derive(Error, Debug)]
pub enum TerracartaError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// File not found.
    #[error("File not found: {path} ({src_path}:{src_line})")]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Directory not found.
    #[error("Directory not found: {path} ({src_path}:{src_line})")]
    DirectoryNotFound {
        /// The missing directory path
        path: PathBuf,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Whole-File Parse Errors
    // =========================================================================
    /// HCL decode error for an entire file.
    #[error("Failed to parse HCL in '{file}' \n\t({src_path}:{src_line}): {message}")]
    HclParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
        /// Line number (if available)
        line: Option<usize>,
        /// Column number (if available)
        column: Option<usize>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// JSON decode error for an entire `.tf.json` file.
    #[error("Failed to parse JSON in '{file}' ({src_path}:{src_line}): {message}")]
    JsonParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Module Resolution Errors
    // =========================================================================
    /// Module source resolution threw (distinct from the common, informational
    /// "source not resolvable" outcome, which is not an error at all).
    #[error("Failed to resolve module source '{module_source}' ({src_path}:{src_line}): {message}")]
    ModuleResolve {
        /// The source string being resolved
        module_source: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Worker Errors
    // =========================================================================
    /// The offloaded build crashed or exited without a result.
    #[error("Index worker failed ({src_path}:{src_line}): {message}")]
    Worker {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A build was cancelled before completing.
    ///
    /// Cancellation after the cancel timeout elapses is reported through
    /// this variant too; callers treat it as "no result", never as a crash.
    #[error("Index build cancelled ({src_path}:{src_line})")]
    Cancelled {
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Graph Errors
    // =========================================================================
    /// Graph export error.
    #[error("Failed to export graph ({src_path}:{src_line}): {message}")]
    GraphExport {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Multiple errors occurred.
    #[error("Multiple errors occurred ({count} total)")]
    Multiple {
        /// Number of errors
        count: usize,
        /// The individual errors
        errors: Vec<TerracartaError>,
    },
}

impl TerracartaError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(
        path: impl Into<PathBuf>,
        source: std::io::Error,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::Io {
            path: path.into(),
            source,
            src_path,
            src_line,
        }
    }

    /// Creates an `HclParse` error.
    #[must_use]
    pub fn hcl_parse(
        file: PathBuf,
        message: String,
        line: Option<usize>,
        column: Option<usize>,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::HclParse {
            file,
            message,
            line,
            column,
            src_path,
            src_line,
        }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::Internal {
            message,
            src_path,
            src_line,
        }
    }

    /// Determines if the error is recoverable (e.g., should continue
    /// indexing other files).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HclParse { .. }
                | Self::JsonParse { .. }
                | Self::ModuleResolve { .. }
                | Self::FileNotFound { .. }
                | Self::ConfigValue { .. }
        )
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::FileNotFound { .. } => 14,
            Self::DirectoryNotFound { .. } => 15,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::Worker { .. } => 20,
            Self::Multiple { .. } => 21,
            _ => 1, // Generic unhandled error
        }
    }

    /// Consolidates multiple errors into a single `TerracartaError::Multiple`
    /// if there's more than one. Otherwise, returns the single error or
    /// `Ok(())` if no errors.
    pub fn collect(errors: Vec<Self>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.into_iter().next().unwrap())
        } else {
            Err(Self::Multiple {
                count: errors.len(),
                errors,
            })
        }
    }
}

impl From<std::io::Error> for TerracartaError {
    fn from(source: std::io::Error) -> Self {
        // This conversion is used when a PathBuf is not readily available.
        // Where a path is known, prefer TerracartaError::io(path, source, file!(), line!()).
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_json::Error> for TerracartaError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {}", source),
            src_path: file!(),
            src_line: line!(),
        }
    }
}

/// A utility for collecting multiple errors during parsing or processing.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<TerracartaError>,
}

impl ErrorCollector {
    /// Create a new error collector.
    #[must_use]
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error to the collection.
    pub fn add(&mut self, error: TerracartaError) {
        self.errors.push(error);
    }

    /// Get the number of collected errors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// Check if there are any errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert to a Result, returning Multiple error if there are any errors.
    pub fn into_result(self) -> Result<()> {
        TerracartaError::collect(self.errors)
    }
}
