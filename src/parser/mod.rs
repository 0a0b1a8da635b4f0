//! Block parsing module for Terraform/OpenTofu files.
//!
//! This module turns one file's raw text into a list of declared blocks.
//! The HCL grammar itself is delegated to `hcl-rs`; `.tf.json` files are
//! decoded with `serde_json`. What lives here is the walk over the decoded
//! tree, the per-kind emission toggles, and the byte-range estimation that
//! locates each block's body in the raw text.
//!
//! # Supported Constructs
//!
//! - `resource "type" "name"` and `data "type" "name"` blocks
//! - `module "name"` blocks (with `source` capture)
//! - `variable "name"`, `output "name"`, and `locals` blocks

mod blocks;
mod cache;

pub use blocks::BlockParser;
pub use cache::{CacheStats, ParseCache};

use crate::types::ParseResult;

/// File extensions to scan for Terraform/OpenTofu files.
pub const TERRAFORM_EXTENSIONS: &[&str] = &[".tf", ".tf.json"];

/// Directory names to skip during scanning and module-file walks.
pub const SKIP_DIRS: &[&str] = &[
    ".terraform",
    ".terragrunt-cache",
    ".git",
    "node_modules",
];

/// Trait for parsing file content into blocks.
///
/// This trait allows for different parsing implementations
/// (e.g., for testing with stub parsers).
pub trait Parser: Send + Sync {
    /// Parse a single file's contents.
    ///
    /// `module_path` is the enclosing module scope the file is being parsed
    /// under; it is copied verbatim onto every emitted block.
    ///
    /// # Errors
    ///
    /// Returns an error only when the whole file fails to decode. Failures
    /// scoped to a single block are collected into the result instead.
    fn parse_text(
        &self,
        text: &str,
        file_path: &std::path::Path,
        module_path: &[String],
    ) -> crate::Result<ParseResult>;
}
