//! Scan report generation.
//!
//! Renders a [`BuildResult`] as a human-readable table summary or a
//! machine-readable JSON document.

use crate::config::Config;
use crate::error::Result;
use crate::types::{BlockKind, BuildResult, ReportFormat};
use chrono::Utc;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

/// Report generator.
pub struct Reporter<'a> {
    config: &'a Config,
}

impl<'a> Reporter<'a> {
    /// Create a reporter over the output configuration.
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Render `result` in the requested format.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn generate(&self, result: &BuildResult, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.text(result)),
            ReportFormat::Json => self.json(result),
        }
    }

    fn text(&self, result: &BuildResult) -> String {
        let mut out = String::new();

        let title = "Terracarta scan";
        if self.config.output.colored {
            out.push_str(&format!("{}\n\n", title.bold()));
        } else {
            out.push_str(&format!("{title}\n\n"));
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![Cell::new("Block kind"), Cell::new("Count")]);
        for kind in BlockKind::ALL {
            let count = result
                .stats
                .blocks_by_type
                .get(kind.as_str())
                .copied()
                .unwrap_or(0);
            table.add_row(vec![kind.as_str().to_string(), count.to_string()]);
        }
        out.push_str(&format!("{table}\n"));

        let edges = result.index.refs.as_ref().map_or(0, Vec::len);
        out.push_str(&format!(
            "\nFiles: {}   Blocks: {}   Edges: {}   Duration: {} ms\n",
            result.stats.files_processed,
            result.stats.total_blocks,
            edges,
            result.stats.duration_ms
        ));

        if !result.errors.is_empty() {
            let heading = format!("\n{} parse error(s):", result.errors.len());
            if self.config.output.colored {
                out.push_str(&format!("{}\n", heading.yellow()));
            } else {
                out.push_str(&format!("{heading}\n"));
            }
            for error in &result.errors {
                out.push_str(&format!("  {}: {}\n", error.file.display(), error.message));
            }
        }

        out
    }

    fn json(&self, result: &BuildResult) -> Result<String> {
        #[derive(Serialize)]
        struct Meta {
            version: &'static str,
            generated_at: String,
            duration_ms: u64,
        }

        #[derive(Serialize)]
        struct JsonBlock<'a> {
            address: String,
            kind: &'a str,
            file: String,
            start: usize,
            end: usize,
        }

        #[derive(Serialize)]
        struct Inventory<'a> {
            total_blocks: usize,
            files_processed: usize,
            files_with_errors: usize,
            blocks: Vec<JsonBlock<'a>>,
        }

        #[derive(Serialize)]
        struct Document<'a> {
            meta: Meta,
            inventory: Inventory<'a>,
            refs: &'a [crate::types::Edge],
            errors: &'a [crate::types::ParseError],
        }

        let blocks: Vec<JsonBlock<'_>> = result
            .index
            .blocks
            .iter()
            .map(|b| JsonBlock {
                address: b.address(),
                kind: b.kind.as_str(),
                file: b.file.to_string_lossy().to_string(),
                start: b.range.start,
                end: b.range.end,
            })
            .collect();

        let doc = Document {
            meta: Meta {
                version: env!("CARGO_PKG_VERSION"),
                generated_at: Utc::now().to_rfc3339(),
                duration_ms: result.stats.duration_ms,
            },
            inventory: Inventory {
                total_blocks: result.stats.total_blocks,
                files_processed: result.stats.files_processed,
                files_with_errors: result.stats.files_with_errors,
                blocks,
            },
            refs: result.index.refs.as_deref().unwrap_or(&[]),
            errors: &result.errors,
        };

        let rendered = if self.config.output.pretty {
            serde_json::to_string_pretty(&doc)
        } else {
            serde_json::to_string(&doc)
        };
        rendered.map_err(Into::into)
    }
}
