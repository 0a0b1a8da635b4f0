//! Block parser implementation.
//!
//! Walks the decoded HCL/JSON tree of one file and emits one [`Block`] per
//! declaration, locating each block's body in the raw text with an anchored
//! header match followed by a brace-depth scan.

use crate::config::IndexOptions;
use crate::error::Result;
use crate::parser::Parser;
use crate::types::{Block, BlockKind, ParseError, ParseResult, TextRange};

use hcl::Body;
use std::collections::HashMap;
use std::path::Path;

/// Parser for Terraform/OpenTofu configuration files.
///
/// Dispatches on file suffix: `.tf.json` is decoded with `serde_json`
/// (no array wrapping), everything else goes through `hcl-rs`. Either way
/// the decoded tree is walked into a flat block list.
pub struct BlockParser {
    /// Per-kind emission toggles and related knobs
    options: IndexOptions,
}

impl BlockParser {
    /// Create a new block parser with the given options.
    #[must_use]
    pub fn new(options: &IndexOptions) -> Self {
        Self {
            options: options.clone(),
        }
    }

    /// Parse a file that has already been read into memory.
    ///
    /// # Errors
    ///
    /// Returns an error only on whole-file decode failure; block-scoped
    /// problems are accumulated as soft diagnostics in the result.
    pub fn parse(
        &self,
        path: &Path,
        text: &str,
        module_path: &[String],
    ) -> Result<ParseResult> {
        if path.to_string_lossy().ends_with(".tf.json") {
            self.parse_json(path, text, module_path)
        } else {
            self.parse_hcl(path, text, module_path)
        }
    }

    /// Whether a kind is emitted under the current options.
    fn emits(&self, kind: BlockKind) -> bool {
        match kind {
            BlockKind::Data => self.options.include_data_sources,
            BlockKind::Variable => self.options.include_variables,
            BlockKind::Output => self.options.include_outputs,
            BlockKind::Locals => self.options.include_locals,
            BlockKind::Resource | BlockKind::Module => true,
        }
    }

    fn parse_hcl(&self, path: &Path, text: &str, module_path: &[String]) -> Result<ParseResult> {
        let body: Body = hcl::from_str(text).map_err(|e| crate::err!(HclParse {
            file: path.to_path_buf(),
            message: e.to_string(),
            line: None,
            column: None,
        }))?;

        let mut result = ParseResult::default();
        let mut ranges = RangeEstimator::new(text);

        for structure in body.into_inner() {
            let hcl::Structure::Block(block) = structure else {
                continue;
            };

            let Some(kind) = keyword_kind(block.identifier.as_str()) else {
                // terraform / provider / anything else is not indexed
                continue;
            };
            if !self.emits(kind) {
                continue;
            }

            match labels_for(kind, &block) {
                Ok((resource_type, name)) => {
                    let source = if kind == BlockKind::Module {
                        get_string_attribute(&block.body, "source")
                    } else {
                        None
                    };
                    result.blocks.push(self.make_block(
                        kind,
                        resource_type,
                        name,
                        source,
                        path,
                        module_path,
                        &mut ranges,
                    ));
                }
                Err(message) => {
                    tracing::warn!(file = %path.display(), kind = %kind, "{message}");
                    result.errors.push(ParseError {
                        message,
                        file: path.to_path_buf(),
                        line: None,
                        column: None,
                        range: None,
                    });
                }
            }
        }

        Ok(result)
    }

    fn parse_json(&self, path: &Path, text: &str, module_path: &[String]) -> Result<ParseResult> {
        let root: serde_json::Value =
            serde_json::from_str(text).map_err(|e| crate::err!(JsonParse {
                file: path.to_path_buf(),
                message: e.to_string(),
            }))?;

        let Some(top) = root.as_object() else {
            return Err(crate::err!(JsonParse {
                file: path.to_path_buf(),
                message: "top-level value is not an object".to_string(),
            }));
        };

        let mut result = ParseResult::default();
        let mut ranges = RangeEstimator::new(text);

        for (keyword, value) in top {
            let Some(kind) = keyword_kind(keyword) else {
                continue;
            };
            if !self.emits(kind) {
                continue;
            }

            match kind {
                BlockKind::Resource | BlockKind::Data => {
                    // { resource: { type: { name: {...} } } }
                    let Some(types) = value.as_object() else {
                        continue;
                    };
                    for (rtype, names) in types {
                        let Some(names) = names.as_object() else {
                            continue;
                        };
                        for name in names.keys() {
                            result.blocks.push(self.make_block(
                                kind,
                                Some(rtype.clone()),
                                Some(name.clone()),
                                None,
                                path,
                                module_path,
                                &mut ranges,
                            ));
                        }
                    }
                }
                BlockKind::Module | BlockKind::Variable | BlockKind::Output => {
                    // { module: { name: {...} } }
                    let Some(names) = value.as_object() else {
                        continue;
                    };
                    for (name, config) in names {
                        let source = (kind == BlockKind::Module)
                            .then(|| config.get("source").and_then(|s| s.as_str()))
                            .flatten()
                            .map(String::from);
                        result.blocks.push(self.make_block(
                            kind,
                            None,
                            Some(name.clone()),
                            source,
                            path,
                            module_path,
                            &mut ranges,
                        ));
                    }
                }
                BlockKind::Locals => {
                    // one block per locals key occurrence
                    result.blocks.push(self.make_block(
                        kind,
                        None,
                        None,
                        None,
                        path,
                        module_path,
                        &mut ranges,
                    ));
                }
            }
        }

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn make_block(
        &self,
        kind: BlockKind,
        resource_type: Option<String>,
        name: Option<String>,
        source: Option<String>,
        path: &Path,
        module_path: &[String],
        ranges: &mut RangeEstimator<'_>,
    ) -> Block {
        let range = ranges.estimate(kind, resource_type.as_deref(), name.as_deref());
        let provider = resource_type.as_deref().and_then(Block::provider_hint);
        Block {
            kind,
            resource_type,
            name,
            provider,
            module_path: module_path.to_vec(),
            source,
            file: path.to_path_buf(),
            range,
        }
    }
}

impl Parser for BlockParser {
    fn parse_text(
        &self,
        text: &str,
        file_path: &Path,
        module_path: &[String],
    ) -> Result<ParseResult> {
        self.parse(file_path, text, module_path)
    }
}

/// Map a declaration keyword onto a block kind.
fn keyword_kind(keyword: &str) -> Option<BlockKind> {
    match keyword {
        "resource" => Some(BlockKind::Resource),
        "data" => Some(BlockKind::Data),
        "module" => Some(BlockKind::Module),
        "variable" => Some(BlockKind::Variable),
        "output" => Some(BlockKind::Output),
        "locals" => Some(BlockKind::Locals),
        _ => None,
    }
}

/// Pull the (type, name) labels off an HCL block, validating arity per kind.
fn labels_for(
    kind: BlockKind,
    block: &hcl::Block,
) -> std::result::Result<(Option<String>, Option<String>), String> {
    let label = |i: usize| block.labels.get(i).map(|l| l.as_str().to_string());
    match kind {
        BlockKind::Resource | BlockKind::Data => {
            let rtype = label(0);
            let name = label(1);
            if rtype.is_none() || name.is_none() {
                return Err(format!(
                    "{} block is missing its type/name labels",
                    kind.as_str()
                ));
            }
            Ok((rtype, name))
        }
        BlockKind::Module | BlockKind::Variable | BlockKind::Output => {
            let name = label(0);
            if name.is_none() {
                return Err(format!("{} block is missing its name label", kind.as_str()));
            }
            Ok((None, name))
        }
        BlockKind::Locals => Ok((None, None)),
    }
}

/// Get a string attribute from an HCL body.
fn get_string_attribute(body: &Body, key: &str) -> Option<String> {
    body.attributes()
        .find(|attr| attr.key.as_str() == key)
        .and_then(|attr| expression_to_string(&attr.expr))
}

/// Convert an expression to a string if possible.
fn expression_to_string(expr: &hcl::Expression) -> Option<String> {
    match expr {
        hcl::Expression::String(s) => Some(s.clone()),
        hcl::Expression::Number(n) => Some(n.to_string()),
        hcl::Expression::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Locates block bodies in raw text.
///
/// `hcl-rs` discards spans, so the location of each declaration is
/// re-derived from the raw text: a per-kind header regex anchors the block,
/// then a brace-depth scan (tracking double-quoted strings and backslash
/// escapes, so braces inside literals don't count) finds where it closes.
/// All offsets are character indices into the decoded text.
struct RangeEstimator<'a> {
    text: &'a str,
    total_chars: usize,
    /// Next search position (char offset) per header, so repeated identical
    /// headers (multiple `locals {}` blocks) each anchor past the previous.
    cursors: HashMap<String, usize>,
}

impl<'a> RangeEstimator<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            total_chars: text.chars().count(),
            cursors: HashMap::new(),
        }
    }

    fn estimate(
        &mut self,
        kind: BlockKind,
        resource_type: Option<&str>,
        name: Option<&str>,
    ) -> TextRange {
        let pattern = header_pattern(kind, resource_type, name);
        let cursor = self.cursors.get(&pattern).copied().unwrap_or(0);

        let range = self
            .anchor(&pattern, cursor)
            .or_else(|| {
                // Looser fallback when the exact header doesn't match
                // (e.g. heredoc weirdness around the labels)
                let loose = loose_pattern(kind);
                self.anchor(&loose, cursor)
            })
            .unwrap_or_else(|| TextRange::new(0, self.total_chars.min(100)));

        self.cursors.insert(pattern, range.end.max(cursor));
        range
    }

    /// Find the header match at/after `cursor` and scan to the balancing
    /// close brace. Returns `None` when the pattern doesn't match at all.
    fn anchor(&self, pattern: &str, cursor: usize) -> Option<TextRange> {
        let re = regex::Regex::new(pattern).ok()?;
        let search_byte = byte_of_char(self.text, cursor);
        let m = re.find(&self.text[search_byte..])?;
        let anchor_byte = search_byte + m.start();
        let anchor_char = cursor + self.text[search_byte..anchor_byte].chars().count();

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escape = false;
        let mut found_start = false;

        for (consumed, c) in self.text[anchor_byte..].chars().enumerate() {
            if !found_start {
                if c == '{' {
                    found_start = true;
                    depth = 1;
                }
                continue;
            }

            if c == '"' && !escape {
                in_string = !in_string;
            }

            if !in_string {
                if c == '{' {
                    depth += 1;
                } else if c == '}' {
                    depth -= 1;
                }
            }

            if c == '\\' {
                escape = !escape;
            } else {
                escape = false;
            }

            if depth == 0 {
                return Some(TextRange::new(anchor_char, anchor_char + consumed + 1));
            }
        }

        // Unbalanced body runs to end of file
        found_start.then(|| TextRange::new(anchor_char, self.total_chars))
    }
}

/// The exact header pattern for a declaration.
fn header_pattern(kind: BlockKind, resource_type: Option<&str>, name: Option<&str>) -> String {
    match kind {
        BlockKind::Resource | BlockKind::Data => match (resource_type, name) {
            (Some(t), Some(n)) => format!(
                r#"(?m)^[\t ]*{}\s+"{}"\s+"{}""#,
                kind.as_str(),
                regex::escape(t),
                regex::escape(n)
            ),
            _ => loose_pattern(kind),
        },
        BlockKind::Module | BlockKind::Variable | BlockKind::Output => match name {
            Some(n) => format!(
                r#"(?m)^[\t ]*{}\s+"{}""#,
                kind.as_str(),
                regex::escape(n)
            ),
            None => loose_pattern(kind),
        },
        BlockKind::Locals => loose_pattern(kind),
    }
}

/// The loose header pattern used when labels are unknown or unmatched.
fn loose_pattern(kind: BlockKind) -> String {
    match kind {
        BlockKind::Resource | BlockKind::Data => {
            format!(r#"(?m)^[\t ]*{}\s+"[^"]*""#, kind.as_str())
        }
        BlockKind::Module | BlockKind::Variable | BlockKind::Output => {
            format!(r#"(?m)^[\t ]*{}\s+"[^"]*"\s*\{{"#, kind.as_str())
        }
        BlockKind::Locals => r"(?m)^[\t ]*locals\s*\{".to_string(),
    }
}

/// Byte offset of the `char_idx`-th character.
fn byte_of_char(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(b, _)| b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerracartaError;
    use pretty_assertions::assert_eq;

    fn parser() -> BlockParser {
        BlockParser::new(&IndexOptions::default())
    }

    #[test]
    fn test_parse_resource() {
        let content = r#"
resource "aws_instance" "web" {
  ami           = "ami-123456"
  instance_type = "t3.micro"
}
"#;
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();

        assert_eq!(result.blocks.len(), 1);
        let block = &result.blocks[0];
        assert_eq!(block.kind, BlockKind::Resource);
        assert_eq!(block.resource_type.as_deref(), Some("aws_instance"));
        assert_eq!(block.name.as_deref(), Some("web"));
        assert_eq!(block.provider.as_deref(), Some("aws"));
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_range_is_brace_balanced() {
        let content = r#"
resource "aws_instance" "web" {
  tags = {
    Name = "web-{server}"
  }
}

resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
}
"#;
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        assert_eq!(result.blocks.len(), 2);

        let chars: Vec<char> = content.chars().collect();
        for block in &result.blocks {
            let slice: String = chars[block.range.start..block.range.end].iter().collect();
            assert!(slice.starts_with("resource"));
            assert!(slice.ends_with('}'));
            // balanced outside string literals
            let opens = slice.matches('{').count();
            let closes = slice.matches('}').count();
            assert_eq!(opens, closes, "unbalanced slice: {slice}");
        }
    }

    #[test]
    fn test_parse_module_with_source() {
        let content = r#"
module "vpc" {
  source = "./modules/vpc"
  cidr   = "10.0.0.0/16"
}
"#;
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();

        assert_eq!(result.blocks.len(), 1);
        let block = &result.blocks[0];
        assert_eq!(block.kind, BlockKind::Module);
        assert_eq!(block.name.as_deref(), Some("vpc"));
        assert_eq!(block.source.as_deref(), Some("./modules/vpc"));
    }

    #[test]
    fn test_parse_all_kinds() {
        let content = r#"
resource "aws_vpc" "main" {}
data "aws_ami" "ubuntu" {}
module "net" { source = "./net" }
variable "region" {}
output "vpc_id" { value = aws_vpc.main.id }
locals {
  env = "prod"
}
"#;
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        assert_eq!(result.blocks.len(), 6);
        let kinds: Vec<BlockKind> = result.blocks.iter().map(|b| b.kind).collect();
        assert!(BlockKind::ALL.iter().all(|k| kinds.contains(k)));
    }

    #[test]
    fn test_empty_locals_still_emits_one_block() {
        let content = "locals {}\n";
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].kind, BlockKind::Locals);
        assert!(result.blocks[0].name.is_none());
    }

    #[test]
    fn test_repeated_locals_get_distinct_ranges() {
        let content = "locals {\n  a = 1\n}\n\nlocals {\n  b = 2\n}\n";
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        assert_eq!(result.blocks.len(), 2);
        assert_ne!(result.blocks[0].range, result.blocks[1].range);
        assert!(result.blocks[1].range.start >= result.blocks[0].range.end);
    }

    #[test]
    fn test_include_toggles_suppress_kinds() {
        let options = IndexOptions {
            include_variables: false,
            include_locals: false,
            ..Default::default()
        };
        let content = r#"
variable "region" {}
locals { x = 1 }
resource "aws_vpc" "main" {}
"#;
        let result = BlockParser::new(&options)
            .parse(Path::new("/p/main.tf"), content, &[])
            .unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].kind, BlockKind::Resource);
    }

    #[test]
    fn test_module_path_is_copied() {
        let content = r#"resource "aws_vpc" "main" {}"#;
        let module_path = vec!["module.vpc".to_string()];
        let result = parser()
            .parse(Path::new("/p/modules/vpc/main.tf"), content, &module_path)
            .unwrap();
        assert_eq!(result.blocks[0].module_path, module_path);
    }

    #[test]
    fn test_empty_file_yields_empty_result() {
        let result = parser().parse(Path::new("/p/empty.tf"), "", &[]).unwrap();
        assert!(result.blocks.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_invalid_hcl_is_file_level_error() {
        let result = parser().parse(Path::new("/p/bad.tf"), "this is not valid { hcl", &[]);
        assert!(matches!(result, Err(TerracartaError::HclParse { .. })));
    }

    #[test]
    fn test_parse_tf_json() {
        let content = r#"{
  "resource": {
    "aws_instance": {
      "web": { "ami": "ami-123456" }
    }
  },
  "variable": {
    "region": { "default": "eu-west-1" }
  },
  "module": {
    "vpc": { "source": "./modules/vpc" }
  }
}"#;
        let result = parser()
            .parse(Path::new("/p/main.tf.json"), content, &[])
            .unwrap();

        assert_eq!(result.blocks.len(), 3);
        let module = result
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Module)
            .unwrap();
        assert_eq!(module.source.as_deref(), Some("./modules/vpc"));
        let resource = result
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Resource)
            .unwrap();
        assert_eq!(resource.resource_type.as_deref(), Some("aws_instance"));
        assert_eq!(resource.name.as_deref(), Some("web"));
    }

    #[test]
    fn test_invalid_json_is_file_level_error() {
        let result = parser().parse(Path::new("/p/bad.tf.json"), "{nope", &[]);
        assert!(matches!(result, Err(TerracartaError::JsonParse { .. })));
    }

    #[test]
    fn test_json_ranges_fall_back() {
        // JSON files have no HCL headers to anchor; ranges degrade to the
        // documented fallback rather than failing.
        let content = r#"{"variable": {"region": {}}}"#;
        let result = parser()
            .parse(Path::new("/p/vars.tf.json"), content, &[])
            .unwrap();
        assert_eq!(result.blocks.len(), 1);
        let range = result.blocks[0].range;
        assert_eq!(range.start, 0);
        assert!(range.end <= 100);
    }

    #[test]
    fn test_non_ascii_offsets_are_char_indexed() {
        let content = "# café ünïcode\nresource \"aws_vpc\" \"main\" {\n}\n";
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        let block = &result.blocks[0];

        let chars: Vec<char> = content.chars().collect();
        let slice: String = chars[block.range.start..block.range.end].iter().collect();
        assert!(slice.starts_with("resource"));
        assert!(slice.ends_with('}'));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let content = "resource \"aws_vpc\" \"main\" {\n  tag = \"}{\"\n}\n";
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        let block = &result.blocks[0];
        let chars: Vec<char> = content.chars().collect();
        let slice: String = chars[block.range.start..block.range.end].iter().collect();
        assert!(slice.ends_with('}'));
        assert!(slice.contains("}{"));
    }

    #[test]
    fn test_terraform_block_is_ignored() {
        let content = r#"
terraform {
  required_version = ">= 1.0"
}
resource "aws_vpc" "main" {}
"#;
        let result = parser().parse(Path::new("/p/main.tf"), content, &[]).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].kind, BlockKind::Resource);
    }
}
