//! Integration tests for Terracarta.
//!
//! These tests verify the end-to-end behavior of discovery, indexing,
//! reference extraction, and incremental updates against real file trees.

use std::path::{Path, PathBuf};
use terracarta::{Config, IndexSession};

/// Get the path to the test fixtures directory.
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

mod index_tests {
    use super::*;
    use terracarta::BlockKind;

    #[tokio::test]
    async fn test_index_simple_workspace() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        // 2 resources, 1 data, 1 locals, 1 output, 2 variables
        assert_eq!(result.stats.total_blocks, 7);
        assert_eq!(result.stats.blocks_by_type["resource"], 2);
        assert_eq!(result.stats.blocks_by_type["variable"], 2);
        assert_eq!(result.stats.blocks_by_type["data"], 1);
        assert_eq!(result.stats.blocks_by_type["locals"], 1);
        assert_eq!(result.stats.blocks_by_type["output"], 1);
        assert_eq!(result.stats.files_processed, 2);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_map_completeness_invariant() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        let index = &result.index;
        let type_total: usize = index.by_type.values().map(Vec::len).sum();
        let file_total: usize = index.by_file.values().map(Vec::len).sum();
        assert_eq!(type_total, index.blocks.len());
        assert_eq!(file_total, index.blocks.len());
    }

    #[tokio::test]
    async fn test_by_file_ordering_invariant() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        for blocks in result.index.by_file.values() {
            for pair in blocks.windows(2) {
                assert!(
                    (pair[0].range.start, pair[0].range.end)
                        <= (pair[1].range.start, pair[1].range.end),
                    "by_file out of position order"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_by_type_ordering_invariant() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        for blocks in result.index.by_type.values() {
            for pair in blocks.windows(2) {
                assert!(
                    pair[0].type_sort_key() <= pair[1].type_sort_key(),
                    "by_type out of (name, type, file) order"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let mut session = IndexSession::new(Config::default());
        let first = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();
        let second = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        assert_eq!(first.index.blocks, second.index.blocks);
        assert_eq!(first.index.refs, second.index.refs);
        // second pass is served from the parse cache
        assert!(session.cache_stats().hits >= 2);
    }

    #[tokio::test]
    async fn test_resource_round_trip() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        let vpc = result
            .index
            .blocks
            .iter()
            .find(|b| b.name.as_deref() == Some("main") && b.kind == BlockKind::Resource)
            .unwrap();

        assert_eq!(vpc.resource_type.as_deref(), Some("aws_vpc"));
        assert_eq!(vpc.provider.as_deref(), Some("aws"));
        assert!(vpc.file.ends_with("main.tf"));
        assert_eq!(vpc.address(), "aws_vpc.main");

        // the range slice is itself a complete, brace-balanced block
        let text = std::fs::read_to_string(&vpc.file).unwrap();
        let chars: Vec<char> = text.chars().collect();
        let slice: String = chars[vpc.range.start..vpc.range.end].iter().collect();
        assert!(slice.starts_with("resource \"aws_vpc\" \"main\""));
        assert_eq!(slice.matches('{').count(), slice.matches('}').count());
        assert!(slice.ends_with('}'));
    }

    #[tokio::test]
    async fn test_json_workspace() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("json"), None)
            .await
            .unwrap();

        assert_eq!(result.stats.total_blocks, 3);
        assert_eq!(result.stats.blocks_by_type["resource"], 1);
        let web = result
            .index
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Resource)
            .unwrap();
        assert_eq!(web.address(), "aws_instance.web");
    }
}

mod refs_tests {
    use super::*;
    use terracarta::{EdgeKind, ReferenceKind};

    #[tokio::test]
    async fn test_resource_reference_scenario() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();

        let refs = result.index.refs.as_ref().unwrap();
        let edge = refs
            .iter()
            .find(|e| e.from == "aws_subnet.public" && e.to == "aws_vpc.main")
            .expect("subnet -> vpc edge missing");
        assert_eq!(edge.kind, EdgeKind::Reference);
        assert_eq!(edge.reference, ReferenceKind::Resource);
    }

    #[tokio::test]
    async fn test_var_data_local_references() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("simple"), None)
            .await
            .unwrap();
        let refs = result.index.refs.as_ref().unwrap();

        assert!(refs
            .iter()
            .any(|e| e.from == "aws_vpc.main"
                && e.to == "var.cidr"
                && e.reference == ReferenceKind::Var));
        assert!(refs
            .iter()
            .any(|e| e.from == "aws_subnet.public"
                && e.to == "data.aws_availability_zones.available"
                && e.reference == ReferenceKind::Data));
        assert!(refs
            .iter()
            .any(|e| e.from == "aws_vpc.main"
                && e.to == "local.locals"
                && e.reference == ReferenceKind::Local));
    }

    #[tokio::test]
    async fn test_module_containment_scenario() {
        // Build from the root file only: the module tree is reached through
        // source resolution and indexed under its module scope.
        let mut session = IndexSession::new(Config::default());
        let root = fixtures_path().join("modular/main.tf");
        let result = session.build(vec![root], None).await.unwrap();

        let scoped = result
            .index
            .blocks
            .iter()
            .find(|b| b.address() == "module.vpc.aws_vpc.this")
            .expect("module-scoped resource missing");
        assert_eq!(scoped.module_path, vec!["module.vpc".to_string()]);

        let refs = result.index.refs.as_ref().unwrap();
        assert!(refs
            .iter()
            .any(|e| e.from == "module.vpc"
                && e.to == "module.vpc.aws_vpc.this"
                && e.kind == EdgeKind::Contains
                && e.reference == ReferenceKind::ModuleContainment));
    }

    #[tokio::test]
    async fn test_module_to_module_scenario() {
        let mut session = IndexSession::new(Config::default());
        let result = session
            .build_dir(&fixtures_path().join("modular"), None)
            .await
            .unwrap();

        let refs = result.index.refs.as_ref().unwrap();
        let edge = refs
            .iter()
            .find(|e| e.from == "module.app" && e.to == "module.vpc")
            .expect("app -> vpc module reference missing");
        assert_eq!(edge.reference, ReferenceKind::ModuleReference);
        assert_eq!(edge.attribute.as_deref(), Some("vpc_id"));
    }

    #[tokio::test]
    async fn test_module_scope_variable_isolation() {
        // var.cidr inside modules/vpc must resolve within the module scope:
        // matching is positional on the full module path, never prefix-based.
        let mut session = IndexSession::new(Config::default());
        let root = fixtures_path().join("modular/main.tf");
        let result = session.build(vec![root], None).await.unwrap();

        let refs = result.index.refs.as_ref().unwrap();
        let var_edge = refs
            .iter()
            .find(|e| e.from == "module.vpc.aws_vpc.this" && e.reference == ReferenceKind::Var)
            .expect("scoped var edge missing");
        assert_eq!(var_edge.to, "module.vpc.var.cidr");
    }
}

mod update_tests {
    use super::*;
    use terracarta::ChangeBatch;

    fn copy_fixture(dir: &Path, target: &Path) {
        for entry in walkdir_copy(dir) {
            let rel = entry.strip_prefix(dir).unwrap();
            let dest = target.join(rel);
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::copy(&entry, &dest).unwrap();
        }
    }

    fn walkdir_copy(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }

    #[tokio::test]
    async fn test_file_deletion_scenario() {
        let workspace = tempfile::tempdir().unwrap();
        copy_fixture(&fixtures_path().join("simple"), workspace.path());

        let mut session = IndexSession::new(Config::default());
        session.build_dir(workspace.path(), None).await.unwrap();
        let blocks_before = session.index().len();
        assert_eq!(blocks_before, 7);

        let variables = workspace.path().join("variables.tf").canonicalize().unwrap();
        std::fs::remove_file(&variables).unwrap();
        let outcome = session.apply_changes(&ChangeBatch {
            deleted: vec![variables.clone()],
            ..Default::default()
        });

        assert_eq!(outcome.blocks_removed, 2);
        let index = session.index();
        assert_eq!(index.len(), 5);
        assert!(index.maps_consistent());
        assert!(!index.by_file.contains_key(&variables));

        // no edge may reference the deleted variable blocks
        let refs = index.refs.as_ref().unwrap();
        assert!(refs
            .iter()
            .all(|e| !e.to.starts_with("var.") && !e.from.starts_with("var.")));
    }

    #[tokio::test]
    async fn test_change_and_create_batch() {
        let workspace = tempfile::tempdir().unwrap();
        copy_fixture(&fixtures_path().join("simple"), workspace.path());

        let mut session = IndexSession::new(Config::default());
        session.build_dir(workspace.path(), None).await.unwrap();

        // change: rename a resource; create: a brand-new file
        let main = workspace.path().join("main.tf").canonicalize().unwrap();
        let text = std::fs::read_to_string(&main)
            .unwrap()
            .replace("\"public\"", "\"private\"");
        std::fs::write(&main, text).unwrap();

        let extra = workspace.path().join("extra.tf");
        std::fs::write(&extra, "resource \"aws_eip\" \"nat\" {}\n").unwrap();
        let extra = extra.canonicalize().unwrap();

        let outcome = session.apply_changes(&ChangeBatch {
            changed: vec![main],
            created: vec![extra],
            ..Default::default()
        });

        assert_eq!(outcome.updated_files.len(), 1);
        assert_eq!(outcome.added_files.len(), 1);

        let index = session.index();
        assert!(index.maps_consistent());
        assert!(index
            .blocks
            .iter()
            .any(|b| b.name.as_deref() == Some("private")));
        assert!(!index
            .blocks
            .iter()
            .any(|b| b.name.as_deref() == Some("public")));
        assert!(index
            .blocks
            .iter()
            .any(|b| b.name.as_deref() == Some("nat")));

        // edges were re-derived against the renamed block
        let refs = index.refs.as_ref().unwrap();
        assert!(refs
            .iter()
            .any(|e| e.from == "aws_subnet.private" && e.to == "aws_vpc.main"));
    }
}

mod cli_tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn test_scan_text_output() {
        let mut cmd = Command::cargo_bin("terracarta").unwrap();
        cmd.arg("scan")
            .arg(fixtures_path().join("simple"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Terracarta scan"))
            .stdout(predicate::str::contains("resource"));
    }

    #[test]
    fn test_scan_json_output() {
        let mut cmd = Command::cargo_bin("terracarta").unwrap();
        let output = cmd
            .arg("scan")
            .arg(fixtures_path().join("simple"))
            .args(["--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let parsed: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("scan --format json must emit JSON");
        assert_eq!(parsed["inventory"]["total_blocks"], 7);
    }

    #[test]
    fn test_graph_dot_output() {
        let mut cmd = Command::cargo_bin("terracarta").unwrap();
        cmd.arg("graph")
            .arg(fixtures_path().join("simple"))
            .assert()
            .success()
            .stdout(predicate::str::contains("digraph"));
    }

    #[test]
    fn test_scan_missing_path_fails() {
        let mut cmd = Command::cargo_bin("terracarta").unwrap();
        cmd.arg("scan")
            .arg("/definitely/not/a/path")
            .assert()
            .failure();
    }

    #[test]
    fn test_validate_example_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("terracarta.yaml");
        std::fs::write(&config_path, terracarta::Config::example_yaml()).unwrap();

        let mut cmd = Command::cargo_bin("terracarta").unwrap();
        cmd.arg("validate")
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("valid"));
    }
}
