//! Integration tests for the pageforge CLI
//!
//! Agent calls are answered from `--replay` files so no Claude CLI is needed.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PAGE: &str = "<html><head><title>Acme</title></head><body>\n<!-- START: hero -->\n<section><h1>Acme rockets</h1></section>\n<!-- END: hero -->\n<!-- START: pricing -->\n<section><form><input name=\"email\"></form><p>$9</p></section>\n<!-- END: pricing -->\n</body></html>";

/// Helper to create a pageforge Command rooted in `dir`
fn pageforge(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("pageforge");
    cmd.current_dir(dir)
        .env_remove("PAGEFORGE_CLAUDE_CMD")
        .env_remove("PAGEFORGE_OUTPUT_DIR")
        .env_remove("PAGEFORGE_DEFAULT_THEME")
        .env_remove("PAGEFORGE_TIMEOUT_SECS")
        .env_remove("PAGEFORGE_LOG");
    cmd
}

/// Write a replay file answering every call in order.
fn write_replay(dir: &Path, name: &str, replies: &[&str]) -> std::path::PathBuf {
    let replies: Vec<serde_json::Value> = replies
        .iter()
        .map(|content| {
            serde_json::json!({
                "type": "respond",
                "content": content,
                "input_tokens": 1000,
                "output_tokens": 500
            })
        })
        .collect();
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(&replies).unwrap()).unwrap();
    path
}

/// Generate a fast-mode project at `dir/output`.
fn generate_fixture(dir: &TempDir) {
    let replay = write_replay(dir.path(), "gen.json", &[PAGE]);
    pageforge(dir.path())
        .arg("--replay")
        .arg(&replay)
        .args(["gen", "Rockets for hobbyists", "--fast"])
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_pageforge_help() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("regen"))
            .stdout(predicate::str::contains("usage"));
    }

    #[test]
    fn test_pageforge_version() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path()).arg("--version").assert().success();
    }

    #[test]
    fn test_regen_requires_sections() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path()).arg("regen").assert().failure();
    }

    #[test]
    fn test_projects_empty() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path())
            .arg("projects")
            .assert()
            .success()
            .stdout(predicate::str::contains("No projects found"));
    }

    #[test]
    fn test_sections_without_project_fails() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path())
            .arg("sections")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No projects found"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created pageforge.toml"));

        let content = fs::read_to_string(dir.path().join("pageforge.toml")).unwrap();
        assert!(content.contains("[agent]"));
        assert!(content.contains("timeout_secs = 300"));

        pageforge(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using default configuration"))
            .stdout(predicate::str::contains("claude_cmd = \"claude\""));
    }

    #[test]
    fn test_config_show_env_override() {
        let dir = TempDir::new().unwrap();
        pageforge(dir.path())
            .env("PAGEFORGE_CLAUDE_CMD", "my-claude")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("claude_cmd = \"my-claude\""));
    }

    #[test]
    fn test_config_validate_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("pageforge.toml"),
            "[agent]\ntimeout_secs = 0\n",
        )
        .unwrap();
        pageforge(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("timeout_secs"));
    }

    #[test]
    fn test_config_validate_bad_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pageforge.toml"), "[agent\n").unwrap();
        pageforge(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse pageforge.toml"));
    }
}

// =============================================================================
// Pipeline Commands
// =============================================================================

mod pipeline {
    use super::*;

    #[test]
    fn test_gen_creates_project() {
        let dir = TempDir::new().unwrap();
        let replay = write_replay(dir.path(), "gen.json", &[PAGE]);

        pageforge(dir.path())
            .arg("--replay")
            .arg(&replay)
            .args(["gen", "Rockets for hobbyists", "--fast"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Updated:   hero, pricing"));

        assert!(dir.path().join("output/index.html").exists());
        assert!(dir.path().join("output/design_analysis.json").exists());
    }

    #[test]
    fn test_second_gen_uses_next_directory() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        generate_fixture(&dir);
        assert!(dir.path().join("output1/index.html").exists());

        pageforge(dir.path())
            .arg("projects")
            .assert()
            .success()
            .stdout(predicate::str::contains("output1"));
    }

    #[test]
    fn test_gen_rejected_output_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let replay = write_replay(dir.path(), "bad.json", &["not a page", "still not a page"]);

        pageforge(dir.path())
            .arg("--replay")
            .arg(&replay)
            .args(["gen", "Rockets", "--fast"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("Nothing was saved"))
            .stderr(predicate::str::contains("validation"));

        assert!(!dir.path().join("output/index.html").exists());
    }

    #[test]
    fn test_regen_updates_only_named_section() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        let replay = write_replay(dir.path(), "regen.json", &["<section><h1>Orbit today</h1></section>"]);

        pageforge(dir.path())
            .arg("--replay")
            .arg(&replay)
            .args(["regen", "hero"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Updated:   hero"))
            .stdout(predicate::str::contains("Untouched: pricing"));

        let html = fs::read_to_string(dir.path().join("output/index.html")).unwrap();
        assert!(html.contains("Orbit today"));
        assert!(html.contains("<p>$9</p>"));
    }

    #[test]
    fn test_regen_unknown_section() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        let replay = write_replay(dir.path(), "regen.json", &[]);

        pageforge(dir.path())
            .arg("--replay")
            .arg(&replay)
            .args(["regen", "faq"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown section 'faq'"));
    }

    #[test]
    fn test_form_edit_rejects_bad_type() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        pageforge(dir.path())
            .args(["form", "edit", "--type", "survey"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("survey"));
    }
}

// =============================================================================
// Inspection Commands
// =============================================================================

mod inspection {
    use super::*;

    #[test]
    fn test_sections_lists_document_order() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        pageforge(dir.path())
            .arg("sections")
            .assert()
            .success()
            .stdout(predicate::str::is_match(r"(?s)hero.*pricing").unwrap())
            .stdout(predicate::str::contains("forms"));
    }

    #[test]
    fn test_history_shows_generate() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        pageforge(dir.path())
            .args(["--project", "output", "history"])
            .assert()
            .success()
            .stdout(predicate::str::contains("generate"))
            .stdout(predicate::str::contains("success"));
    }

    #[test]
    fn test_usage_totals() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        pageforge(dir.path())
            .args(["usage", "--all"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Total: 1,000 in / 500 out"))
            .stdout(predicate::str::contains("By project:"));
    }

    #[test]
    fn test_usage_rejects_unknown_kind() {
        let dir = TempDir::new().unwrap();
        generate_fixture(&dir);
        pageforge(dir.path())
            .args(["usage", "--kind", "deploy"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid operation kind"));
    }
}
