#![allow(deprecated)]

//! End-to-end tests for the chatkeep binary
//!
//! Each test runs against its own temporary data directory and a config path
//! that does not exist, so only built-in defaults apply.
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;
mod common;

fn chatkeep(data: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chatkeep").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("CHATKEEP_DATA_DIR")
        .env_remove("CHATKEEP_DEFAULT_MODEL")
        .env_remove("CHATKEEP_EXPORT_DIR")
        .env_remove("CHATKEEP_EXPORT_FORMAT")
        .arg("--config")
        .arg(data.join("missing.yaml"))
        .arg("--data-dir")
        .arg(data);
    cmd
}

fn create(data: &Path, title: &str) -> String {
    let output = chatkeep(data).args(["new", title]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    stdout
        .split_whitespace()
        .last()
        .expect("new prints the conversation id")
        .to_string()
}

#[test]
fn test_new_append_search_show() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Deploy plan");
    let short = &id[..8];

    chatkeep(tmp.path())
        .args(["append", short, "When do we deploy to production?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Appended message 1"));

    chatkeep(tmp.path())
        .args(["append", short, "--role", "assistant", "Friday."])
        .assert()
        .success();

    chatkeep(tmp.path())
        .args(["search", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains(short));

    chatkeep(tmp.path())
        .args(["show", short])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deploy plan"))
        .stdout(predicate::str::contains("Friday."));
}

#[test]
fn test_append_rejects_unknown_role() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Roles");

    chatkeep(tmp.path())
        .args(["append", &id, "--role", "robot", "beep"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("robot"));
}

#[test]
fn test_show_unknown_conversation_fails() {
    let tmp = TempDir::new().unwrap();

    chatkeep(tmp.path())
        .args(["show", "deadbeef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_list_empty_store() {
    let tmp = TempDir::new().unwrap();

    chatkeep(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversations found."));
}

#[test]
fn test_delete_then_list() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Short lived");

    chatkeep(tmp.path())
        .args(["delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted conversation"));

    chatkeep(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversations found."));
}

#[test]
fn test_export_writes_markdown_file() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Exported notes");
    let out = tmp.path().join("out");

    chatkeep(tmp.path())
        .args(["export", &id, "--format", "md", "--preset", "clean", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported"));

    let files = common::files_in(&out);
    assert_eq!(files.len(), 1);
    let body = std::fs::read_to_string(&files[0]).unwrap();
    assert!(body.starts_with("# Exported notes"));
}

#[test]
fn test_export_unknown_format_fails() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Whatever");

    chatkeep(tmp.path())
        .args(["export", &id, "--format", "docx", "--output"])
        .arg(tmp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported export format 'docx'"));
}

#[test]
fn test_export_bundle_writes_one_file_per_format() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Bundled");
    let out = tmp.path().join("bundle");

    chatkeep(tmp.path())
        .args(["export", &id, "-f", "md", "-f", "html", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("markdown"))
        .stdout(predicate::str::contains("html"));

    let extensions: Vec<String> = common::files_in(&out)
        .iter()
        .filter_map(|p| p.extension().and_then(|e| e.to_str()).map(String::from))
        .collect();
    assert_eq!(extensions.len(), 2);
    assert!(extensions.contains(&"md".to_string()));
    assert!(extensions.contains(&"html".to_string()));
}

#[test]
fn test_collection_export_imports_into_another_store() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source");
    let first = create(&source, "First of two");
    let second = create(&source, "Second of two");
    let file = tmp.path().join("all.json");

    chatkeep(&source)
        .args(["export", &first, &second, "--collection", "--output"])
        .arg(&file)
        .assert()
        .success();

    let target = tmp.path().join("target");
    chatkeep(&target)
        .arg("import")
        .arg(&file)
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conversations: 2"))
        .stdout(predicate::str::contains("Ready to import"));
    chatkeep(&target)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversations found."));

    chatkeep(&target)
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(first.as_str()))
        .stdout(predicate::str::contains(second.as_str()));

    chatkeep(&target)
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing imported"));
}

#[test]
fn test_import_check_rejects_garbage() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("garbage.json");
    std::fs::write(&file, "[1, 2").unwrap();

    chatkeep(tmp.path())
        .arg("import")
        .arg(&file)
        .arg("--check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_show_filters_by_role_as_chat_json() {
    let tmp = TempDir::new().unwrap();
    let id = create(tmp.path(), "Chat");
    chatkeep(tmp.path())
        .args(["append", &id, "question one"])
        .assert()
        .success();
    chatkeep(tmp.path())
        .args(["append", &id, "--role", "assistant", "answer one"])
        .assert()
        .success();

    let output = chatkeep(tmp.path())
        .args(["show", &id, "--role", "assistant", "--chat-json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let messages: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        messages,
        serde_json::json!([{"role": "assistant", "content": "answer one"}])
    );
}

#[test]
fn test_formats_lists_renderers() {
    let tmp = TempDir::new().unwrap();

    chatkeep(tmp.path())
        .arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("markdown"))
        .stdout(predicate::str::contains("html"))
        .stdout(predicate::str::contains("json"))
        .stdout(predicate::str::contains("text"));
}

#[test]
fn test_templates_instantiate_with_vars() {
    let tmp = TempDir::new().unwrap();

    chatkeep(tmp.path())
        .args(["templates", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("code-review"));

    chatkeep(tmp.path())
        .args([
            "templates",
            "instantiate",
            "code-review",
            "--var",
            "language=rust",
            "--var",
            "code=fn main() {}",
            "--var",
            "focus_areas=safety",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created conversation"));

    chatkeep(tmp.path())
        .args(["search", "safety"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Code Review"));
}

#[test]
fn test_templates_instantiate_reports_missing_vars() {
    let tmp = TempDir::new().unwrap();

    chatkeep(tmp.path())
        .args(["templates", "instantiate", "code-review", "--var", "language=go"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("code, focus_areas"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (_config_dir, config_path) =
        common::temp_config_file("export:\n  options:\n    messages_per_page: 0\n");

    Command::cargo_bin("chatkeep")
        .unwrap()
        .arg("--config")
        .arg(config_path)
        .arg("--data-dir")
        .arg(tmp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("messages_per_page"));
}
