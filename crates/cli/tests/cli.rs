// End-to-end tests for the `backfill` binary.
// Run with: cargo test -p backfill-cli --test cli

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use httpmock::prelude::*;
use tempfile::TempDir;

fn backfill() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_backfill"));
    cmd.env_remove("BACKFILL_STORE").env_remove("BACKFILL_SEARCH_NODE");
    cmd
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Scratch dir with the CSV exports, the config and a seeded SQLite file.
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in ["comments.csv", "users.csv", "import.toml"] {
        std::fs::copy(fixtures_dir().join(name), dir.path().join(name)).unwrap();
    }
    let conn = rusqlite::Connection::open(dir.path().join("site.sqlite3")).unwrap();
    let schema = std::fs::read_to_string(fixtures_dir().join("schema.sql")).unwrap();
    conn.execute_batch(&schema).unwrap();
    dir
}

fn comment_ids(dir: &Path) -> Vec<i64> {
    let conn = rusqlite::Connection::open(dir.join("site.sqlite3")).unwrap();
    let mut stmt = conn.prepare("SELECT id FROM comments ORDER BY id").unwrap();
    let rows = stmt.query_map([], |r| r.get(0)).unwrap();
    rows.collect::<Result<_, _>>().unwrap()
}

fn mock_index(server: &MockServer, health: &str) {
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).json_body(serde_json::json!({ "cluster_name": "test" }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/_cat/indices");
        then.status(200).json_body(serde_json::json!([
            { "health": health, "status": "open", "index": "comments" }
        ]));
    });
}

fn run_import(dir: &Path, server: &MockServer, extra: &[&str]) -> Output {
    backfill()
        .arg("run")
        .arg(dir.join("import.toml"))
        .arg("--store")
        .arg(dir.join("site.sqlite3"))
        .arg("--search-node")
        .arg(server.base_url())
        .arg("--log-file")
        .arg(dir.join("processing.log"))
        .args(extra)
        .output()
        .unwrap()
}

// ============================================================================
// validate
// ============================================================================

#[test]
fn validate_accepts_fixture_config() {
    let output = backfill()
        .arg("validate")
        .arg(fixtures_dir().join("import.toml"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("OK:"));
    assert!(stdout.contains("batch size: 2"));
}

#[test]
fn validate_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        "name = \"bad\"\n\n[source]\ncomments = \"c.csv\"\nauthors = \"u.csv\"\n\n[import]\nbatch_size = 0\n",
    )
    .unwrap();

    let output = backfill().arg("validate").arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("batch_size"));
}

#[test]
fn validate_missing_file_is_usage_error() {
    let output = backfill().arg("validate").arg("no-such-import.toml").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn run_imports_and_writes_log() {
    let dir = workspace();
    let server = MockServer::start();
    mock_index(&server, "green");
    let bulk = server.mock(|when, then| {
        when.method(POST).path("/_bulk");
        then.status(200).json_body(serde_json::json!({ "errors": false, "items": [] }));
    });

    let output = run_import(dir.path(), &server, &[]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    bulk.assert_calls(2);
    assert_eq!(comment_ids(dir.path()), vec![500, 501, 502, 503, 504]);
    assert!(dir.path().join("remap.json").exists());

    let log = std::fs::read_to_string(dir.path().join("processing.log")).unwrap();
    assert!(log.contains("Inserted 4, updated 0"));
    assert!(log.contains("Finished in"));
}

#[test]
fn dry_run_prints_preview_and_writes_nothing() {
    let dir = workspace();
    let server = MockServer::start();
    mock_index(&server, "green");

    let output = run_import(dir.path(), &server, &["--dry-run"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let preview: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(preview["old_id"], 3);
    assert_eq!(comment_ids(dir.path()), vec![500]);
    assert!(!dir.path().join("remap.json").exists());
}

#[test]
fn red_index_exits_with_setup_code() {
    let dir = workspace();
    let server = MockServer::start();
    mock_index(&server, "red");

    let output = run_import(dir.path(), &server, &[]);
    assert_eq!(output.status.code(), Some(4));
    assert_eq!(comment_ids(dir.path()), vec![500]);

    // The failure still lands in the log file
    let log = std::fs::read_to_string(dir.path().join("processing.log")).unwrap();
    assert!(log.contains("ERROR:"));
    assert!(log.contains("health is red"));
}

#[test]
fn missing_store_exits_with_setup_code() {
    let dir = workspace();
    let server = MockServer::start();

    let output = backfill()
        .arg("run")
        .arg(dir.path().join("import.toml"))
        .arg("--store")
        .arg(dir.path().join("absent.sqlite3"))
        .arg("--search-node")
        .arg(server.base_url())
        .arg("--log-file")
        .arg(dir.path().join("processing.log"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(!dir.path().join("absent.sqlite3").exists());
}

#[test]
fn store_from_environment() {
    let dir = workspace();
    let server = MockServer::start();
    mock_index(&server, "green");
    server.mock(|when, then| {
        when.method(POST).path("/_bulk");
        then.status(200).json_body(serde_json::json!({ "errors": false, "items": [] }));
    });

    let output = backfill()
        .env("BACKFILL_STORE", dir.path().join("site.sqlite3"))
        .env("BACKFILL_SEARCH_NODE", server.base_url())
        .arg("run")
        .arg(dir.path().join("import.toml"))
        .arg("--log-file")
        .arg(dir.path().join("processing.log"))
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(comment_ids(dir.path()).len(), 5);
}

#[test]
fn run_without_store_is_usage_error() {
    let dir = workspace();
    let output = backfill()
        .arg("run")
        .arg(dir.path().join("import.toml"))
        .arg("--log-file")
        .arg(dir.path().join("processing.log"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("BACKFILL_STORE"));
}
