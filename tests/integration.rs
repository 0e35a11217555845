use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn fx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("fx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("articles.jsonl"),
        concat!(
            r#"{"url": "https://news.example.com/a", "download_time": "2024-10-22T08:00:00Z", "title": "Acme beats", "content": "<p>Acme beat estimates.</p>"}"#,
            "\n",
            r#"{"url": "https://news.example.com/b", "download_time": "2024-10-23T09:30:00Z", "content": "<p>Globex misses.</p>"}"#,
            "\n",
            r#"{"url": "https://news.example.com/c", "download_time": "2024-10-26T10:00:00Z", "content": "out of range"}"#,
            "\n"
        ),
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/results.sqlite"

[source]
path = "{root}/data/news.sqlite"
content_column = "htmlContent"

[pipeline]
page_size = 50
chunk_size = 5
"#,
        root = root.display()
    );

    let config_path = config_dir.join("fx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/results.sqlite").exists());
    assert!(tmp.path().join("data/news.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_fx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_fx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_then_status() {
    let (tmp, config_path) = setup_test_env();
    let jsonl = tmp.path().join("articles.jsonl");

    run_fx(&config_path, &["init"]);
    let (stdout, stderr, success) = run_fx(&config_path, &["import", jsonl.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Imported 3 of 3"), "stdout={}", stdout);

    let (stdout, stderr, success) = run_fx(
        &config_path,
        &["status", "--start", "2024-10-22", "--end", "2024-10-25"],
    );
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Documents:    2"), "stdout={}", stdout);
    assert!(stdout.contains("Enriched:     0 / 2"), "stdout={}", stdout);
    assert!(stdout.contains("Checkpoint:   none"), "stdout={}", stdout);
}

#[test]
fn test_import_twice_inserts_nothing_new() {
    let (tmp, config_path) = setup_test_env();
    let jsonl = tmp.path().join("articles.jsonl");

    run_fx(&config_path, &["import", jsonl.to_str().unwrap()]);
    let (stdout, _, success) = run_fx(&config_path, &["import", jsonl.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Imported 0 of 3"), "stdout={}", stdout);
}

#[test]
fn test_schema_prints_strict_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fx(&config_path, &["schema"]);
    assert!(success, "schema failed: {}", stderr);
    let schema: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["additionalProperties"], false);
    assert!(schema["properties"]["financial_event_with_symbols"].is_object());
}

#[test]
fn test_schema_does_not_need_config() {
    let (stdout, _, success) = run_fx(Path::new("/nonexistent/fx.toml"), &["schema"]);
    assert!(success);
    assert!(stdout.contains("main_company"));
}

#[test]
fn test_run_without_providers_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();
    run_fx(&config_path, &["init"]);

    let (_, stderr, success) = run_fx(
        &config_path,
        &["run", "--start", "2024-10-22", "--end", "2024-10-25", "--progress", "off"],
    );
    assert!(!success);
    assert!(stderr.contains("No [[providers]] configured"), "stderr={}", stderr);
}

#[test]
fn test_run_accepts_from_start() {
    let (_tmp, config_path) = setup_test_env();
    run_fx(&config_path, &["init"]);

    let (_, stderr, success) = run_fx(
        &config_path,
        &[
            "run",
            "--start",
            "2024-10-22",
            "--end",
            "2024-10-25",
            "--from-start",
            "--progress",
            "off",
        ],
    );
    assert!(!success);
    assert!(!stderr.contains("unexpected argument"), "stderr={}", stderr);
    assert!(stderr.contains("No [[providers]] configured"), "stderr={}", stderr);
}

#[test]
fn test_run_rejects_empty_range() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_fx(
        &config_path,
        &["run", "--start", "2024-10-25", "--end", "2024-10-22"],
    );
    assert!(!success);
    assert!(stderr.contains("empty date range"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_reports_path() {
    let (_, stderr, success) = run_fx(Path::new("/nonexistent/fx.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("/nonexistent/fx.toml"), "stderr={}", stderr);
}
