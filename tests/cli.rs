//! Runs the `ragtrace` binary for the commands that need no provider.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragtrace_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragtrace"))
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragtrace_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "ragtrace=warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragtrace binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn setup_files() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files = root.join("files");
    fs::create_dir_all(files.join("nested")).unwrap();
    fs::write(files.join("short.md"), "# Short\n\nAgents use tools.").unwrap();
    fs::write(files.join("nested/long.txt"), "x".repeat(2600)).unwrap();
    fs::write(files.join("skip.rs"), "fn main() {}").unwrap();
    fs::write(
        files.join("page.html"),
        r#"<html><head><title>Page</title></head><body>
        <nav>menu</nav><div class="post-content">Planning and memory.</div>
        </body></html>"#,
    )
    .unwrap();

    let config = format!(
        r#"[sources]
paths = ["{}"]
extract_classes = ["post-content"]

[chunking]
chunk_size = 1000
chunk_overlap = 200
"#,
        files.display()
    );
    let config_path = root.join("ragtrace.toml");
    fs::write(&config_path, config).unwrap();
    (tmp, config_path)
}

#[test]
fn test_init_writes_example_config() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config/ragtrace.toml");

    let (stdout, stderr, ok) = run(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("ragtrace.toml"));
    let written = fs::read_to_string(&config_path).unwrap();
    assert!(written.contains("[retrieval]"));

    let (_, stderr, ok) = run(&config_path, &["init"]);
    assert!(!ok);
    assert!(stderr.contains("--force"));

    let (_, _, ok) = run(&config_path, &["init", "--force"]);
    assert!(ok);
}

#[test]
fn test_chunk_counts() {
    let (_tmp, config_path) = setup_files();
    let (stdout, stderr, ok) = run(&config_path, &["chunk"]);
    assert!(ok, "chunk failed: {}", stderr);

    // short.md, long.txt, page.html; skip.rs is not matched.
    assert!(stdout.contains("documents: 3"), "stdout: {}", stdout);
    // 2600 chars → ceil((2600 - 200) / 800) = 3, plus one each for the others.
    assert!(stdout.contains("chunks: 5"), "stdout: {}", stdout);
    assert!(!stdout.contains("skip.rs"));
}

#[test]
fn test_load_lists_documents() {
    let (_tmp, config_path) = setup_files();
    let (stdout, stderr, ok) = run(&config_path, &["load"]);
    assert!(ok, "load failed: {}", stderr);
    assert!(stdout.contains("short.md"));
    assert!(stdout.contains("page.html"));
    assert!(stdout.contains("documents: 3"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run(&tmp.path().join("nope.toml"), &["chunk"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_chunking_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("ragtrace.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
    let (_, stderr, ok) = run(&config_path, &["chunk"]);
    assert!(!ok);
    assert!(stderr.contains("chunk_overlap"));
}

#[test]
fn test_ask_requires_api_key() {
    let (_tmp, config_path) = setup_files();
    let output = Command::new(ragtrace_binary())
        .arg("--config")
        .arg(&config_path)
        .args(["ask", "What is an agent?", "--no-save"])
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no API key"), "stderr: {}", stderr);
}
