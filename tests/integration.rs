use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn paracheck_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("paracheck");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    fs::write(
        root.join("files").join("thesis.txt"),
        "The quick brown fox jumps over the lazy dog.\n\n\
         The quick brown fox jumps over the lazy dog.\n\n\
         Distributed consensus needs a majority of replicas to agree.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/paracheck.sqlite"

[storage]
root = "{root}/data/uploads"

[similarity]
high_risk_threshold = 70.0

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );
    let config_path = root.join("config").join("paracheck.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_paracheck(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(paracheck_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run paracheck: {}", e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn init_and_upload(config_path: &Path, file: &Path) -> String {
    let (_, stderr, success) = run_paracheck(config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (stdout, stderr, success) =
        run_paracheck(config_path, &["upload", file.to_str().unwrap(), "--user", "3"]);
    assert!(success, "upload failed: stdout={}, stderr={}", stdout, stderr);
    stdout
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_paracheck(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));

    let (_, stderr, success) = run_paracheck(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_upload_reports_duplicates() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("thesis.txt");
    let stdout = init_and_upload(&config_path, &file);

    assert!(stdout.contains("document 1: thesis.txt"), "got: {}", stdout);
    assert!(stdout.contains("paragraphs: 3"), "got: {}", stdout);
    assert!(stdout.contains("100.0%"), "got: {}", stdout);

    let (report, _, success) = run_paracheck(&config_path, &["report", "1"]);
    assert!(success);
    assert!(report.contains("status: CHECKED"), "got: {}", report);
    assert!(report.contains("paragraph:1"), "got: {}", report);
    assert!(report.contains("2 of 3 paragraphs at or above 70%"), "got: {}", report);
}

#[test]
fn test_documents_listing_and_filters() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("thesis.txt");
    init_and_upload(&config_path, &file);

    let (stdout, _, success) = run_paracheck(&config_path, &["documents", "--owner", "3"]);
    assert!(success);
    assert!(stdout.contains("thesis.txt"), "got: {}", stdout);

    let (stdout, _, success) = run_paracheck(&config_path, &["documents", "--owner", "99"]);
    assert!(success);
    assert!(stdout.contains("No documents found."));

    let (_, _, success) = run_paracheck(&config_path, &["documents", "--status", "archived"]);
    assert!(!success, "unknown status should fail");
}

#[test]
fn test_edit_then_recheck_lowers_similarity() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("thesis.txt");
    init_and_upload(&config_path, &file);

    let (stdout, stderr, success) = run_paracheck(
        &config_path,
        &[
            "edit",
            "1",
            "1",
            "Sphinx of black quartz, judge my vow, said nobody ever.",
        ],
    );
    assert!(success, "edit failed: {}", stderr);
    assert!(stdout.contains("Updated 1 paragraph(s)."));

    let (stdout, _, success) = run_paracheck(&config_path, &["edit", "1", "42", "ghost"]);
    assert!(success);
    assert!(stdout.contains("nothing changed"));

    let (report, stderr, success) = run_paracheck(&config_path, &["recheck", "1"]);
    assert!(success, "recheck failed: {}", stderr);
    assert!(report.contains("Sphinx of black quartz"), "got: {}", report);
    assert!(!report.contains("100.0%"), "got: {}", report);
}

#[test]
fn test_version_history() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("thesis.txt");
    init_and_upload(&config_path, &file);

    for n in 1..=3 {
        let content = format!("draft number {}", n);
        let (stdout, stderr, success) = run_paracheck(
            &config_path,
            &["version", "save", "1", "--content", &content, "--style", "ACADEMIC"],
        );
        assert!(success, "save failed: {}", stderr);
        assert!(
            stdout.contains(&format!("Saved version {} of document 1", n)),
            "got: {}",
            stdout
        );
    }

    let (stdout, _, success) = run_paracheck(&config_path, &["version", "list", "1"]);
    assert!(success);
    let v3 = stdout.find("v3").expect("v3 listed");
    let v1 = stdout.find("v1").expect("v1 listed");
    assert!(v3 < v1, "newest first: {}", stdout);

    let (stdout, _, success) = run_paracheck(&config_path, &["version", "get", "2"]);
    assert!(success);
    assert!(stdout.contains("draft number 2"));

    let (_, _, success) =
        run_paracheck(&config_path, &["version", "save", "1", "--content", "   "]);
    assert!(!success, "blank content must be rejected");

    let (_, _, success) =
        run_paracheck(&config_path, &["version", "save", "99", "--content", "x"]);
    assert!(!success, "unknown document must be rejected");
}

#[test]
fn test_export_and_delete() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("thesis.txt");
    init_and_upload(&config_path, &file);

    let out = tmp.path().join("out").join("thesis.docx");
    let (stdout, stderr, success) = run_paracheck(
        &config_path,
        &["export", "1", "--output", out.to_str().unwrap()],
    );
    assert!(success, "export failed: {}", stderr);
    // Text uploads have no package to rewrite.
    assert!(stdout.contains("(fresh)"), "got: {}", stdout);
    let bytes = fs::read(&out).unwrap();
    let paragraphs = paracheck::extract::extract_paragraphs(&bytes, "thesis.docx").unwrap();
    assert_eq!(paragraphs.len(), 3);

    let (stdout, _, success) = run_paracheck(&config_path, &["delete", "1"]);
    assert!(success);
    assert!(stdout.contains("Deleted document 1."));

    let (_, stderr, success) = run_paracheck(&config_path, &["report", "1"]);
    assert!(!success);
    assert!(stderr.contains("document not found: 1"), "got: {}", stderr);
}

#[test]
fn test_rewrite_without_generator_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_paracheck(&config_path, &["init"]);
    let (_, stderr, success) = run_paracheck(&config_path, &["rewrite", "some text"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_sensitive_words() {
    let (_tmp, config_path) = setup_test_env();
    run_paracheck(&config_path, &["init"]);

    let (stdout, stderr, success) = run_paracheck(
        &config_path,
        &["words", "add", "forbidden", "--category", "POLITICS", "--level", "high"],
    );
    assert!(success, "words add failed: {}", stderr);
    assert!(stdout.contains("forbidden"));

    let (_, _, success) = run_paracheck(&config_path, &["words", "add", "forbidden"]);
    assert!(!success, "duplicate word must be rejected");

    let (stdout, _, success) = run_paracheck(&config_path, &["words", "list"]);
    assert!(success);
    assert!(stdout.contains("forbidden"));
    assert!(stdout.contains("HIGH"));
    assert!(stdout.contains("enabled"));

    let (stdout, stderr, success) = run_paracheck(&config_path, &["words", "disable", "forbidden"]);
    assert!(success, "words disable failed: {}", stderr);
    assert!(stdout.contains("disabled"));
    let (stdout, _, _) = run_paracheck(&config_path, &["words", "list"]);
    assert!(stdout.contains("disabled"), "got: {}", stdout);

    let (_, stderr, success) = run_paracheck(&config_path, &["words", "enable", "ghost"]);
    assert!(!success);
    assert!(stderr.contains("sensitive word not found: ghost"), "got: {}", stderr);
}

#[test]
fn test_documents_huge_page_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("files").join("thesis.txt");
    init_and_upload(&config_path, &file);

    let (_, stderr, success) = run_paracheck(
        &config_path,
        &["documents", "--page", "9223372036854775807"],
    );
    assert!(!success);
    assert!(stderr.contains("out of range"), "got: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_paracheck(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "got: {}", stderr);
}
