use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn pagevec(workdir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pagevec"))
        .current_dir(workdir)
        .env_remove("EMBEDDING_PROVIDER")
        .env_remove("EMBEDDING_MODEL")
        .env_remove("HASH_EMBED_DIMENSIONS")
        .env_remove("PAGEVEC_PROVIDER")
        .env_remove("PAGEVEC_MODEL")
        .env("RUST_LOG", "warn")
        .args(["--config", "missing.toml"])
        .args(args)
        .output()
        .expect("run CLI")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn corpus() -> TempDir {
    let dir = tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("doc1_page_1.txt"), "alpha protocol").unwrap();
    fs::write(docs.join("doc1_page_2.txt"), "beta procedure").unwrap();
    fs::write(docs.join("doc2_page_1.txt"), "alpha protocol").unwrap();
    dir
}

#[test]
fn index_then_search_prints_ranked_blocks() {
    let dir = corpus();
    let output = pagevec(dir.path(), &["index", "docs"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pages: 3  written: 3"), "{stdout}");
    assert!(dir.path().join("docs/doc1_page_1.vec").exists());

    let output = pagevec(dir.path(), &["search", "docs", "alpha protocol", "--top-k", "2"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Knowledgebase Top 1 file: "), "{stdout}");
    assert!(stdout.contains("Knowledgebase Top 2 file: "));
    assert!(!stdout.contains("Knowledgebase Top 3"));
    assert!(!stdout.contains("beta procedure"));
}

#[test]
fn search_json_reports_scores_and_paths() {
    let dir = corpus();
    assert_success(&pagevec(dir.path(), &["index", "docs"]));

    let output = pagevec(dir.path(), &["search", "docs", "beta procedure", "--json"]);
    assert_success(&output);
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["scanned"], 3);
    let results = value["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0]["path"]
        .as_str()
        .unwrap()
        .ends_with("doc1_page_2.txt"));
    assert_eq!(results[0]["content"], "beta procedure");
    assert!(value["skipped"].as_array().unwrap().is_empty());
}

#[test]
fn prompt_contains_context_and_question() {
    let dir = corpus();
    assert_success(&pagevec(dir.path(), &["index", "docs"]));

    let output = pagevec(dir.path(), &["prompt", "docs", "what is alpha?", "--top-k", "1"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Content: alpha protocol"), "{stdout}");
    assert!(stdout.contains("### Question: what is alpha?"));
}

#[test]
fn ask_with_local_provider_answers_offline() {
    let dir = corpus();
    assert_success(&pagevec(dir.path(), &["index", "docs"]));

    let output = pagevec(
        dir.path(),
        &["ask", "docs", "beta procedure", "--top-k", "1", "--provider", "local"],
    );
    assert_success(&output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Based on the top excerpt: beta procedure\n"
    );
}

#[test]
fn audit_flags_edited_pages() {
    let dir = corpus();
    assert_success(&pagevec(dir.path(), &["index", "docs"]));
    let output = pagevec(dir.path(), &["audit", "docs"]);
    assert_success(&output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "all cache entries match their pages\n"
    );

    fs::write(dir.path().join("docs/doc1_page_2.txt"), "gamma revision").unwrap();
    let output = pagevec(dir.path(), &["audit", "docs", "--json"]);
    assert_success(&output);
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["reason"], "content-changed");
    assert!(entries[0]["cache_path"]
        .as_str()
        .unwrap()
        .ends_with("doc1_page_2.vec"));
}

#[test]
fn index_fails_on_missing_root_and_bad_pages() {
    let dir = tempdir().unwrap();
    let output = pagevec(dir.path(), &["index", "nowhere"]);
    assert!(!output.status.success());

    fs::write(dir.path().join("ok_page_1.txt"), "readable text").unwrap();
    fs::write(dir.path().join("bad_page_1.txt"), [0xff, 0xfe, 0x00]).unwrap();
    let output = pagevec(dir.path(), &["index", "."]);
    assert!(!output.status.success());
    assert!(dir.path().join("ok_page_1.vec").exists());
    assert!(!dir.path().join("bad_page_1.vec").exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad_page_1.txt"));
}
