use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn mdpress_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("mdpress"))
}

#[test]
fn test_scan_reports_fallback_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("clean.md"), "# Clean").unwrap();
    fs::write(
        temp_dir.path().join("flagged.md"),
        ":::note\ncareful\n:::\n",
    )
    .unwrap();

    mdpress_cmd()
        .arg("scan")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 2 file(s)"))
        .stdout(predicate::str::contains("flagged.md"))
        .stdout(predicate::str::contains(":::note"));
}

#[test]
fn test_scan_json_output() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("flagged.md"),
        "<!-- a comment -->\n",
    )
    .unwrap();

    let output = mdpress_cmd()
        .arg("scan")
        .arg(temp_dir.path())
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report.as_array().unwrap().len(), 1);
    assert!(report[0]["path"].as_str().unwrap().ends_with("flagged.md"));
    assert!(report[0]["reason"]
        .as_str()
        .unwrap()
        .contains("HTML comment"));
}

#[test]
fn test_scan_clean_tree() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.md"), "# A").unwrap();

    mdpress_cmd()
        .arg("scan")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 of 1 file(s)"));
}

#[test]
fn test_scan_respects_project_config() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("page.md"),
        "import Chart from \"@lib/chart\"\n\n# Page\n",
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("mdpress.yaml"),
        "pipelineOptions:\n  allowedImports:\n    - \"@components/callout\"\n",
    )
    .unwrap();

    mdpress_cmd()
        .arg("scan")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("@lib/chart"));
}

#[test]
fn test_hash_prints_digest() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("a.md");
    fs::write(&file, "# A").unwrap();

    let output = mdpress_cmd()
        .arg("hash")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let digest = String::from_utf8(output).unwrap();
    let digest = digest.trim();
    assert_eq!(digest.len(), 16);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_hash_missing_file_fails() {
    mdpress_cmd()
        .arg("hash")
        .arg("/definitely/not/here.md")
        .assert()
        .failure();
}

#[test]
fn test_cache_stats_and_clear() {
    let temp_dir = TempDir::new().unwrap();

    mdpress_cmd()
        .arg("cache")
        .arg("stats")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("entries: 0"));

    mdpress_cmd()
        .arg("cache")
        .arg("clear")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("cache cleared"));
}

#[test]
fn test_cache_clean_reports_removals() {
    let temp_dir = TempDir::new().unwrap();

    mdpress_cmd()
        .arg("cache")
        .arg("clean")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("removed 0 stale"));
}
