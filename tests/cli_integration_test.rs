use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// OLE1 header: magic, description "test" (4 bytes), 8 reserved bytes.
const OBJ_HEADER: &str = "010500000200000004000000746573740000000000000000";

fn write_sample(dir: &TempDir, payload_hex: &str) -> std::path::PathBuf {
    let len = (payload_hex.len() / 2) as u32;
    let size = hex::encode(len.to_le_bytes());
    let doc = format!("{{\\rtf1{{\\object\\objdata {OBJ_HEADER}{size}{payload_hex}}}}}");
    let path = dir.path().join("sample.rtf");
    fs::write(&path, doc).unwrap();
    path
}

#[test]
fn test_help_command() {
    Command::cargo_bin("rtfcarve")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Extract and scan embedded OLE objects",
        ));
}

#[test]
fn test_version_command() {
    Command::cargo_bin("rtfcarve")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rtfcarve"));
}

#[test]
fn test_nonexistent_file_fails() {
    Command::cargo_bin("rtfcarve")
        .unwrap()
        .arg("/nonexistent/sample.rtf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to process"));
}

#[test]
fn test_extracts_embedded_object() {
    let dir = TempDir::new().unwrap();
    let path = write_sample(&dir, "d0cf");

    Command::cargo_bin("rtfcarve")
        .unwrap()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 embedded object(s)"))
        .stdout(predicate::str::contains("Ole2"));
}

#[test]
fn test_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write_sample(&dir, "4142");

    let output = Command::cargo_bin("rtfcarve")
        .unwrap()
        .args(["--json"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["report"]["objects"][0]["flavour"], "Ole10Native");
    assert_eq!(summary["report"]["verdict"], "Clean");
    assert!(summary["sha256"][0].is_string());
}

#[test]
fn test_keep_tmp_reports_kept_paths() {
    let dir = TempDir::new().unwrap();
    let path = write_sample(&dir, "d0cf");
    let tmp_root = TempDir::new().unwrap();

    Command::cargo_bin("rtfcarve")
        .unwrap()
        .args(["--keep-tmp", "--tmp-dir"])
        .arg(tmp_root.path())
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("kept at"));

    // something was actually kept under the requested root
    assert!(fs::read_dir(tmp_root.path()).unwrap().count() > 0);
}

#[test]
fn test_clean_file_with_no_objects() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.rtf");
    fs::write(&path, "{\\rtf1 just text}").unwrap();

    Command::cargo_bin("rtfcarve")
        .unwrap()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 embedded object(s)"));
}
