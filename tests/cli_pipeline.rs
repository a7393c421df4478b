// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

const PIPELINE_CONFIG: &str = r#"
[embeddings]
provider = "hashing"
dimension = 1024
max_tokens = 16

[pipeline]
transcribe_command = '''cat >/dev/null; printf '{"text":"Temperature 36.8. Patient slept well."}' '''
report_command = '''cat >/dev/null; printf '{"summary":"Stable visit.","objects":["Temperature 36.8"],"plans":["Continue observation"]}' '''
"#;

fn workspace(config: &str) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join(".homecarerc.toml"), config).expect("write config");
    dir
}

fn homecare(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("homecare"));
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("json output")
}

#[test]
fn transcribe_runs_configured_command() {
    let dir = workspace(PIPELINE_CONFIG);
    fs::write(dir.path().join("visit.m4a"), b"audio").expect("write audio");

    homecare(&dir)
        .args(["transcribe", "visit.m4a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Patient slept well."));
}

#[test]
fn transcribe_missing_file_fails() {
    let dir = workspace(PIPELINE_CONFIG);
    homecare(&dir)
        .args(["transcribe", "missing.m4a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("audio file not found"));
}

#[test]
fn report_renders_structured_summary() {
    let dir = workspace(PIPELINE_CONFIG);
    fs::write(dir.path().join("transcript.txt"), "Temperature 36.8.").expect("write");

    homecare(&dir)
        .args(["report", "transcript.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## summary\nStable visit."))
        .stdout(predicate::str::contains("## O\n- Temperature 36.8"))
        .stdout(predicate::str::contains("## A\n- None"));
}

#[test]
fn process_chains_transcription_and_report() {
    let dir = workspace(PIPELINE_CONFIG);
    fs::write(dir.path().join("visit.wav"), b"audio").expect("write audio");

    let result = json_stdout(homecare(&dir).args(["--format", "json", "process", "visit.wav"]));
    assert_eq!(
        result["transcript"],
        "Temperature 36.8. Patient slept well."
    );
    assert!(result["report"]
        .as_str()
        .expect("report")
        .contains("## P\n- Continue observation"));
}

#[test]
fn failing_report_command_surfaces_stderr() {
    let dir = workspace(
        r#"
[pipeline]
report_command = "cat >/dev/null; echo 'model offline' >&2; exit 2"
"#,
    );
    fs::write(dir.path().join("transcript.txt"), "x").expect("write");

    homecare(&dir)
        .args(["report", "transcript.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("model offline"));
}

#[test]
fn similarity_reports_scores_and_truncation() {
    let dir = workspace(PIPELINE_CONFIG);
    let note = "## S\n- Slept well\n\n## O\n- Temperature 36.8\n";
    let long_note = "observation ".repeat(40);
    fs::write(dir.path().join("a.md"), note).expect("write");
    fs::write(dir.path().join("b.md"), note).expect("write");
    fs::write(dir.path().join("long.md"), &long_note).expect("write");

    let same = json_stdout(homecare(&dir).args(["--format", "json", "similarity", "a.md", "b.md"]));
    assert!((same["similarity"].as_f64().expect("similarity") - 1.0).abs() < 1e-4);
    assert!((same["bleu"].as_f64().expect("bleu") - 100.0).abs() < 1e-6);
    assert_eq!(same["truncation_a"]["truncated"], false);

    let long = json_stdout(homecare(&dir).args([
        "--format", "json", "similarity", "a.md", "long.md",
    ]));
    assert_eq!(long["truncation_b"]["truncated"], true);
    assert_eq!(long["truncation_b"]["used_token_count"], 16);
    assert_eq!(long["bleu"].as_f64().expect("bleu"), 0.0);
}
