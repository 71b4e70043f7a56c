//! Integration tests for the rag-query binary.
//! Uses assert_cmd to run the binary, a real temp config, and an in-process
//! HTTP server on its own thread. No mocks.

mod support;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;
use support::{spawn_server_thread, unused_url, Reply};

/// Write a minimal YAML config to a temp file pointing at `url`.
fn write_config(dir: &tempfile::TempDir, url: &str, streaming: bool) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "api:\n  url: {}\nquery:\n  limit: 3\n  streaming: {}",
        url, streaming
    )
    .unwrap();
    path
}

/// Answers the streaming endpoint with a streamed reply and the atomic one
/// with a JSON body.
fn spawn_test_server() -> String {
    spawn_server_thread(|req| {
        if req.path == "/openai/stream" {
            Reply::sse(&[
                r#"{"type":"source_documents","documents":[{"page_content":"Art. 1","metadata":{"source":"lei.pdf","page":4}}]}"#,
                r#"{"type":"text_delta","delta":"Streamed "}"#,
                r#"{"type":"text_delta","delta":"answer."}"#,
                r#"{"type":"stream_completed"}"#,
            ])
        } else {
            Reply::json(
                "200 OK",
                r#"{"answer":"Atomic answer.","source_documents":[{"page_content":"Art. 9"}]}"#,
            )
        }
    })
}

fn command(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::from(cargo_bin_cmd!("rag-query"));
    // Keep a developer's ~/.rag-query/config.yaml out of the picture.
    cmd.env("HOME", home.path())
        .env("USERPROFILE", home.path())
        .env_remove("RAG_QUERY_CONFIG");
    cmd
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn prints_streamed_answer_and_sources() {
    let url = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &url, true);

    let mut cmd = command(&dir);
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Streamed answer."))
        .stdout(predicate::str::contains("Sources:"))
        .stdout(predicate::str::contains("[1] Art. 1"))
        .stdout(predicate::str::contains("source: lei.pdf"))
        .stdout(predicate::str::contains("page: 4"));
}

#[test]
fn config_env_var_and_atomic_mode() {
    let url = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &url, false);

    let mut cmd = command(&dir);
    cmd.env("RAG_QUERY_CONFIG", &config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Atomic answer."))
        .stdout(predicate::str::contains("[1] Art. 9"));
}

#[test]
fn positional_question_and_flag_overrides() {
    let url = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = command(&dir);
    cmd.arg("--api-url")
        .arg(&url)
        .arg("--no-stream")
        .arg("What is the answer?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Atomic answer."));
}

#[test]
fn http_error_detail_and_hint_on_stderr() {
    let url = spawn_server_thread(|_| {
        Reply::json("500 Internal Server Error", r#"{"detail":"db down"}"#)
    });
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = command(&dir);
    cmd.arg("--api-url").arg(&url).arg("--no-stream").arg("Q");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error: db down"))
        .stderr(predicate::str::contains("Hint:"));
}

#[test]
fn failed_stream_marks_partial_output_discarded() {
    let url = spawn_server_thread(|_| {
        Reply::sse(&[
            r#"{"type":"text_delta","delta":"half an ans"}"#,
            r#"{"type":"error","message":"boom"}"#,
        ])
        .with_delay(std::time::Duration::from_millis(300))
    });
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = command(&dir);
    cmd.arg("--api-url").arg(&url).arg("Q");

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("Sources:").not())
        .stderr(predicate::str::contains("partial answer above discarded"))
        .stderr(predicate::str::contains("Error: boom"));
}

#[test]
fn server_down_shows_error() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = command(&dir);
    cmd.arg("--api-url").arg(unused_url()).write_stdin("hello\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::is_match("(?i)(network|connect|error)").unwrap());
}

#[test]
fn empty_question_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = command(&dir);
    cmd.arg("--api-url").arg(unused_url()).write_stdin("   \n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no question"));
}

#[test]
fn out_of_range_flag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = command(&dir);
    cmd.arg("--limit").arg("50").arg("Q");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("limit"));
}
