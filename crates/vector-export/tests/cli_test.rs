//! Command-line tests for the `vector-export` binary.

#![allow(clippy::pedantic)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vector_export() -> Command {
    let mut cmd = Command::cargo_bin("vector-export").unwrap();
    cmd.env_remove("PINECONE_API_KEY")
        .env_remove("WEAVIATE_API_KEY")
        .env_remove("QDRANT_API_KEY");
    cmd
}

#[test]
fn test_help_lists_backends() {
    vector_export()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pinecone"))
        .stdout(predicate::str::contains("weaviate"))
        .stdout(predicate::str::contains("qdrant"));
}

#[test]
fn test_missing_values_without_terminal_fail() {
    let dir = TempDir::new().unwrap();
    vector_export()
        .current_dir(dir.path())
        .args(["qdrant", "-u", "http://localhost:6333"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_zero_batch_size_rejected() {
    let dir = TempDir::new().unwrap();
    vector_export()
        .current_dir(dir.path())
        .args(["qdrant", "-u", "http://localhost:6333", "-c", "docs", "--batch-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_qdrant_export_with_env_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .and(header("api-key", "from-env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "points_count": 2,
                "config": {"params": {"vectors": {"size": 2, "distance": "Dot"}}}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/scroll"))
        .and(header("api-key", "from-env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "points": [
                    {"id": 1, "payload": {"n": 1}, "vector": [1.0, 0.0]},
                    {"id": 2, "payload": {"n": 2}, "vector": [0.0, 1.0]}
                ],
                "next_page_offset": null
            }
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let uri = server.uri();
    let out_arg = out.display().to_string();

    let assert = tokio::task::spawn_blocking(move || {
        vector_export()
            .env("QDRANT_API_KEY", "from-env")
            .args(["-m", "clip", "qdrant", "-u", &uri, "-c", "docs", "-o", &out_arg, "-q"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Export completed."));
    assert!(out.join("docs.parquet").exists());
    assert!(out.join("export.db").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_failure_reported_on_stderr() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let out_arg = dir.path().join("out").display().to_string();
    let uri = server.uri();

    let assert = tokio::task::spawn_blocking(move || {
        vector_export()
            .env("QDRANT_API_KEY", "k")
            .args(["qdrant", "-u", &uri, "-c", "missing", "-o", &out_arg, "-q"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("Collection 'missing' not found"))
        .stdout(predicate::str::contains("Export completed.").not());
}
