//! End-to-end CLI tests for the harvester binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use harvester_core::auth::{TokenRecord, TokenStore, unix_now};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::upstream::{COOKIE, CSRF, ScriptedUpstream, endpoint};

const COMPANY_URL: &str = "https://www.glassdoor.com/Reviews/Acme-Reviews-E12345.htm";

/// Binary with credential environment cleared and the store pinned to `store`.
fn harvester(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.env_remove("HARVESTER_CSRF_TOKEN")
        .env_remove("HARVESTER_COOKIE")
        .env_remove("HARVESTER_COOKIE_FILE")
        .env_remove("HARVESTER_ENDPOINT")
        .env_remove("RUST_LOG")
        .env("HARVESTER_TOKEN_STORE", store);
    cmd
}

fn seed_store(store: &Path) {
    TokenStore::at(store)
        .save(&TokenRecord::new(CSRF, COOKIE, unix_now()))
        .unwrap();
}

// ==================== id ====================

#[test]
fn test_id_prints_resource_id() {
    let dir = TempDir::new().unwrap();
    harvester(&dir.path().join("token.json"))
        .args(["id", "--url", COMPANY_URL])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"resource_id\": 12345"));
}

#[test]
fn test_id_without_identifier_exits_2() {
    let dir = TempDir::new().unwrap();
    harvester(&dir.path().join("token.json"))
        .args(["id", "--url", "https://www.glassdoor.com/Reviews/index.htm"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_missing_subcommand_shows_usage() {
    let dir = TempDir::new().unwrap();
    harvester(&dir.path().join("token.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// ==================== auth ====================

#[test]
fn test_auth_without_capture_inputs_exits_2() {
    let dir = TempDir::new().unwrap();
    harvester(&dir.path().join("token.json"))
        .args(["-q", "auth"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("CSRF"));
}

#[test]
fn test_auth_mints_and_never_prints_credentials() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("token.json");

    harvester(&store)
        .args(["auth", "--csrf-token", "very-secret-csrf", "--cookie", "sid=very-secret-cookie"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"refreshed\": true"))
        .stdout(predicate::str::contains("very-secret").not())
        .stderr(predicate::str::contains("very-secret").not());

    let saved = TokenStore::at(&store).load().unwrap().unwrap();
    assert_eq!(saved.csrf_token(), "very-secret-csrf");

    // Second call reuses the stored record without capture inputs.
    harvester(&store)
        .args(["auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"refreshed\": false"));
}

// ==================== scrape ====================

#[test]
fn test_scrape_rejects_invalid_workers() {
    let dir = TempDir::new().unwrap();
    harvester(&dir.path().join("token.json"))
        .args(["scrape", "--url", COMPANY_URL, "--workers", "0"])
        .assert()
        .code(2);
}

#[tokio::test]
async fn test_scrape_writes_pages_and_prints_summary() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let upstream = ScriptedUpstream::new(6);
    upstream.mount(&server).await;

    let dir = TempDir::new().unwrap();
    let store = dir.path().join("token.json");
    seed_store(&store);
    let out = dir.path().join("out");

    let assert = harvester(&store)
        .args(["-q", "scrape", "--url", COMPANY_URL, "--workers", "3"])
        .args(["--endpoint", &endpoint(&server)])
        .arg("--output-dir")
        .arg(&out)
        .args(["--jitter-min-ms", "0", "--jitter-max-ms", "0"])
        .args(["--batch-delay-min-ms", "0", "--batch-delay-max-ms", "0"])
        .assert()
        .success();

    let summary: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["resource_id"], 12345);
    assert_eq!(summary["total_pages"], 6);
    assert_eq!(summary["succeeded"].as_array().unwrap().len(), 6);
    assert_eq!(summary["failed"].as_array().unwrap().len(), 0);
    assert_eq!(summary["status"], "Saved 6 of 6 pages using 3 workers.");
    for page in 1..=6 {
        assert!(out.join("12345").join(format!("pg{page}.json")).is_file());
    }
    assert!(upstream.probes() >= 1);
}

#[tokio::test]
async fn test_scrape_partial_failure_still_exits_0() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    ScriptedUpstream::new(4)
        .fail_page(2, 404, u32::MAX)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = dir.path().join("token.json");
    seed_store(&store);

    let assert = harvester(&store)
        .args(["-q", "scrape", "--url", COMPANY_URL, "--workers", "2"])
        .args(["--endpoint", &endpoint(&server)])
        .arg("--output-dir")
        .arg(dir.path())
        .args(["--jitter-min-ms", "0", "--jitter-max-ms", "0"])
        .assert()
        .success();

    let summary: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["failed"][0]["page"], 2);
    assert_eq!(summary["failed"][0]["kind"], "http_status");
    assert_eq!(summary["failed"][0]["attempts"], 1);
    assert!(
        summary["status"]
            .as_str()
            .unwrap()
            .ends_with("Failed to process 1 pages.")
    );
}

// ==================== pages ====================

#[tokio::test]
async fn test_pages_reports_total() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    ScriptedUpstream::new(41).mount(&server).await;

    let dir = TempDir::new().unwrap();
    let store = dir.path().join("token.json");
    seed_store(&store);

    harvester(&store)
        .args(["pages", "--url", COMPANY_URL, "--endpoint", &endpoint(&server)])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_pages\": 41"));
}

#[tokio::test]
async fn test_pages_upstream_failure_exits_1() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    ScriptedUpstream::new(41)
        .fail_page(1, 403, u32::MAX)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = dir.path().join("token.json");
    seed_store(&store);

    harvester(&store)
        .args(["-q", "pages", "--url", COMPANY_URL, "--endpoint", &endpoint(&server)])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}
