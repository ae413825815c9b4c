//! CLI end-to-end tests
//!
//! Tests for the cinesync command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for the cinesync binary
#[allow(deprecated)]
fn cinesync_cmd() -> Command {
    let mut cmd = Command::cargo_bin("cinesync").unwrap();
    cmd.env_remove("TMDB_API_KEY").env_remove("RUST_LOG");
    cmd
}

fn db_cmd(db: &Path) -> Command {
    let mut cmd = cinesync_cmd();
    cmd.arg("--database").arg(db);
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = cinesync_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = cinesync_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cinesync"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = cinesync_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_sync_help() {
    let mut cmd = cinesync_cmd();
    cmd.args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pull movies from TMDb"));
}

#[test]
fn test_cli_validate_config_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[tmdb]
api_key = "abc123"
language = "de-DE"

[sync]
target_count = 300
"#,
    )
    .unwrap();

    let mut cmd = cinesync_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("de-DE"))
        .stdout(predicate::str::contains("Target: 300 movies"));
}

#[test]
fn test_cli_validate_rejects_zero_concurrency() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "[sync]\nmax_concurrent_details = 0\n").unwrap();

    let mut cmd = cinesync_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrent_details"));
}

#[test]
fn test_cli_sync_without_api_key_fails() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "[tmdb]\napi_key = \"\"\n").unwrap();

    let mut cmd = db_cmd(&dir.path().join("catalog.db"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TMDB_API_KEY"));
}

#[test]
fn test_cli_list_empty_catalog() {
    let dir = tempdir().unwrap();
    let mut cmd = db_cmd(&dir.path().join("catalog.db"));
    cmd.arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No movies found"));
}

#[test]
fn test_cli_list_rejects_unknown_sort() {
    let dir = tempdir().unwrap();
    let mut cmd = db_cmd(&dir.path().join("catalog.db"));
    cmd.args(["list", "--sort", "popularity"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid sort field"));
}

#[test]
fn test_cli_register_twice_fails() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("catalog.db");

    db_cmd(&db)
        .args(["register", "alice", "--password", "secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered user alice"));

    db_cmd(&db)
        .args(["register", "alice", "--password", "other"])
        .assert()
        .failure();
}

#[test]
fn test_cli_favorite_requires_valid_password() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("catalog.db");

    db_cmd(&db)
        .args(["register", "bob", "--password", "secret"])
        .assert()
        .success();

    db_cmd(&db)
        .args(["favorite", "--user", "bob", "--password", "wrong", "550"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid username or password"));
}

async fn mock_tmdb() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/genre/movie/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "genres": [{"id": 18, "name": "Drama"}, {"id": 35, "name": "Comedy"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/movie/popular"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1,
            "total_pages": 1,
            "total_results": 2,
            "results": [
                {
                    "id": 550,
                    "title": "Fight Club",
                    "release_date": "1999-10-15",
                    "vote_average": 8.4,
                    "poster_path": "/fc.jpg",
                    "genre_ids": [18]
                },
                {
                    "id": 13,
                    "title": "Forrest Gump",
                    "release_date": "1994-06-23",
                    "vote_average": 8.5,
                    "genre_ids": [35, 18]
                }
            ]
        })))
        .mount(&server)
        .await;

    for (id, runtime) in [(550, 139), (13, 142)] {
        Mock::given(method("GET"))
            .and(path(format!("/movie/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "runtime": runtime,
                "vote_average": 8.4
            })))
            .mount(&server)
            .await;
    }

    server
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_sync_then_list_and_favorite() {
    let server = mock_tmdb().await;
    let dir = tempdir().unwrap();
    let db = dir.path().join("catalog.db");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[tmdb]
api_key = "test-key"
base_url = "{}"

[sync]
browse_pages = 1
"#,
            server.uri()
        ),
    )
    .unwrap();

    let config = config_path.clone();
    let db_path = db.clone();
    tokio::task::spawn_blocking(move || {
        db_cmd(&db_path)
            .arg("--config")
            .arg(&config)
            .arg("sync")
            .assert()
            .success()
            .stdout(predicate::str::contains("2 movies in catalog"));

        let output = db_cmd(&db_path)
            .arg("--config")
            .arg(&config)
            .args(["list", "--sort", "title", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let movies: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(movies[0]["title"], "Fight Club");
        assert_eq!(movies[0]["runtime_minutes"], 139);
        assert_eq!(
            movies[0]["poster_reference"],
            "https://image.tmdb.org/t/p/w500/fc.jpg"
        );
        assert_eq!(movies[1]["title"], "Forrest Gump");
        assert_eq!(movies[1]["genres"], json!(["Comedy", "Drama"]));

        db_cmd(&db_path)
            .arg("--config")
            .arg(&config)
            .args(["list", "--genre", "Comedy"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Forrest Gump"))
            .stdout(predicate::str::contains("Fight Club").not());

        db_cmd(&db_path)
            .args(["register", "carol", "--password", "pw"])
            .assert()
            .success();
        db_cmd(&db_path)
            .args(["favorite", "--user", "carol", "--password", "pw", "13"])
            .assert()
            .success()
            .stdout(predicate::str::contains("added to favorites"));
        db_cmd(&db_path)
            .args(["favorites", "--user", "carol", "--password", "pw"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Forrest Gump"));
    })
    .await
    .unwrap();
}
