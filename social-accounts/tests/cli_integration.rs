//! Command-line behavior of social-accounts

use assert_cmd::Command;
use axum::{
    extract::{Path, Query},
    routing::{delete, get},
    Json, Router,
};
use libsocialcast::credentials::TokenCipher;
use libsocialcast::{Database, NewAccount, Platform};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::process::Stdio;
use tempfile::TempDir;

struct TestEnv {
    _temp_dir: TempDir,
    config_path: String,
    db_path: String,
    key: String,
}

fn setup_test_env(oauth_section: &str) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("socialcast.db");
    let key = TokenCipher::generate_key();

    let config_content = format!(
        r#"
[database]
path = "{}"

[security]
encryption_key = "{}"

{}
"#,
        db_path.display().to_string().replace('\\', "/"),
        key,
        oauth_section
    );
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        config_path: config_path.to_str().unwrap().to_string(),
        db_path: db_path.to_str().unwrap().to_string(),
        key,
        _temp_dir: temp_dir,
    }
}

fn social_accounts(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("social-accounts").unwrap();
    cmd.env("SOCIALCAST_CONFIG", &env.config_path)
        .env_remove("SOCIALCAST_SERVER")
        .env_remove("SOCIALCAST_APP_ID")
        .env_remove("SOCIALCAST_APP_SECRET")
        .env_remove("SOCIALCAST_ENCRYPTION_KEY")
        .env_remove("SOCIALCAST_DB_PATH");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("social-accounts")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("disconnect"))
        .stdout(predicate::str::contains("keygen"));
}

#[test]
fn test_keygen_prints_usable_key() {
    let output = Command::cargo_bin("social-accounts")
        .unwrap()
        .arg("keygen")
        .output()
        .unwrap();
    assert!(output.status.success());

    let key = String::from_utf8(output.stdout).unwrap();
    assert!(key.trim().starts_with("AGE-SECRET-KEY-1"));
    assert!(TokenCipher::from_key(key.trim()).is_ok());
    assert!(String::from_utf8_lossy(&output.stderr).contains("# recipient: age1"));
}

#[test]
fn test_keygen_json() {
    let output = Command::cargo_bin("social-accounts")
        .unwrap()
        .args(["keygen", "--format", "json"])
        .output()
        .unwrap();
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    let recipient = TokenCipher::from_key(value["encryption_key"].as_str().unwrap())
        .unwrap()
        .recipient();
    assert_eq!(value["recipient"], recipient.as_str());
}

#[test]
fn test_show_with_no_accounts() {
    let env = setup_test_env("");

    social_accounts(&env)
        .args(["show", "--server", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No accounts connected for server 42"));
}

#[test]
fn test_disconnect_unknown_account_is_not_an_error() {
    let env = setup_test_env("");

    social_accounts(&env)
        .args(["disconnect", "--server", "42", "--platform", "facebook"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No facebook account connected for server 42"));
}

#[test]
fn test_list_posts_json_empty() {
    let env = setup_test_env("");

    social_accounts(&env)
        .args(["list-posts", "--server", "42", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_connect_requires_app_credentials() {
    let env = setup_test_env("");

    social_accounts(&env)
        .args(["connect", "--server", "42", "--platform", "instagram"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("oauth.app_id"));
}

async fn provider(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    if params.contains_key("fields") {
        return Json(json!({ "data": [{
            "id": "1001",
            "name": "Coffee Shop",
            "access_token": "page-token",
            "tasks": ["CREATE_CONTENT"],
            "instagram_business_account": { "id": "1784", "username": "coffee.shop" }
        }] }));
    }
    Json(json!({ "access_token": "user-token" }))
}

#[test]
fn test_connect_completes_through_browser_redirect() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let provider_addr = rt.block_on(async {
        let app = Router::new()
            .route("/oauth/access_token", get(provider))
            .route("/me/accounts", get(provider));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    });

    let callback_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let env = setup_test_env(&format!(
        r#"
[oauth]
app_id = "1234"
app_secret = "shh"
redirect_uri = "http://127.0.0.1:{port}/callback"
bind_address = "127.0.0.1"
port = {port}
timeout_secs = 30
token_url = "http://{provider}/oauth/access_token"
graph_url = "http://{provider}"
"#,
        port = callback_port,
        provider = provider_addr
    ));

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("social-accounts"))
        .args(["connect", "--server", "42", "--platform", "instagram"])
        .env("SOCIALCAST_CONFIG", &env.config_path)
        .env_remove("SOCIALCAST_APP_ID")
        .env_remove("SOCIALCAST_APP_SECRET")
        .env_remove("SOCIALCAST_ENCRYPTION_KEY")
        .env_remove("SOCIALCAST_DB_PATH")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut url = String::new();
    stdout.read_line(&mut url).unwrap();
    assert!(url.contains("client_id=1234"), "{}", url);
    assert!(url.contains("state=42"), "{}", url);

    let status = rt.block_on(async {
        reqwest::get(format!(
            "http://127.0.0.1:{}/callback?code=abc&state=42",
            callback_port
        ))
        .await
        .unwrap()
        .status()
    });
    assert_eq!(status, reqwest::StatusCode::OK);

    let mut rest = String::new();
    stdout.read_to_string(&mut rest).unwrap();
    assert!(child.wait().unwrap().success());
    assert!(
        rest.contains("Connected instagram account coffee.shop (1784)"),
        "{}",
        rest
    );

    social_accounts(&env)
        .args(["show", "--server", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("instagram\tcoffee.shop\t1784"));

    social_accounts(&env)
        .args(["connect", "--server", "42", "--platform", "instagram"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already has"));
}

async fn connect_account(env: &TestEnv, platform: Platform, account_id: &str) {
    let db = Database::open(&env.db_path, &env.key).await.unwrap();
    db.save_account(
        "42",
        &NewAccount {
            platform,
            platform_account_id: account_id.to_string(),
            access_token: "page-token".to_string(),
            display_name: "coffee.shop".to_string(),
        },
    )
    .await
    .unwrap();
}

async fn start_graph() -> std::net::SocketAddr {
    let app = Router::new()
        .route(
            "/{id}",
            delete(|| async { Json(json!({ "success": true })) }),
        )
        .route(
            "/{id}/insights",
            get(|| async {
                Json(json!({ "data": [
                    { "name": "impressions", "values": [{ "value": 340 }] },
                    { "name": "reach", "values": [{ "value": 210 }] }
                ] }))
            }),
        )
        .route(
            "/{id}/media",
            get(|Path(id): Path<String>| async move {
                Json(json!({ "data": [{
                    "id": format!("{}-post-1", id),
                    "caption": "Cold brew",
                    "permalink": "https://instagram.com/p/c1",
                    "timestamp": "2025-06-03T09:00:00+0000"
                }] }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stats_recent_and_delete_against_graph() {
    let addr = start_graph().await;
    let env = setup_test_env(&format!("[oauth]\ngraph_url = \"http://{}\"", addr));
    connect_account(&env, Platform::Instagram, "1784").await;

    social_accounts(&env)
        .args(["stats", "--server", "42", "--post", "ig-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("instagram post ig-1"))
        .stdout(predicate::str::contains("reach\t210"))
        .stdout(predicate::str::contains("impressions\t340"));

    let output = social_accounts(&env)
        .args(["stats", "--server", "42", "--post", "ig-1", "--saved", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let saved: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(saved["metrics"]["reach"], 210);
    assert_eq!(saved["server_id"], "42");

    social_accounts(&env)
        .args(["recent", "--server", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1784-post-1\t2025-06-03\tCold brew\thttps://instagram.com/p/c1",
        ));

    social_accounts(&env)
        .args(["delete", "--server", "42", "--post", "ig-1"])
        .assert()
        .success()
        .stdout(predicate::str::diff("Deleted instagram post ig-1\n"));
}

#[test]
fn test_saved_stats_without_snapshot() {
    let env = setup_test_env("");

    social_accounts(&env)
        .args(["stats", "--server", "42", "--post", "ig-1", "--saved"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved insights for post ig-1"));
}

#[tokio::test]
async fn test_post_management_unsupported_for_facebook() {
    let env = setup_test_env("");
    connect_account(&env, Platform::Facebook, "1001").await;

    social_accounts(&env)
        .args(["delete", "--server", "42", "--platform", "facebook", "--post", "1001_1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not supported for facebook"));
}
