//! HTTP API tests against a real listener.

use std::fs;
use std::sync::Arc;

use folder_search::app::AppContext;
use folder_search::config::Config;
use folder_search::server;
use serde_json::{json, Value};
use tempfile::TempDir;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server over a fresh local root seeded with a small tree.
async fn start_server(tmp: &TempDir) -> String {
    let port = find_free_port();
    let mut cfg = Config::minimal(tmp.path());
    cfg.server.bind = format!("127.0.0.1:{}", port);

    let root = cfg.local.root.clone();
    fs::create_dir_all(root.join("proj/sub")).unwrap();
    fs::write(root.join("proj/notes.md"), "rust ownership and borrowing").unwrap();
    fs::write(root.join("proj/sub/todo.txt"), "buy milk").unwrap();
    fs::write(root.join("proj/image.png"), [0u8, 1, 2, 3]).unwrap();

    let ctx = Arc::new(AppContext::open(cfg).await.unwrap());
    tokio::spawn(server::run_server(ctx, std::future::pending::<()>()));
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn wait_for_status(client: &reqwest::Client, base: &str, folder: &str, want: &str) {
    for _ in 0..50 {
        let body: Value = client
            .post(format!("{}/api/index/status", base))
            .json(&json!({ "folder_paths": [folder] }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["statuses"][folder] == want {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("folder {} never reached status {}", folder, want);
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_index_status_search_delete_flow() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/index", base))
        .json(&json!({ "folder_path": "proj" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Indexing started for folder: proj");

    wait_for_status(&client, &base, "proj", "indexed").await;

    let body: Value = client
        .post(format!("{}/api/index/status", base))
        .json(&json!({ "folder_paths": ["proj", "elsewhere"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["statuses"]["proj"], "indexed");
    assert_eq!(body["statuses"]["elsewhere"], "not_indexed");

    let body: Value = client
        .post(format!("{}/api/search", base))
        .json(&json!({ "query": "rust ownership", "n_results": 3 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["file_path"], "proj/notes.md");
    assert!(results[0]["relevance_score"].as_f64().unwrap() > 0.0);

    let body: Value = client
        .delete(format!("{}/api/index", base))
        .json(&json!({ "folder_path": "proj" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted_count"], 2);
    wait_for_status(&client, &base, "proj", "not_indexed").await;
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/search", base))
        .json(&json!({ "query": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_unknown_session_is_unauthorized() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/files?path=proj", base))
        .header("X-Session-Id", "no-such-session")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_file_listing_and_errors() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/api/files?path=proj", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["image.png", "notes.md", "sub"]);

    let resp = client
        .get(format!("{}/api/files?path=../outside", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(format!("{}/api/files?path=missing", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_upload_download_delete_file() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/api/files?path=inbox/new.txt", base))
        .body("fresh content")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        fs::read_to_string(tmp.path().join("files/inbox/new.txt")).unwrap(),
        "fresh content"
    );

    let resp = client
        .get(format!("{}/api/files/download?path=inbox/new.txt", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("new.txt"));
    assert_eq!(resp.text().await.unwrap(), "fresh content");

    let resp = client
        .delete(format!("{}/api/files?path=inbox/new.txt", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{}/api/files?path=inbox/new.txt", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_logout_without_header_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/logout", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
