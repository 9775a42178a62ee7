//! Synology provider against an in-process File Station stand-in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Form, State},
    http::header,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use folder_search::app::AppContext;
use folder_search::config::{Config, SynologyConfig};
use folder_search::provider::{Provider, SynologyLogin, SynologyProvider};
use folder_search_core::models::IndexStatus;
use futures::TryStreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;

const SID: &str = "sid-1";
const TOKEN: &str = "tok-1";

#[derive(Clone)]
struct Entry {
    is_dir: bool,
    content: Vec<u8>,
    mtime: f64,
}

#[derive(Clone, Default)]
struct Nas {
    files: Arc<Mutex<HashMap<String, Entry>>>,
    logouts: Arc<Mutex<usize>>,
}

fn dir() -> Entry {
    Entry {
        is_dir: true,
        content: Vec::new(),
        mtime: 10.0,
    }
}

fn file(content: &[u8]) -> Entry {
    Entry {
        is_dir: false,
        content: content.to_vec(),
        mtime: 10.0,
    }
}

impl Nas {
    fn seeded() -> Self {
        let nas = Nas::default();
        {
            let mut files = nas.files.lock().unwrap();
            files.insert("/share".into(), dir());
            files.insert("/share/docs".into(), dir());
            files.insert("/share/docs/deep".into(), dir());
            files.insert("/share/docs/a.txt".into(), file(b"nas hello world"));
            files.insert("/share/docs/deep/b.md".into(), file(b"deep markdown notes"));
            files.insert("/share/docs/photo.jpg".into(), file(&[0xff, 0xd8]));
            // EUC-KR "안녕"
            files.insert("/share/docs/korean.txt".into(), file(&[0xbe, 0xc8, 0xb3, 0xe7]));
        }
        nas
    }
}

fn ok(data: Value) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

fn fail(code: i64) -> Response {
    Json(json!({ "success": false, "error": { "code": code } })).into_response()
}

fn describe(path: &str, entry: &Entry) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    json!({
        "name": name,
        "path": path,
        "isdir": entry.is_dir,
        "additional": {
            "size": entry.content.len(),
            "time": { "mtime": entry.mtime }
        }
    })
}

async fn entry_cgi(State(nas): State<Nas>, Form(params): Form<HashMap<String, String>>) -> Response {
    let api = params.get("api").map(String::as_str).unwrap_or_default();
    let method = params.get("method").map(String::as_str).unwrap_or_default();

    if api == "SYNO.API.Auth" && method == "login" {
        let good = params.get("account").is_some_and(|a| a == "alice")
            && params.get("passwd").is_some_and(|p| p == "pw");
        if !good {
            return fail(400);
        }
        return ok(json!({ "sid": SID, "synotoken": TOKEN }));
    }

    if params.get("_sid").map(String::as_str) != Some(SID) {
        return fail(119);
    }

    let files = nas.files.lock().unwrap().clone();
    match (api, method) {
        ("SYNO.API.Auth", "logout") => {
            *nas.logouts.lock().unwrap() += 1;
            ok(Value::Null)
        }
        ("SYNO.FileStation.List", "list_share") => ok(json!({
            "shares": [{ "name": "share", "path": "/share" }]
        })),
        ("SYNO.FileStation.List", "list") => {
            let folder = params.get("folder_path").cloned().unwrap_or_default();
            if !files.get(&folder).is_some_and(|e| e.is_dir) {
                return fail(408);
            }
            let prefix = format!("{}/", folder);
            let mut children: Vec<(&String, &Entry)> = files
                .iter()
                .filter(|(path, _)| {
                    path.strip_prefix(&prefix)
                        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
                })
                .collect();
            children.sort_by(|a, b| a.0.cmp(b.0));
            let listed: Vec<Value> = children.iter().map(|(p, e)| describe(p, e)).collect();
            ok(json!({ "files": listed }))
        }
        ("SYNO.FileStation.List", "getinfo") => {
            let path = params.get("path").cloned().unwrap_or_default();
            match files.get(&path) {
                Some(entry) => ok(json!({ "files": [describe(&path, entry)] })),
                None => ok(json!({ "files": [{ "name": "", "path": path, "code": 408 }] })),
            }
        }
        ("SYNO.FileStation.Download", "download") => {
            let path = params.get("path").cloned().unwrap_or_default();
            if path.ends_with("/slow.txt") {
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            }
            match files.get(&path) {
                Some(entry) if !entry.is_dir => (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    entry.content.clone(),
                )
                    .into_response(),
                _ => fail(408),
            }
        }
        ("SYNO.FileStation.Delete", "delete") => {
            let raw = params.get("path").cloned().unwrap_or_default();
            let paths: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            let mut files = nas.files.lock().unwrap();
            for path in paths {
                let nested = format!("{}/", path);
                files.retain(|p, _| p != &path && !p.starts_with(&nested));
            }
            ok(Value::Null)
        }
        _ => fail(103),
    }
}

async fn start_nas(nas: Nas) -> u16 {
    let app = Router::new()
        .route("/webapi/entry.cgi", any(entry_cgi))
        .with_state(nas);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn login_for(port: u16, password: &str) -> SynologyLogin {
    SynologyLogin {
        host: "127.0.0.1".to_string(),
        port,
        username: "alice".to_string(),
        password: password.to_string(),
        secure: false,
        otp_code: None,
    }
}

async fn logged_in(port: u16) -> SynologyProvider {
    let provider = SynologyProvider::new(&login_for(port, "pw"), &SynologyConfig::default()).unwrap();
    provider.login(None).await.unwrap();
    provider
}

#[tokio::test]
async fn test_bad_password_is_permission_denied() {
    let port = start_nas(Nas::seeded()).await;
    let provider =
        SynologyProvider::new(&login_for(port, "wrong"), &SynologyConfig::default()).unwrap();
    let err = provider.login(None).await.unwrap_err();
    assert!(matches!(err, folder_search::Error::PermissionDenied(_)));
    assert!(!provider.is_logged_in().await);
}

#[tokio::test]
async fn test_listing_and_metadata() {
    let port = start_nas(Nas::seeded()).await;
    let provider = logged_in(port).await;

    let shares = provider.list_shares().await.unwrap();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].path, "/share");

    let items = provider.list_files("/share/docs").await.unwrap();
    let paths: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/share/docs/a.txt",
            "/share/docs/deep",
            "/share/docs/korean.txt",
            "/share/docs/photo.jpg"
        ]
    );
    assert_eq!(items[0].size, Some(15));
    assert!(items[1].is_directory);
    assert_eq!(items[1].size, None);

    let all = provider.list_files_recursive("/share/docs").await.unwrap();
    assert!(all.iter().any(|i| i.path == "/share/docs/deep/b.md"));

    let meta = provider.get_metadata("/share/docs/a.txt").await.unwrap().unwrap();
    assert_eq!(meta.last_modified, 10.0);
    assert!(provider.get_metadata("/share/missing").await.unwrap().is_none());

    let err = provider.list_files("/share/missing").await.unwrap_err();
    assert!(matches!(err, folder_search::Error::RemoteProtocol(_)));
}

#[tokio::test]
async fn test_read_and_download() {
    let port = start_nas(Nas::seeded()).await;
    let provider = logged_in(port).await;

    let text = provider.read_file_content("/share/docs/a.txt").await.unwrap();
    assert_eq!(text.as_deref(), Some("nas hello world"));

    let korean = provider.read_file_content("/share/docs/korean.txt").await.unwrap();
    assert_eq!(korean.as_deref(), Some("안녕"));

    assert!(provider
        .read_file_content("/share/docs/nope.txt")
        .await
        .unwrap()
        .is_none());

    let chunks: Vec<Vec<u8>> = provider
        .download_file("/share/docs/a.txt")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), b"nas hello world");
}

#[tokio::test]
async fn test_stalled_download_times_out() {
    let nas = Nas::seeded();
    nas.files
        .lock()
        .unwrap()
        .insert("/share/docs/slow.txt".into(), file(b"eventually"));
    let port = start_nas(nas).await;
    let config = SynologyConfig {
        list_timeout_secs: 1,
        ..SynologyConfig::default()
    };
    let provider = SynologyProvider::new(&login_for(port, "pw"), &config).unwrap();
    provider.login(None).await.unwrap();

    let started = std::time::Instant::now();
    let err = match provider.download_file("/share/docs/slow.txt").await {
        Ok(stream) => stream.try_collect::<Vec<Vec<u8>>>().await.unwrap_err(),
        Err(e) => e,
    };
    assert!(matches!(err, folder_search::Error::RemoteProtocol(_)));
    assert!(started.elapsed() < std::time::Duration::from_secs(3));

    // Prompt downloads are unaffected by the short timeout.
    let chunks: Vec<Vec<u8>> = provider
        .download_file("/share/docs/a.txt")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), b"nas hello world");
}

#[tokio::test]
async fn test_delete_item() {
    let nas = Nas::seeded();
    let port = start_nas(nas.clone()).await;
    let provider = logged_in(port).await;

    assert!(provider.delete_item("/share/docs/deep").await.unwrap());
    assert!(!nas.files.lock().unwrap().contains_key("/share/docs/deep/b.md"));
    assert!(!provider.delete_item("/share/docs/deep").await.unwrap());
}

#[tokio::test]
async fn test_close_logs_out_and_drops_session() {
    let nas = Nas::seeded();
    let port = start_nas(nas.clone()).await;
    let provider = logged_in(port).await;

    provider.close().await.unwrap();
    assert_eq!(*nas.logouts.lock().unwrap(), 1);
    assert!(!provider.is_logged_in().await);

    let err = provider.list_files("/share").await.unwrap_err();
    assert!(matches!(err, folder_search::Error::PermissionDenied(_)));
}

#[tokio::test]
async fn test_index_nas_folder_through_session() {
    let port = start_nas(Nas::seeded()).await;
    let tmp = TempDir::new().unwrap();
    let ctx = AppContext::open(Config::minimal(tmp.path())).await.unwrap();

    let session = ctx
        .sessions
        .login_synology(&login_for(port, "pw"))
        .await
        .unwrap();
    assert_eq!(session.provider_id, format!("synology:alice@127.0.0.1:{}", port));

    let provider = ctx.provider(Some(session.session_id.as_str())).await.unwrap();
    ctx.start_indexing(provider.clone(), "/share/docs").await.unwrap();
    assert!(ctx.jobs.join(&session.provider_id, "/share/docs").await);

    let ids = ctx.index.ids().await.unwrap();
    assert_eq!(
        ids,
        vec![
            "/share/docs/a.txt-chunk-1",
            "/share/docs/deep/b.md-chunk-1",
            "/share/docs/korean.txt-chunk-1",
        ]
    );

    // Status is scoped to the NAS identity, not the local one.
    let nas_status = ctx
        .statuses(provider.as_ref(), &["/share/docs".to_string()])
        .await
        .unwrap();
    assert_eq!(nas_status["/share/docs"], IndexStatus::Indexed);
    let local = ctx.sessions.local();
    let local_status = ctx
        .statuses(local.as_ref(), &["/share/docs".to_string()])
        .await
        .unwrap();
    assert_eq!(local_status["/share/docs"], IndexStatus::NotIndexed);

    let deleted = ctx.delete_index(provider.as_ref(), "/share/docs").await.unwrap();
    assert_eq!(deleted, 3);

    assert!(ctx.sessions.logout(&session.session_id).await.unwrap());
    assert!(ctx.provider(Some(session.session_id.as_str())).await.is_err());
    ctx.shutdown().await;
}
