//! Synology NAS provider over the File Station Web API.
//!
//! Every call goes to `{scheme}://{host}:{port}/webapi/entry.cgi`. A
//! session is opened with [`SynologyProvider::login`], which stores the
//! session id (`_sid`) and the anti-forgery `synotoken`; both are attached
//! to every later request. Calls without a session fail with
//! [`Error::PermissionDenied`].
//!
//! API-level failures (`"success": false`) and transport failures surface
//! as [`Error::RemoteProtocol`]. Nothing is retried.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use folder_search_core::models::FileItem;

use super::{file_name, ByteStream, Provider};
use crate::config::SynologyConfig;
use crate::decode::decode_text;
use crate::error::{Error, Result};

const ADDITIONAL: &str = r#"["real_path","size","owner","time"]"#;

/// Connection parameters for a NAS session.
#[derive(Debug, Clone, Deserialize)]
pub struct SynologyLogin {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default)]
    pub otp_code: Option<String>,
}

fn default_secure() -> bool {
    true
}

#[derive(Debug, Clone)]
struct Session {
    sid: String,
    syno_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    sid: String,
    #[serde(default)]
    synotoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    name: String,
    path: String,
    #[serde(default)]
    isdir: bool,
    /// Present on `getinfo` entries that could not be resolved.
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    additional: Option<Additional>,
}

#[derive(Debug, Deserialize)]
struct Additional {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    time: Option<Times>,
}

#[derive(Debug, Deserialize)]
struct Times {
    #[serde(default)]
    mtime: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ShareList {
    #[serde(default)]
    shares: Vec<RemoteShare>,
}

#[derive(Debug, Deserialize)]
struct RemoteShare {
    name: String,
    path: String,
}

impl From<RemoteFile> for FileItem {
    fn from(file: RemoteFile) -> Self {
        let additional = file.additional;
        let size = if file.isdir {
            None
        } else {
            additional.as_ref().and_then(|a| a.size)
        };
        let last_modified = additional
            .and_then(|a| a.time)
            .and_then(|t| t.mtime)
            .unwrap_or(0.0);
        FileItem {
            name: file.name,
            is_directory: file.isdir,
            path: file.path,
            size,
            last_modified,
        }
    }
}

fn stalled(path: &str) -> Error {
    Error::RemoteProtocol(format!("download of {} stalled", path))
}

pub struct SynologyProvider {
    endpoint: String,
    username: String,
    password: String,
    provider_id: String,
    client: reqwest::Client,
    list_timeout: Duration,
    upload_timeout: Duration,
    session: RwLock<Option<Session>>,
}

impl SynologyProvider {
    pub fn new(login: &SynologyLogin, config: &SynologyConfig) -> Result<Self> {
        let scheme = if login.secure { "https" } else { "http" };
        let list_timeout = Duration::from_secs(config.list_timeout_secs);

        let client = reqwest::Client::builder()
            .connect_timeout(list_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            endpoint: format!("{}://{}:{}/webapi/entry.cgi", scheme, login.host, login.port),
            username: login.username.clone(),
            password: login.password.clone(),
            provider_id: format!("synology:{}@{}:{}", login.username, login.host, login.port),
            client,
            list_timeout,
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            session: RwLock::new(None),
        })
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Open a File Station session. `otp_code` is required for accounts
    /// with two-factor authentication.
    pub async fn login(&self, otp_code: Option<&str>) -> Result<()> {
        let mut form = vec![
            ("api", "SYNO.API.Auth".to_string()),
            ("version", "7".to_string()),
            ("method", "login".to_string()),
            ("account", self.username.clone()),
            ("passwd", self.password.clone()),
            ("session", "FileStation".to_string()),
            ("format", "sid".to_string()),
            ("enable_syno_token", "yes".to_string()),
        ];
        if let Some(otp) = otp_code {
            form.push(("otp_code", otp.to_string()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .timeout(self.list_timeout)
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope = response.json().await?;
        if !envelope.success {
            let code = envelope.error.map(|e| e.code).unwrap_or_default();
            return Err(Error::PermissionDenied(format!(
                "Synology login failed (code {})",
                code
            )));
        }

        let data: LoginData = parse_data(envelope.data, "SYNO.API.Auth.login")?;
        *self.session.write().await = Some(Session {
            sid: data.sid,
            syno_token: data.synotoken,
        });

        tracing::info!(provider = %self.provider_id, "Synology session opened");
        Ok(())
    }

    async fn session(&self) -> Result<Session> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::PermissionDenied("not logged in".to_string()))
    }

    fn with_token(&self, request: reqwest::RequestBuilder, session: &Session) -> reqwest::RequestBuilder {
        match &session.syno_token {
            Some(token) => request.header("X-SYNO-Token", token),
            None => request,
        }
    }

    /// Authenticated File Station call. Returns the `data` member.
    async fn api_request(
        &self,
        api: &str,
        method: &str,
        version: &str,
        params: &[(&str, String)],
        post: bool,
    ) -> Result<Value> {
        let session = self.session().await?;

        let mut query: Vec<(&str, String)> = vec![
            ("api", api.to_string()),
            ("version", version.to_string()),
            ("method", method.to_string()),
            ("_sid", session.sid.clone()),
        ];
        query.extend(params.iter().cloned());

        let request = if post {
            self.client.post(&self.endpoint).form(&query)
        } else {
            self.client.get(&self.endpoint).query(&query)
        };

        let response = self
            .with_token(request, &session)
            .timeout(self.list_timeout)
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope = response.json().await?;
        if !envelope.success {
            let code = envelope.error.map(|e| e.code).unwrap_or_default();
            return Err(Error::RemoteProtocol(format!(
                "{}.{} failed (code {})",
                api, method, code
            )));
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    async fn download_request(&self, path: &str, mode: &str) -> Result<reqwest::RequestBuilder> {
        let session = self.session().await?;
        let query = [
            ("api", "SYNO.FileStation.Download"),
            ("version", "2"),
            ("method", "download"),
            ("_sid", session.sid.as_str()),
            ("path", path),
            ("mode", mode),
        ];
        let request = self.client.get(&self.endpoint).query(&query);
        Ok(self.with_token(request, &session))
    }

    /// Top-level shared folders visible to the session.
    pub async fn list_shares(&self) -> Result<Vec<FileItem>> {
        let data = self
            .api_request("SYNO.FileStation.List", "list_share", "2", &[], false)
            .await?;
        let shares: ShareList = parse_data(Some(data), "SYNO.FileStation.List.list_share")?;

        Ok(shares
            .shares
            .into_iter()
            .map(|share| FileItem {
                name: share.name,
                is_directory: true,
                path: share.path,
                size: None,
                last_modified: 0.0,
            })
            .collect())
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(data: Option<Value>, what: &str) -> Result<T> {
    serde_json::from_value(data.unwrap_or(Value::Null))
        .map_err(|e| Error::RemoteProtocol(format!("unexpected {} response: {}", what, e)))
}

/// A File Station error body served in place of file content.
fn api_error_in_body(bytes: &[u8]) -> Option<i64> {
    let envelope: Envelope = serde_json::from_slice(bytes).ok()?;
    if envelope.success {
        return None;
    }
    envelope.error.map(|e| e.code)
}

#[async_trait]
impl Provider for SynologyProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileItem>> {
        let params = [
            ("folder_path", path.to_string()),
            ("additional", ADDITIONAL.to_string()),
        ];
        let data = self
            .api_request("SYNO.FileStation.List", "list", "2", &params, false)
            .await?;
        let list: FileList = parse_data(Some(data), "SYNO.FileStation.List.list")?;
        Ok(list.files.into_iter().map(FileItem::from).collect())
    }

    /// Breadth-first walk. The starting folder must list; failures deeper
    /// down are logged and that subtree is skipped.
    async fn list_files_recursive(&self, path: &str) -> Result<Vec<FileItem>> {
        let mut all = Vec::new();
        let mut queue = VecDeque::new();

        for item in self.list_files(path).await? {
            if item.is_directory {
                queue.push_back(item.path.clone());
            }
            all.push(item);
        }

        while let Some(dir) = queue.pop_front() {
            match self.list_files(&dir).await {
                Ok(items) => {
                    for item in items {
                        if item.is_directory {
                            queue.push_back(item.path.clone());
                        }
                        all.push(item);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %dir, error = %e, "skipping unreadable NAS folder");
                }
            }
        }

        Ok(all)
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<FileItem>> {
        let params = [
            ("path", path.to_string()),
            ("additional", ADDITIONAL.to_string()),
        ];
        let data = match self
            .api_request("SYNO.FileStation.List", "getinfo", "2", &params, false)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(path, error = %e, "getinfo failed");
                return Ok(None);
            }
        };

        let list: FileList = match parse_data(Some(data), "SYNO.FileStation.List.getinfo") {
            Ok(list) => list,
            Err(e) => {
                tracing::debug!(path, error = %e, "getinfo unparseable");
                return Ok(None);
            }
        };

        Ok(list
            .files
            .into_iter()
            .next()
            .filter(|file| file.code.is_none())
            .map(FileItem::from))
    }

    async fn read_file_content(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .download_request(path, "open")
            .await?
            .timeout(self.list_timeout)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        if let Some(code) = api_error_in_body(&bytes) {
            tracing::warn!(path, code, "NAS refused file read");
            return Ok(None);
        }

        match decode_text(&bytes, path) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(path, error = %e, "unreadable text file");
                Ok(None)
            }
        }
    }

    async fn upload_file(&self, destination_path: &str, bytes: Vec<u8>) -> Result<()> {
        let session = self.session().await?;
        let name = file_name(destination_path).to_string();
        let folder = match destination_path.trim_end_matches('/').rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        };

        // File Station expects the file part after every text field.
        let form = multipart::Form::new()
            .text("api", "SYNO.FileStation.Upload")
            .text("version", "2")
            .text("method", "upload")
            .text("_sid", session.sid.clone())
            .text("path", folder.clone())
            .text("overwrite", "true")
            .text("create_parents", "true")
            .part("file", multipart::Part::bytes(bytes).file_name(name.clone()));

        let request = self.client.post(&self.endpoint).multipart(form);
        let response = self
            .with_token(request, &session)
            .timeout(self.upload_timeout)
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope = response.json().await?;
        if !envelope.success {
            let code = envelope.error.map(|e| e.code).unwrap_or_default();
            return Err(Error::RemoteProtocol(format!(
                "upload of {} to {} failed (code {})",
                name, folder, code
            )));
        }

        tracing::info!(file = %name, folder = %folder, "uploaded to NAS");
        Ok(())
    }

    /// Stream a file. A whole-request timeout would cut off large files, so
    /// the wait for headers and the gap between body chunks are each bounded
    /// by the listing timeout instead.
    async fn download_file(&self, path: &str) -> Result<ByteStream> {
        let idle = self.list_timeout;
        let request = self.download_request(path, "download").await?;
        let response = tokio::time::timeout(idle, request.send())
            .await
            .map_err(|_| stalled(path))??
            .error_for_status()?;

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let bytes = response.bytes().await?;
            if let Some(code) = api_error_in_body(&bytes) {
                return Err(Error::RemoteProtocol(format!(
                    "download of {} failed (code {})",
                    path, code
                )));
            }
            let body = bytes.to_vec();
            return Ok(futures::stream::once(async move { Ok(body) }).boxed());
        }

        let path = path.to_string();
        let body = response.bytes_stream().boxed();
        Ok(futures::stream::unfold(Some(body), move |state| {
            let path = path.clone();
            async move {
                let mut body = state?;
                match tokio::time::timeout(idle, body.next()).await {
                    Ok(Some(Ok(chunk))) => Some((Ok(chunk.to_vec()), Some(body))),
                    Ok(Some(Err(e))) => Some((Err(Error::from(e)), None)),
                    Ok(None) => None,
                    Err(_) => Some((Err(stalled(&path)), None)),
                }
            }
        })
        .boxed())
    }

    async fn delete_item(&self, path: &str) -> Result<bool> {
        if self.get_metadata(path).await?.is_none() {
            return Ok(false);
        }

        let paths = serde_json::to_string(&[path])
            .map_err(|e| Error::RemoteProtocol(e.to_string()))?;
        let params = [("path", paths), ("force_delete", "true".to_string())];
        self.api_request("SYNO.FileStation.Delete", "delete", "2", &params, true)
            .await?;

        tracing::info!(path, "deleted from NAS");
        Ok(true)
    }

    /// Log out. Best effort: the session is dropped locally either way.
    async fn close(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        let query = [
            ("api", "SYNO.API.Auth"),
            ("version", "7"),
            ("method", "logout"),
            ("session", "FileStation"),
            ("_sid", session.sid.as_str()),
        ];
        let request = self.client.get(&self.endpoint).query(&query);
        if let Err(e) = self
            .with_token(request, &session)
            .timeout(self.list_timeout)
            .send()
            .await
        {
            tracing::warn!(provider = %self.provider_id, error = %e, "Synology logout failed");
        }
        Ok(())
    }
}
