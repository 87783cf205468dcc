use async_trait::async_trait;
use common::config::{Account, ApiSettings};
use common::discovery;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication failed for {username}: {message}")]
    Auth { username: String, message: String },
    #[error("session error: {0}")]
    Session(String),
    #[error("upload failed: {0}")]
    Upload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaId(pub String);

/// An authenticated session for one account.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub auth_token: String,
    pub proxy: Option<String>,
}

/// The external collaborator performing login/session handling and the
/// actual media upload. Implementations must mark the source video
/// with its `.uploaded` sidecar on success.
#[async_trait]
pub trait Publisher {
    async fn acquire_session(&self, account: &Account) -> Result<Session, PublishError>;

    async fn upload(
        &self,
        session: &Session,
        video_path: &Path,
        caption: &str,
    ) -> Result<MediaId, PublishError>;
}

/// HTTP publisher against the platform's mobile API, with a per-account
/// session cache under the configured sessions directory.
pub struct ApiPublisher {
    api: ApiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionUuids {
    phone_id: String,
    uuid: String,
    client_session_id: String,
    advertising_id: String,
    android_device_id: String,
}

impl SessionUuids {
    fn generate() -> Self {
        Self {
            phone_id: random_hex_id(),
            uuid: random_hex_id(),
            client_session_id: random_hex_id(),
            advertising_id: random_hex_id(),
            android_device_id: random_hex_id(),
        }
    }
}

fn random_hex_id() -> String {
    const HEX: &[u8] = b"abcdef0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

/// On-disk shape of `sessions/<username>_session.json`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    username: String,
    auth_token: String,
    user_agent: String,
    uuids: SessionUuids,
    last_login: String,
}

#[derive(Debug, Serialize)]
struct SessionInfo<'a> {
    user_agent: &'a str,
    last_login: String,
    username: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: String,
    #[serde(default)]
    authorization: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: String,
    #[serde(default)]
    media: Option<MediaInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    pk: serde_json::Value,
}

impl ApiPublisher {
    pub fn new(api: ApiSettings) -> Self {
        Self { api }
    }

    fn session_path(&self, username: &str) -> PathBuf {
        self.api
            .sessions_dir
            .join(format!("{}_session.json", username))
    }

    fn http_client(&self, proxy: Option<&str>) -> Result<reqwest::Client, PublishError> {
        let mut builder = reqwest::Client::builder().user_agent(self.api.user_agent.clone());
        if let Some(p) = proxy {
            let proxy = reqwest::Proxy::all(p)
                .map_err(|e| PublishError::Session(format!("invalid proxy {:?}: {}", p, e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| PublishError::Session(format!("failed to build http client: {}", e)))
    }

    fn load_cached(&self, path: &Path) -> Result<StoredSession, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&content).map_err(|e| e.to_string())
    }

    /// Probe the session with a lightweight authenticated request.
    async fn validate(&self, client: &reqwest::Client, auth_token: &str) -> bool {
        let url = format!("{}/api/v1/feed/timeline/", self.api.base_url);
        match client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, auth_token)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn login(
        &self,
        client: &reqwest::Client,
        account: &Account,
        session_path: &Path,
    ) -> Result<Session, PublishError> {
        log::info!("Logging in as {}", account.username);
        let uuids = SessionUuids::generate();
        let body = serde_json::json!({
            "username": account.username,
            "password": account.password,
            "phone_id": uuids.phone_id,
            "guid": uuids.uuid,
            "device_id": uuids.android_device_id,
            "adid": uuids.advertising_id,
            "locale": self.api.locale,
            "country": self.api.country,
            "country_code": self.api.country_code,
            "timezone_offset": self.api.timezone_offset_secs,
            "app_version": self.api.app_version,
            "login_attempt_count": 0,
        });

        let url = format!("{}/api/v1/accounts/login/", self.api.base_url);
        let resp = client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Session(format!("login request failed: {}", e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            let message = resp.text().await.unwrap_or_default();
            self.discard_session(session_path, &account.username);
            return Err(PublishError::Auth {
                username: account.username.clone(),
                message,
            });
        }
        if !status.is_success() {
            return Err(PublishError::Session(format!(
                "login returned {} for {}",
                status, account.username
            )));
        }

        let parsed: LoginResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Session(format!("malformed login response: {}", e)))?;
        let token = match (parsed.status.as_str(), parsed.authorization) {
            ("ok", Some(token)) => token,
            _ => {
                self.discard_session(session_path, &account.username);
                return Err(PublishError::Auth {
                    username: account.username.clone(),
                    message: "login rejected by the platform".to_string(),
                });
            }
        };

        self.persist_session(account, &token, &uuids, session_path);
        log::info!("Logged in as {} with a fresh session", account.username);
        Ok(Session {
            username: account.username.clone(),
            auth_token: token,
            proxy: account.proxy.clone(),
        })
    }

    fn persist_session(
        &self,
        account: &Account,
        token: &str,
        uuids: &SessionUuids,
        session_path: &Path,
    ) {
        let last_login = chrono::Local::now()
            .format(common::TIMESTAMP_FORMAT)
            .to_string();
        let stored = StoredSession {
            username: account.username.clone(),
            auth_token: token.to_string(),
            user_agent: self.api.user_agent.clone(),
            uuids: uuids.clone(),
            last_login: last_login.clone(),
        };
        match serde_json::to_string_pretty(&stored) {
            Ok(json) => {
                if let Err(e) = fs::write(session_path, json) {
                    log::warn!(
                        "Failed to cache session for {}: {}",
                        account.username,
                        e
                    );
                }
            }
            Err(e) => log::warn!("Failed to serialize session for {}: {}", account.username, e),
        }

        let info = SessionInfo {
            user_agent: &self.api.user_agent,
            last_login,
            username: &account.username,
        };
        if let Ok(json) = serde_json::to_string_pretty(&info) {
            let _ = fs::write(session_path.with_extension("info"), json);
        }
    }

    fn discard_session(&self, session_path: &Path, username: &str) {
        if session_path.exists() {
            log::info!("Removing stale session file for {}", username);
            let _ = fs::remove_file(session_path);
        }
    }
}

#[async_trait]
impl Publisher for ApiPublisher {
    async fn acquire_session(&self, account: &Account) -> Result<Session, PublishError> {
        fs::create_dir_all(&self.api.sessions_dir).map_err(|e| {
            PublishError::Session(format!(
                "failed to create sessions directory {}: {}",
                self.api.sessions_dir.display(),
                e
            ))
        })?;
        let session_path = self.session_path(&account.username);
        let client = self.http_client(account.proxy.as_deref())?;
        if let Some(p) = &account.proxy {
            log::info!("Using proxy for {}: {}", account.username, p);
        }

        if session_path.exists() {
            match self.load_cached(&session_path) {
                Ok(stored) => {
                    log::info!("Found cached session for {}, validating", account.username);
                    if self.validate(&client, &stored.auth_token).await {
                        log::info!("Cached session for {} is valid", account.username);
                        return Ok(Session {
                            username: account.username.clone(),
                            auth_token: stored.auth_token,
                            proxy: account.proxy.clone(),
                        });
                    }
                    log::warn!("Session for {} expired, logging in again", account.username);
                }
                Err(e) => {
                    log::warn!(
                        "Cached session for {} unreadable ({}), logging in again",
                        account.username,
                        e
                    );
                }
            }
        }

        self.login(&client, account, &session_path).await
    }

    async fn upload(
        &self,
        session: &Session,
        video_path: &Path,
        caption: &str,
    ) -> Result<MediaId, PublishError> {
        let client = self.http_client(session.proxy.as_deref())?;
        let bytes = tokio::fs::read(video_path).await.map_err(|e| {
            PublishError::Upload(format!("failed to read {}: {}", video_path.display(), e))
        })?;
        let file_name = video_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| PublishError::Upload(format!("invalid video part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("video", part)
            .text("caption", caption.to_string());

        let url = format!("{}/api/v1/clips/upload/", self.api.base_url);
        let resp = client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &session.auth_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Upload(format!("upload request failed: {}", e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PublishError::Auth {
                username: session.username.clone(),
                message: "session rejected during upload".to_string(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PublishError::Upload(format!(
                "upload returned {}: {}",
                status, text
            )));
        }

        let parsed: UploadResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Upload(format!("malformed upload response: {}", e)))?;
        let pk = match (parsed.status.as_str(), parsed.media) {
            ("ok", Some(media)) => match media.pk {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            _ => {
                return Err(PublishError::Upload(
                    "upload rejected by the platform".to_string(),
                ))
            }
        };

        // Mark the source video so discovery skips it from now on.
        let marker = discovery::uploaded_marker(video_path);
        if let Err(e) = fs::write(&marker, []) {
            log::warn!(
                "Uploaded {} but could not write marker {}: {}",
                video_path.display(),
                marker.display(),
                e
            );
        }

        log::info!("Upload complete, media id {}", pk);
        Ok(MediaId(pk))
    }
}
