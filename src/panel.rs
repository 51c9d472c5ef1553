//! Access to the hosting panel that owns servers and their backups.
//!
//! The sync engine only sees the [`Panel`] trait. [`PteroPanel`] talks to
//! a Pterodactyl-style client API over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A server as reported by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Server {
    /// Short identifier used in API paths.
    pub identifier: String,
    /// Stable unique identifier.
    pub uuid: String,
    /// Human label.
    pub name: String,
}

/// A backup as reported by the panel. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Unique, stable identifier.
    pub uuid: String,
    /// Human label; not unique and not filesystem-safe.
    pub name: String,
    /// Whether the panel finished the backup successfully.
    pub successful: bool,
    /// Expected archive size in bytes (advisory).
    pub bytes: u64,
    /// Paths the panel left out of the archive.
    #[serde(default)]
    pub ignored_files: Vec<String>,
    /// SHA-256 checksum of the archive, once known.
    #[serde(default)]
    pub hash: Option<String>,
    /// When the backup was started.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the backup finished, if it has.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether the backup is protected from deletion.
    #[serde(default)]
    pub locked: bool,
}

impl Backup {
    /// Creates a backup record with only the fields the engine relies on.
    #[must_use]
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, successful: bool, bytes: u64) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            successful,
            bytes,
            ignored_files: Vec::new(),
            hash: None,
            created_at: None,
            completed_at: None,
            locked: false,
        }
    }
}

/// The three panel operations a sync run needs.
#[async_trait]
pub trait Panel: Send + Sync {
    /// Fetches a server by its identifier.
    async fn fetch_server(&self, server_id: &str) -> Result<Server>;

    /// Fetches every backup of a server, in panel order.
    async fn fetch_backups(&self, server_id: &str) -> Result<Vec<Backup>>;

    /// Requests a short-lived download URL for one backup.
    async fn download_url(&self, server_id: &str, backup_uuid: &str) -> Result<String>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Deserialize)]
struct Object<T> {
    attributes: T,
}

#[derive(Deserialize)]
struct List<T> {
    data: Vec<Object<T>>,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Deserialize)]
struct ListMeta {
    pagination: Pagination,
}

#[derive(Deserialize)]
struct Pagination {
    current_page: u32,
    total_pages: u32,
}

#[derive(Deserialize)]
struct BackupAttributes {
    uuid: String,
    name: String,
    #[serde(default)]
    ignored_files: Vec<String>,
    #[serde(default)]
    sha256_hash: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    is_successful: bool,
    #[serde(default)]
    is_locked: bool,
}

impl From<BackupAttributes> for Backup {
    fn from(raw: BackupAttributes) -> Self {
        Self {
            uuid: raw.uuid,
            name: raw.name,
            successful: raw.is_successful,
            bytes: raw.bytes,
            ignored_files: raw.ignored_files,
            hash: raw.sha256_hash,
            created_at: raw.created_at,
            completed_at: raw.completed_at,
            locked: raw.is_locked,
        }
    }
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    detail: String,
}

// ============================================================================
// HTTP client
// ============================================================================

/// Pterodactyl client-API implementation of [`Panel`].
pub struct PteroPanel {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl PteroPanel {
    /// Creates a client for the panel at `base_url` authenticating with `token`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn server_url(&self, server_id: &str) -> String {
        format!("{}/api/client/servers/{server_id}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Panel {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response.json().await?)
    }
}

/// Picks the first `errors[].detail` out of a panel error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.errors.into_iter().next())
        .map_or_else(|| body.trim().to_string(), |e| e.detail)
}

#[async_trait]
impl Panel for PteroPanel {
    async fn fetch_server(&self, server_id: &str) -> Result<Server> {
        let object: Object<Server> = self.get_json(&self.server_url(server_id), &[]).await?;
        Ok(object.attributes)
    }

    async fn fetch_backups(&self, server_id: &str) -> Result<Vec<Backup>> {
        let url = format!("{}/backups", self.server_url(server_id));
        let mut backups = Vec::new();
        let mut page: u32 = 1;

        loop {
            let list: List<BackupAttributes> =
                self.get_json(&url, &[("page", page.to_string())]).await?;
            backups.extend(list.data.into_iter().map(|o| Backup::from(o.attributes)));

            match list.meta {
                Some(ListMeta { pagination }) if pagination.current_page < pagination.total_pages => {
                    page = pagination.current_page + 1;
                }
                _ => break,
            }
        }

        Ok(backups)
    }

    async fn download_url(&self, server_id: &str, backup_uuid: &str) -> Result<String> {
        let url = format!("{}/backups/{backup_uuid}/download", self.server_url(server_id));
        let object: Object<SignedUrl> = self.get_json(&url, &[]).await?;
        Ok(object.attributes.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backup_json(uuid: &str, name: &str, successful: bool) -> serde_json::Value {
        let completed_at = successful.then_some("2024-03-01T04:05:00+00:00");
        json!({
            "object": "backup",
            "attributes": {
                "uuid": uuid,
                "name": name,
                "ignored_files": [],
                "sha256_hash": null,
                "bytes": 1000,
                "created_at": "2024-03-01T04:00:00+00:00",
                "completed_at": completed_at,
                "is_successful": successful,
                "is_locked": false
            }
        })
    }

    fn page(data: Vec<serde_json::Value>, current: u32, total: u32) -> serde_json::Value {
        json!({
            "object": "list",
            "data": data,
            "meta": { "pagination": {
                "total": 3, "count": 1, "per_page": 1,
                "current_page": current, "total_pages": total, "links": {}
            }}
        })
    }

    fn panel(server: &MockServer) -> PteroPanel {
        PteroPanel::new(reqwest::Client::new(), &format!("{}/", server.uri()), "ptlc_secret")
    }

    #[tokio::test]
    async fn fetch_server_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/client/servers/1a2b3c4d"))
            .and(header("authorization", "Bearer ptlc_secret"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "server",
                "attributes": {
                    "identifier": "1a2b3c4d",
                    "uuid": "1a2b3c4d-0000-4000-8000-000000000000",
                    "name": "Survival",
                    "node": "node-1"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fetched = panel(&server).fetch_server("1a2b3c4d").await.unwrap();
        assert_eq!(fetched.name, "Survival");
        assert_eq!(fetched.uuid, "1a2b3c4d-0000-4000-8000-000000000000");
    }

    #[tokio::test]
    async fn fetch_backups_follows_pagination() {
        let server = MockServer::start().await;
        for (n, uuid) in [(1, "aaa"), (2, "bbb"), (3, "ccc")] {
            Mock::given(method("GET"))
                .and(path("/api/client/servers/srv/backups"))
                .and(query_param("page", n.to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(page(vec![backup_json(uuid, "Nightly", n != 2)], n, 3)),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let backups = panel(&server).fetch_backups("srv").await.unwrap();
        let uuids: Vec<_> = backups.iter().map(|b| b.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["aaa", "bbb", "ccc"]);
        assert!(backups[0].successful);
        assert!(!backups[1].successful);
        assert_eq!(backups[2].bytes, 1000);
        assert!(backups[1].completed_at.is_none());
    }

    #[tokio::test]
    async fn fetch_backups_without_meta_is_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/client/servers/srv/backups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [backup_json("aaa", "Only", true)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backups = panel(&server).fetch_backups("srv").await.unwrap();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn download_url_reads_signed_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/client/servers/srv/backups/aaa/download"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "signed_url",
                "attributes": { "url": "https://node.example.com/download/backup?token=xyz" }
            })))
            .mount(&server)
            .await;

        let url = panel(&server).download_url("srv", "aaa").await.unwrap();
        assert_eq!(url, "https://node.example.com/download/backup?token=xyz");
    }

    #[tokio::test]
    async fn error_status_maps_to_panel_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": [{
                    "code": "AccessDeniedHttpException",
                    "status": "403",
                    "detail": "This action is unauthorized."
                }]
            })))
            .mount(&server)
            .await;

        let err = panel(&server).fetch_server("srv").await.unwrap_err();
        match err {
            Error::Panel { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "This action is unauthorized.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(error_message("  Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn backup_serializes_camel_case() {
        let mut backup = Backup::new("abc123", "Daily Backup", true, 1000);
        backup.hash = Some("sha1:deadbeef".to_string());
        let value = serde_json::to_value(&backup).unwrap();
        assert_eq!(value["uuid"], "abc123");
        assert_eq!(value["successful"], true);
        assert_eq!(value["ignoredFiles"], json!([]));
        assert_eq!(value["hash"], "sha1:deadbeef");
        assert!(value.get("is_successful").is_none());
    }
}
