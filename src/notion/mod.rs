use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::notion::model::{QueryDatabaseResp, RetrieveDatabaseResp};

pub mod model;

const NOTION_API_BASE: &str = "https://api.notion.com/";

/// Failure modes of a single Notion request.
#[derive(Debug, Error)]
pub enum NotionError {
    #[error("access denied by Notion ({status})")]
    AccessDenied { status: u16 },
    #[error("not found")]
    NotFound,
    #[error("notion error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid Notion response: {0}")]
    Decode(String),
}

impl NotionError {
    /// Only transport failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotionError::Transport(_))
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NotionError::AccessDenied {
                status: status.as_u16(),
            },
            StatusCode::NOT_FOUND => NotionError::NotFound,
            _ => NotionError::Http {
                status: status.as_u16(),
                body,
            },
        }
    }
}

/// Read-only view of the Notion database API used by the fetcher.
#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn retrieve_database(&self, database_id: &str)
        -> Result<RetrieveDatabaseResp, NotionError>;

    async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
        page_size: u32,
    ) -> Result<QueryDatabaseResp, NotionError>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String) -> anyhow::Result<Self> {
        let base_url = Url::parse(NOTION_API_BASE).expect("valid default Notion URL");
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("notion-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            base_url,
            token,
            version,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.notion.base_url).context("invalid notion.base_url")?;
        Self::with_base_url(cfg.notion.token.clone(), cfg.notion.version.clone(), base_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, NotionError> {
        self.base_url
            .join(path)
            .map_err(|err| NotionError::Decode(format!("invalid endpoint {path}: {err}")))
    }

    pub fn build_retrieve_request(&self, database_id: &str) -> Result<reqwest::Request, NotionError> {
        let url = self.endpoint(&format!("v1/databases/{}", database_id))?;
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version)
            .build()
            .map_err(|err| NotionError::Decode(err.to_string()))
    }

    pub fn build_query_request(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
        page_size: u32,
    ) -> Result<reqwest::Request, NotionError> {
        let url = self.endpoint(&format!("v1/databases/{}/query", database_id))?;
        self.http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version)
            .header("Content-Type", "application/json")
            .json(&query_body(start_cursor, page_size))
            .build()
            .map_err(|err| NotionError::Decode(err.to_string()))
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, NotionError> {
        debug!(method=%request.method(), url=%request.url(), "sending notion request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|err| NotionError::Transport(err.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            debug!(%status, %body, "notion request failed");
            return Err(NotionError::from_status(status, body));
        }

        res.json::<T>()
            .await
            .map_err(|err| NotionError::Decode(err.to_string()))
    }
}

pub fn query_body(start_cursor: Option<&str>, page_size: u32) -> Value {
    let mut body = json!({ "page_size": page_size });
    if let Some(cursor) = start_cursor {
        body["start_cursor"] = Value::String(cursor.to_string());
    }
    body
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn retrieve_database(
        &self,
        database_id: &str,
    ) -> Result<RetrieveDatabaseResp, NotionError> {
        let request = self.build_retrieve_request(database_id)?;
        self.execute(request).await
    }

    async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
        page_size: u32,
    ) -> Result<QueryDatabaseResp, NotionError> {
        let request = self.build_query_request(database_id, start_cursor, page_size)?;
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> NotionClient {
        NotionClient::new("token".into(), "2022-06-28".into()).unwrap()
    }

    #[test]
    fn query_body_includes_cursor_only_when_present() {
        assert_eq!(query_body(None, 100), json!({ "page_size": 100 }));
        assert_eq!(
            query_body(Some("abc"), 100),
            json!({ "page_size": 100, "start_cursor": "abc" })
        );
    }

    #[test]
    fn retrieve_request_sets_headers() {
        let request = client().build_retrieve_request("db-1").unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/v1/databases/db-1");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        assert_eq!(
            headers
                .get("Notion-Version")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "2022-06-28"
        );
    }

    #[test]
    fn query_request_posts_json() {
        let request = client()
            .build_query_request("db-1", Some("cur"), 100)
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/databases/db-1/query");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let parsed: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed["start_cursor"], "cur");
        assert_eq!(parsed["page_size"], 100);
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            NotionError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            NotionError::AccessDenied { status: 401 }
        ));
        assert!(matches!(
            NotionError::from_status(StatusCode::FORBIDDEN, String::new()),
            NotionError::AccessDenied { status: 403 }
        ));
        assert!(matches!(
            NotionError::from_status(StatusCode::NOT_FOUND, String::new()),
            NotionError::NotFound
        ));
        assert!(matches!(
            NotionError::from_status(StatusCode::BAD_GATEWAY, "oops".into()),
            NotionError::Http { status: 502, .. }
        ));
        assert!(!NotionError::NotFound.is_transient());
        assert!(NotionError::Transport("reset".into()).is_transient());
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("token\""));
        assert!(rendered.contains("api.notion.com"));
    }
}
