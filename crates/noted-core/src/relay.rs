//! HTTP client for the Noted relay backend.
//!
//! The relay holds the workspace OAuth tokens; this client only ever sends
//! the remote user id. Endpoints:
//!
//! | Call                          | Route                          |
//! |-------------------------------|--------------------------------|
//! | status check                  | `GET  /user/{id}/status`       |
//! | discover latest authorization | `GET  /oauth/check-completion` |
//! | summarize + categorize        | `POST /summarize-and-categorize` |
//! | summarize only                | `POST /summarize`              |
//! | save entry                    | `POST /notion/save`            |
//! | categories                    | `GET  /categories`             |
//! | health                        | `GET  /admin/health`           |
//! | authorization entry point     | `GET  /auth/notion/login`      |

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::link::identity::redact;
use crate::link::reconciler::{IdentitySource, LinkStatus};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoverResponse {
    #[serde(alias = "has_candidate")]
    pub has_users: bool,
    #[serde(default, alias = "candidate_id")]
    pub latest_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarizeRequest<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    pub openai_api_key: &'a str,
}

/// Summary and topic category produced for an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveEntryRequest {
    pub summary: String,
    pub url: String,
    pub title: String,
    pub user_id: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SavedEntry {
    #[serde(alias = "entry_url")]
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Categories {
    pub categories: Vec<String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// FastAPI-style error body; `detail` is a string or a validation list.
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Client for one relay deployment.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base: Url,
}

impl RelayClient {
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(RelayError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Where the user starts authorization; the relay handles the callback.
    pub fn login_url(&self) -> Url {
        self.url(&["auth", "notion", "login"])
    }

    /// Open the authorization page in the system browser.
    pub fn open_login(&self) -> std::io::Result<()> {
        open::that(self.login_url().as_str())
    }

    pub async fn status(&self, user_id: &str) -> Result<LinkStatus, RelayError> {
        debug!(user = %redact(user_id), "probing link status");
        let resp = self
            .http
            .get(self.url(&["user", user_id, "status"]))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn discover(&self) -> Result<DiscoverResponse, RelayError> {
        let resp = self
            .http
            .get(self.url(&["oauth", "check-completion"]))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn summarize_and_categorize(
        &self,
        content: &str,
        title: Option<&str>,
        api_key: &str,
    ) -> Result<Summary, RelayError> {
        let body = SummarizeRequest {
            content,
            title,
            openai_api_key: api_key,
        };
        let resp = self
            .http
            .post(self.url(&["summarize-and-categorize"]))
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }

    /// Summary only, without a category.
    pub async fn summarize(&self, content: &str, api_key: &str) -> Result<String, RelayError> {
        let body = SummarizeRequest {
            content,
            title: None,
            openai_api_key: api_key,
        };
        let resp = self
            .http
            .post(self.url(&["summarize"]))
            .json(&body)
            .send()
            .await?;
        let summary: Summary = decode(resp).await?;
        Ok(summary.summary)
    }

    pub async fn save_entry(&self, request: &SaveEntryRequest) -> Result<SavedEntry, RelayError> {
        debug!(user = %redact(&request.user_id), category = %request.category, "saving entry");
        let resp = self
            .http
            .post(self.url(&["notion", "save"]))
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn categories(&self) -> Result<Categories, RelayError> {
        let resp = self.http.get(self.url(&["categories"])).send().await?;
        decode(resp).await
    }

    pub async fn health(&self) -> Result<Health, RelayError> {
        let resp = self.http.get(self.url(&["admin", "health"])).send().await?;
        decode(resp).await
    }

    /// Base URL plus percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl IdentitySource for RelayClient {
    async fn status(&self, remote_id: &str) -> Result<LinkStatus, RelayError> {
        RelayClient::status(self, remote_id).await
    }

    async fn discover_latest(&self) -> Result<Option<String>, RelayError> {
        let found = self.discover().await?;
        Ok(found
            .latest_user_id
            .filter(|id| found.has_users && !id.is_empty()))
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RelayError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(error_for(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| RelayError::Decode(e.to_string()))
}

fn error_for(status: StatusCode, body: &str) -> RelayError {
    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
        Err(_) => body.to_string(),
    };
    // The relay's save handler re-raises its own 401 as a 500 with the
    // original message folded into `detail`.
    let auth_in_detail = detail.to_ascii_lowercase().contains("not authenticated");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RelayError::Unauthorized { detail },
        _ if status.is_server_error() && auth_in_detail => RelayError::Unauthorized { detail },
        _ => RelayError::Server {
            status: status.as_u16(),
            detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::reconciler::{StatusAction, StatusReason};
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> RelayClient {
        RelayClient::new(&RelayConfig {
            base_url: server.url(),
            request_timeout_secs: 5,
            max_content_chars: 4000,
        })
        .unwrap()
    }

    #[test]
    fn test_urls_keep_base_path_and_encode_ids() {
        let client = RelayClient::new(&RelayConfig {
            base_url: "https://relay.example.com/api/".into(),
            ..RelayConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.url(&["user", "a b/c", "status"]).as_str(),
            "https://relay.example.com/api/user/a%20b%2Fc/status"
        );
        assert_eq!(
            client.login_url().as_str(),
            "https://relay.example.com/api/auth/notion/login"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = RelayClient::new(&RelayConfig {
            base_url: "not a url".into(),
            ..RelayConfig::default()
        });
        assert!(matches!(result, Err(RelayError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_status_connected() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user/u-9/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"connected": true, "reason": "valid_token", "message": "Token is valid and working",
                    "workspace_id": "ws-1", "workspace_name": "Acme"}"#,
            )
            .create_async()
            .await;

        let status = client_for(&server).status("u-9").await.unwrap();
        assert!(status.connected);
        assert_eq!(status.reason, Some(StatusReason::ValidToken));
        assert_eq!(status.workspace_name.as_deref(), Some("Acme"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_not_connected_with_clear_action() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/u-9/status")
            .with_status(200)
            .with_body(
                r#"{"connected": false, "reason": "invalid_token", "message": "Token invalid",
                    "action": "clear_extension_storage", "workspace_id": null}"#,
            )
            .create_async()
            .await;

        let status = client_for(&server).status("u-9").await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.reason, Some(StatusReason::InvalidToken));
        assert_eq!(status.action, Some(StatusAction::ClearLocalState));
    }

    #[tokio::test]
    async fn test_status_unknown_reason_is_tolerated() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/u-9/status")
            .with_status(200)
            .with_body(r#"{"connected": false, "reason": "expired_grant"}"#)
            .create_async()
            .await;

        let status = client_for(&server).status("u-9").await.unwrap();
        assert_eq!(status.reason, Some(StatusReason::Other));
    }

    #[tokio::test]
    async fn test_status_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/u-9/status")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let err = client_for(&server).status("u-9").await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, RelayError::Server { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_discover_latest_accepts_both_shapes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/check-completion")
            .with_status(200)
            .with_body(r#"{"has_users": true, "latest_user_id": "u-9"}"#)
            .create_async()
            .await;
        let client = client_for(&server);
        assert_eq!(client.discover_latest().await.unwrap().as_deref(), Some("u-9"));

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/check-completion")
            .with_status(200)
            .with_body(r#"{"has_candidate": true, "candidate_id": "u-7"}"#)
            .create_async()
            .await;
        let client = client_for(&server);
        assert_eq!(client.discover_latest().await.unwrap().as_deref(), Some("u-7"));
    }

    #[tokio::test]
    async fn test_discover_latest_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/oauth/check-completion")
            .with_status(200)
            .with_body(r#"{"has_users": false, "latest_user_id": null}"#)
            .create_async()
            .await;
        assert_eq!(client_for(&server).discover_latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_summarize_and_categorize_sends_key_and_title() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/summarize-and-categorize")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "content": "text",
                "title": "Title",
                "openai_api_key": "sk-test"
            })))
            .with_status(200)
            .with_body(r#"{"summary": "short", "category": "Technology"}"#)
            .create_async()
            .await;

        let summary = client_for(&server)
            .summarize_and_categorize("text", Some("Title"), "sk-test")
            .await
            .unwrap();
        assert_eq!(summary.summary, "short");
        assert_eq!(summary.category.as_deref(), Some("Technology"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_summarize_error_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/summarize")
            .with_status(500)
            .with_body(r#"{"detail": "Failed to generate summary: OpenAI API error"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .summarize("text", "sk-test")
            .await
            .unwrap_err();
        match err {
            RelayError::Server { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "Failed to generate summary: OpenAI API error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_entry_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notion/save")
            .with_status(401)
            .with_body(r#"{"detail": "User not authenticated with Notion"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .save_entry(&SaveEntryRequest {
                summary: "s".into(),
                url: "https://example.com".into(),
                title: "t".into(),
                user_id: "u-9".into(),
                category: "General News".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_save_entry_wrapped_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notion/save")
            .with_status(500)
            .with_body(
                r#"{"detail": "Failed to save to Notion: 401: User not authenticated with Notion"}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .save_entry(&SaveEntryRequest {
                summary: "s".into(),
                url: "https://example.com".into(),
                title: "t".into(),
                user_id: "u-9".into(),
                category: "General News".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_save_entry_returns_page_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notion/save")
            .match_body(Matcher::PartialJson(serde_json::json!({"user_id": "u-9"})))
            .with_status(200)
            .with_body(r#"{"page_url": "https://notion.so/page-1"}"#)
            .create_async()
            .await;

        let saved = client_for(&server)
            .save_entry(&SaveEntryRequest {
                summary: "s".into(),
                url: "https://example.com".into(),
                title: "t".into(),
                user_id: "u-9".into(),
                category: "Technology".into(),
            })
            .await
            .unwrap();
        assert_eq!(saved.page_url, "https://notion.so/page-1");
    }

    #[tokio::test]
    async fn test_categories_and_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/categories")
            .with_status(200)
            .with_body(
                r#"{"categories": ["Technology", "Science"],
                    "descriptions": {"Technology": "Tech news", "Science": "Research"}}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/admin/health")
            .with_status(200)
            .with_body(r#"{"status": "healthy", "total_users": 3, "timestamp": "2026-01-01T00:00:00"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let categories = client.categories().await.unwrap();
        assert_eq!(categories.categories, vec!["Technology", "Science"]);
        assert_eq!(categories.descriptions["Science"], "Research");

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.total_users, 3);
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/admin/health")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server).health().await.unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }
}
