//! HttpSheetService - sheet synchronization over HTTP.
//!
//! Wire protocol:
//!
//! - `GET  {base}/sheets/{slice}` returns a [`RemoteSlice`] as JSON
//! - `PUT  {base}/sheets/{slice}` with `{"rows": [...]}` replaces the sheet
//!   rows and returns `{"revision": "..."}`
//!
//! 401/403 map to `AuthFailure`; everything else that goes wrong (network,
//! timeouts, other statuses, unreadable bodies) maps to `ServiceUnavailable`.

use async_trait::async_trait;
use bizdash_core::config::SyncConfig;
use bizdash_core::{BizdashError, RemoteRow, RemoteSlice, Result, SheetService};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    rows: &'a [RemoteRow],
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    revision: String,
}

/// Sheet service client talking to a remote HTTP endpoint.
#[derive(Clone)]
pub struct HttpSheetService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpSheetService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            api_key,
            timeout,
        }
    }

    /// Builds a client from the `[sync]` section, reading the token from
    /// the configured environment variable.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| BizdashError::config("sync.base_url is not set"))?;
        let api_key = std::env::var(&config.api_key_env).ok();

        tracing::info!(
            "[HttpSheetService] Initialized with URL: {}, API key: {}",
            base_url,
            if api_key.is_some() { "present" } else { "none" }
        );

        Ok(Self::new(
            base_url,
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        ))
    }

    fn sheet_url(&self, slice: &str) -> String {
        format!("{}/sheets/{}", self.base_url, slice)
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            request.header("Authorization", format!("Bearer {}", api_key))
        } else {
            request
        }
    }

    async fn send(&self, slice: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| BizdashError::service_unavailable(slice, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = format!("HTTP {}: {}", status.as_u16(), body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(BizdashError::auth_failure(slice, message))
        } else {
            Err(BizdashError::service_unavailable(slice, message))
        }
    }
}

#[async_trait]
impl SheetService for HttpSheetService {
    async fn fetch_slice(&self, name: &str) -> Result<RemoteSlice> {
        let request = self.auth_request(self.client.get(self.sheet_url(name)));
        let response = self.send(name, request).await?;
        let remote: RemoteSlice = response.json().await.map_err(|e| {
            BizdashError::service_unavailable(name, format!("unreadable response: {}", e))
        })?;

        tracing::debug!(
            "[HttpSheetService] Fetched '{}': {} rows at revision {}",
            name,
            remote.rows.len(),
            remote.revision
        );
        Ok(remote)
    }

    async fn push_slice(&self, name: &str, rows: &[RemoteRow]) -> Result<String> {
        let request = self
            .auth_request(self.client.put(self.sheet_url(name)))
            .json(&PushRequest { rows });
        let response = self.send(name, request).await?;
        let pushed: PushResponse = response.json().await.map_err(|e| {
            BizdashError::service_unavailable(name, format!("unreadable response: {}", e))
        })?;

        tracing::debug!(
            "[HttpSheetService] Pushed {} rows to '{}', new revision {}",
            rows.len(),
            name,
            pushed.revision
        );
        Ok(pushed.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdash_core::Fields;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpSheetService {
        HttpSheetService::new(
            server.uri(),
            Some("secret-token".to_string()),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_fetch_slice_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheets/revenue"))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [{"key": "q1", "fields": {"amount": 1200}}],
                "revision": "r7",
                "perRecordModifiedAt": {"q1": "2024-01-01T00:00:00Z"}
            })))
            .mount(&server)
            .await;

        let remote = service(&server).fetch_slice("revenue").await.unwrap();
        assert_eq!(remote.revision, "r7");
        assert_eq!(remote.rows.len(), 1);
        assert_eq!(remote.row("q1").unwrap().fields.get("amount"), Some(&json!(1200)));
        assert!(remote.per_record_modified_at.contains_key("q1"));
    }

    #[tokio::test]
    async fn test_push_slice_returns_revision() {
        let server = MockServer::start().await;
        let mut fields = Fields::new();
        fields.insert("amount".to_string(), json!(5));
        let rows = vec![RemoteRow::new("e1", fields)];

        Mock::given(method("PUT"))
            .and(path("/sheets/expenses"))
            .and(body_json(json!({"rows": [{"key": "e1", "fields": {"amount": 5}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"revision": "r8"})))
            .mount(&server)
            .await;

        let revision = service(&server).push_slice("expenses", &rows).await.unwrap();
        assert_eq!(revision, "r8");
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheets/hr"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = service(&server).fetch_slice("hr").await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_server_error_is_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheets/okrs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = service(&server).fetch_slice("okrs").await.unwrap_err();
        assert!(matches!(err, BizdashError::ServiceUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheets/marketing"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"rows": [], "revision": "r1"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let service = HttpSheetService::new(server.uri(), None, Duration::from_millis(50));
        let err = service.fetch_slice("marketing").await.unwrap_err();
        assert!(matches!(err, BizdashError::ServiceUnavailable { .. }));
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let err = HttpSheetService::from_config(&SyncConfig::default()).err().unwrap();
        assert!(matches!(err, BizdashError::Config(_)));
    }
}
