//! REST client for the training backend.
//!
//! Every call goes through [`ApiClient::send`], which attaches the bearer
//! credential, applies the retry policy and turns non-success responses into
//! [`ApiError::Server`] carrying the backend's `detail` message.

pub mod auth;
pub mod scenarios;
pub mod simulation;

pub use simulation::SimulationBackend;

use crate::config::Config;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("could not reach the server: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Unreachable(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// When a failed request may be sent a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retry {
    /// Only when the request never reached the server.
    OnConnect,
    /// Also after a timeout. Use for calls that are safe to repeat.
    OnConnectOrTimeout,
}

impl Retry {
    fn allows(self, err: &ApiError) -> bool {
        match (self, err) {
            (_, ApiError::Unreachable(_)) => true,
            (Retry::OnConnectOrTimeout, ApiError::Timeout) => true,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.token.clone(), config.request_timeout())
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn get(&self, endpoint: &str) -> RequestBuilder {
        self.authorize(self.client.get(self.url(endpoint)))
    }

    fn post(&self, endpoint: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(endpoint)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request built by `build`, retrying once when `retry` allows.
    ///
    /// `fallback` is the message used when the backend reports a failure
    /// without a `detail` field.
    async fn send<F>(&self, build: F, retry: Retry, fallback: &str) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = match build().send().await.map_err(ApiError::from_reqwest) {
            Ok(response) => response,
            Err(err) if retry.allows(&err) => {
                warn!(error = %err, "Request failed, retrying once");
                build().send().await.map_err(ApiError::from_reqwest)?
            }
            Err(err) => return Err(err),
        };

        let status = response.status();
        debug!(url = %response.url(), %status, "Backend responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Server {
            status: status.as_u16(),
            message: detail_message(&body).unwrap_or_else(|| fallback.to_string()),
        })
    }

    /// Decodes a JSON body. An empty body yields `None`.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ApiError> {
        let text = response.text().await.map_err(ApiError::from_reqwest)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn decode_required<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        Self::decode(response)
            .await?
            .ok_or_else(|| ApiError::Decode("empty response body".to_string()))
    }
}

/// Pulls the human-readable `detail` out of an error body.
fn detail_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_detail_message_variants() {
        assert_eq!(
            detail_message(r#"{"detail": "Scenario not found"}"#),
            Some("Scenario not found".to_string())
        );
        assert_eq!(
            detail_message(r#"{"detail": [{"msg": "field required"}]}"#),
            Some(r#"[{"msg":"field required"}]"#.to_string())
        );
        assert_eq!(detail_message(r#"{"error": "nope"}"#), None);
        assert_eq!(detail_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn test_retry_policy() {
        let unreachable = ApiError::Unreachable("refused".into());
        assert!(Retry::OnConnect.allows(&unreachable));
        assert!(!Retry::OnConnect.allows(&ApiError::Timeout));
        assert!(Retry::OnConnectOrTimeout.allows(&ApiError::Timeout));
        assert!(!Retry::OnConnectOrTimeout.allows(&ApiError::Server {
            status: 500,
            message: "boom".into()
        }));
    }

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let client = test_server::client("http://localhost:8000/", None);
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_server_error_uses_fallback_without_detail() {
        let router = Router::new().route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }),
        );
        let base = test_server::spawn(router).await;
        let client = test_server::client(&base, None);

        let err = client
            .send(|| client.get("/broken"), Retry::OnConnect, "API call failed")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 500,
                message: "API call failed".into()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_success_body_decodes_to_none() {
        let router = Router::new().route("/empty", get(|| async { StatusCode::OK }));
        let base = test_server::spawn(router).await;
        let client = test_server::client(&base, None);

        let response = client
            .send(|| client.get("/empty"), Retry::OnConnect, "API call failed")
            .await
            .unwrap();
        let decoded: Option<serde_json::Value> = ApiClient::decode(response).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/flaky",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_GATEWAY, Json(json!({"detail": "upstream down"})))
                }
            }),
        );
        let base = test_server::spawn(router).await;
        let client = test_server::client(&base, None);

        let err = client
            .send(|| client.get("/flaky"), Retry::OnConnectOrTimeout, "API call failed")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upstream down");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_reported() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = test_server::client(&format!("http://{}", addr), None);
        let err = client
            .send(|| client.get("/anything"), Retry::OnConnect, "API call failed")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unreachable(_)), "got {err:?}");
    }
}
