use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{AUTHORIZATION, COOKIE},
    Client,
};
use serde_json::Value;
use slack_reader_config::SlackConfig;
use thiserror::Error;
use tracing::debug;

pub type Params = BTreeMap<String, String>;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("slack API {method}: {message}")]
    Transport { method: String, message: String },
    #[error("slack API {method}: {code}")]
    Rejected { method: String, code: String },
    #[error("unmarshal {method} response: {message}")]
    Decode { method: String, message: String },
}

impl ApiError {
    pub fn transport(method: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn rejected(method: &str, code: impl Into<String>) -> Self {
        Self::Rejected {
            method: method.to_string(),
            code: code.into(),
        }
    }

    pub fn decode(method: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::Transport { method, .. }
            | Self::Rejected { method, .. }
            | Self::Decode { method, .. } => method,
        }
    }
}

/// The single remote capability the rest of the workspace depends on: call a
/// Web API method with flat string parameters and get the decoded body back.
/// Implementations must surface `ok: false` payloads as [`ApiError::Rejected`].
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value>;
}

#[derive(Clone)]
pub struct SlackClient {
    base_url: String,
    token: String,
    cookie: Option<String>,
    http: Client,
}

impl SlackClient {
    pub fn new(cfg: &SlackConfig) -> Result<Self> {
        let base_url = cfg.resolved_api_base_url()?;
        let timeout = Duration::try_from_secs_f64(cfg.timeout_seconds.max(1.0))
            .with_context(|| format!("invalid timeout_seconds {}", cfg.timeout_seconds))?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("failed to construct reqwest client")?;

        Ok(Self {
            base_url,
            token: cfg.token.trim().to_string(),
            cookie: cookie_header(&cfg.cookies),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value> {
        debug!(method, params = params.len(), "slack api call");

        let mut req = self.http.post(self.method_url(method)).form(params);
        if !self.token.is_empty() {
            req = req.header(AUTHORIZATION, format!("Bearer {}", self.token));
        }
        if let Some(cookie) = &self.cookie {
            req = req.header(COOKIE, cookie.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|err| ApiError::transport(method, err.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|err| {
            ApiError::transport(
                method,
                format!("failed to read response body (status {status}): {err}"),
            )
        })?;

        if !status.is_success() {
            return Err(ApiError::transport(
                method,
                format!("slack returned {status}: {}", text.trim()),
            ));
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|err| ApiError::decode(method, err.to_string()))?;
        check_ok(method, body)
    }
}

/// Applies the Web API envelope rule: anything without `"ok": true` is a
/// rejection carrying the remote `error` code.
pub fn check_ok(method: &str, body: Value) -> ApiResult<Value> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }

    let code = body
        .get("error")
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty())
        .unwrap_or("unknown error");
    Err(ApiError::rejected(method, code))
}

// Credentials are stored as a query string ("d=xoxd-...&d-s=123"); the
// Cookie header wants "d=xoxd-...; d-s=123".
fn cookie_header(raw: &str) -> Option<String> {
    let pairs: Vec<&str> = raw
        .trim()
        .split(['&', ';'])
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Form, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn test_slack_config(url: String) -> SlackConfig {
        SlackConfig {
            workspace: "myteam".to_string(),
            api_base_url: url,
            token: "xoxc-test".to_string(),
            cookies: "d=xoxd-secret".to_string(),
            timeout_seconds: 5.0,
            user_agent: "slack-reader-test".to_string(),
        }
    }

    async fn spawn_mock_server() -> String {
        async fn handler(
            Path(method): Path<String>,
            headers: HeaderMap,
            Form(params): Form<HashMap<String, String>>,
        ) -> (StatusCode, String) {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "Bearer xoxc-test");
            let has_cookie = headers
                .get("cookie")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("d=xoxd-secret"));
            if !authorized || !has_cookie {
                return (
                    StatusCode::OK,
                    json!({"ok": false, "error": "not_authed"}).to_string(),
                );
            }

            match method.as_str() {
                "conversations.history" => (
                    StatusCode::OK,
                    json!({"ok": true, "echo": params}).to_string(),
                ),
                "channel.missing" => (
                    StatusCode::OK,
                    json!({"ok": false, "error": "channel_not_found"}).to_string(),
                ),
                "silent.failure" => (StatusCode::OK, json!({"ok": false}).to_string()),
                "server.error" => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
                "not.json" => (StatusCode::OK, "<html>nope</html>".to_string()),
                _ => (
                    StatusCode::OK,
                    json!({"ok": false, "error": "unknown_method"}).to_string(),
                ),
            }
        }

        let app = Router::new().route("/api/:method", post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        format!("http://{}/api", addr)
    }

    #[test]
    fn cookie_header_joins_query_pairs() {
        assert_eq!(
            cookie_header("d=xoxd-abc&d-s=123"),
            Some("d=xoxd-abc; d-s=123".to_string())
        );
        assert_eq!(cookie_header("  "), None);
    }

    #[test]
    fn check_ok_defaults_missing_error_code() {
        let err = check_ok("users.list", json!({"ok": false})).expect_err("rejected");
        assert_eq!(err.to_string(), "slack API users.list: unknown error");
        assert_eq!(err.method(), "users.list");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn call_posts_form_params_with_credentials() {
        let base_url = spawn_mock_server().await;
        let client = SlackClient::new(&test_slack_config(base_url)).expect("new client");

        let mut params = Params::new();
        params.insert("channel".to_string(), "C0123ABCDE".to_string());
        params.insert("limit".to_string(), "200".to_string());

        let body = client
            .call("conversations.history", &params)
            .await
            .expect("history call");
        assert_eq!(body["echo"]["channel"], "C0123ABCDE");
        assert_eq!(body["echo"]["limit"], "200");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn call_surfaces_remote_error_code() {
        let base_url = spawn_mock_server().await;
        let client = SlackClient::new(&test_slack_config(base_url)).expect("new client");

        let err = client
            .call("channel.missing", &Params::new())
            .await
            .expect_err("expected rejection");
        assert!(matches!(
            &err,
            ApiError::Rejected { code, .. } if code == "channel_not_found"
        ));

        let err = client
            .call("silent.failure", &Params::new())
            .await
            .expect_err("expected rejection");
        assert!(matches!(
            &err,
            ApiError::Rejected { code, .. } if code == "unknown error"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn call_includes_status_and_body_on_http_failure() {
        let base_url = spawn_mock_server().await;
        let client = SlackClient::new(&test_slack_config(base_url)).expect("new client");

        let err = client
            .call("server.error", &Params::new())
            .await
            .expect_err("expected HTTP failure");

        assert!(matches!(err, ApiError::Transport { .. }));
        let msg = err.to_string();
        assert!(msg.contains("server.error"));
        assert!(msg.contains("500"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn call_reports_undecodable_body() {
        let base_url = spawn_mock_server().await;
        let client = SlackClient::new(&test_slack_config(base_url)).expect("new client");

        let err = client
            .call("not.json", &Params::new())
            .await
            .expect_err("expected decode failure");
        assert!(matches!(err, ApiError::Decode { .. }));
        assert!(err.to_string().starts_with("unmarshal not.json response"));
    }

    #[test]
    fn infinite_timeout_is_an_error_not_a_panic() {
        let mut cfg = test_slack_config("http://127.0.0.1:1/api".to_string());
        cfg.timeout_seconds = f64::INFINITY;

        let err = SlackClient::new(&cfg)
            .err()
            .expect("infinite timeout should be rejected");
        assert!(err.to_string().contains("invalid timeout_seconds"), "{err:#}");
    }
}
