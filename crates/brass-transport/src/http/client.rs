//! Action emitter over plain HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use brass_core::{
    ActionResponse, ApiError, ApiResult, Emitter, EmitterExt, TransportError, TransportResult,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Emitter settings.
#[derive(Debug, Clone)]
pub struct HttpEmitterConfig {
    /// Base URL; actions are posted to `<url>/<action>`.
    pub url: String,
    pub access_token: Option<String>,
    /// Resolved with `get_login_info` when `None`.
    pub self_id: Option<i64>,
    pub timeout: Duration,
}

impl HttpEmitterConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            self_id: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Posts one request per action to the gateway's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpEmitter {
    client: Client,
    url: String,
    access_token: Option<String>,
    self_id: i64,
}

impl HttpEmitter {
    /// Builds the emitter, asking the gateway for its identity if the config
    /// does not name one.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built or identity discovery fails.
    pub async fn connect(config: HttpEmitterConfig) -> ApiResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        let mut emitter = Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            access_token: config.access_token.filter(|t| !t.is_empty()),
            self_id: config.self_id.unwrap_or_default(),
        };

        if config.self_id.is_none() {
            warn!(url = %emitter.url, "No self_id configured, asking the gateway");
            emitter.self_id = emitter.get_login_info().await?.user_id;
        }
        info!(url = %emitter.url, self_id = emitter.self_id, "HTTP emitter ready");
        Ok(emitter)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Emitter for HttpEmitter {
    fn self_id(&self) -> i64 {
        self.self_id
    }

    async fn call(&self, action: &str, params: Value) -> ApiResult<Value> {
        let url = format!("{}/{}", self.url, action);
        trace!(self_id = self.self_id, action, "Posting action");

        let mut request = self.client.post(&url).json(&params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    action: action.to_string(),
                }
            } else {
                ApiError::Transport(TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        if status != StatusCode::OK {
            debug!(action, status = status.as_u16(), "Action rejected");
            return Err(ApiError::HttpStatus {
                action: action.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ActionResponse = serde_json::from_str(&body)?;
        envelope.into_data(action, &body)
    }
}

/// Checks an emitter config without touching the network.
pub(crate) fn validate(config: &HttpEmitterConfig) -> TransportResult<()> {
    if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
        return Err(TransportError::InvalidConfig(format!(
            "emitter url `{}` must start with http:// or https://",
            config.url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::{Json, Router, routing::post};
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    /// A fake gateway answering `/<action>`.
    async fn gateway() -> (String, Seen) {
        async fn action(
            State(seen): State<Seen>,
            Path(action): Path<String>,
            headers: HeaderMap,
            Json(params): Json<Value>,
        ) -> (StatusCode, String) {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen.lock().push((action.clone(), auth, params));
            match action.as_str() {
                "get_login_info" => (
                    StatusCode::OK,
                    json!({"status": "ok", "retcode": 0, "data": {"user_id": 42, "nickname": "bot"}})
                        .to_string(),
                ),
                "send_private_msg" => (
                    StatusCode::OK,
                    json!({"status": "ok", "retCode": 0, "data": {"message_id": 9}}).to_string(),
                ),
                "delete_msg" => (
                    StatusCode::OK,
                    json!({"status": "failed", "retcode": 100, "data": null}).to_string(),
                ),
                _ => (StatusCode::NOT_FOUND, "no such action".to_string()),
            }
        }

        let seen = Seen::default();
        let app = Router::new()
            .route("/{action}", post(action))
            .with_state(seen.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn discovers_identity_and_sends_token() {
        let (url, seen) = gateway().await;
        let mut config = HttpEmitterConfig::new(format!("{url}/"));
        config.access_token = Some("tok".into());

        let emitter = HttpEmitter::connect(config).await.unwrap();
        assert_eq!(emitter.self_id(), 42);
        assert_eq!(emitter.url(), url);

        let sent = emitter.send_private_msg(7, "hello").await.unwrap();
        assert_eq!(sent.message_id, 9);

        let seen = seen.lock();
        assert_eq!(seen[0].0, "get_login_info");
        assert_eq!(seen[1].0, "send_private_msg");
        assert_eq!(seen[1].1.as_deref(), Some("Bearer tok"));
        assert_eq!(seen[1].2["user_id"], 7);
    }

    #[tokio::test]
    async fn failures_carry_action_and_body() {
        let (url, _seen) = gateway().await;
        let mut config = HttpEmitterConfig::new(url);
        config.self_id = Some(1);
        let emitter = HttpEmitter::connect(config).await.unwrap();

        match emitter.delete_msg(3).await {
            Err(ApiError::Failed {
                action,
                retcode,
                body,
            }) => {
                assert_eq!(action, "delete_msg");
                assert_eq!(retcode, 100);
                assert!(body.contains("failed"));
            }
            other => panic!("unexpected {other:?}"),
        }

        match emitter.call("nope", json!({})).await {
            Err(ApiError::HttpStatus { status, body, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such action");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn url_validation() {
        assert!(validate(&HttpEmitterConfig::new("http://127.0.0.1:5700")).is_ok());
        assert!(validate(&HttpEmitterConfig::new("127.0.0.1:5700")).is_err());
    }
}
