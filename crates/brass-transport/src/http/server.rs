//! Webhook listener.
//!
//! One POST per gateway event. Message and notice events are answered
//! inline: the response is held open until a handler replies, every handler
//! is done with the event, or the reply window closes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::Value;
use sha1::Sha1;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use brass_core::{
    Event, Listener, PostType, ReplyError, ReplyResult, Replyer, TransportError, TransportResult,
};

use crate::serve::{self, DEFAULT_SHUTDOWN_GRACE};

type HmacSha1 = Hmac<Sha1>;

/// Header carrying `sha1=<hex hmac>` of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Default window for an inline reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Listener settings.
#[derive(Debug, Clone)]
pub struct HttpListenerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Shared secret for [`SIGNATURE_HEADER`]; unsigned posts are accepted
    /// when `None`.
    pub secret: Option<String>,
    pub reply_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for HttpListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/".to_string(),
            secret: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Receives gateway events over HTTP POST.
pub struct HttpListener {
    config: HttpListenerConfig,
}

impl HttpListener {
    pub fn new(config: HttpListenerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HttpListenerConfig {
        &self.config
    }
}

#[async_trait]
impl Listener for HttpListener {
    async fn listen(
        &self,
        token: CancellationToken,
        events: mpsc::Sender<Event>,
    ) -> TransportResult<()> {
        let listener = serve::bind(&self.config.host, self.config.port).await?;
        let state = WebhookState {
            secret: self.config.secret.as_deref().filter(|s| !s.is_empty()).map(Arc::from),
            reply_timeout: self.config.reply_timeout,
            events,
        };
        serve::serve(
            listener,
            router(&self.config.path, state),
            token,
            self.config.shutdown_grace,
            "HTTP",
        )
        .await
    }
}

#[derive(Clone)]
pub(crate) struct WebhookState {
    pub(crate) secret: Option<Arc<str>>,
    pub(crate) reply_timeout: Duration,
    pub(crate) events: mpsc::Sender<Event>,
}

pub(crate) fn router(path: &str, state: WebhookState) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Router::new()
        .route(&path, post(webhook))
        .with_state(state)
}

async fn webhook(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.secret {
        let Some(signature) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            warn!("Rejected unsigned webhook");
            return StatusCode::UNAUTHORIZED.into_response();
        };
        if !verify_signature(secret, &body, signature) {
            warn!("Rejected webhook with bad signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let event = match Event::decode(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Invalid event");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    trace!(self_id = event.self_id(), types = %event.types_display(), "Webhook received");

    if !matches!(event.post_type(), PostType::Message | PostType::Notice) {
        if state.events.send(event).await.is_err() {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        return StatusCode::NO_CONTENT.into_response();
    }

    let (replyer, reply) = HttpReplyer::new();
    if state
        .events
        .send(event.with_replyer(Arc::new(replyer)))
        .await
        .is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    // Resolves on reply, or with an error once every handler has dropped
    // the replyer.
    match tokio::time::timeout(state.reply_timeout, reply).await {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Ok(Err(_)) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => {
            debug!(timeout = ?state.reply_timeout, "Reply window closed");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// `sha1=<hex>` signature of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> TransportResult<String> {
    let mut mac = mac(secret)?;
    mac.update(body);
    Ok(format!("sha1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks a [`SIGNATURE_HEADER`] value in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(expected) = signature
        .strip_prefix("sha1=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };
    let Ok(mut mac) = mac(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn mac(secret: &str) -> TransportResult<HmacSha1> {
    HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| TransportError::InvalidConfig(format!("invalid webhook secret: {e}")))
}

/// Inline reply bound to one held-open webhook response.
pub struct HttpReplyer {
    slot: Mutex<Option<oneshot::Sender<Vec<u8>>>>,
}

impl HttpReplyer {
    fn new() -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl Replyer for HttpReplyer {
    async fn reply(&self, operation: Value) -> ReplyResult<()> {
        let body = serde_json::to_vec(&operation)?;
        let Some(tx) = self.slot.lock().take() else {
            return Err(ReplyError::AlreadyReplied);
        };
        tx.send(body).map_err(|_| ReplyError::Expired)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    use brass_core::EventType;

    use super::*;

    const PRIVATE: &str =
        r#"{"post_type":"message","message_type":"private","time":1,"self_id":42,"user_id":7}"#;
    const HEARTBEAT: &str =
        r#"{"post_type":"meta_event","meta_event_type":"heartbeat","time":1,"self_id":42}"#;

    fn app(secret: Option<&str>, reply_timeout: Duration) -> (Router, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(8);
        let state = WebhookState {
            secret: secret.map(Arc::from),
            reply_timeout,
            events: tx,
        };
        (router("/", state), rx)
    }

    fn post(body: &'static str, signature: Option<String>) -> Request<Body> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        request.body(Body::from(body)).unwrap()
    }

    async fn body(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn unsigned_event_is_accepted() {
        let (app, mut rx) = app(None, Duration::from_secs(5));
        let response = tokio::spawn(app.oneshot(post(PRIVATE, None)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.types(), [EventType::Message, EventType::PrivateMessage]);
        assert_eq!(event.self_id(), 42);
        assert!(event.replyer().is_some());

        // Dropping the event releases the response without waiting for the
        // reply window.
        drop(event);
        let response = response.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn signature_checks() {
        let (app, mut rx) = app(Some("s3cret"), Duration::from_millis(10));

        let missing = app.clone().oneshot(post(PRIVATE, None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let forged = sign("other", PRIVATE.as_bytes()).unwrap();
        let forged = app.clone().oneshot(post(PRIVATE, Some(forged))).await.unwrap();
        assert_eq!(forged.status(), StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());

        let signed = sign("s3cret", HEARTBEAT.as_bytes()).unwrap();
        let signed = app.oneshot(post(HEARTBEAT, Some(signed))).await.unwrap();
        assert_eq!(signed.status(), StatusCode::NO_CONTENT);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.types(), [EventType::MetaEvent, EventType::Heartbeat]);
        assert!(event.replyer().is_none());
    }

    #[tokio::test]
    async fn bad_requests() {
        let (app, mut rx) = app(None, Duration::from_millis(10));

        let invalid = app
            .clone()
            .oneshot(post(r#"{"post_type":"message"}"#, None))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let get = Request::builder().uri("/").body(Body::empty()).unwrap();
        let get = app.oneshot(get).await.unwrap();
        assert_eq!(get.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn quick_reply_is_the_response_body() {
        let (app, mut rx) = app(None, Duration::from_secs(5));
        let response = tokio::spawn(app.oneshot(post(PRIVATE, None)));

        let event = rx.recv().await.unwrap();
        let replyer = event.replyer().unwrap().clone();
        replyer.reply(json!({"reply": "hi"})).await.unwrap();
        assert!(matches!(
            replyer.reply(json!({"reply": "again"})).await,
            Err(ReplyError::AlreadyReplied)
        ));

        let response = response.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(body, json!({"reply": "hi"}));
    }

    #[tokio::test]
    async fn late_reply_is_expired() {
        let (app, mut rx) = app(None, Duration::from_millis(20));
        let response = tokio::spawn(app.oneshot(post(PRIVATE, None)));

        let event = rx.recv().await.unwrap();
        let response = response.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body(response).await.is_empty());

        let replyer = event.replyer().unwrap();
        assert!(matches!(
            replyer.reply(json!({"reply": "late"})).await,
            Err(ReplyError::Expired)
        ));
    }

    #[test]
    fn signatures() {
        let signature = sign("key", b"payload").unwrap();
        assert!(signature.starts_with("sha1="));
        assert_eq!(signature.len(), 5 + 40);
        assert!(verify_signature("key", b"payload", &signature));
        assert!(!verify_signature("key", b"payload!", &signature));
        assert!(!verify_signature("key", b"payload", &signature[5..]));
        assert!(!verify_signature("key", b"payload", "sha1=zz"));
    }

    #[test]
    fn signature_uses_the_configured_key() {
        // RFC 2202, HMAC-SHA1 test case 2.
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?").unwrap(),
            "sha1=effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
        let long_key = "k".repeat(200);
        assert_ne!(sign(&long_key, b"x").unwrap(), sign("", b"x").unwrap());
    }
}
