//! Reverse WebSocket: gateways dial in.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{info, trace, warn};

use brass_core::{Driver, EmitterMux, Event, Listener, TransportResult};

use super::connection::{Connection, DEFAULT_ACTION_TIMEOUT, OUTBOUND_CAPACITY};
use crate::registry::EmitterRegistry;
use crate::serve::{self, DEFAULT_SHUTDOWN_GRACE};

/// Server settings.
#[derive(Debug, Clone)]
pub struct WsServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Required as `Authorization: Bearer <token>` when set.
    pub access_token: Option<String>,
    pub action_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/ws".to_string(),
            access_token: None,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Accepts gateway connections; one socket per bot identity.
pub struct WsServer {
    config: WsServerConfig,
    registry: Arc<EmitterRegistry>,
}

impl WsServer {
    pub fn new(config: WsServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(EmitterRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<EmitterRegistry> {
        &self.registry
    }

    async fn run(
        &self,
        listener: TcpListener,
        token: CancellationToken,
        events: mpsc::Sender<Event>,
    ) -> TransportResult<()> {
        let state = ServerState {
            access_token: self
                .config
                .access_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(Arc::from),
            action_timeout: self.config.action_timeout,
            registry: self.registry.clone(),
            events,
            token: token.clone(),
        };

        let path = if self.config.path.starts_with('/') {
            self.config.path.clone()
        } else {
            format!("/{}", self.config.path)
        };
        let router = Router::new().route(&path, get(upgrade)).with_state(state);

        serve::serve(
            listener,
            router,
            token,
            self.config.shutdown_grace,
            "WebSocket",
        )
        .await
    }
}

#[async_trait]
impl Listener for WsServer {
    async fn listen(
        &self,
        token: CancellationToken,
        events: mpsc::Sender<Event>,
    ) -> TransportResult<()> {
        let listener = serve::bind(&self.config.host, self.config.port).await?;
        self.run(listener, token, events).await
    }
}

impl Driver for WsServer {
    fn emitters(&self) -> Arc<dyn EmitterMux> {
        self.registry.clone()
    }
}

#[derive(Clone)]
struct ServerState {
    access_token: Option<Arc<str>>,
    action_timeout: Duration,
    registry: Arc<EmitterRegistry>,
    events: mpsc::Sender<Event>,
    token: CancellationToken,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if !authorized(state.access_token.as_deref(), &headers) {
        warn!(remote_addr = %addr, "Rejected WebSocket upgrade with bad token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    info!(remote_addr = %addr, "Gateway connecting");
    ws.on_upgrade(move |socket| serve_socket(socket, addr, state))
}

/// `Authorization: Bearer <token>`, compared case-insensitively.
fn authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case(&format!("Bearer {expected}")))
}

async fn serve_socket(socket: WebSocket, addr: SocketAddr, state: ServerState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut frames) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let conn = Connection::new(
        addr.to_string(),
        outbound,
        state.registry.clone(),
        state.events.clone(),
        state.action_timeout,
    );

    let writer = tokio::spawn(
        async move {
            while let Some(frame) = frames.recv().await {
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    warn!(remote_addr = %addr, error = %e, "Failed to write frame");
                    break;
                }
            }
            let _ = sink.close().await;
        }
        .with_current_subscriber(),
    );

    loop {
        let message = tokio::select! {
            _ = state.token.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => conn.on_frame(text.as_str().as_bytes().to_vec()),
            Some(Ok(Message::Binary(data))) => conn.on_frame(data.to_vec()),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => trace!(remote_addr = %addr, "Control frame"),
            Some(Err(e)) => {
                warn!(remote_addr = %addr, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    conn.close();
    writer.abort();
    info!(remote_addr = %addr, "Gateway disconnected");
}
