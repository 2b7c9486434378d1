//! Forward WebSocket: dial out to gateway nodes, retrying on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, trace, warn};

use brass_core::{Driver, EmitterMux, Event, Listener, TransportError, TransportResult};

use super::connection::{Connection, DEFAULT_ACTION_TIMEOUT, OUTBOUND_CAPACITY};
use crate::registry::EmitterRegistry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default pause between dial attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// One gateway endpoint.
#[derive(Debug, Clone)]
pub struct WsNode {
    /// `ws://` / `wss://` URL; a bare `host:port` is dialled as `ws://`.
    pub url: String,
    pub access_token: Option<String>,
}

impl WsNode {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
        }
    }

    fn endpoint(&self) -> String {
        if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("ws://{}", self.url)
        }
    }

    fn request(&self) -> TransportResult<Request<()>> {
        let endpoint = self.endpoint();
        let mut request = endpoint.as_str().into_client_request().map_err(|e| {
            TransportError::InvalidConfig(format!("bad node url `{endpoint}`: {e}"))
        })?;
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    pub nodes: Vec<WsNode>,
    pub retry_interval: Duration,
    pub action_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

/// Keeps one connection per configured node alive.
pub struct WsClient {
    config: WsClientConfig,
    registry: Arc<EmitterRegistry>,
}

impl WsClient {
    pub fn new(config: WsClientConfig) -> Self {
        Self {
            config,
            registry: Arc::new(EmitterRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<EmitterRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Listener for WsClient {
    async fn listen(
        &self,
        token: CancellationToken,
        events: mpsc::Sender<Event>,
    ) -> TransportResult<()> {
        if self.config.nodes.is_empty() {
            return Err(TransportError::InvalidConfig(
                "no WebSocket nodes configured".to_string(),
            ));
        }
        // Fail fast on malformed URLs instead of retrying them forever.
        for node in &self.config.nodes {
            node.request()?;
        }

        let mut tasks = JoinSet::new();
        for node in self.config.nodes.clone() {
            let dialer = Dialer {
                node,
                retry_interval: self.config.retry_interval,
                action_timeout: self.config.action_timeout,
                registry: self.registry.clone(),
                events: events.clone(),
                token: token.clone(),
            };
            tasks.spawn(dialer.run().with_current_subscriber());
        }

        token.cancelled().await;
        while tasks.join_next().await.is_some() {}
        info!("WebSocket client stopped");
        Ok(())
    }
}

impl Driver for WsClient {
    fn emitters(&self) -> Arc<dyn EmitterMux> {
        self.registry.clone()
    }
}

struct Dialer {
    node: WsNode,
    retry_interval: Duration,
    action_timeout: Duration,
    registry: Arc<EmitterRegistry>,
    events: mpsc::Sender<Event>,
    token: CancellationToken,
}

impl Dialer {
    async fn run(self) {
        let url = self.node.endpoint();
        let mut ticker = tokio::time::interval(self.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let request = match self.node.request() {
                Ok(request) => request,
                Err(e) => {
                    error!(url = %url, error = %e, "Giving up on node");
                    return;
                }
            };

            debug!(url = %url, "Dialling gateway");
            let dialled = tokio::select! {
                _ = self.token.cancelled() => return,
                dialled = connect_async(request) => dialled,
            };
            match dialled {
                Ok((stream, _)) => {
                    info!(url = %url, "Connected to gateway");
                    self.serve(stream, &url).await;
                    if self.token.is_cancelled() {
                        return;
                    }
                    warn!(url = %url, retry_in = ?self.retry_interval, "Gateway connection lost");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, retry_in = ?self.retry_interval, "Dial failed");
                }
            }
        }
    }

    async fn serve(&self, stream: WsStream, url: &str) {
        let (mut sink, mut source) = stream.split();
        let (outbound, mut frames) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let conn = Connection::new(
            url.to_string(),
            outbound,
            self.registry.clone(),
            self.events.clone(),
            self.action_timeout,
        );

        let writer_url = url.to_string();
        let writer = tokio::spawn(
            async move {
                while let Some(frame) = frames.recv().await {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        warn!(url = %writer_url, error = %e, "Failed to write frame");
                        break;
                    }
                }
                let _ = sink.close().await;
            }
            .with_current_subscriber(),
        );

        loop {
            let message = tokio::select! {
                _ = self.token.cancelled() => break,
                message = source.next() => message,
            };
            match message {
                Some(Ok(Message::Text(text))) => conn.on_frame(text.as_str().as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => conn.on_frame(data.to_vec()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => trace!(url = %url, "Control frame"),
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "WebSocket read failed");
                    break;
                }
            }
        }

        conn.close();
        writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as HandshakeRequest, Response as HandshakeResponse,
    };

    use super::*;
    use crate::ws::connection::tests::{LIFECYCLE, answer};

    /// A loopback address nothing listens on yet.
    async fn free_addr() -> std::net::SocketAddr {
        let scratch = TcpListener::bind("127.0.0.1:0").await.unwrap();
        scratch.local_addr().unwrap()
    }

    #[test]
    fn node_requests() {
        assert_eq!(WsNode::new("127.0.0.1:3001").endpoint(), "ws://127.0.0.1:3001");
        assert_eq!(WsNode::new("wss://gw.example/ws").endpoint(), "wss://gw.example/ws");

        let mut node = WsNode::new("127.0.0.1:3001");
        assert!(node.request().unwrap().headers().get("authorization").is_none());
        node.access_token = Some("tok".into());
        assert_eq!(
            node.request().unwrap().headers()["authorization"],
            "Bearer tok"
        );
    }

    #[tokio::test]
    async fn no_nodes_is_an_error() {
        let client = WsClient::new(WsClientConfig::default());
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            client.listen(CancellationToken::new(), tx).await,
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retries_on_interval_then_registers() {
        let interval = Duration::from_millis(300);
        let late = free_addr().await;
        let never = free_addr().await;

        let mut node = WsNode::new(late.to_string());
        node.access_token = Some("tok".into());
        let client = Arc::new(WsClient::new(WsClientConfig {
            nodes: vec![node, WsNode::new(never.to_string())],
            retry_interval: interval,
            action_timeout: Duration::from_secs(2),
        }));

        let token = CancellationToken::new();
        let (events_tx, mut events) = mpsc::channel(8);
        let started = Instant::now();
        let running = tokio::spawn({
            let client = client.clone();
            let token = token.clone();
            async move { client.listen(token, events_tx).await }
        });

        // The first dial hits a closed port; bring the gateway up afterwards.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let gateway = TcpListener::bind(late).await.unwrap();
        let (socket, _) = gateway.accept().await.unwrap();
        assert!(started.elapsed() >= interval);

        let auth = Arc::new(Mutex::new(None));
        let seen = auth.clone();
        let mut gateway = accept_hdr_async(
            socket,
            move |request: &HandshakeRequest, response: HandshakeResponse| {
                *seen.lock() = request
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(response)
            },
        )
        .await
        .unwrap();
        assert_eq!(auth.lock().as_deref(), Some("Bearer tok"));

        gateway.send(Message::Text(LIFECYCLE.into())).await.unwrap();
        assert_eq!(events.recv().await.unwrap().self_id(), 42);
        assert_eq!(client.registry().self_ids(), [42]);

        // Answer the version query so nothing is left hanging.
        if let Some(Ok(Message::Text(frame))) = gateway.next().await {
            let reply = answer(frame.as_str(), serde_json::json!({"app_name": "test"}));
            gateway.send(Message::Text(reply.into())).await.unwrap();
        }

        token.cancel();
        running.await.unwrap().unwrap();
        assert!(client.registry().is_empty());
    }
}
