//! State shared by the server and client sockets.
//!
//! ```text
//! read loop ──frame──► spawn ─┬─ echo present  ─► PendingCalls[echo] ─► waiting call()
//!                             └─ event         ─► registry (meta) ─► events channel
//! call() ──► PendingCalls.register(echo) ──► outbound ──► writer task ──► socket
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::instrument::WithSubscriber;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use brass_core::{
    ActionRequest, ActionResponse, ApiError, ApiResult, Emitter, Event, Frame, PostType,
    ReplyError, ReplyResult, Replyer, actions,
};

use crate::registry::EmitterRegistry;

/// Default wait for an action's response.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames queued for one socket's writer.
pub(crate) const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// PendingCalls
// =============================================================================

/// In-flight actions on one socket, keyed by echo.
#[derive(Default)]
pub(crate) struct PendingCalls {
    slots: Mutex<HashMap<String, oneshot::Sender<ActionResponse>>>,
}

impl PendingCalls {
    /// Registers `echo` before its request is written.
    fn register(self: &Arc<Self>, echo: &str) -> (oneshot::Receiver<ActionResponse>, PendingGuard) {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(echo.to_string(), tx);
        let guard = PendingGuard {
            calls: self.clone(),
            echo: echo.to_string(),
        };
        (rx, guard)
    }

    /// Hands `response` to its waiter. Returns `false` for an unknown echo,
    /// e.g. one whose caller already timed out.
    fn resolve(&self, response: ActionResponse) -> bool {
        let Some(echo) = response.echo.as_deref() else {
            return false;
        };
        let Some(tx) = self.slots.lock().remove(echo) else {
            return false;
        };
        tx.send(response).is_ok()
    }

    /// Fails every waiter with [`ApiError::NotConnected`].
    fn clear(&self) {
        self.slots.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Removes the slot when the call finishes, whatever the outcome.
struct PendingGuard {
    calls: Arc<PendingCalls>,
    echo: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.calls.slots.lock().remove(&self.echo);
    }
}

// =============================================================================
// WsEmitter
// =============================================================================

/// Emitter bound to one socket and identity.
pub struct WsEmitter {
    self_id: i64,
    outbound: mpsc::Sender<String>,
    pending: Arc<PendingCalls>,
    timeout: Duration,
}

#[async_trait]
impl Emitter for WsEmitter {
    fn self_id(&self) -> i64 {
        self.self_id
    }

    async fn call(&self, action: &str, params: Value) -> ApiResult<Value> {
        let echo = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&ActionRequest {
            action,
            params,
            echo: Some(&echo),
        })?;

        let (response, _guard) = self.pending.register(&echo);
        // One deadline covers queueing the frame and waiting for the answer.
        let exchange = async {
            self.outbound
                .send(frame)
                .await
                .map_err(|_| ApiError::NotConnected)?;
            trace!(self_id = self.self_id, action, echo = %echo, "Action sent");
            response.await.map_err(|_| ApiError::NotConnected)
        };

        let response = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(self_id = self.self_id, action, echo = %echo, "Action timed out");
                return Err(ApiError::Timeout {
                    action: action.to_string(),
                });
            }
        };

        let body = if response.is_failed() {
            serde_json::to_string(&response)?
        } else {
            String::new()
        };
        response.into_data(action, &body)
    }
}

// =============================================================================
// WsReplyer
// =============================================================================

/// Quick operation sent as a `.handle_quick_operation` action carrying the
/// original event.
pub struct WsReplyer {
    emitter: Arc<WsEmitter>,
    context: Value,
    replied: AtomicBool,
}

impl WsReplyer {
    fn new(emitter: Arc<WsEmitter>, context: Value) -> Self {
        Self {
            emitter,
            context,
            replied: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Replyer for WsReplyer {
    async fn reply(&self, operation: Value) -> ReplyResult<()> {
        if self.replied.swap(true, Ordering::SeqCst) {
            return Err(ReplyError::AlreadyReplied);
        }
        let params = json!({ "context": self.context, "operation": operation });
        self.emitter
            .call(actions::HANDLE_QUICK_OPERATION, params)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One physical socket, server or client side.
pub(crate) struct Connection {
    peer: String,
    outbound: mpsc::Sender<String>,
    pending: Arc<PendingCalls>,
    action_timeout: Duration,
    registry: Arc<EmitterRegistry>,
    events: mpsc::Sender<Event>,
    /// Set once the gateway announces who it is.
    emitter: Mutex<Option<Arc<WsEmitter>>>,
    closed: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        peer: String,
        outbound: mpsc::Sender<String>,
        registry: Arc<EmitterRegistry>,
        events: mpsc::Sender<Event>,
        action_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            peer,
            outbound,
            pending: Arc::new(PendingCalls::default()),
            action_timeout,
            registry,
            events,
            emitter: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Handles one inbound frame on its own task so a slow consumer never
    /// stalls the read loop.
    pub(crate) fn on_frame(self: &Arc<Self>, raw: Vec<u8>) {
        let this = self.clone();
        tokio::spawn(async move { this.handle_frame(raw).await }.with_current_subscriber());
    }

    async fn handle_frame(&self, raw: Vec<u8>) {
        let (event, content) = match Frame::decode(&raw) {
            Ok(Frame::Response(response)) => {
                let echo = response.echo.clone().unwrap_or_default();
                if !self.pending.resolve(response) {
                    debug!(peer = %self.peer, echo = %echo, "Response for no pending call");
                }
                return;
            }
            Ok(Frame::Event { event, content }) => (event, content),
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Invalid frame");
                return;
            }
        };

        let emitter = self.emitter_for(event.self_id());
        if *event.post_type() == PostType::MetaEvent {
            self.register(&emitter);
        }

        let event = match event.post_type() {
            PostType::Message | PostType::Request => {
                event.with_replyer(Arc::new(WsReplyer::new(emitter, content)))
            }
            _ => event,
        };

        if self.events.send(event).await.is_err() {
            debug!(peer = %self.peer, "Event channel closed, dropping event");
        }
    }

    /// The socket's emitter for `self_id`, created on first sight.
    fn emitter_for(&self, self_id: i64) -> Arc<WsEmitter> {
        let mut slot = self.emitter.lock();
        match slot.as_ref() {
            Some(emitter) if emitter.self_id == self_id => emitter.clone(),
            _ => {
                let emitter = Arc::new(WsEmitter {
                    self_id,
                    outbound: self.outbound.clone(),
                    pending: self.pending.clone(),
                    timeout: self.action_timeout,
                });
                *slot = Some(emitter.clone());
                emitter
            }
        }
    }

    /// Publishes `emitter` unless the socket has closed. Holds the emitter
    /// lock so it cannot interleave with [`close`](Self::close).
    fn register(&self, emitter: &Arc<WsEmitter>) -> bool {
        let slot = self.emitter.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let current = slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, emitter));
        if current {
            self.registry.insert(emitter.clone());
        }
        current
    }

    /// Unregisters the identity and fails every in-flight call. Called once
    /// the read loop ends.
    pub(crate) fn close(&self) {
        let taken = {
            let mut slot = self.emitter.lock();
            self.closed.store(true, Ordering::SeqCst);
            slot.take()
        };
        self.pending.clear();
        if let Some(emitter) = taken {
            let self_id = emitter.self_id;
            let emitter: Arc<dyn Emitter> = emitter;
            self.registry.remove_if_same(self_id, &emitter);
        }
    }
}
