//! Per-invocation handler context.
//!
//! One [`Context`] is created for every (event, handler end) pair. It owns an
//! index into the handler end's immutable handler list:
//!
//! ```text
//! handlers: [recovery, mw1, mw2, leaf]
//! cursor:    0 -> 1 -> 2 ...          (next handler to run)
//! abort():   cursor = usize::MAX      (nothing else runs)
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use brass_core::{CancellableEmitter, Emitter, QuickOperation, ReplyError, ReplyResult, Replyer};

use crate::handler::Handler;

/// Cursor value after [`Context::abort`]; larger than any valid index.
const ABORTED: usize = usize::MAX;

/// State threaded through a handler chain.
pub struct Context<T> {
    token: CancellationToken,
    emitter: Arc<dyn Emitter>,
    time: i64,
    self_id: i64,
    data: Arc<T>,
    replyer: Option<Arc<dyn Replyer>>,
    handlers: Arc<[Handler<T>]>,
    cursor: usize,
}

impl<T> Context<T> {
    pub(crate) fn new(
        token: CancellationToken,
        emitter: Arc<dyn Emitter>,
        time: i64,
        data: Arc<T>,
        replyer: Option<Arc<dyn Replyer>>,
        handlers: Arc<[Handler<T>]>,
    ) -> Self {
        let self_id = emitter.self_id();
        let emitter: Arc<dyn Emitter> = Arc::new(CancellableEmitter::new(emitter, token.clone()));
        Self {
            token,
            self_id,
            emitter,
            time,
            data,
            replyer,
            handlers,
            cursor: 0,
        }
    }

    /// Runs the next handler in the chain.
    ///
    /// A handler that returns without calling `next` ends the chain. Calling
    /// `next` after [`abort`](Self::abort), or past the last handler, does
    /// nothing.
    pub fn next(&mut self) -> BoxFuture<'_, ()>
    where
        T: Send + Sync,
    {
        Box::pin(async move {
            let Some(handler) = self.handlers.get(self.cursor).cloned() else {
                return;
            };
            self.cursor += 1;
            handler.call(self).await;
        })
    }

    /// Skips every remaining handler, including ones a caller further up the
    /// chain would reach through its own `next`.
    pub fn abort(&mut self) {
        self.cursor = ABORTED;
    }

    pub fn is_aborted(&self) -> bool {
        self.cursor == ABORTED
    }

    /// Number of handlers started so far.
    pub fn cursor(&self) -> usize {
        if self.is_aborted() {
            self.handlers.len()
        } else {
            self.cursor
        }
    }

    /// The decoded payload.
    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_arc(&self) -> Arc<T> {
        self.data.clone()
    }

    /// Emitter bound to the identity that received the event. Calls made
    /// through it end with [`ApiError::Cancelled`](brass_core::ApiError::Cancelled)
    /// once the engine shuts down.
    pub fn emitter(&self) -> &Arc<dyn Emitter> {
        &self.emitter
    }

    pub fn self_id(&self) -> i64 {
        self.self_id
    }

    /// Event timestamp, as sent by the gateway.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Engine-wide cancellation.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn can_reply(&self) -> bool {
        self.replyer.is_some()
    }

    /// Answers the event inline.
    pub async fn reply(&self, operation: QuickOperation) -> ReplyResult<()> {
        self.reply_raw(operation.to_value()).await
    }

    pub async fn reply_raw(&self, operation: Value) -> ReplyResult<()> {
        match &self.replyer {
            Some(replyer) => replyer.reply(operation).await,
            None => Err(ReplyError::NoReplyer),
        }
    }

    /// A handler-less copy, handed to a waiting conversation.
    pub(crate) fn detach(&self) -> Self {
        Self {
            token: self.token.clone(),
            emitter: self.emitter.clone(),
            time: self.time,
            self_id: self.self_id,
            data: self.data.clone(),
            replyer: self.replyer.clone(),
            handlers: Arc::from(Vec::new()),
            cursor: 0,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("self_id", &self.self_id)
            .field("time", &self.time)
            .field("data", &self.data)
            .field("cursor", &self.cursor)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
