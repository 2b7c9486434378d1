//! Multi-turn conversations.
//!
//! [`conversation`] turns a dialog function into an ordinary leaf handler.
//! The first message for a [`SessionKey`] starts the dialog; while it runs,
//! further messages with the same key are handed to the dialog's
//! [`Session::next`] instead of starting a new one.
//!
//! ```rust,ignore
//! composer.handle(conversation(|ctx: &mut Context<PrivateMessage>, session: &mut Session<PrivateMessage>| {
//!     Box::pin(async move {
//!         let _ = ctx.reply(QuickOperation::reply("your name?")).await;
//!         if let Ok(answer) = session.next_within(Duration::from_secs(30), &[]).await {
//!             let name = answer.data().first_text().map(|t| t.text).unwrap_or_default();
//!             let _ = answer.reply(QuickOperation::reply(format!("hi {name}"))).await;
//!         }
//!     })
//! }), []);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use brass_core::{Payload, SessionKey};

use crate::context::Context;
use crate::error::{SessionError, SessionResult};
use crate::handler::{Filter, Handler};

// =============================================================================
// Session
// =============================================================================

/// The receiving side of one open conversation.
pub struct Session<T> {
    key: String,
    token: CancellationToken,
    rx: mpsc::Receiver<Context<T>>,
}

impl<T> Session<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next message with this session's key that passes every
    /// filter. Messages that fail a filter are dropped.
    ///
    /// # Errors
    /// [`SessionError::Cancelled`] when the engine shuts down,
    /// [`SessionError::Closed`] if the slot is gone.
    pub async fn next(&mut self, filters: &[Filter<T>]) -> SessionResult<Context<T>> {
        loop {
            let ctx = tokio::select! {
                _ = self.token.cancelled() => return Err(SessionError::Cancelled),
                ctx = self.rx.recv() => ctx.ok_or(SessionError::Closed)?,
            };
            if filters.iter().all(|filter| filter(ctx.data())) {
                return Ok(ctx);
            }
            trace!(key = %self.key, "Dropping message rejected by session filters");
        }
    }

    /// Like [`next`](Self::next), giving up after `timeout`.
    pub async fn next_within(
        &mut self,
        timeout: Duration,
        filters: &[Filter<T>],
    ) -> SessionResult<Context<T>> {
        tokio::time::timeout(timeout, self.next(filters))
            .await
            .map_err(|_| SessionError::Timeout)?
    }
}

// =============================================================================
// SessionStore
// =============================================================================

struct Slot<T> {
    generation: u64,
    tx: mpsc::Sender<Context<T>>,
}

/// Key → open session table.
struct SessionStore<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    generation: AtomicU64,
}

/// Outcome of [`SessionStore::set`].
enum Arrival<T> {
    /// No session was open; the caller owns the new one.
    First(Session<T>, SlotGuard<T>),
    /// Delivered to the running session.
    Delivered,
}

impl<T> SessionStore<T> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Opens a session for `key`, or hands `ctx` to the one already open.
    async fn set(self: &Arc<Self>, key: String, mut ctx: Context<T>) -> Arrival<T> {
        loop {
            let tx = {
                let mut slots = self.slots.lock();
                match slots.get(&key) {
                    Some(slot) => slot.tx.clone(),
                    None => {
                        let (tx, rx) = mpsc::channel(1);
                        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                        slots.insert(key.clone(), Slot { generation, tx });
                        let session = Session {
                            key: key.clone(),
                            token: ctx.token().clone(),
                            rx,
                        };
                        let guard = SlotGuard {
                            store: self.clone(),
                            key,
                            generation,
                        };
                        return Arrival::First(session, guard);
                    }
                }
            };

            // Sent outside the lock; the slot holds one message and the
            // owner may be slow to take it.
            match tx.send(ctx).await {
                Ok(()) => return Arrival::Delivered,
                Err(mpsc::error::SendError(returned)) => {
                    // The owner returned between lookup and send.
                    ctx = returned;
                }
            }
        }
    }

    fn remove(&self, key: &str, generation: u64) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| slot.generation == generation) {
            slots.remove(key);
        }
    }
}

/// Deletes the slot when the owning dialog ends, including by panic.
struct SlotGuard<T> {
    store: Arc<SessionStore<T>>,
    key: String,
    generation: u64,
}

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        self.store.remove(&self.key, self.generation);
        debug!(key = %self.key, "Conversation closed");
    }
}

// =============================================================================
// conversation
// =============================================================================

/// Builds a leaf handler that runs `dialog` once per open conversation key.
///
/// Each call gets its own session table, so two `conversation` handlers never
/// see each other's messages.
pub fn conversation<T, F>(dialog: F) -> Handler<T>
where
    T: Payload + SessionKey,
    F: for<'a> Fn(&'a mut Context<T>, &'a mut Session<T>) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    let store = Arc::new(SessionStore::<T>::new());
    let dialog = Arc::new(dialog);

    Handler::named(
        std::any::type_name::<F>(),
        move |ctx: &mut Context<T>| {
            let store = store.clone();
            let dialog = dialog.clone();
            Box::pin(async move {
                let key = ctx.data().session_key();
                match store.set(key.clone(), ctx.detach()).await {
                    Arrival::First(mut session, _guard) => {
                        debug!(key = %key, "Conversation started");
                        dialog(ctx, &mut session).await;
                    }
                    Arrival::Delivered => {
                        trace!(key = %key, "Message delivered to open conversation");
                    }
                }
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde::Deserialize;
    use tokio::sync::Notify;
    use tokio_test::assert_ok;

    use brass_core::EventType;

    use super::*;
    use crate::context::tests::NullEmitter;
    use crate::handler::filter;

    #[derive(Debug, Deserialize)]
    struct Say {
        user: i64,
        text: String,
    }

    impl Payload for Say {
        fn event_type() -> EventType {
            EventType::Other("test:say".into())
        }
    }

    impl SessionKey for Say {
        fn session_key(&self) -> String {
            format!("private:{}", self.user)
        }
    }

    fn ctx(token: &CancellationToken, handler: &Handler<Say>, user: i64, text: &str) -> Context<Say> {
        Context::new(
            token.clone(),
            Arc::new(NullEmitter(1)),
            0,
            Arc::new(Say {
                user,
                text: text.into(),
            }),
            None,
            Arc::from(vec![handler.clone()]),
        )
    }

    #[tokio::test]
    async fn second_message_goes_to_the_open_dialog() {
        let token = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));
        let waiting = Arc::new(Notify::new());
        let (answers_tx, mut answers_rx) = mpsc::unbounded_channel();

        let handler = {
            let started = started.clone();
            let waiting = waiting.clone();
            conversation(move |_ctx: &mut Context<Say>, session: &mut Session<Say>| {
                let started = started.clone();
                let waiting = waiting.clone();
                let answers_tx = answers_tx.clone();
                Box::pin(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    waiting.notify_one();
                    let only_yes = filter(|s: &Say| s.text == "yes");
                    let answer = session.next(&[only_yes]).await;
                    let _ = answers_tx.send(answer.map(|c| c.data().text.clone()));
                })
            })
        };

        let first = {
            let mut ctx = ctx(&token, &handler, 7, "start");
            tokio::spawn(async move { ctx.next().await })
        };
        waiting.notified().await;

        // Same key: delivered, not a new dialog. The filter drops "no".
        ctx(&token, &handler, 7, "no").next().await;
        ctx(&token, &handler, 7, "yes").next().await;

        assert_eq!(answers_rx.recv().await, Some(Ok("yes".to_string())));
        assert_ok!(first.await);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // The dialog has returned, so the key starts fresh.
        let again = {
            let mut ctx = ctx(&token, &handler, 7, "start");
            tokio::spawn(async move { ctx.next().await })
        };
        waiting.notified().await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        token.cancel();
        assert_eq!(answers_rx.recv().await, Some(Err(SessionError::Cancelled)));
        assert_ok!(again.await);
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let token = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let handler = {
            let started = started.clone();
            conversation(move |_ctx: &mut Context<Say>, _session: &mut Session<Say>| {
                let started = started.clone();
                Box::pin(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        ctx(&token, &handler, 1, "a").next().await;
        ctx(&token, &handler, 2, "b").next().await;
        ctx(&token, &handler, 1, "c").next().await;
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn next_within_times_out_and_cleans_up() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler = conversation(move |_ctx: &mut Context<Say>, session: &mut Session<Say>| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(session.next_within(Duration::from_secs(5), &[]).await.err());
            })
        });

        ctx(&token, &handler, 3, "start").next().await;
        assert_eq!(rx.recv().await, Some(Some(SessionError::Timeout)));

        // Slot was removed, so this starts a new dialog rather than blocking.
        ctx(&token, &handler, 3, "again").next().await;
        assert_eq!(rx.recv().await, Some(Some(SessionError::Timeout)));
    }
}
