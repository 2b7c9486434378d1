//! The dispatch engine.
//!
//! ```text
//! Listener ──► mpsc(capacity) ──► worker 0..N ──► for each type tag:
//!                                                    consumer? ─ allow-list? ─ emitter? ─► consume
//!                                                                                           └► task per HandlerEnd
//! ```
//!
//! Workers never wait for handlers: `consume` spawns and returns, so a slow
//! handler does not hold up the next queued event.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, info, trace, warn};

use brass_core::{Driver, EmitterMux, Event, EventType, Payload, TransportResult};

use crate::composer::{Composer, Consumer, ErasedConsumer};
use crate::recovery::recovery;

/// Default capacity of the inbound event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

type Registry = HashMap<EventType, Arc<dyn ErasedConsumer>>;

/// Routes inbound events to registered handlers.
///
/// # Example
///
/// ```rust,ignore
/// let mut engine = Engine::new(driver).with_workers(4);
/// engine
///     .on_event::<PrivateMessage>()
///     .handle(handler(|ctx| Box::pin(async move { /* ... */ })), []);
/// engine.run(CancellationToken::new()).await?;
/// ```
pub struct Engine {
    driver: Arc<dyn Driver>,
    consumers: Registry,
    workers: usize,
    queue_capacity: usize,
    dispatch: Option<Dispatch>,
}

impl Engine {
    /// Creates an engine with one worker per available CPU and a queue of
    /// [`DEFAULT_QUEUE_CAPACITY`].
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            consumers: HashMap::new(),
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dispatch: None,
        }
    }

    /// Sets the worker count. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the inbound queue capacity. Zero is treated as one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Routes every log record of the engine, its listener and all handlers
    /// to `dispatch` instead of the ambient subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Registers handlers for payload type `T`, from any identity.
    ///
    /// Registering the same type again replaces the earlier registration.
    pub fn on_event<T: Payload>(&mut self) -> Composer<T> {
        self.register(Vec::new())
    }

    /// Registers handlers for payload type `T`, only for events received by
    /// one of `selfs`.
    pub fn on_selfs_event<T: Payload>(
        &mut self,
        selfs: impl IntoIterator<Item = i64>,
    ) -> Composer<T> {
        self.register(selfs.into_iter().collect())
    }

    fn register<T: Payload>(&mut self, selfs: Vec<i64>) -> Composer<T> {
        let consumer = Arc::new(Consumer::<T>::new(selfs));
        let event_type = T::event_type();
        if self
            .consumers
            .insert(event_type.clone(), consumer.clone())
            .is_some()
        {
            warn!(event_type = %event_type, "Replacing existing registration");
        }
        Composer::new(consumer, vec![recovery()])
    }

    /// One line per handler end, sorted by type.
    pub fn describe(&self) -> Vec<String> {
        let mut consumers: Vec<_> = self.consumers.values().collect();
        consumers.sort_by(|a, b| a.event_type().as_str().cmp(b.event_type().as_str()));
        consumers.iter().flat_map(|c| c.describe()).collect()
    }

    /// Starts the workers, then runs the listener until `token` is cancelled
    /// or the listener stops.
    ///
    /// # Errors
    /// Returns the listener's error if it fails to start or dies.
    pub async fn run(self, token: CancellationToken) -> TransportResult<()> {
        let dispatch = self.dispatch.clone();
        let fut = self.run_inner(token);
        match dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch).await,
            None => fut.await,
        }
    }

    async fn run_inner(self, token: CancellationToken) -> TransportResult<()> {
        info!(
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            consumers = self.consumers.len(),
            "Starting engine"
        );
        for line in self.describe() {
            info!("{line}");
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let consumers = Arc::new(self.consumers);
        let mux = self.driver.emitters();

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(
                worker(
                    id,
                    rx.clone(),
                    consumers.clone(),
                    mux.clone(),
                    token.clone(),
                )
                .with_current_subscriber(),
            );
        }

        let result = self.driver.listen(token.clone(), tx).await;
        if let Err(e) = &result {
            warn!(error = %e, "Listener stopped with error");
        }

        token.cancel();
        while workers.join_next().await.is_some() {}
        info!("Engine stopped");
        result
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    consumers: Arc<Registry>,
    mux: Arc<dyn EmitterMux>,
    token: CancellationToken,
) {
    trace!(worker = id, "Worker started");
    loop {
        let event = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            }
        };
        dispatch_event(&event, &consumers, mux.as_ref(), &token);
    }
    trace!(worker = id, "Worker stopped");
}

/// Hands `event` to the consumer of each of its tags.
fn dispatch_event(
    event: &Event,
    consumers: &Registry,
    mux: &dyn EmitterMux,
    token: &CancellationToken,
) {
    let self_id = event.self_id();
    debug!(self_id, types = %event.types_display(), time = event.time(), "Dispatching event");

    for event_type in event.types() {
        let Some(consumer) = consumers.get(event_type) else {
            continue;
        };
        if !consumer.accepts(self_id) {
            trace!(self_id, event_type = %event_type, "Identity not in allow-list");
            continue;
        }
        let emitter = match mux.get_emitter(self_id) {
            Ok(emitter) => emitter,
            Err(e) => {
                warn!(self_id, event_type = %event_type, error = %e, "No emitter for identity");
                continue;
            }
        };
        consumer.consume(token, emitter, event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;

    use brass_core::{ApiError, ApiResult, Emitter, Listener};

    use super::*;
    use crate::context::Context;
    use crate::context::tests::NullEmitter;
    use crate::handler::{Handler, handler};

    /// Feeds canned frames, then idles until cancelled.
    struct ScriptedDriver {
        frames: Vec<&'static str>,
        known: Vec<i64>,
    }

    struct KnownIdentities(Vec<i64>);

    impl EmitterMux for KnownIdentities {
        fn get_emitter(&self, self_id: i64) -> ApiResult<Arc<dyn Emitter>> {
            if self.0.contains(&self_id) {
                Ok(Arc::new(NullEmitter(self_id)))
            } else {
                Err(ApiError::UnknownIdentity(self_id))
            }
        }

        fn self_ids(&self) -> Vec<i64> {
            self.0.clone()
        }
    }

    #[async_trait]
    impl Listener for ScriptedDriver {
        async fn listen(
            &self,
            token: CancellationToken,
            events: mpsc::Sender<Event>,
        ) -> TransportResult<()> {
            for frame in &self.frames {
                let event = Event::decode(frame.as_bytes()).unwrap();
                events.send(event).await.unwrap();
            }
            token.cancelled().await;
            Ok(())
        }
    }

    impl Driver for ScriptedDriver {
        fn emitters(&self) -> Arc<dyn EmitterMux> {
            Arc::new(KnownIdentities(self.known.clone()))
        }
    }

    #[derive(Debug, Deserialize)]
    struct AnyMsg {}

    impl Payload for AnyMsg {
        fn event_type() -> EventType {
            EventType::Message
        }
    }

    #[derive(Debug, Deserialize)]
    struct PrivateMsg {
        user_id: i64,
    }

    impl Payload for PrivateMsg {
        fn event_type() -> EventType {
            EventType::PrivateMessage
        }
    }

    fn counting<T: Payload>(counter: &Arc<AtomicUsize>) -> Handler<T> {
        let counter = counter.clone();
        handler(move |_ctx: &mut Context<T>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        })
    }

    const PRIVATE_FROM_42: &str =
        r#"{"post_type":"message","message_type":"private","time":1,"self_id":42,"user_id":7}"#;
    const PRIVATE_FROM_43: &str =
        r#"{"post_type":"message","message_type":"private","time":1,"self_id":43,"user_id":7}"#;
    const PRIVATE_FROM_UNKNOWN: &str =
        r#"{"post_type":"message","message_type":"private","time":1,"self_id":99,"user_id":7}"#;

    async fn run_until(engine: Engine, done: impl Fn() -> bool) {
        let token = CancellationToken::new();
        let run = tokio::spawn(engine.run(token.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("handlers did not run in time");
        // Let stragglers finish so over-counting would show.
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn each_tag_is_consumed_once() {
        let driver = ScriptedDriver {
            frames: vec![PRIVATE_FROM_42],
            known: vec![42],
        };
        let mut engine = Engine::new(Arc::new(driver)).with_workers(2);

        let any = Arc::new(AtomicUsize::new(0));
        let private = Arc::new(AtomicUsize::new(0));
        engine.on_event::<AnyMsg>().handle(counting(&any), []);
        engine.on_event::<PrivateMsg>().handle(counting(&private), []);

        let (a, p) = (any.clone(), private.clone());
        run_until(engine, move || {
            a.load(Ordering::SeqCst) >= 1 && p.load(Ordering::SeqCst) >= 1
        })
        .await;

        assert_eq!(any.load(Ordering::SeqCst), 1);
        assert_eq!(private.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn allow_list_and_unknown_identity() {
        let driver = ScriptedDriver {
            frames: vec![PRIVATE_FROM_43, PRIVATE_FROM_UNKNOWN, PRIVATE_FROM_42],
            known: vec![42, 43],
        };
        let mut engine = Engine::new(Arc::new(driver));

        let only_42 = Arc::new(AtomicUsize::new(0));
        let everyone = Arc::new(AtomicUsize::new(0));
        engine.on_selfs_event::<PrivateMsg>([42]).handle(counting(&only_42), []);
        engine.on_event::<AnyMsg>().handle(counting(&everyone), []);

        let e = everyone.clone();
        run_until(engine, move || e.load(Ordering::SeqCst) >= 2).await;

        // 43 is filtered by the allow-list, 99 has no emitter.
        assert_eq!(only_42.load(Ordering::SeqCst), 1);
        assert_eq!(everyone.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn filters_and_ends_run_independently() {
        let driver = ScriptedDriver {
            frames: vec![PRIVATE_FROM_42],
            known: vec![42],
        };
        let mut engine = Engine::new(Arc::new(driver));

        let matched = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let composer = engine.on_event::<PrivateMsg>();
        composer.handle(
            counting(&matched),
            [crate::handler::filter(|m: &PrivateMsg| m.user_id == 7)],
        );
        composer.handle(
            counting(&rejected),
            [crate::handler::filter(|m: &PrivateMsg| m.user_id == 8)],
        );
        composer.handle(counting(&matched), []);

        let m = matched.clone();
        run_until(engine, move || m.load(Ordering::SeqCst) >= 2).await;

        assert_eq!(matched.load(Ordering::SeqCst), 2);
        assert_eq!(rejected.load(Ordering::SeqCst), 0);
    }

    fn blow_up() {
        panic!("handler blew up");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_end_spares_siblings_and_later_events() {
        let driver = ScriptedDriver {
            frames: vec![PRIVATE_FROM_42, PRIVATE_FROM_42],
            known: vec![42],
        };
        let mut engine = Engine::new(Arc::new(driver)).with_workers(1);

        let attempts = Arc::new(AtomicUsize::new(0));
        let sibling = Arc::new(AtomicUsize::new(0));
        let composer = engine.on_event::<PrivateMsg>();
        let a = attempts.clone();
        composer.handle(
            handler(move |_ctx: &mut Context<PrivateMsg>| {
                a.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { blow_up() })
            }),
            [],
        );
        composer.handle(counting(&sibling), []);

        let (a, s) = (attempts.clone(), sibling.clone());
        run_until(engine, move || {
            a.load(Ordering::SeqCst) >= 2 && s.load(Ordering::SeqCst) >= 2
        })
        .await;

        // Both events reached both ends; each panic stayed inside its own end.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(sibling.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn re_registration_replaces() {
        let driver = ScriptedDriver {
            frames: Vec::new(),
            known: Vec::new(),
        };
        let mut engine = Engine::new(Arc::new(driver));
        let noop = || handler(|_ctx: &mut Context<AnyMsg>| Box::pin(async {}));

        engine.on_event::<AnyMsg>().handle(noop(), []).handle(noop(), []);
        engine.on_event::<AnyMsg>().handle(noop(), []);

        assert_eq!(engine.describe().len(), 1);
    }
}
