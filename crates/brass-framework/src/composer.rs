//! Handler composition.
//!
//! ```text
//! engine.on_event::<GroupMessage>()          root Composer  [recovery]
//!   .middleware(log)                                         [recovery, log]
//!   .compose([only_groups([1])])   child     filters [g1]    [recovery, log]
//!       .handle(echo, [on_command("/", ["echo"])])  -> HandlerEnd { [g1, cmd], [recovery, log, echo] }
//!   .handle(stats, [])                                     -> HandlerEnd { [], [recovery, log, stats] }
//! ```
//!
//! Composers exist only while handlers are being registered. Every
//! [`Composer::handle`] freezes the accumulated filters and handlers into one
//! [`HandlerEnd`] owned by the root [`Consumer`]; dispatch only sees those.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, warn};

use brass_core::{Emitter, Event, EventType, Payload};

use crate::context::Context;
use crate::handler::{Filter, Handler};

// =============================================================================
// HandlerEnd
// =============================================================================

/// A frozen (filters, handlers) pipeline.
pub struct HandlerEnd<T> {
    filters: Vec<Filter<T>>,
    handlers: Arc<[Handler<T>]>,
}

impl<T> HandlerEnd<T> {
    /// Whether every filter accepts `data`, evaluated in order.
    pub fn matches(&self, data: &T) -> bool {
        self.filters.iter().all(|filter| filter(data))
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn handlers(&self) -> &[Handler<T>] {
        &self.handlers
    }
}

// =============================================================================
// Consumer
// =============================================================================

/// All handler ends registered for one payload type.
pub struct Consumer<T> {
    event_type: EventType,
    selfs: Vec<i64>,
    ends: RwLock<Vec<Arc<HandlerEnd<T>>>>,
}

impl<T: Payload> Consumer<T> {
    pub(crate) fn new(selfs: Vec<i64>) -> Self {
        Self {
            event_type: T::event_type(),
            selfs,
            ends: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, end: HandlerEnd<T>) {
        self.ends.write().push(Arc::new(end));
    }

    pub fn len(&self) -> usize {
        self.ends.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Type-erased view of a [`Consumer`], stored in the engine registry.
pub(crate) trait ErasedConsumer: Send + Sync {
    fn event_type(&self) -> &EventType;

    /// Identity allow-list check; an empty list accepts everyone.
    fn accepts(&self, self_id: i64) -> bool;

    /// Decodes the payload once and spawns one task per handler end.
    /// Returns without waiting for the handlers.
    fn consume(&self, token: &CancellationToken, emitter: Arc<dyn Emitter>, event: &Event);

    /// One line per handler end for the registration summary.
    fn describe(&self) -> Vec<String>;
}

impl<T: Payload> ErasedConsumer for Consumer<T> {
    fn event_type(&self) -> &EventType {
        &self.event_type
    }

    fn accepts(&self, self_id: i64) -> bool {
        self.selfs.is_empty() || self.selfs.contains(&self_id)
    }

    fn consume(&self, token: &CancellationToken, emitter: Arc<dyn Emitter>, event: &Event) {
        let data: Arc<T> = match event.payload(&self.event_type) {
            Ok(data) => Arc::new(data),
            Err(e) => {
                warn!(
                    self_id = event.self_id(),
                    event_type = %self.event_type,
                    error = %e,
                    "Failed to decode payload, skipping"
                );
                return;
            }
        };

        let ends = self.ends.read().clone();
        debug!(
            self_id = event.self_id(),
            event_type = %self.event_type,
            ends = ends.len(),
            "Consuming event"
        );

        for end in ends {
            let token = token.clone();
            let emitter = emitter.clone();
            let data = data.clone();
            let replyer = event.replyer().cloned();
            let time = event.time();

            tokio::spawn(
                async move {
                    if !end.matches(&data) {
                        return;
                    }
                    let mut ctx =
                        Context::new(token, emitter, time, data, replyer, end.handlers.clone());
                    ctx.next().await;
                }
                .with_current_subscriber(),
            );
        }
    }

    fn describe(&self) -> Vec<String> {
        let selfs = if self.selfs.is_empty() {
            "*".to_string()
        } else {
            self.selfs
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        self.ends
            .read()
            .iter()
            .map(|end| {
                let handlers = end
                    .handlers
                    .iter()
                    .map(Handler::name)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                format!(
                    "onebot -> [{selfs}] -> {} -> {} filter(s) -> {handlers}",
                    self.event_type,
                    end.filters.len()
                )
            })
            .collect()
    }
}

// =============================================================================
// Composer
// =============================================================================

/// Builder for handler ends of one payload type.
pub struct Composer<T> {
    handlers: Vec<Handler<T>>,
    filters: Vec<Filter<T>>,
    root: Arc<Consumer<T>>,
}

impl<T: Payload> Composer<T> {
    pub(crate) fn new(root: Arc<Consumer<T>>, handlers: Vec<Handler<T>>) -> Self {
        Self {
            handlers,
            filters: Vec::new(),
            root,
        }
    }

    /// Appends middleware run before the leaf of every handler end built from
    /// this composer afterwards.
    pub fn middleware(&mut self, handler: Handler<T>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Appends a filter for every handler end built from this composer
    /// afterwards.
    pub fn filter(&mut self, filter: Filter<T>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Forks a child composer that inherits everything accumulated so far
    /// plus `filters`. Later changes to either side do not affect the other.
    pub fn compose(&self, filters: impl IntoIterator<Item = Filter<T>>) -> Composer<T> {
        let mut child_filters = self.filters.clone();
        child_filters.extend(filters);
        Composer {
            handlers: self.handlers.clone(),
            filters: child_filters,
            root: self.root.clone(),
        }
    }

    /// Registers `handler` as a new handler end, guarded by the accumulated
    /// filters followed by `filters`.
    pub fn handle(
        &self,
        handler: Handler<T>,
        filters: impl IntoIterator<Item = Filter<T>>,
    ) -> &Self {
        let mut end_filters = self.filters.clone();
        end_filters.extend(filters);

        let mut handlers = self.handlers.clone();
        handlers.push(handler);

        self.root.push(HandlerEnd {
            filters: end_filters,
            handlers: Arc::from(handlers),
        });
        self
    }

    /// The consumer handler ends are registered on.
    pub fn root(&self) -> &Arc<Consumer<T>> {
        &self.root
    }
}

impl<T> Clone for Composer<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            filters: self.filters.clone(),
            root: self.root.clone(),
        }
    }
}
