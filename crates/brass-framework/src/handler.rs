//! Handler and filter function types.
//!
//! A handler borrows the [`Context`] mutably for the duration of its future,
//! which is what lets middleware run code both before and after
//! [`Context::next`]:
//!
//! ```rust,ignore
//! let logger = handler(|ctx: &mut Context<PrivateMessage>| Box::pin(async move {
//!     let started = Instant::now();
//!     ctx.next().await;
//!     info!(elapsed = ?started.elapsed(), "handled");
//! }));
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::Context;

type HandlerFn<T> = dyn for<'a> Fn(&'a mut Context<T>) -> BoxFuture<'a, ()> + Send + Sync;

/// A middleware or leaf handler.
pub struct Handler<T> {
    name: Arc<str>,
    f: Arc<HandlerFn<T>>,
}

impl<T> Handler<T> {
    /// Wraps `f`, naming it after its type for the registration summary.
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context<T>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self::named(std::any::type_name::<F>(), f)
    }

    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context<T>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call<'a>(&self, ctx: &'a mut Context<T>) -> BoxFuture<'a, ()> {
        (self.f)(ctx)
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: self.f.clone(),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name).finish()
    }
}

/// Shorthand for [`Handler::new`].
pub fn handler<T, F>(f: F) -> Handler<T>
where
    F: for<'a> Fn(&'a mut Context<T>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Handler::new(f)
}

/// A predicate over the decoded payload. Filters run in order before any
/// handler and stop at the first `false`.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Wraps a closure as a [`Filter`].
pub fn filter<T, F>(f: F) -> Filter<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}
