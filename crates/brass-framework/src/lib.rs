//! # Brass Framework
//!
//! Dispatch and handler composition on top of `brass-core`.
//!
//! This layer provides:
//! - [`Engine`]: worker pool routing events to typed consumers
//! - [`Composer`]: middleware chains and filters, forked per branch
//! - [`Context`]: explicit `next` / `abort` continuation
//! - [`conversation`]: multi-turn dialogs keyed by sender
//! - Ready-made [`filters`] and the [`recovery`] middleware

pub mod composer;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod filters;
pub mod handler;
pub mod recovery;

pub use futures::future::BoxFuture;

pub use composer::{Composer, Consumer, HandlerEnd};
pub use context::Context;
pub use conversation::{Session, conversation};
pub use engine::{DEFAULT_QUEUE_CAPACITY, Engine};
pub use error::{SessionError, SessionResult};
pub use filters::{on_command, only_at_users, only_group_users, only_groups, only_users};
pub use handler::{Filter, Handler, filter, handler};
pub use recovery::recovery;
