//! # Brass
//!
//! A OneBot chat-bot runtime: typed events in, composable async handlers,
//! actions and quick replies out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────────────────┐
//! │    Driver    │────▶│    Engine    │────▶│ Consumer "message:private"           │──▶ handler end
//! │ (HTTP / WS)  │     │ queue+workers│────▶│ Consumer "notice:group_increase"     │──▶ handler end
//! └──────────────┘     └──────────────┘────▶│ Consumer ...                         │──▶ handler end
//!        ▲                                  └──────────────────────────────────────┘
//!        └──────────── actions (Emitter) ◀──────────── Context::emitter() ◀───────────┘
//! ```
//!
//! - **Driver**: receives frames and exposes one emitter per bot identity
//! - **Engine**: decodes, routes by wire type tag, applies allow-lists
//! - **Handler end**: filters plus a chain of handlers linked by `next()`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brass::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = BrassRuntime::builder().build().await?;
//!     runtime.on_event::<PrivateMessage>().handle(
//!         handler(|ctx: &mut Context<PrivateMessage>| Box::pin(async move {
//!             let _ = ctx.reply(QuickOperation::reply("pong")).await;
//!         })),
//!         [on_command("/", ["ping"])],
//!     );
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use brass_core as core;
pub use brass_framework as framework;
pub use brass_runtime as runtime;
pub use brass_transport as transport;

/// Everything a bot application usually needs:
///
/// ```rust,ignore
/// use brass::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use brass_runtime::{BrassRuntime, RuntimeError, RuntimeResult};

    // Handler composition
    pub use brass_framework::{
        BoxFuture, Composer, Context, Engine, Filter, Handler, Session, SessionError, conversation,
        filter, handler, on_command, only_at_users, only_group_users, only_groups, only_users,
        recovery,
    };

    // Events and payloads
    pub use brass_core::payload::{
        AnyMessage, FriendAdd, FriendRecall, FriendRequest, GroupAdmin, GroupBan, GroupDecrease,
        GroupIncrease, GroupMessage, GroupRecall, GroupRequest, GroupUpload, Heartbeat, Lifecycle,
        Notify, PrivateMessage,
    };
    pub use brass_core::{Event, EventType, Payload, PostType, SessionKey};

    // Outbound
    pub use brass_core::{
        ApiError, ApiResult, Emitter, EmitterExt, EmitterMux, MessageChain, QuickOperation,
        ReplyError, Segment,
    };

    pub use brass_runtime::prelude::*;
}
