//! # Brass Core
//!
//! Wire model and capability traits shared by every Brass crate.
//!
//! - [`event`]: inbound [`Event`]s, their [`EventType`] tags and frame decoding.
//! - [`payload`]: typed payloads handlers receive.
//! - [`segment`]: message segments and the [`MessageChain`] builder.
//! - [`action`]: outbound action envelopes, typed results and quick operations.
//! - [`capability`]: [`Emitter`], [`EmitterMux`], [`Listener`], [`Replyer`], [`Driver`].
//! - [`error`]: error taxonomy.
//!
//! This crate performs no I/O of its own; transports live in
//! `brass-transport` and dispatch in `brass-framework`.

pub mod action;
pub mod capability;
pub mod error;
pub mod event;
pub mod payload;
pub mod segment;

pub use action::{
    ActionRequest, ActionResponse, GetMsgResult, LoginInfo, QuickOperation, SendMsgResult, Status,
    StrangerInfo, VersionInfo, actions,
};
pub use capability::{CancellableEmitter, Driver, Emitter, EmitterExt, EmitterMux, Listener, Replyer};
pub use error::{
    ApiError, ApiResult, DecodeError, DecodeResult, ReplyError, ReplyResult, TransportError,
    TransportResult,
};
pub use event::{Event, EventType, Frame, PostType, decode_event};
pub use payload::{Payload, SessionKey};
pub use segment::{MessageChain, Segment, SegmentData};
