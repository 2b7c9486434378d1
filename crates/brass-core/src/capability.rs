//! Capability traits implemented by transports.
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Emitter`] | Issues actions on behalf of one bot identity. |
//! | [`EmitterMux`] | Resolves an identity to its emitter. |
//! | [`Listener`] | Produces inbound events until cancelled. |
//! | [`Replyer`] | One-shot quick reply bound to a single inbound event. |
//! | [`Driver`] | A listener that also owns the identity registry. |

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::action::{
    GetMsgResult, LoginInfo, SendMsgResult, Status, StrangerInfo, VersionInfo, actions,
};
use crate::error::{ApiError, ApiResult, ReplyResult, TransportResult};
use crate::event::Event;
use crate::segment::MessageChain;

// =============================================================================
// Emitter
// =============================================================================

/// Outbound action channel for one bot identity.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Identity this emitter acts for.
    fn self_id(&self) -> i64;

    /// Calls `action` and returns the envelope's `data` on success.
    ///
    /// # Errors
    /// Non-200 responses, failed envelopes, timeouts and lost connections are
    /// all reported as [`ApiError`](crate::ApiError). Calls are never retried.
    async fn call(&self, action: &str, params: Value) -> ApiResult<Value>;
}

/// Wraps an emitter so every call also ends when `token` is cancelled.
///
/// The inner emitter's own timeout still applies; whichever fires first wins.
pub struct CancellableEmitter {
    inner: Arc<dyn Emitter>,
    token: CancellationToken,
}

impl CancellableEmitter {
    pub fn new(inner: Arc<dyn Emitter>, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    pub fn inner(&self) -> &Arc<dyn Emitter> {
        &self.inner
    }
}

#[async_trait]
impl Emitter for CancellableEmitter {
    fn self_id(&self) -> i64 {
        self.inner.self_id()
    }

    async fn call(&self, action: &str, params: Value) -> ApiResult<Value> {
        self.token
            .run_until_cancelled(self.inner.call(action, params))
            .await
            .unwrap_or_else(|| {
                Err(ApiError::Cancelled {
                    action: action.to_string(),
                })
            })
    }
}

/// Typed actions, available on every [`Emitter`] (including `dyn Emitter`).
#[async_trait]
pub trait EmitterExt: Emitter {
    /// Calls `action` and decodes `data` into `R`.
    async fn call_as<R: DeserializeOwned>(&self, action: &str, params: Value) -> ApiResult<R> {
        let data = self.call(action, params).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn send_private_msg(
        &self,
        user_id: i64,
        message: impl Into<MessageChain> + Send,
    ) -> ApiResult<SendMsgResult> {
        let params = json!({ "user_id": user_id, "message": message.into() });
        self.call_as(actions::SEND_PRIVATE_MSG, params).await
    }

    async fn send_group_msg(
        &self,
        group_id: i64,
        message: impl Into<MessageChain> + Send,
    ) -> ApiResult<SendMsgResult> {
        let params = json!({ "group_id": group_id, "message": message.into() });
        self.call_as(actions::SEND_GROUP_MSG, params).await
    }

    async fn get_msg(&self, message_id: i64) -> ApiResult<GetMsgResult> {
        self.call_as(actions::GET_MSG, json!({ "message_id": message_id }))
            .await
    }

    async fn delete_msg(&self, message_id: i64) -> ApiResult<()> {
        self.call(actions::DELETE_MSG, json!({ "message_id": message_id }))
            .await?;
        Ok(())
    }

    async fn get_login_info(&self) -> ApiResult<LoginInfo> {
        self.call_as(actions::GET_LOGIN_INFO, json!({})).await
    }

    async fn get_stranger_info(&self, user_id: i64, no_cache: bool) -> ApiResult<StrangerInfo> {
        let params = json!({ "user_id": user_id, "no_cache": no_cache });
        self.call_as(actions::GET_STRANGER_INFO, params).await
    }

    async fn get_status(&self) -> ApiResult<Status> {
        self.call_as(actions::GET_STATUS, json!({})).await
    }

    async fn get_version_info(&self) -> ApiResult<VersionInfo> {
        self.call_as(actions::GET_VERSION_INFO, json!({})).await
    }

    async fn set_friend_add_request(
        &self,
        flag: &str,
        approve: bool,
        remark: &str,
    ) -> ApiResult<()> {
        let params = json!({ "flag": flag, "approve": approve, "remark": remark });
        self.call(actions::SET_FRIEND_ADD_REQUEST, params).await?;
        Ok(())
    }

    /// `sub_type` must match the request's (`add` or `invite`).
    async fn set_group_add_request(
        &self,
        flag: &str,
        sub_type: &str,
        approve: bool,
        reason: &str,
    ) -> ApiResult<()> {
        let params = json!({
            "flag": flag,
            "sub_type": sub_type,
            "approve": approve,
            "reason": reason,
        });
        self.call(actions::SET_GROUP_ADD_REQUEST, params).await?;
        Ok(())
    }

    /// An empty title removes it; `duration` of `-1` means permanent.
    async fn set_group_special_title(
        &self,
        group_id: i64,
        user_id: i64,
        special_title: &str,
        duration: i64,
    ) -> ApiResult<()> {
        let params = json!({
            "group_id": group_id,
            "user_id": user_id,
            "special_title": special_title,
            "duration": duration,
        });
        self.call(actions::SET_GROUP_SPECIAL_TITLE, params).await?;
        Ok(())
    }
}

impl<E: Emitter + ?Sized> EmitterExt for E {}

// =============================================================================
// EmitterMux
// =============================================================================

/// Identity → emitter lookup.
///
/// Must tolerate concurrent registration and removal while lookups are in
/// flight.
pub trait EmitterMux: Send + Sync {
    /// # Errors
    /// [`ApiError::UnknownIdentity`](crate::ApiError::UnknownIdentity) if no
    /// emitter is registered for `self_id`.
    fn get_emitter(&self, self_id: i64) -> ApiResult<Arc<dyn Emitter>>;

    /// Identities currently registered.
    fn self_ids(&self) -> Vec<i64>;
}

// =============================================================================
// Listener / Driver
// =============================================================================

/// Source of inbound events.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Pushes events into `events` until `token` is cancelled.
    ///
    /// Returns once the transport has shut down.
    async fn listen(
        &self,
        token: CancellationToken,
        events: mpsc::Sender<Event>,
    ) -> TransportResult<()>;
}

/// A complete transport: a listener plus the identities it can act for.
pub trait Driver: Listener {
    fn emitters(&self) -> Arc<dyn EmitterMux>;
}

// =============================================================================
// Replyer
// =============================================================================

/// One-shot quick reply bound to a single inbound event.
#[async_trait]
pub trait Replyer: Send + Sync {
    /// Sends `operation` as the event's quick reply.
    ///
    /// # Errors
    /// [`ReplyError::Expired`](crate::ReplyError::Expired) once the reply
    /// window is closed, [`ReplyError::AlreadyReplied`](crate::ReplyError::AlreadyReplied)
    /// on a second call.
    async fn reply(&self, operation: Value) -> ReplyResult<()>;
}
