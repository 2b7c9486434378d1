//! Outbound action envelopes and typed results.
//!
//! Request frames look like `{"action": "...", "params": {...}, "echo": "..."}`;
//! the `echo` is only present on WebSocket transports. Responses are
//! `{"status": "ok", "retcode": 0, "data": ..., "echo": "..."}`. Some
//! gateways spell the return code `retCode`, both are accepted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::segment::MessageChain;

/// Action names understood by OneBot v11 gateways.
pub mod actions {
    pub const SEND_PRIVATE_MSG: &str = "send_private_msg";
    pub const SEND_GROUP_MSG: &str = "send_group_msg";
    pub const GET_MSG: &str = "get_msg";
    pub const DELETE_MSG: &str = "delete_msg";
    pub const GET_LOGIN_INFO: &str = "get_login_info";
    pub const GET_STRANGER_INFO: &str = "get_stranger_info";
    pub const GET_STATUS: &str = "get_status";
    pub const GET_VERSION_INFO: &str = "get_version_info";
    pub const SET_FRIEND_ADD_REQUEST: &str = "set_friend_add_request";
    pub const SET_GROUP_ADD_REQUEST: &str = "set_group_add_request";
    pub const SET_GROUP_SPECIAL_TITLE: &str = "set_group_special_title";
    /// Hidden action used by WebSocket quick replies.
    pub const HANDLE_QUICK_OPERATION: &str = ".handle_quick_operation";
}

// =============================================================================
// Envelopes
// =============================================================================

/// An outbound action frame.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest<'a> {
    pub action: &'a str,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<&'a str>,
}

/// A response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "retCode")]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(
        default,
        deserialize_with = "echo_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub echo: Option<String>,
}

impl ActionResponse {
    /// Whether the envelope reports a failure. Compared case-insensitively.
    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }

    /// Unwraps the `data` field, turning a failed envelope into
    /// [`ApiError::Failed`] carrying `body` for diagnosis.
    pub fn into_data(self, action: &str, body: &str) -> ApiResult<Value> {
        if self.is_failed() {
            return Err(ApiError::Failed {
                action: action.to_string(),
                retcode: self.retcode,
                body: body.to_string(),
            });
        }
        Ok(self.data)
    }
}

/// Echo values are generated as strings, but some gateways hand numbers back.
fn echo_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// =============================================================================
// Typed results
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMsgResult {
    pub message_id: i64,
}

/// Result of `get_msg`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMsgResult {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub message_type: String,
    pub message_id: i64,
    #[serde(default)]
    pub real_id: i64,
    #[serde(default)]
    pub sender: crate::payload::Sender,
    #[serde(default)]
    pub message: MessageChain,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginInfo {
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrangerInfo {
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub age: i32,
}

/// Gateway health as reported by `get_status` and heartbeats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub good: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub protocol_version: String,
}

// =============================================================================
// Quick operations
// =============================================================================

/// Body of a quick reply.
///
/// Sent as the HTTP response body, or as the `operation` of a
/// `.handle_quick_operation` action on WebSocket transports.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QuickOperation {
    /// Answer a message.
    Reply { reply: Value },
    /// Approve or reject a friend/group request.
    Approve { approve: bool, remark: String },
    /// Any other operation object.
    Custom(Value),
}

impl QuickOperation {
    /// Replies with plain text.
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            reply: Value::String(text.into()),
        }
    }

    /// Replies with a segment chain.
    pub fn reply_chain(chain: MessageChain) -> Self {
        Self::Reply {
            reply: serde_json::to_value(chain).unwrap_or(Value::Null),
        }
    }

    pub fn approve(approve: bool, remark: impl Into<String>) -> Self {
        Self::Approve {
            approve,
            remark: remark.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_accepts_both_retcode_spellings() {
        let a: ActionResponse = serde_json::from_value(json!({"status":"ok","retcode":3})).unwrap();
        let b: ActionResponse = serde_json::from_value(json!({"status":"ok","retCode":3})).unwrap();
        assert_eq!(a.retcode, 3);
        assert_eq!(b.retcode, 3);
    }

    #[test]
    fn numeric_echo_is_stringified() {
        let r: ActionResponse = serde_json::from_value(json!({"status":"ok","echo":12})).unwrap();
        assert_eq!(r.echo.as_deref(), Some("12"));
    }

    #[test]
    fn failed_status_is_an_error() {
        let r: ActionResponse =
            serde_json::from_value(json!({"status":"FAILED","retcode":100,"data":null})).unwrap();
        match r.into_data("send_private_msg", "raw") {
            Err(ApiError::Failed { action, retcode, body }) => {
                assert_eq!(action, "send_private_msg");
                assert_eq!(retcode, 100);
                assert_eq!(body, "raw");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn quick_operation_bodies() {
        assert_eq!(QuickOperation::reply("hi").to_value(), json!({"reply":"hi"}));
        assert_eq!(
            QuickOperation::approve(true, "ok").to_value(),
            json!({"approve":true,"remark":"ok"})
        );
    }
}
