//! Request events. Answer them with
//! [`QuickOperation::approve`](crate::QuickOperation::approve) or the
//! `set_*_add_request` actions, passing back `flag`.

use serde::{Deserialize, Serialize};

use super::{OneBotEvent, deref_parent};

/// Friend request (`request:friend`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    pub user_id: i64,
    #[serde(default)]
    pub comment: String,
    pub flag: String,
}

/// Group join request or invitation (`request:group`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRequest {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    /// `add` or `invite`.
    #[serde(default)]
    pub sub_type: String,
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub comment: String,
    pub flag: String,
}

deref_parent! {
    FriendRequest => OneBotEvent,
    GroupRequest => OneBotEvent,
}
