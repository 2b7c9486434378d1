//! Notice events (`notice:<notice_type>`).

use serde::{Deserialize, Serialize};

use super::{OneBotEvent, deref_parent};

/// Poke, lucky king and honor notifications (`notice:notify`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notify {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub target_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub group_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecall {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRecall {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    pub user_id: i64,
    pub message_id: i64,
}

/// Member left or was kicked. `sub_type` is `leave`, `kick` or `kick_me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDecrease {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub sub_type: String,
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
}

/// Member joined. `sub_type` is `approve` or `invite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIncrease {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub sub_type: String,
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
}

/// Admin change. `sub_type` is `set` or `unset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAdmin {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub sub_type: String,
    pub group_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub busid: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupUpload {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    pub group_id: i64,
    pub user_id: i64,
    pub file: UploadedFile,
}

/// Mute change. `sub_type` is `ban` or `lift_ban`, `duration` in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBan {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub sub_type: String,
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendAdd {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    pub user_id: i64,
}

deref_parent! {
    Notify => OneBotEvent,
    GroupRecall => OneBotEvent,
    FriendRecall => OneBotEvent,
    GroupDecrease => OneBotEvent,
    GroupIncrease => OneBotEvent,
    GroupAdmin => OneBotEvent,
    GroupUpload => OneBotEvent,
    GroupBan => OneBotEvent,
    FriendAdd => OneBotEvent,
}
