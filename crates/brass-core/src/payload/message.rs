//! Message events.

use serde::{Deserialize, Serialize};

use super::{OneBotEvent, SessionKey, deref_parent};
use crate::segment::{At, Face, Image, MessageChain, Reply, Text};

// ============================================================================
// Shared Types
// ============================================================================

/// Message sender information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    /// "male", "female" or "unknown".
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub age: i32,
    /// Group card, group messages only.
    #[serde(default)]
    pub card: Option<String>,
    /// "owner", "admin" or "member", group messages only.
    #[serde(default)]
    pub role: Option<String>,
}

/// Anonymous user information (for anonymous group messages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anonymous {
    pub id: i64,
    pub name: String,
    pub flag: String,
}

// ============================================================================
// MessageEvent
// ============================================================================

/// Fields shared by private and group messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(flatten)]
    pub parent: OneBotEvent,

    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub sub_type: String,
    pub message_id: i64,
    pub user_id: i64,
    pub message: MessageChain,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub font: i32,
    #[serde(default)]
    pub sender: Sender,
}

impl MessageEvent {
    pub fn first_text(&self) -> Option<Text> {
        self.message.first()
    }

    pub fn texts(&self) -> Vec<Text> {
        self.message.all()
    }

    pub fn first_face(&self) -> Option<Face> {
        self.message.first()
    }

    pub fn faces(&self) -> Vec<Face> {
        self.message.all()
    }

    pub fn first_at(&self) -> Option<At> {
        self.message.first()
    }

    pub fn ats(&self) -> Vec<At> {
        self.message.all()
    }

    /// The quoted message, if this message is a reply.
    pub fn first_reply(&self) -> Option<Reply> {
        self.message.first()
    }

    pub fn first_image(&self) -> Option<Image> {
        self.message.first()
    }

    pub fn images(&self) -> Vec<Image> {
        self.message.all()
    }

    /// Whether any mention targets `user_id`.
    pub fn mentions(&self, user_id: &str) -> bool {
        self.ats().iter().any(|at| at.qq == user_id)
    }
}

// ============================================================================
// Concrete message payloads
// ============================================================================

/// Private message (`message:private`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    #[serde(flatten)]
    pub parent: MessageEvent,

    /// Source group of a temporary conversation.
    #[serde(default)]
    pub temp_source: Option<i64>,
}

/// Group message (`message:group`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    #[serde(flatten)]
    pub parent: MessageEvent,

    pub group_id: i64,
    #[serde(default)]
    pub anonymous: Option<Anonymous>,
}

/// Any message (`message`); `group_id` is set for group messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyMessage {
    #[serde(flatten)]
    pub parent: MessageEvent,

    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub anonymous: Option<Anonymous>,
}

deref_parent! {
    PrivateMessage => MessageEvent,
    GroupMessage => MessageEvent,
    AnyMessage => MessageEvent,
    MessageEvent => OneBotEvent,
}

impl SessionKey for PrivateMessage {
    fn session_key(&self) -> String {
        format!("private:{}", self.user_id)
    }
}

impl SessionKey for GroupMessage {
    fn session_key(&self) -> String {
        format!("group:{}:{}", self.group_id, self.user_id)
    }
}

impl SessionKey for AnyMessage {
    fn session_key(&self) -> String {
        match self.group_id {
            Some(group_id) => format!("group:{}:{}", group_id, self.user_id),
            None => format!("private:{}", self.user_id),
        }
    }
}
