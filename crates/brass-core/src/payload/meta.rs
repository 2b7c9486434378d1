//! Meta events.

use serde::{Deserialize, Serialize};

use super::{OneBotEvent, deref_parent};
use crate::action::Status;

/// Lifecycle event (`meta_event:lifecycle`).
///
/// `sub_type` is `enable`, `disable` or `connect`. WebSocket transports
/// learn a socket's identity from the first one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub sub_type: String,
}

/// Heartbeat event (`meta_event:heartbeat`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(flatten)]
    pub parent: OneBotEvent,
    #[serde(default)]
    pub status: Status,
    /// Interval in milliseconds.
    #[serde(default)]
    pub interval: i64,
}

deref_parent! {
    Lifecycle => OneBotEvent,
    Heartbeat => OneBotEvent,
}
