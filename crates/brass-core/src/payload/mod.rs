//! Typed event payloads.
//!
//! # Hierarchy
//!
//! ```text
//! OneBotEvent { time, self_id, post_type }
//! ├── MessageEvent { message_id, user_id, message, ... }
//! │   ├── PrivateMessage                                       "message:private"
//! │   ├── GroupMessage                                         "message:group"
//! │   └── AnyMessage                                           "message"
//! ├── notice::*                                                "notice:<kind>"
//! ├── request::{FriendRequest, GroupRequest}                   "request:<kind>"
//! └── meta::{Lifecycle, Heartbeat}                             "meta_event:<kind>"
//! ```
//!
//! Children embed their parent with `#[serde(flatten)]` and `Deref` to it,
//! so `group_msg.user_id` and `group_msg.time` both work.

mod message;
mod meta;
mod notice;
mod request;

pub use message::{Anonymous, AnyMessage, GroupMessage, MessageEvent, PrivateMessage, Sender};
pub use meta::{Heartbeat, Lifecycle};
pub use notice::{
    FriendAdd, FriendRecall, GroupAdmin, GroupBan, GroupDecrease, GroupIncrease, GroupRecall,
    GroupUpload, Notify, UploadedFile,
};
pub use request::{FriendRequest, GroupRequest};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::event::EventType;

/// A payload type the engine can route to.
///
/// The associated [`EventType`] is the registry key handlers of this type
/// are stored under.
pub trait Payload: DeserializeOwned + Send + Sync + 'static {
    fn event_type() -> EventType;
}

/// A payload that belongs to a conversation.
///
/// Two events with equal keys are part of the same dialog.
pub trait SessionKey {
    fn session_key(&self) -> String;
}

/// Fields common to every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneBotEvent {
    pub time: i64,
    pub self_id: i64,
    #[serde(default)]
    pub post_type: String,
}

macro_rules! payload {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Payload for $ty {
                fn event_type() -> EventType {
                    EventType::$kind
                }
            }
        )*
    };
}

macro_rules! deref_parent {
    ($($ty:ty => $parent:ty),* $(,)?) => {
        $(
            impl std::ops::Deref for $ty {
                type Target = $parent;

                fn deref(&self) -> &Self::Target {
                    &self.parent
                }
            }
        )*
    };
}

pub(crate) use deref_parent;

payload! {
    AnyMessage => Message,
    PrivateMessage => PrivateMessage,
    GroupMessage => GroupMessage,
    Notify => Notify,
    GroupRecall => GroupRecall,
    FriendRecall => FriendRecall,
    GroupDecrease => GroupDecrease,
    GroupIncrease => GroupIncrease,
    GroupAdmin => GroupAdmin,
    GroupUpload => GroupUpload,
    GroupBan => GroupBan,
    FriendAdd => FriendAdd,
    FriendRequest => FriendRequest,
    GroupRequest => GroupRequest,
    Lifecycle => Lifecycle,
    Heartbeat => Heartbeat,
}
