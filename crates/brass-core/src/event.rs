//! Inbound events and frame decoding.
//!
//! # Type tags
//!
//! Every event carries two tags, most general first:
//!
//! ```text
//! {"post_type":"message","message_type":"private",...}
//!   -> [Message, PrivateMessage]        ("message", "message:private")
//! ```
//!
//! The second tag is built from the `"<post_type>_type"` field. Wire kinds
//! known at compile time map onto a closed [`EventType`] variant; anything
//! else lands in [`EventType::Other`] so handlers can still register for it.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::action::ActionResponse;
use crate::capability::Replyer;
use crate::error::{DecodeError, DecodeResult};

// =============================================================================
// PostType
// =============================================================================

/// Top-level discriminator of an inbound event (`post_type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostType {
    Message,
    Notice,
    Request,
    MetaEvent,
    /// A post type this crate does not know about.
    Other(String),
}

impl PostType {
    /// Parses the wire value of `post_type`.
    pub fn parse(value: &str) -> Self {
        match value {
            "message" => Self::Message,
            "notice" => Self::Notice,
            "request" => Self::Request,
            "meta_event" => Self::MetaEvent,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Notice => "notice",
            Self::Request => "request",
            Self::MetaEvent => "meta_event",
            Self::Other(value) => value,
        }
    }
}

// =============================================================================
// EventType
// =============================================================================

/// Registry key for an event kind.
///
/// Displayed as the wire key, e.g. `message:group` or `notice:group_recall`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Every message, private or group.
    Message,
    PrivateMessage,
    GroupMessage,

    /// Every notice.
    Notice,
    Notify,
    GroupRecall,
    FriendRecall,
    GroupDecrease,
    GroupIncrease,
    GroupAdmin,
    GroupUpload,
    GroupBan,
    FriendAdd,

    /// Every request.
    Request,
    FriendRequest,
    GroupRequest,

    /// Every meta event.
    MetaEvent,
    Lifecycle,
    Heartbeat,

    /// A wire key without a dedicated variant.
    Other(String),
}

impl EventType {
    /// Resolves a wire key such as `"message:private"`.
    pub fn from_key(key: &str) -> Self {
        match key {
            "message" => Self::Message,
            "message:private" => Self::PrivateMessage,
            "message:group" => Self::GroupMessage,
            "notice" => Self::Notice,
            "notice:notify" => Self::Notify,
            "notice:group_recall" => Self::GroupRecall,
            "notice:friend_recall" => Self::FriendRecall,
            "notice:group_decrease" => Self::GroupDecrease,
            "notice:group_increase" => Self::GroupIncrease,
            "notice:group_admin" => Self::GroupAdmin,
            "notice:group_upload" => Self::GroupUpload,
            "notice:group_ban" => Self::GroupBan,
            "notice:friend_add" => Self::FriendAdd,
            "request" => Self::Request,
            "request:friend" => Self::FriendRequest,
            "request:group" => Self::GroupRequest,
            "meta_event" => Self::MetaEvent,
            "meta_event:lifecycle" => Self::Lifecycle,
            "meta_event:heartbeat" => Self::Heartbeat,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire key.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::PrivateMessage => "message:private",
            Self::GroupMessage => "message:group",
            Self::Notice => "notice",
            Self::Notify => "notice:notify",
            Self::GroupRecall => "notice:group_recall",
            Self::FriendRecall => "notice:friend_recall",
            Self::GroupDecrease => "notice:group_decrease",
            Self::GroupIncrease => "notice:group_increase",
            Self::GroupAdmin => "notice:group_admin",
            Self::GroupUpload => "notice:group_upload",
            Self::GroupBan => "notice:group_ban",
            Self::FriendAdd => "notice:friend_add",
            Self::Request => "request",
            Self::FriendRequest => "request:friend",
            Self::GroupRequest => "request:group",
            Self::MetaEvent => "meta_event",
            Self::Lifecycle => "meta_event:lifecycle",
            Self::Heartbeat => "meta_event:heartbeat",
            Self::Other(key) => key,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event
// =============================================================================

/// A decoded inbound event.
///
/// Only the header is decoded eagerly; the typed payload is decoded on demand
/// by each consumer via [`Event::payload`]. An event is immutable once it has
/// been handed to the engine.
#[derive(Clone)]
pub struct Event {
    types: Vec<EventType>,
    post_type: PostType,
    time: i64,
    self_id: i64,
    raw: Arc<[u8]>,
    replyer: Option<Arc<dyn Replyer>>,
}

impl Event {
    /// Decodes an event from the raw frame bytes.
    pub fn decode(raw: &[u8]) -> DecodeResult<Self> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(&value, Arc::from(raw))
    }

    /// Builds an event from an already parsed frame.
    pub fn from_value(value: &Value, raw: Arc<[u8]>) -> DecodeResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| DecodeError::InvalidJson("frame is not an object".into()))?;

        let post = str_field(obj, "post_type")?;
        let sub_field = format!("{post}_type");
        let sub = str_field(obj, &sub_field)?;
        let time = int_field(obj, "time")?;
        let self_id = int_field(obj, "self_id")?;

        Ok(Self {
            types: vec![
                EventType::from_key(post),
                EventType::from_key(&format!("{post}:{sub}")),
            ],
            post_type: PostType::parse(post),
            time,
            self_id,
            raw,
            replyer: None,
        })
    }

    /// Attaches a quick-reply capability. Used by transports before the
    /// event is enqueued.
    pub fn with_replyer(mut self, replyer: Arc<dyn Replyer>) -> Self {
        self.replyer = Some(replyer);
        self
    }

    /// Type tags, most general first.
    pub fn types(&self) -> &[EventType] {
        &self.types
    }

    pub fn post_type(&self) -> &PostType {
        &self.post_type
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    /// Identity of the bot that received the event.
    pub fn self_id(&self) -> i64 {
        self.self_id
    }

    /// The frame exactly as received.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn replyer(&self) -> Option<&Arc<dyn Replyer>> {
        self.replyer.as_ref()
    }

    /// Decodes the raw frame into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self, event_type: &EventType) -> DecodeResult<T> {
        serde_json::from_slice(&self.raw).map_err(|e| DecodeError::Payload {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        })
    }

    /// Tags joined with `,`, for log fields.
    pub fn types_display(&self) -> String {
        self.types
            .iter()
            .map(EventType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("types", &self.types)
            .field("time", &self.time)
            .field("self_id", &self.self_id)
            .field("replyable", &self.replyer.is_some())
            .finish_non_exhaustive()
    }
}

fn str_field<'a>(obj: &'a serde_json::Map<String, Value>, name: &str) -> DecodeResult<&'a str> {
    obj.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))
}

fn int_field(obj: &serde_json::Map<String, Value>, name: &str) -> DecodeResult<i64> {
    obj.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))
}

// =============================================================================
// Frame
// =============================================================================

/// A WebSocket frame: either an action response or an inbound event.
#[derive(Debug)]
pub enum Frame {
    /// Carries an `echo` field.
    Response(ActionResponse),
    /// An inbound event plus the parsed frame, kept for quick operations.
    Event { event: Event, content: Value },
}

impl Frame {
    /// Classifies and decodes one frame.
    pub fn decode(raw: &[u8]) -> DecodeResult<Self> {
        let content: Value =
            serde_json::from_slice(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        if content.get("echo").is_some_and(|echo| !echo.is_null()) {
            let response = serde_json::from_value(content)
                .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
            return Ok(Self::Response(response));
        }

        let event = Event::from_value(&content, Arc::from(raw))?;
        Ok(Self::Event { event, content })
    }
}

/// Decodes an HTTP or WebSocket event body.
pub fn decode_event(raw: &[u8]) -> DecodeResult<Event> {
    Event::decode(raw)
}
