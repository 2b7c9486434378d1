//! OneBot v11 message segments.
//!
//! A message is an array of `{"type": ..., "data": {...}}` objects. Segments
//! are kept in that raw shape so unknown kinds survive a round trip; typed
//! views are produced on demand through [`SegmentData`].
//!
//! ```rust,ignore
//! let chain = MessageChain::new().at("10001").text(" hello").face("178");
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Segment
// ============================================================================

/// A single message segment in its wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Segment {
    /// Builds a segment from typed data.
    pub fn new<T: SegmentData>(data: &T) -> Self {
        Self {
            kind: T::KIND.to_string(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Typed view of this segment, if it is of kind `T` and well formed.
    pub fn parse<T: SegmentData>(&self) -> Option<T> {
        if self.kind != T::KIND {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Typed data of one segment kind.
pub trait SegmentData: Serialize + DeserializeOwned {
    /// The `type` value on the wire.
    const KIND: &'static str;
}

// ============================================================================
// Segment data
// ============================================================================

/// Plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
}

/// QQ face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
}

/// Mention. `qq` is a user id or `"all"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct At {
    #[serde(deserialize_with = "lenient_string")]
    pub qq: String,
}

/// Quote of an earlier message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
}

/// Image. `file` accepts a URL, a `file://` URI or `base64://` data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub file: String,
}

impl SegmentData for Text {
    const KIND: &'static str = "text";
}
impl SegmentData for Face {
    const KIND: &'static str = "face";
}
impl SegmentData for At {
    const KIND: &'static str = "at";
}
impl SegmentData for Reply {
    const KIND: &'static str = "reply";
}
impl SegmentData for Image {
    const KIND: &'static str = "image";
}
impl SegmentData for File {
    const KIND: &'static str = "file";
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

// ============================================================================
// Text command helpers
// ============================================================================

impl Text {
    /// Returns the command name if the trimmed text starts with `prefix`.
    ///
    /// `"/echo hello"` with prefix `"/"` yields `Some("echo")`.
    pub fn command(&self, prefix: &str) -> Option<&str> {
        let trimmed = self.text.trim();
        if !trimmed.starts_with(prefix) {
            return None;
        }
        trimmed.split_whitespace().next()?.strip_prefix(prefix)
    }

    /// Returns the `index`-th argument after the command.
    pub fn command_arg(&self, prefix: &str, index: usize) -> Option<&str> {
        self.command(prefix)?;
        self.text.split_whitespace().nth(index + 1)
    }

    /// Looks up `key value` pairs following the command. Keys compare
    /// case-insensitively.
    ///
    /// `"/ban user 123 time 60"` with key `"time"` yields `Some("60")`.
    pub fn key_value(&self, key: &str) -> Option<&str> {
        let parts: Vec<&str> = self.text.split_whitespace().collect();
        parts
            .get(1..)?
            .chunks_exact(2)
            .find(|pair| pair[0].eq_ignore_ascii_case(key))
            .map(|pair| pair[1])
    }
}

// ============================================================================
// MessageChain
// ============================================================================

/// An ordered list of segments with a fluent builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain(Vec<Segment>);

impl MessageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, segment: Segment) -> Self {
        self.0.push(segment);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.push(Segment::new(&Text { text: text.into() }))
    }

    /// Line break.
    pub fn br(self) -> Self {
        self.text("\n")
    }

    pub fn face(self, id: impl ToString) -> Self {
        self.push(Segment::new(&Face { id: id.to_string() }))
    }

    pub fn at(self, qq: impl ToString) -> Self {
        self.push(Segment::new(&At { qq: qq.to_string() }))
    }

    pub fn reply(self, message_id: impl ToString) -> Self {
        self.push(Segment::new(&Reply {
            id: message_id.to_string(),
        }))
    }

    pub fn image(self, file: impl Into<String>) -> Self {
        self.push(Segment::new(&Image {
            file: file.into(),
            ..Default::default()
        }))
    }

    pub fn file(self, file: impl Into<String>) -> Self {
        self.push(Segment::new(&File { file: file.into() }))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First well-formed segment of kind `T`.
    pub fn first<T: SegmentData>(&self) -> Option<T> {
        self.0.iter().find_map(Segment::parse::<T>)
    }

    /// All well-formed segments of kind `T`, in order.
    pub fn all<T: SegmentData>(&self) -> Vec<T> {
        self.0.iter().filter_map(Segment::parse::<T>).collect()
    }

    /// Concatenated text of all text segments.
    pub fn plain_text(&self) -> String {
        self.all::<Text>().into_iter().map(|t| t.text).collect()
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        Self::new().text(text)
    }
}

impl From<String> for MessageChain {
    fn from(text: String) -> Self {
        Self::new().text(text)
    }
}

impl From<Vec<Segment>> for MessageChain {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}
