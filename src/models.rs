use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MESSAGE_TYPE: &str = "chat-message-v7";

/// Payload of a message. Anything that is not a well-formed `text` or
/// `image` payload decodes to `Unknown` so that newer clients never break
/// older ones.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "Value", into = "RawContent")]
pub enum Content {
    Text { value: String },
    Image { value: String, filename: Option<String> },
    Unknown { tag: Option<String> },
}

impl Content {
    pub fn text(value: impl Into<String>) -> Self {
        Content::Text { value: value.into() }
    }

    pub fn image(data_uri: impl Into<String>, filename: impl Into<String>) -> Self {
        Content::Image {
            value: data_uri.into(),
            filename: Some(filename.into()),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Content::Text { .. } => Some("text"),
            Content::Image { .. } => Some("image"),
            Content::Unknown { tag } => tag.as_deref(),
        }
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(String::from);
        let tag = field("type");
        match (tag.as_deref(), field("value")) {
            (Some("text"), Some(value)) => Content::Text { value },
            (Some("image"), Some(data_uri)) => Content::Image {
                value: data_uri,
                filename: field("filename"),
            },
            _ => Content::Unknown { tag },
        }
    }
}

#[derive(Serialize, Default)]
struct RawContent {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

impl From<Content> for RawContent {
    fn from(content: Content) -> Self {
        match content {
            Content::Text { value } => RawContent {
                kind: Some("text".to_string()),
                value: Some(value),
                filename: None,
            },
            Content::Image { value, filename } => RawContent {
                kind: Some("image".to_string()),
                value: Some(value),
                filename,
            },
            Content::Unknown { tag } => RawContent {
                kind: tag,
                ..RawContent::default()
            },
        }
    }
}

// Other writers may store fractional or non-numeric timestamps.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        _ => 0,
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub sender: String,
    pub content: Content,
    /// Milliseconds since the Unix epoch; the sort key of the live query.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record has no value")]
    Missing,
    #[error("record is not an object")]
    NotAnObject,
    #[error("record has no content")]
    MissingContent,
    #[error("record has no sender")]
    MissingSender,
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl MessageRecord {
    pub fn new(sender: impl Into<String>, content: Content, timestamp: i64) -> Self {
        MessageRecord {
            kind: MESSAGE_TYPE.to_string(),
            sender: sender.into(),
            content,
            timestamp,
        }
    }

    /// Validates an incoming store value. Content and sender are the only
    /// fields a record cannot be rendered without.
    pub fn from_value(value: Option<&Value>) -> Result<Self, RecordError> {
        let value = value.ok_or(RecordError::Missing)?;
        let object = value.as_object().ok_or(RecordError::NotAnObject)?;
        if object.get("content").map_or(true, Value::is_null) {
            return Err(RecordError::MissingContent);
        }
        if object.get("sender").map_or(true, Value::is_null) {
            return Err(RecordError::MissingSender);
        }
        Ok(MessageRecord::deserialize(value)?)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
