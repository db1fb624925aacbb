use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local, Utc};
use iced::widget::image;

use crate::models::{Content, MessageRecord};

/// Which side of the conversation a message sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Own,
    Other,
}

#[derive(Debug, Clone)]
pub struct ImageBody {
    /// Original data URI, kept for the full-size viewer.
    pub src: String,
    pub alt: String,
    pub handle: image::Handle,
}

#[derive(Debug, Clone)]
pub enum Body {
    Text(String),
    Image(ImageBody),
    Placeholder(String),
}

#[derive(Debug, Clone)]
pub struct MessageNode {
    pub id: String,
    pub sender: String,
    pub body: Body,
    pub role: Role,
    pub timestamp: i64,
}

/// Result of [`render_or_update`]: a fresh node the caller must attach, or
/// confirmation that an attached node was rewritten in place.
#[derive(Debug)]
pub enum Rendered {
    New(MessageNode),
    Updated,
}

/// The visible message list, in display order.
#[derive(Debug, Default)]
pub struct MessageList {
    nodes: Vec<MessageNode>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageNode> {
        self.nodes.iter()
    }

    pub fn get(&self, id: &str) -> Option<&MessageNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut MessageNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    pub fn append(&mut self, node: MessageNode) {
        self.nodes.push(node);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.nodes.iter().position(|node| node.id == id) {
            Some(index) => {
                self.nodes.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Writes `record` into the node keyed by `id`, creating one if needed.
pub fn render_or_update(
    list: &mut MessageList,
    id: &str,
    record: &MessageRecord,
    is_own: bool,
) -> Rendered {
    let role = if is_own { Role::Own } else { Role::Other };
    let body = render_body(&record.content);

    match list.get_mut(id) {
        Some(node) => {
            node.sender = record.sender.clone();
            node.body = body;
            node.role = role;
            node.timestamp = record.timestamp;
            Rendered::Updated
        }
        None => Rendered::New(MessageNode {
            id: id.to_string(),
            sender: record.sender.clone(),
            body,
            role,
            timestamp: record.timestamp,
        }),
    }
}

fn render_body(content: &Content) -> Body {
    match content {
        Content::Text { value } => Body::Text(value.clone()),
        Content::Image { value, filename } => {
            let alt = filename.clone().unwrap_or_else(|| "Image".to_string());
            match decode_data_uri(value) {
                Some((_, bytes)) => Body::Image(ImageBody {
                    src: value.clone(),
                    alt,
                    handle: image::Handle::from_memory(bytes),
                }),
                None => Body::Placeholder(format!("[Unreadable image: {}]", alt)),
            }
        }
        Content::Unknown { tag } => Body::Placeholder(format!(
            "[Unknown content: {}]",
            tag.as_deref().unwrap_or("N/A")
        )),
    }
}

/// Splits a `data:<mime>;base64,<payload>` URI into its MIME type and bytes.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    let datetime: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_default();
    let local_datetime: DateTime<Local> = datetime.with_timezone(&Local);
    let today = Local::now().date_naive();
    let message_date = local_datetime.date_naive();

    if message_date == today {
        local_datetime.format("%I:%M %p").to_string()
    } else if (today - message_date).num_days() == 1 {
        format!("Yesterday, {}", local_datetime.format("%I:%M %p"))
    } else {
        local_datetime.format("%b %d, %I:%M %p").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_record(sender: &str, text: &str) -> MessageRecord {
        MessageRecord::new(sender, Content::text(text), 1)
    }

    fn attach(list: &mut MessageList, id: &str, record: &MessageRecord, is_own: bool) {
        if let Rendered::New(node) = render_or_update(list, id, record, is_own) {
            list.append(node);
        }
    }

    #[test]
    fn test_new_node_is_returned_unattached() {
        let mut list = MessageList::new();
        let rendered = render_or_update(&mut list, "m1", &text_record("Ana", "hi"), true);
        match rendered {
            Rendered::New(node) => {
                assert_eq!(node.id, "m1");
                assert_eq!(node.sender, "Ana");
                assert_eq!(node.role, Role::Own);
                assert!(matches!(node.body, Body::Text(ref t) if t == "hi"));
            }
            Rendered::Updated => panic!("expected a new node"),
        }
        assert!(list.is_empty());
    }

    #[test]
    fn test_existing_node_is_rewritten_in_place() {
        let mut list = MessageList::new();
        attach(&mut list, "m1", &text_record("Ana", "hi"), true);
        let rendered = render_or_update(&mut list, "m1", &text_record("Ana", "hi edited"), false);
        assert!(matches!(rendered, Rendered::Updated));
        assert_eq!(list.len(), 1);
        let node = list.get("m1").unwrap();
        assert!(matches!(node.body, Body::Text(ref t) if t == "hi edited"));
        assert_eq!(node.role, Role::Other);
    }

    #[test]
    fn test_unknown_content_renders_placeholder() {
        let mut list = MessageList::new();
        let tagged = MessageRecord::new("Bo", Content::Unknown { tag: Some("poll".into()) }, 1);
        let untagged = MessageRecord::new("Bo", Content::Unknown { tag: None }, 2);
        attach(&mut list, "a", &tagged, false);
        attach(&mut list, "b", &untagged, false);
        assert!(matches!(list.get("a").unwrap().body, Body::Placeholder(ref t) if t == "[Unknown content: poll]"));
        assert!(matches!(list.get("b").unwrap().body, Body::Placeholder(ref t) if t == "[Unknown content: N/A]"));
    }

    #[test]
    fn test_image_content_decodes_data_uri() {
        let mut list = MessageList::new();
        let uri = format!("data:image/png;base64,{}", STANDARD.encode([137u8, 80, 78, 71]));
        let record = MessageRecord::new("Ana", Content::image(uri.clone(), "cat.png"), 1);
        attach(&mut list, "img", &record, true);
        match &list.get("img").unwrap().body {
            Body::Image(image) => {
                assert_eq!(image.src, uri);
                assert_eq!(image.alt, "cat.png");
            }
            other => panic!("expected an image, got {:?}", other),
        }
    }

    #[test]
    fn test_broken_image_renders_placeholder() {
        let mut list = MessageList::new();
        let record = MessageRecord::new(
            "Ana",
            Content::Image { value: "not a uri".into(), filename: None },
            1,
        );
        attach(&mut list, "img", &record, true);
        assert!(matches!(list.get("img").unwrap().body, Body::Placeholder(ref t) if t == "[Unreadable image: Image]"));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut list = MessageList::new();
        attach(&mut list, "m1", &text_record("Ana", "hi"), true);
        assert!(!list.remove("nope"));
        assert_eq!(list.len(), 1);
        assert!(list.remove("m1"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_decode_data_uri() {
        let (mime, bytes) = decode_data_uri("data:image/gif;base64,R0lG").unwrap();
        assert_eq!(mime, "image/gif");
        assert_eq!(bytes, b"GIF");
        assert!(decode_data_uri("data:image/gif,R0lG").is_none());
        assert!(decode_data_uri("image/gif;base64,R0lG").is_none());
    }
}
