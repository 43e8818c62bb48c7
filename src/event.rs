//! Decoding of inbound frames into chat events.
//!
//! Two shapes are understood:
//!
//! - OneBot v11 events (as pushed by `NapCat` and similar gateways): meta events
//!   (heartbeats, lifecycle) and message events
//! - A minimal internal shape: `{"user_id": "...", "text": "...", "timestamp": "<RFC 3339>"}`
//!
//! A frame may carry a single object or a top-level array of them. Anything
//! that matches neither shape is dropped.

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;
use serde_with::serde_as;

use crate::serde_helpers::StringFromAny;

/// A decoded inbound event.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Gateway bookkeeping such as heartbeats; never user content
    Meta(MetaEvent),
    Message(Message),
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEvent {
    /// `meta_event_type`, e.g. `heartbeat` or `lifecycle`
    pub kind: String,
    /// Heartbeat interval announced by the gateway, in milliseconds
    pub interval: Option<u64>,
}

impl MetaEvent {
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.kind == "heartbeat"
    }
}

/// A chat message, normalized across the supported shapes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub self_id: Option<String>,
    pub user_id: String,
    pub text: String,
    pub timestamp: DateTime<Local>,
    /// `group` or `private`
    pub message_type: Option<String>,
    /// Present for group messages only
    pub group_id: Option<String>,
    /// Sent by the bot account itself
    pub from_self: bool,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct OneBotEvent {
    #[serde(default)]
    post_type: String,
    #[serde_as(as = "Option<StringFromAny>")]
    self_id: Option<String>,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    meta_event_type: String,
    interval: Option<u64>,
    message_type: Option<String>,
    #[serde_as(as = "Option<StringFromAny>")]
    user_id: Option<String>,
    #[serde_as(as = "Option<StringFromAny>")]
    group_id: Option<String>,
    /// Either a plain string or an array of segments
    message: Option<Value>,
    #[serde(default)]
    raw_message: String,
    sender: Option<Sender>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct Sender {
    #[serde_as(as = "Option<StringFromAny>")]
    user_id: Option<String>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct InternalMessage {
    #[serde_as(as = "Option<StringFromAny>")]
    user_id: Option<String>,
    text: Option<String>,
    timestamp: Option<String>,
}

/// Decode every event carried by one frame.
#[must_use]
pub fn decode_frame(raw: &[u8]) -> Vec<Event> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_slice::<Value>(trimmed) {
        Ok(Value::Array(items)) => items.iter().filter_map(decode_value).collect(),
        Ok(value) => decode_value(&value).into_iter().collect(),
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Dropping frame that is not JSON");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            Vec::new()
        }
    }
}

/// Decode a single JSON object.
#[must_use]
pub fn decode_value(value: &Value) -> Option<Event> {
    if let Ok(event) = OneBotEvent::deserialize(value) {
        match event.post_type.as_str() {
            "meta_event" => {
                return Some(Event::Meta(MetaEvent {
                    kind: event.meta_event_type,
                    interval: event.interval,
                }));
            }
            "message" if event.user_id.is_some() => return Some(Event::Message(event.into_message())),
            _ => {}
        }
    }

    let internal = InternalMessage::deserialize(value).ok()?;
    let user_id = internal.user_id.filter(|id| !id.is_empty())?;
    let text = internal.text.filter(|text| !text.is_empty())?;
    let timestamp = internal
        .timestamp
        .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
        .map_or_else(Local::now, |ts| ts.with_timezone(&Local));

    Some(Event::Message(Message {
        self_id: None,
        user_id,
        text,
        timestamp,
        message_type: None,
        group_id: None,
        from_self: false,
    }))
}

impl OneBotEvent {
    fn into_message(self) -> Message {
        let text = extract_text(self.message.as_ref(), &self.raw_message);

        let from_self = self.self_id.as_ref().is_some_and(|self_id| {
            let sender = self.sender.as_ref().and_then(|s| s.user_id.as_ref());
            sender == Some(self_id) || self.user_id.as_ref() == Some(self_id)
        });

        let timestamp = DateTime::from_timestamp(self.time, 0)
            .map_or_else(Local::now, |ts| ts.with_timezone(&Local));

        Message {
            self_id: self.self_id,
            user_id: self.user_id.unwrap_or_default(),
            text,
            timestamp,
            message_type: self.message_type,
            group_id: self.group_id,
            from_self,
        }
    }
}

/// Text of a OneBot `message` field: a plain string, else the concatenated
/// `text` segments, else `fallback` (the gateway's `raw_message`).
fn extract_text(message: Option<&Value>, fallback: &str) -> String {
    match message {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(Value::Array(segments)) => {
            let text: String = segments
                .iter()
                .filter(|segment| segment.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|segment| segment.pointer("/data/text").and_then(Value::as_str))
                .collect();

            if text.is_empty() {
                fallback.to_owned()
            } else {
                text
            }
        }
        _ => fallback.to_owned(),
    }
}
