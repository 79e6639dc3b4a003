//! Inbound payload classification types.
//!
//! The platform delivers every callback as a JSON object with a `type`
//! field. A `message_new` payload carries an ordinary user message; every
//! other type is treated as a special event and routed through the event
//! handler table.

use serde_json::Value;
use std::fmt;

/// Payload type string for ordinary user messages.
pub const MESSAGE_NEW: &str = "message_new";

/// The special events the engine recognizes.
///
/// `NoMatch` is synthetic: it is raised internally when a message matches
/// neither a command nor a pattern, never by the platform itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialEvent {
    MessageAllow,
    MessageDeny,
    MessageReply,
    NoMatch,
}

impl SpecialEvent {
    /// Parse a platform event type string. Unknown strings yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "message_allow" => Some(Self::MessageAllow),
            "message_deny" => Some(Self::MessageDeny),
            "message_reply" => Some(Self::MessageReply),
            "no_match" => Some(Self::NoMatch),
            _ => None,
        }
    }

    /// The wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageAllow => "message_allow",
            Self::MessageDeny => "message_deny",
            Self::MessageReply => "message_reply",
            Self::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for SpecialEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user message extracted from a `message_new` payload.
///
/// Constructed per request and dropped once dispatch completes.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Originating user id, used to address the reply
    pub user_id: i64,

    /// Message text exactly as the platform delivered it
    pub text: String,

    /// The full `object` payload, passed through to handler callbacks
    pub raw: Value,
}

impl InboundMessage {
    /// Extract a message from a callback `object` payload.
    ///
    /// Returns `None` when `user_id` or `body` is missing or of the wrong
    /// shape; such payloads are logged and dropped by the dispatcher.
    pub fn from_object(object: &Value) -> Option<Self> {
        let user_id = extract_user_id(object)?;
        let text = object.get("body")?.as_str()?.to_string();

        Some(Self {
            user_id,
            text,
            raw: object.clone(),
        })
    }
}

/// Pull the user id out of a callback `object`.
///
/// The platform sends ids as JSON numbers, but string ids show up in
/// the wild too, so both forms are accepted.
pub fn extract_user_id(object: &Value) -> Option<i64> {
    match object.get("user_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
