//! Dispatcher - handler selection and invocation.
//!
//! The dispatcher receives verified callback payloads from the gateway and
//! walks the [`HandlerRegistry`] in a fixed precedence order, invoking at
//! most one handler per payload.
//!
//! # Resolution order
//!
//! ```text
//! payload type == "message_new"
//!     │
//!     ▼
//! 1. command table   (first token, prefix stripped, first match wins)
//! 2. pattern table   (regex over lower-cased text, first match wins)
//! 3. no_match event  (synthetic fallback)
//!
//! any other payload type
//!     │
//!     ▼
//! event table        (first handler for that event kind)
//! ```
//!
//! A handler returning non-empty text produces exactly one outbound send,
//! addressed to the originating user. `message_deny` is the deliberate
//! exception: denial events never produce a reply, whatever the handler
//! returns.

use crate::event::{extract_user_id, InboundMessage, SpecialEvent, MESSAGE_NEW};
use crate::outbound::Sender;
use crate::registry::HandlerRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Walks the registry for each verified payload and forwards replies to
/// the outbound sender.
///
/// The registry and sender are shared immutably; a single dispatcher
/// serves all in-flight requests without locking.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    sender: Arc<dyn Sender>,
    cmd_prefix: Option<String>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        sender: Arc<dyn Sender>,
        cmd_prefix: Option<String>,
    ) -> Self {
        Self {
            registry,
            sender,
            cmd_prefix,
        }
    }

    /// Dispatch one verified callback payload.
    ///
    /// `message_new` payloads go through command/pattern resolution; every
    /// other type string is routed as a special event. Malformed payloads
    /// are logged and dropped, never escalated.
    pub async fn dispatch(&self, payload: &Value) {
        let Some(kind) = payload.get("type").and_then(Value::as_str) else {
            warn!("Payload without a type field, dropping");
            return;
        };

        let Some(object) = payload.get("object") else {
            warn!(kind, "Payload without an object field, dropping");
            return;
        };

        if kind == MESSAGE_NEW {
            let Some(message) = InboundMessage::from_object(object) else {
                warn!("message_new payload missing user_id or body, dropping");
                return;
            };

            info!(user_id = message.user_id, "New message");
            self.handle_message(message).await;
        } else {
            info!(kind, "Received event");
            self.handle_named_event(kind, object).await;
        }
    }

    /// Command and pattern resolution for an ordinary message.
    async fn handle_message(&self, message: InboundMessage) {
        let lowered = message.text.to_lowercase();

        // First whitespace-delimited token, prefix stripped, is the
        // command candidate.
        let mut candidate = lowered.split_whitespace().next().unwrap_or("").to_string();
        if let Some(prefix) = &self.cmd_prefix {
            candidate = candidate.replacen(&prefix.to_lowercase(), "", 1);
        }

        if let Some(handler) = self.registry.find_command(&candidate) {
            // Remove the first occurrence of "<prefix><command>" from the
            // original-cased text; the callback sees the remainder.
            let needle = match &self.cmd_prefix {
                Some(prefix) => format!("{prefix}{}", handler.command),
                None => handler.command.clone(),
            };
            let remainder = remove_first_ignore_case(&message.text, &needle);

            debug!(command = %handler.command, "Command matched");
            let answer = (handler.callback)(&remainder, &message.raw);
            self.reply(message.user_id, answer).await;
            return;
        }

        if let Some(handler) = self.registry.find_pattern(&lowered) {
            debug!(pattern = %handler.pattern, "Pattern matched");
            let answer = (handler.callback)(&message.text, &message.raw);
            self.reply(message.user_id, answer).await;
            return;
        }

        info!(text = %message.text, "No command or pattern matched, raising no_match");
        self.handle_event(SpecialEvent::NoMatch, message.user_id, &message.raw)
            .await;
    }

    /// Event resolution for a platform-named event type.
    async fn handle_named_event(&self, name: &str, object: &Value) {
        let Some(event) = SpecialEvent::parse(name) else {
            warn!(kind = name, "Unsupported event type, dropping");
            return;
        };

        let Some(user_id) = extract_user_id(object) else {
            warn!(kind = name, "Event payload without user_id, dropping");
            return;
        };

        self.handle_event(event, user_id, object).await;
    }

    /// Invoke the first registered handler for `event`, if any.
    async fn handle_event(&self, event: SpecialEvent, user_id: i64, raw: &Value) {
        let Some(handler) = self.registry.find_event(event) else {
            info!(event = %event, "No handler registered for event");
            return;
        };

        let answer = (handler.callback)(user_id, raw);

        // Denial events never produce a reply, whatever the handler
        // returned.
        if event == SpecialEvent::MessageDeny {
            return;
        }

        self.reply(user_id, answer).await;
    }

    /// Forward a non-empty handler answer to the outbound sender. Delivery
    /// failures are logged and dropped.
    async fn reply(&self, user_id: i64, answer: Option<String>) {
        let Some(text) = answer else { return };
        if text.is_empty() {
            return;
        }

        if let Err(e) = self.sender.send(user_id, &text).await {
            warn!(user_id, error = %e, "Failed to deliver reply");
        }
    }
}

/// Remove the first case-insensitive occurrence of `needle` from `text`.
///
/// This mirrors the matching step: the command was found in the
/// lower-cased text, so the removal must tolerate the original casing.
fn remove_first_ignore_case(text: &str, needle: &str) -> String {
    if needle.is_empty() {
        return text.to_string();
    }

    let needle: Vec<char> = needle.chars().collect();
    let mut start = 0;
    while start < text.len() {
        if let Some(end) = match_at_ignore_case(text, start, &needle) {
            let mut out = String::with_capacity(text.len() - (end - start));
            out.push_str(&text[..start]);
            out.push_str(&text[end..]);
            return out;
        }
        // Advance one char
        start += text[start..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1);
    }

    text.to_string()
}

/// If `needle` matches `text` at byte offset `start` ignoring case,
/// return the byte offset just past the match.
fn match_at_ignore_case(text: &str, start: usize, needle: &[char]) -> Option<usize> {
    let mut pos = start;
    for &expected in needle {
        let actual = text[pos..].chars().next()?;
        let equal = actual == expected || actual.to_lowercase().eq(expected.to_lowercase());
        if !equal {
            return None;
        }
        pos += actual.len_utf8();
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::SendError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every send instead of touching the network.
    struct RecordingSender {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sender for RecordingSender {
        async fn send(&self, user_id: i64, text: &str) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::Status(500));
            }
            self.sent.lock().unwrap().push((user_id, text.to_string()));
            Ok(())
        }
    }

    fn dispatcher(
        registry: HandlerRegistry,
        prefix: Option<&str>,
    ) -> (Dispatcher, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            sender.clone(),
            prefix.map(str::to_string),
        );
        (dispatcher, sender)
    }

    fn message(user_id: i64, body: &str) -> Value {
        json!({
            "type": "message_new",
            "object": {"user_id": user_id, "body": body}
        })
    }

    #[tokio::test]
    async fn test_command_beats_pattern() {
        let mut registry = HandlerRegistry::new();
        registry
            .command("hello", None, |_, _| Some("from command".to_string()))
            .unwrap();
        registry
            .pattern("hello", |_, _| Some("from pattern".to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&message(7, "hello world")).await;

        assert_eq!(sender.sent(), vec![(7, "from command".to_string())]);
    }

    #[tokio::test]
    async fn test_command_matching_is_case_insensitive() {
        let mut registry = HandlerRegistry::new();
        registry
            .command("hello", None, |_, _| Some("hi".to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&message(1, "HeLLo there")).await;

        assert_eq!(sender.sent(), vec![(1, "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_prefix_and_command_stripped_from_remainder() {
        let mut registry = HandlerRegistry::new();
        registry
            .command("hello", None, |text, _| Some(format!("[{text}]")))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, Some("!"));
        dispatcher.dispatch(&message(3, "!hello world")).await;

        assert_eq!(sender.sent(), vec![(3, "[ world]".to_string())]);
    }

    #[tokio::test]
    async fn test_stripping_removes_single_first_occurrence() {
        let mut registry = HandlerRegistry::new();
        registry
            .command("go", None, |text, _| Some(text.to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&message(5, "go to go")).await;

        // Only the first "go" is removed; later occurrences survive.
        assert_eq!(sender.sent(), vec![(5, " to go".to_string())]);
    }

    #[tokio::test]
    async fn test_pattern_receives_original_cased_text() {
        let mut registry = HandlerRegistry::new();
        registry
            .pattern("nice.*bot", |text, _| Some(text.to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&message(2, "Nice work, Bot")).await;

        assert_eq!(sender.sent(), vec![(2, "Nice work, Bot".to_string())]);
    }

    #[tokio::test]
    async fn test_no_match_event_receives_original_object() {
        let mut registry = HandlerRegistry::new();
        registry
            .on("no_match", |uid, raw| {
                assert_eq!(raw["body"], "gibberish");
                Some(format!("sorry {uid}"))
            })
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&message(9, "gibberish")).await;

        assert_eq!(sender.sent(), vec![(9, "sorry 9".to_string())]);
    }

    #[tokio::test]
    async fn test_message_deny_never_replies() {
        let mut registry = HandlerRegistry::new();
        registry
            .on("message_deny", |_, _| Some("you won't see this".to_string()))
            .unwrap();
        registry
            .on("message_allow", |_, _| Some("welcome back".to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);

        dispatcher
            .dispatch(&json!({"type": "message_deny", "object": {"user_id": 4}}))
            .await;
        assert!(sender.sent().is_empty());

        dispatcher
            .dispatch(&json!({"type": "message_allow", "object": {"user_id": 4}}))
            .await;
        assert_eq!(sender.sent(), vec![(4, "welcome back".to_string())]);
    }

    #[tokio::test]
    async fn test_unrecognized_event_is_dropped() {
        let mut registry = HandlerRegistry::new();
        registry
            .on("no_match", |_, _| Some("fallback".to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher
            .dispatch(&json!({"type": "group_join", "object": {"user_id": 1}}))
            .await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_event_is_silent() {
        let (dispatcher, sender) = dispatcher(HandlerRegistry::new(), None);
        dispatcher
            .dispatch(&json!({"type": "message_reply", "object": {"user_id": 1}}))
            .await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_suppresses_reply() {
        let mut registry = HandlerRegistry::new();
        registry.command("quiet", None, |_, _| None).unwrap();
        registry
            .command("blank", None, |_, _| Some(String::new()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&message(1, "quiet")).await;
        dispatcher.dispatch(&message(1, "blank")).await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped() {
        let mut registry = HandlerRegistry::new();
        registry
            .on("no_match", |_, _| Some("fallback".to_string()))
            .unwrap();

        let (dispatcher, sender) = dispatcher(registry, None);
        dispatcher.dispatch(&json!({"object": {}})).await;
        dispatcher.dispatch(&json!({"type": "message_new"})).await;
        dispatcher
            .dispatch(&json!({"type": "message_new", "object": {"user_id": 1}}))
            .await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_isolated() {
        let mut registry = HandlerRegistry::new();
        registry
            .command("hello", None, |_, _| Some("hi".to_string()))
            .unwrap();

        let sender = Arc::new(RecordingSender::failing());
        let dispatcher = Dispatcher::new(Arc::new(registry), sender, None);

        // Must not panic or propagate.
        dispatcher.dispatch(&message(1, "hello")).await;
    }

    #[test]
    fn test_remove_first_ignore_case() {
        assert_eq!(remove_first_ignore_case("Hello world", "hello"), " world");
        assert_eq!(remove_first_ignore_case("!Hello world", "!hello"), " world");
        assert_eq!(remove_first_ignore_case("go to go", "go"), " to go");
        assert_eq!(remove_first_ignore_case("no match here", "xyz"), "no match here");
        assert_eq!(remove_first_ignore_case("text", ""), "text");
    }
}
