//! Handler registry - the ordered routing tables of the engine.
//!
//! The [`HandlerRegistry`] holds three collections, each preserving
//! registration order:
//!
//! - command handlers, keyed by an exact leading token
//! - pattern handlers, keyed by a regex over the lower-cased message
//! - event handlers, keyed by one of the recognized [`SpecialEvent`] kinds
//!
//! Registration order is a user-visible precedence contract: lookup is a
//! linear scan and the first match wins, so the tables are never reordered
//! into maps.
//!
//! The registry is append-only during setup and read-only once the server
//! is serving. Share it through an `Arc`; no locking is needed after
//! startup.
//!
//! # Example
//!
//! ```rust,ignore
//! use chatrelay::HandlerRegistry;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.command("hello", Some("greet the bot"), |_, _| {
//!     Some("Hi!".to_string())
//! })?;
//! registry.pattern(r"nice.*bot", |_, _| Some("Thanks!".to_string()))?;
//! registry.on("no_match", |_, _| Some("I don't understand.".to_string()))?;
//! ```

use crate::event::SpecialEvent;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Callback invoked for command and pattern matches.
///
/// Receives the message text (remainder after command stripping, or the
/// full original text for patterns) and the raw callback object. A
/// non-empty return value becomes the outbound reply.
pub type MessageCallback = Arc<dyn Fn(&str, &Value) -> Option<String> + Send + Sync>;

/// Callback invoked for special events. Receives the user id and the raw
/// callback object.
pub type EventCallback = Arc<dyn Fn(i64, &Value) -> Option<String> + Send + Sync>;

/// Errors raised during handler registration.
///
/// These are programmer errors in the embedding application and are meant
/// to be fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required registration argument was empty
    #[error("missing parameter '{name}' for {function}()")]
    MissingParam {
        function: &'static str,
        name: &'static str,
    },

    /// The pattern rule failed to compile
    #[error("invalid pattern rule: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The event name is not one of the recognized kinds
    #[error("unsupported event type: '{0}'")]
    UnknownEvent(String),
}

/// A handler bound to an exact leading command token.
#[derive(Clone)]
pub struct CommandHandler {
    /// Lower-cased command token, without the prefix
    pub command: String,

    /// Optional one-line description used by [`HandlerRegistry::help`]
    pub description: Option<String>,

    pub callback: MessageCallback,
}

/// A handler bound to a regex evaluated against the lower-cased message.
#[derive(Clone)]
pub struct PatternHandler {
    pub pattern: Regex,
    pub callback: MessageCallback,
}

/// A handler bound to one of the recognized special events.
#[derive(Clone)]
pub struct EventHandler {
    pub event: SpecialEvent,
    pub callback: EventCallback,
}

/// The three ordered handler tables.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    commands: Vec<CommandHandler>,
    patterns: Vec<PatternHandler>,
    events: Vec<EventHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command handler for an exact leading token.
    ///
    /// The token is matched case-insensitively and without the configured
    /// prefix. Registration order decides precedence between duplicate
    /// tokens: the first registered wins.
    pub fn command<F>(
        &mut self,
        token: &str,
        description: Option<&str>,
        callback: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&str, &Value) -> Option<String> + Send + Sync + 'static,
    {
        if token.is_empty() {
            return Err(RegistryError::MissingParam {
                function: "command",
                name: "token",
            });
        }

        debug!(command = %token, "Registering command handler");

        self.commands.push(CommandHandler {
            command: token.to_lowercase(),
            description: description.map(str::to_string),
            callback: Arc::new(callback),
        });
        Ok(())
    }

    /// Register a pattern handler.
    ///
    /// The rule is compiled once at registration and evaluated against the
    /// lower-cased message text during dispatch.
    pub fn pattern<F>(&mut self, rule: &str, callback: F) -> Result<(), RegistryError>
    where
        F: Fn(&str, &Value) -> Option<String> + Send + Sync + 'static,
    {
        if rule.is_empty() {
            return Err(RegistryError::MissingParam {
                function: "pattern",
                name: "rule",
            });
        }

        debug!(rule = %rule, "Registering pattern handler");

        self.patterns.push(PatternHandler {
            pattern: Regex::new(rule)?,
            callback: Arc::new(callback),
        });
        Ok(())
    }

    /// Register a handler for one of the special events.
    ///
    /// `name` must be one of `message_allow`, `message_deny`,
    /// `message_reply`, `no_match`; anything else is a fatal
    /// [`RegistryError::UnknownEvent`].
    pub fn on<F>(&mut self, name: &str, callback: F) -> Result<(), RegistryError>
    where
        F: Fn(i64, &Value) -> Option<String> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(RegistryError::MissingParam {
                function: "on",
                name: "name",
            });
        }

        let event =
            SpecialEvent::parse(name).ok_or_else(|| RegistryError::UnknownEvent(name.to_string()))?;

        debug!(event = %event, "Registering event handler");

        self.events.push(EventHandler {
            event,
            callback: Arc::new(callback),
        });
        Ok(())
    }

    /// First command handler whose token equals `candidate`, in
    /// registration order.
    pub fn find_command(&self, candidate: &str) -> Option<&CommandHandler> {
        self.commands.iter().find(|h| h.command == candidate)
    }

    /// First pattern handler whose rule matches `lowered`, in registration
    /// order.
    pub fn find_pattern(&self, lowered: &str) -> Option<&PatternHandler> {
        self.patterns.iter().find(|h| h.pattern.is_match(lowered))
    }

    /// First event handler registered for `event`.
    pub fn find_event(&self, event: SpecialEvent) -> Option<&EventHandler> {
        self.events.iter().find(|h| h.event == event)
    }

    /// Number of registered handlers across all three tables.
    pub fn handler_count(&self) -> usize {
        self.commands.len() + self.patterns.len() + self.events.len()
    }

    /// Render the help text: one line per registered command, in
    /// registration order, as `"<prefix><command> - <description>"` with
    /// the dash and description omitted when absent.
    pub fn help(&self, prefix: Option<&str>) -> String {
        let prefix = prefix.unwrap_or("");
        let mut out = String::from("\n");

        for handler in &self.commands {
            out.push_str(prefix);
            out.push_str(&handler.command);

            if let Some(description) = &handler.description {
                out.push_str(" - ");
                out.push_str(description);
            }

            out.push('\n');
        }

        out
    }
}
