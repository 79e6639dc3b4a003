//! # Chatrelay
//!
//! A webhook-driven message routing engine for chat-bot platforms.
//!
//! Inbound callback payloads arrive over HTTP, are verified against the
//! configured group identity and shared secret, classified, and dispatched
//! to user-registered command, pattern, and event handlers. Replies go out
//! through the platform messaging API.
//!
//! ## Architecture
//!
//! ```text
//! Platform -> HTTP Gateway -> Dispatcher -> Handler -> Outbound Sender
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Inbound payload classification types
//! - [`registry`]: Ordered command/pattern/event handler tables
//! - [`dispatch`]: Handler selection and invocation
//! - [`gateway`]: Webhook verification and the HTTP surface
//! - [`outbound`]: Delivery of replies to the messaging API
//! - [`config`]: TOML configuration with environment substitution
//! - [`shutdown`]: Graceful shutdown coordination

pub mod config;
pub mod dispatch;
pub mod event;
pub mod gateway;
pub mod outbound;
pub mod registry;
pub mod shutdown;

// Re-export commonly used types at crate root
pub use config::BotConfig;
pub use dispatch::Dispatcher;
pub use event::{InboundMessage, SpecialEvent};
pub use outbound::{ApiSender, SendError, Sender};
pub use registry::{HandlerRegistry, RegistryError};
