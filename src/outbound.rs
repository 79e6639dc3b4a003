//! Outbound sender - delivery of replies to the messaging API.
//!
//! The [`Sender`] trait is the seam between the dispatcher and the
//! network: production code uses [`ApiSender`], tests substitute a
//! recording stub.
//!
//! Delivery is strictly one attempt. A failed send is logged and the
//! message is dropped; nothing else in flight is affected.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default timeout for outbound API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by an outbound delivery attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// The HTTP request itself failed (connect, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("messaging API returned status {0}")]
    Status(u16),
}

/// Delivers one outbound message to a user.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Send `text` to `user_id`. One attempt; failure means the message
    /// is dropped.
    async fn send(&self, user_id: i64, text: &str) -> Result<(), SendError>;
}

/// [`Sender`] backed by the platform messaging endpoint.
///
/// Issues one GET per reply with `user_id`, URL-encoded `message`, and
/// `access_token` query parameters.
#[derive(Debug, Clone)]
pub struct ApiSender {
    /// Messaging endpoint, e.g. `https://api.vk.com/method/messages.send`
    api_url: String,

    /// API access key, passed as the `access_token` parameter
    api_key: String,

    /// HTTP client (reused for connection pooling)
    client: Client,

    /// Request timeout
    timeout: Duration,
}

impl ApiSender {
    /// Create a sender targeting `api_url` with the given access key.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Sender for ApiSender {
    async fn send(&self, user_id: i64, text: &str) -> Result<(), SendError> {
        debug!(user_id, "Sending outbound message");

        let response = self
            .client
            .get(&self.api_url)
            .timeout(self.timeout)
            .query(&[
                ("user_id", user_id.to_string().as_str()),
                ("message", text),
                ("access_token", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(user_id, "Message sent");
            Ok(())
        } else {
            warn!(user_id, status = %status, "Messaging API rejected the send");
            Err(SendError::Status(status.as_u16()))
        }
    }
}
