//! Configuration for the bot engine.
//!
//! Loads a TOML file with `${ENV_VAR}` substitution.
//!
//! # Example
//!
//! ```toml
//! group_id = 123456
//! confirmation_token = "${CONFIRMATION_TOKEN}"
//! secret = "${SECRET}"
//! api_key = "${API_KEY}"
//! cmd_prefix = "!"
//!
//! [server]
//! port = 3000
//!
//! [outbound]
//! timeout_ms = 10000
//! ```
//!
//! All of `group_id`, `confirmation_token`, `secret`, and `api_key` are
//! required; a missing or empty value is a fatal startup error. The
//! configuration is immutable once the server starts.

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Root configuration structure.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    /// Platform group identity, matched against confirmation challenges
    pub group_id: i64,

    /// Literal body returned to a valid confirmation challenge
    pub confirmation_token: String,

    /// Shared secret every ordinary callback must carry
    pub secret: String,

    /// Messaging API access key
    pub api_key: String,

    /// Optional command prefix (e.g. "!"), stripped before command lookup
    #[serde(default)]
    pub cmd_prefix: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub outbound: OutboundConfig,
}

/// HTTP server settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

/// Outbound sender settings.
#[derive(Debug, Deserialize, Clone)]
pub struct OutboundConfig {
    /// Messaging API endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.vk.com/method/messages.send".to_string()
}

fn default_timeout_ms() -> u64 {
    10000
}

impl BotConfig {
    /// Load configuration from the default path or the `CHATRELAY_CONFIG`
    /// env var.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("CHATRELAY_CONFIG").unwrap_or_else(|_| "config/chatrelay.toml".to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        let config: BotConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            group_id = config.group_id,
            port = config.server.port,
            prefix = config.cmd_prefix.as_deref().unwrap_or(""),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate required fields and the outbound endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmation_token.is_empty() {
            return Err(ConfigError::MissingField("confirmation_token"));
        }
        if self.secret.is_empty() {
            return Err(ConfigError::MissingField("secret"));
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }
        if self.group_id == 0 {
            return Err(ConfigError::MissingField("group_id"));
        }

        // Unsubstituted env vars are almost always a deployment mistake.
        for (name, value) in [
            ("confirmation_token", &self.confirmation_token),
            ("secret", &self.secret),
            ("api_key", &self.api_key),
        ] {
            if value.contains("${") {
                warn!(field = name, "Value contains an unsubstituted environment variable");
            }
        }

        if !self.outbound.api_url.starts_with("http://")
            && !self.outbound.api_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "outbound.api_url must start with http:// or https://, got '{}'",
                self.outbound.api_url
            )));
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}
