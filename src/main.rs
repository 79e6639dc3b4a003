//! Chatrelay demo bot.
//!
//! Shows the embedding pattern: load configuration, register handlers,
//! and serve the webhook endpoint. Configuration comes from
//! `config/chatrelay.toml` (or `CHATRELAY_CONFIG`) with `${ENV_VAR}`
//! substitution; see [`chatrelay::config`].

use chatrelay::gateway::{build_app, AppState};
use chatrelay::outbound::ApiSender;
use chatrelay::shutdown::shutdown_signal;
use chatrelay::{BotConfig, Dispatcher, HandlerRegistry};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    // Configuration and registration errors are programmer/deployment
    // errors; log and terminate with a non-zero status.
    if let Err(e) = run().await {
        error!(error = %e, "Fatal error during startup");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(BotConfig::load()?);

    let registry = Arc::new(build_registry(&config)?);
    info!(handlers = registry.handler_count(), "Handlers registered");

    let sender = ApiSender::new(&config.outbound.api_url, &config.api_key)
        .with_timeout(Duration::from_millis(config.outbound.timeout_ms));
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(sender),
        config.cmd_prefix.clone(),
    ));

    let app = build_app(AppState {
        config: config.clone(),
        dispatcher,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server is listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Register the demo handlers. Registration order is the precedence
/// order, so the broad pattern goes last.
fn build_registry(config: &BotConfig) -> Result<HandlerRegistry, chatrelay::RegistryError> {
    let mut registry = HandlerRegistry::new();

    // The help text is rendered after every command is registered; the
    // callback reads the snapshot through a OnceLock.
    let help_text: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
    let snapshot = help_text.clone();
    registry.command("help", Some("list available commands"), move |_, _| {
        snapshot.get().cloned()
    })?;

    registry.command("hello", Some("greet the bot"), |_, _| {
        Some("Hello there!".to_string())
    })?;

    registry.command("echo", Some("repeat the rest of the message"), |text, _| {
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    })?;

    registry.pattern(r"(\bhi\b|\bhey\b)", |_, _| Some("Hi!".to_string()))?;

    registry.on("message_allow", |user_id, _| {
        info!(user_id, "User allowed messages");
        Some("Glad to have you back!".to_string())
    })?;

    registry.on("message_deny", |user_id, _| {
        info!(user_id, "User denied messages");
        None
    })?;

    registry.on("no_match", |_, _| {
        Some("I don't understand that. Try \"help\".".to_string())
    })?;

    let _ = help_text.set(registry.help(config.cmd_prefix.as_deref()));

    Ok(registry)
}
