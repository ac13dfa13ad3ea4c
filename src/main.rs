use anyhow::{Context, Result};
use multi_translator::api::{self, AppState};
use multi_translator::config::Config;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multi_translator=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Starting multi-translator server");

    let config = Config::from_env()?;
    info!(
        "Translation backend: {:?}, speech: {}",
        config.translation_backend,
        if config.google_tts_api_key.is_some() { "enabled" } else { "not configured" }
    );

    let state = AppState::from_config(&config)?;

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    api::serve(listener, state).await
}
