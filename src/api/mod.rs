//! HTTP API.
//!
//! Translation and speech are open to every caller. User administration
//! and metrics need an identity with the ADMIN role.

mod error;
mod handlers;

pub use error::{ApiError, ErrorBody, MISSING_PARAMETERS};

use crate::auth::{IdentityResolver, TokenResolver};
use crate::config::Config;
use crate::metrics::GatewayMetrics;
use crate::speech::{AudioCache, CachedSpeech, SpeechGateway, SpeechSource};
use crate::translation::{TranslationGateway, Translator};
use crate::users::{PgUserDirectory, UserDirectory};
use anyhow::{Context, Result};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub text: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub translated_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: Option<String>,
    pub language: Option<String>,
}

/// Shared handles behind every route
#[derive(Clone)]
pub struct AppState {
    pub translator: Arc<dyn Translator>,
    pub speech: Arc<dyn SpeechSource>,
    pub identity: Arc<dyn IdentityResolver>,
    /// `None` when no database is configured
    pub users: Option<Arc<dyn UserDirectory>>,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let metrics = Arc::new(GatewayMetrics::new());

        let translator = TranslationGateway::from_config(config, client.clone(), metrics.clone())?;

        let speech_gateway = SpeechGateway::from_config(config, client, metrics.clone());
        let speech = CachedSpeech::new(
            speech_gateway,
            Arc::new(AudioCache::with_capacity(config.audio_cache_entries)),
        )
        .with_metrics(metrics.clone());

        let identity = TokenResolver::from_entries(&config.auth_tokens)
            .context("Failed to parse AUTH_TOKENS")?;
        if identity.is_empty() {
            warn!("AUTH_TOKENS is empty; admin routes will reject every request");
        } else {
            info!("Loaded {} access tokens", identity.len());
        }

        let users: Option<Arc<dyn UserDirectory>> = match &config.database_url {
            Some(url) => Some(Arc::new(PgUserDirectory::connect_lazy(url)?)),
            None => {
                warn!("DATABASE_URL not set; user routes will answer 503");
                None
            }
        };

        Ok(Self {
            translator: Arc::new(translator),
            speech: Arc::new(speech),
            identity: Arc::new(identity),
            users,
            metrics,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/languages", get(handlers::languages))
        .route("/api/translate", post(handlers::translate))
        .route("/api/speech", post(handlers::speech))
        .route("/api/session", get(handlers::session))
        .route("/api/users", get(handlers::list_users))
        .route("/api/users/:id", get(handlers::user_by_id))
        .route("/api/users/:id/role", put(handlers::update_role))
        .route("/api/users/:id/subscription", get(handlers::subscription))
        .route("/api/admin/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("✓ Listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")
}
