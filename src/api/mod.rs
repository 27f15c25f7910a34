// HTTP API: JSON endpoints, OAuth redirects and page models

pub mod account;
pub mod auth_middleware;
pub mod error;
pub mod integrations;
pub mod oauth;
pub mod pages;
pub mod session;

pub use auth_middleware::AuthSession;
pub use error::AppError;

use crate::config::UrieConfig;
use crate::credentials::TokenCipher;
use crate::link::StateSigner;
use crate::platforms::PlatformRegistry;
use crate::store::Store;
use anyhow::{Context, Result};
use axum::{
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared application state
///
/// Built once at startup; every handler receives it as `State<Arc<AppState>>`.
pub struct AppState {
    pub store: Arc<Store>,
    pub cipher: TokenCipher,
    pub signer: StateSigner,
    pub platforms: PlatformRegistry,
    pub config: UrieConfig,
}

impl AppState {
    /// Wires every dependency from configuration: opens the database, parses
    /// the token key, creates the state signer and the platform clients.
    pub fn from_config(config: UrieConfig) -> Result<Self> {
        let store = Store::open(&config.database.path)?;

        let cipher = TokenCipher::from_hex_key(config.token_encryption_key.as_deref())?;
        if !cipher.is_enabled() {
            warn!("TOKEN_ENCRYPTION_KEY not set; OAuth tokens will be stored in plaintext (development only)");
        }

        let signer = match config.oauth.state_secret.as_deref() {
            Some(secret) => StateSigner::new(secret.as_bytes(), config.oauth.state_ttl_seconds)?,
            None => {
                warn!("URIE_STATE_SECRET not set; using a random per-process OAuth state secret");
                StateSigner::random(config.oauth.state_ttl_seconds)?
            }
        };

        let platforms =
            PlatformRegistry::from_config(&config).context("Failed to build platform clients")?;

        Ok(Self {
            store: Arc::new(store),
            cipher,
            signer,
            platforms,
            config,
        })
    }
}

/// `302 Found` to `location`.
///
/// Browser-facing redirects use 302 rather than axum's 303/307 helpers.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Create the complete application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(session::routes())
        .merge(account::routes())
        .merge(oauth::routes())
        .merge(integrations::routes())
        .merge(pages::routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) fn test_state(config: UrieConfig) -> AppState {
    AppState {
        store: Arc::new(Store::in_memory().unwrap()),
        cipher: TokenCipher::plaintext(),
        signer: StateSigner::new(b"test-state-secret", config.oauth.state_ttl_seconds).unwrap(),
        platforms: PlatformRegistry::from_config(&config).unwrap(),
        config,
    }
}
