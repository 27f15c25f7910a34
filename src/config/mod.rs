use crate::models::Platform;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete Urie configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrieConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    /// 64 hex characters. Tokens are stored in plaintext when absent.
    #[serde(default)]
    pub token_encryption_key: Option<String>,
    #[serde(default)]
    pub instagram: PlatformConfig,
    #[serde(default)]
    pub tiktok: PlatformConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public origin used to build OAuth redirect URIs and callback redirects.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    "urie.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Login session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Sessions older than this are treated as unauthenticated.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "urie_session".to_string()
}

fn default_max_age_days() -> i64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            max_age_days: default_max_age_days(),
            secure_cookie: false,
        }
    }
}

/// OAuth state signing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// HMAC secret for the `state` parameter. A random per-process secret is
    /// used when unset, which invalidates pending links on restart.
    #[serde(default)]
    pub state_secret: Option<String>,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: u64,
}

fn default_state_ttl() -> u64 {
    600
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_secret: None,
            state_ttl_seconds: default_state_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Items fetched per metrics refresh.
    #[serde(default = "default_refresh_page_size")]
    pub refresh_page_size: u32,
    /// Upper bound for the `limit` query parameter of content listings.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_refresh_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            refresh_page_size: default_refresh_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// OAuth client credentials and endpoint overrides for one platform.
///
/// Unset endpoints fall back to the platform's production URLs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl PlatformConfig {
    /// Client id, when configured and non-empty.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Client id and secret, when both are configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id()?;
        let secret = self.client_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((id, secret))
    }
}

impl UrieConfig {
    /// Loads the TOML file named by `URIE_CONFIG` (if any), then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("URIE_CONFIG") {
            Ok(path) if !path.is_empty() => load_config(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlays values from an environment lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("URIE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("URIE_BASE_URL") {
            self.server.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("URIE_DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("URIE_SECURE_COOKIE") {
            if let Ok(b) = v.parse::<bool>() {
                self.session.secure_cookie = b;
            }
        }
        if let Some(v) = get("URIE_STATE_SECRET") {
            self.oauth.state_secret = Some(v);
        }
        if let Some(v) = get("TOKEN_ENCRYPTION_KEY") {
            self.token_encryption_key = Some(v);
        }
        if let Some(v) = get("AUTH_INSTAGRAM_ID") {
            self.instagram.client_id = Some(v);
        }
        if let Some(v) = get("AUTH_INSTAGRAM_SECRET") {
            self.instagram.client_secret = Some(v);
        }
        if let Some(v) = get("TIKTOK_CLIENT_KEY") {
            self.tiktok.client_id = Some(v);
        }
        if let Some(v) = get("TIKTOK_CLIENT_SECRET") {
            self.tiktok.client_secret = Some(v);
        }
    }

    pub fn platform(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Instagram => &self.instagram,
            Platform::TikTok => &self.tiktok,
        }
    }

    /// Absolute URL of the integration page for `platform`.
    pub fn integration_url(&self, platform: Platform) -> String {
        format!("{}{}", self.server.base_url, platform.integration_path())
    }

    /// Redirect URI registered with the platform.
    pub fn callback_url(&self, platform: Platform) -> String {
        format!("{}{}", self.server.base_url, platform.callback_path())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<UrieConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let mut config: UrieConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    config.server.base_url = config.server.base_url.trim_end_matches('/').to_string();
    Ok(config)
}
