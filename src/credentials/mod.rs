//! At-rest protection for OAuth tokens.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Link flow / analytics                   │
//! │  - plaintext tokens in memory only       │
//! └─────────────────────────────────────────┘
//!          ↓ encrypt            ↑ decrypt
//! ┌─────────────────────────────────────────┐
//! │  TokenCipher                             │
//! │  - AES-256-GCM, 16-byte nonce + tag      │
//! │  - identity when no key is configured    │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │  Store (social_accounts columns)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use urie::credentials::TokenCipher;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cipher = TokenCipher::from_hex_key(Some(&"11".repeat(32)))?;
//! let blob = cipher.encrypt("access-token")?;
//! assert_eq!(cipher.decrypt(&blob)?, "access-token");
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;

pub use encryption::{parse_key_hex, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Tokens returned by a platform's OAuth token endpoint.
///
/// Lives in memory only; anything persisted goes through [`TokenCipher`] first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token, for platforms that issue one
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC)
    pub expires_at: Option<DateTime<Utc>>,

    /// Platform user id when the token endpoint reports it (Instagram
    /// `user_id`, TikTok `open_id`)
    pub user_id: Option<String>,
}

/// Symmetric cipher for tokens stored in the database.
///
/// Without a key this is the identity function. That mode exists for local
/// development only and is logged loudly at startup.
#[derive(Clone)]
pub struct TokenCipher {
    key: Option<[u8; KEY_SIZE]>,
}

impl TokenCipher {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key: Some(key) }
    }

    /// Cipher that stores tokens in plaintext (development only).
    pub fn plaintext() -> Self {
        Self { key: None }
    }

    /// Builds a cipher from an optional 64-character hex key.
    ///
    /// A missing or empty key yields the plaintext cipher; a key that is present
    /// but malformed is an error rather than a silent downgrade.
    pub fn from_hex_key(key_hex: Option<&str>) -> Result<Self> {
        match key_hex.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key_hex) => {
                let key = parse_key_hex(key_hex).context("Invalid TOKEN_ENCRYPTION_KEY")?;
                Ok(Self::new(key))
            }
            None => Ok(Self::plaintext()),
        }
    }

    /// True when tokens are actually encrypted.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        match &self.key {
            Some(key) => encryption::encrypt(plaintext, key),
            None => Ok(plaintext.to_string()),
        }
    }

    /// Decrypts a stored token.
    ///
    /// Fails when a key is configured and the blob cannot be authenticated
    /// under it; the caller must not use such a token.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        match &self.key {
            Some(key) => encryption::decrypt(blob, key),
            None => Ok(blob.to_string()),
        }
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
