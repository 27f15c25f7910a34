//! Password hashing and session token generation.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;
use tokio::task::spawn_blocking;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hashes a password into a PHC string (Argon2id, default parameters).
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| anyhow!("Failed to encode password salt: {e}"))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Checks a password against a stored PHC string.
///
/// `Ok(false)` for a wrong password, `Err` for an unreadable hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {e}")),
    }
}

/// [`hash_password`] on the blocking pool, for request handlers.
pub async fn hash_password_blocking(password: String) -> Result<String> {
    spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")?
}

/// [`verify_password`] on the blocking pool, for request handlers.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")?
}

/// Random 256-bit session token, hex encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
