//! AES-256-GCM encryption for OAuth tokens.
//!
//! Each token is encrypted separately with a fresh 128-bit nonce. The stored blob
//! is `nonce || tag || ciphertext`, base64-encoded, so a single column holds
//! everything needed to decrypt it.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};

/// AES-256-GCM with a 16-byte nonce.
type TokenAead = AesGcm<Aes256, U16>;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (128 bits)
pub const NONCE_SIZE: usize = 16;

/// Size of the authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Parses a 64-character hex key into raw key bytes.
///
/// # Returns
/// * `Ok([u8; 32])` - Decoded key
/// * `Err` - If the key is not exactly 64 hex characters
pub fn parse_key_hex(key_hex: &str) -> Result<[u8; KEY_SIZE]> {
    let key_hex = key_hex.trim();
    if key_hex.len() != KEY_SIZE * 2 {
        return Err(anyhow!(
            "Encryption key must be {} hex characters ({} bytes), got {} characters",
            KEY_SIZE * 2,
            KEY_SIZE,
            key_hex.len()
        ));
    }

    let bytes = hex::decode(key_hex).context("Encryption key is not valid hex")?;
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Encrypts plaintext and returns the base64 `nonce || tag || ciphertext` blob.
///
/// # Security
/// - Uses a cryptographically secure random nonce per call (never reuse)
/// - Authenticated encryption (tampering detected on decrypt)
pub fn encrypt(plaintext: &str, key: &[u8; KEY_SIZE]) -> Result<String> {
    let cipher = TokenAead::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + buffer.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(tag.as_slice());
    blob.extend_from_slice(&buffer);

    Ok(BASE64.encode(blob))
}

/// Decrypts a blob produced by [`encrypt`].
///
/// # Returns
/// * `Ok(String)` - Decrypted plaintext
/// * `Err` - If the blob is not base64, is truncated, was encrypted with another
///   key, or has been tampered with
pub fn decrypt(blob: &str, key: &[u8; KEY_SIZE]) -> Result<String> {
    let bytes = BASE64.decode(blob).context("Failed to decode token blob")?;

    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(anyhow!(
            "Token blob too short: expected at least {} bytes, got {}",
            NONCE_SIZE + TAG_SIZE,
            bytes.len()
        ));
    }

    let (nonce, rest) = bytes.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let cipher = TokenAead::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(buffer).context("Decrypted data is not valid UTF-8")
}
