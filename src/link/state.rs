//! Signed, time-limited OAuth `state` parameter.
//!
//! Format: `base64url(json) "." base64url(hmac_sha256(secret, base64url(json)))`.
//! The JSON payload carries the creator and agency being linked plus the
//! issue time. Nothing is kept server-side, so states survive across
//! processes that share the secret.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock skew for states issued "in the future".
const MAX_SKEW_SECONDS: i64 = 60;

/// Payload round-tripped through the platform's consent screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkState {
    pub creator_id: String,
    pub agency_id: String,
    /// Issue time, unix seconds.
    pub iat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("state is malformed")]
    Malformed,
    #[error("state signature does not match")]
    BadSignature,
    #[error("state has expired")]
    Expired,
}

/// Issues and verifies OAuth state tokens.
#[derive(Clone)]
pub struct StateSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl StateSigner {
    /// Create a signer
    ///
    /// # Arguments
    /// * `secret` - HMAC key shared by every process that verifies states
    /// * `ttl_seconds` - How long states remain valid (default: 600 = 10 minutes)
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(anyhow!("State secret must not be empty"));
        }
        let mac = HmacSha256::new_from_slice(secret).context("Invalid state secret")?;
        let ttl_seconds = i64::try_from(ttl_seconds).context("State TTL out of range")?;
        Ok(Self {
            mac,
            ttl: Duration::seconds(ttl_seconds),
        })
    }

    /// Signer with a random per-process secret.
    pub fn random(ttl_seconds: u64) -> Result<Self> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(&secret, ttl_seconds)
    }

    pub fn sign(&self, creator_id: &str, agency_id: &str) -> Result<String> {
        self.sign_at(creator_id, agency_id, Utc::now())
    }

    /// Signs a state issued at `issued_at`.
    pub fn sign_at(
        &self,
        creator_id: &str,
        agency_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = LinkState {
            creator_id: creator_id.to_string(),
            agency_id: agency_id.to_string(),
            iat: issued_at.timestamp(),
        };
        let json = serde_json::to_vec(&claims).context("Failed to serialize state")?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.signature(&payload));
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verifies signature and age, returning the payload.
    pub fn verify(&self, state: &str) -> Result<LinkState, StateError> {
        let (payload, signature) = state.split_once('.').ok_or(StateError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StateError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| StateError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| StateError::Malformed)?;
        let claims: LinkState = serde_json::from_slice(&json).map_err(|_| StateError::Malformed)?;
        if claims.creator_id.is_empty() || claims.agency_id.is_empty() {
            return Err(StateError::Malformed);
        }

        let age = Utc::now().timestamp() - claims.iat;
        if age > self.ttl.num_seconds() || age < -MAX_SKEW_SECONDS {
            return Err(StateError::Expired);
        }

        Ok(claims)
    }

    fn signature(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSigner")
            .field("ttl_seconds", &self.ttl.num_seconds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> StateSigner {
        StateSigner::new(b"test-secret", 600).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = signer();
        let state = signer.sign("c1", "a1").unwrap();

        let claims = signer.verify(&state).unwrap();
        assert_eq!(claims.creator_id, "c1");
        assert_eq!(claims.agency_id, "a1");
    }

    #[test]
    fn test_state_is_url_safe() {
        let state = signer().sign("c1", "a1").unwrap();
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
    }

    #[test]
    fn test_unsigned_state_rejected() {
        let unsigned = URL_SAFE_NO_PAD.encode(r#"{"creatorId":"c1","agencyId":"a1"}"#);
        assert_eq!(signer().verify(&unsigned), Err(StateError::Malformed));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = signer();
        let state = signer.sign("c1", "a1").unwrap();
        let (_, signature) = state.split_once('.').unwrap();

        let forged = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"creatorId":"c2","agencyId":"a1","iat":{}}}"#,
            Utc::now().timestamp()
        ));
        let tampered = format!("{}.{}", forged, signature);
        assert_eq!(signer.verify(&tampered), Err(StateError::BadSignature));
    }

    #[test]
    fn test_other_secret_rejected() {
        let state = signer().sign("c1", "a1").unwrap();
        let other = StateSigner::new(b"other-secret", 600).unwrap();
        assert_eq!(other.verify(&state), Err(StateError::BadSignature));
    }

    #[test]
    fn test_expired_state_rejected() {
        let signer = signer();
        let state = signer
            .sign_at("c1", "a1", Utc::now() - Duration::seconds(601))
            .unwrap();
        assert_eq!(signer.verify(&state), Err(StateError::Expired));

        let state = signer
            .sign_at("c1", "a1", Utc::now() - Duration::seconds(590))
            .unwrap();
        assert!(signer.verify(&state).is_ok());
    }

    #[test]
    fn test_garbage_rejected() {
        let signer = signer();
        assert_eq!(signer.verify(""), Err(StateError::Malformed));
        assert_eq!(signer.verify("a.b.c"), Err(StateError::Malformed));
        assert_eq!(signer.verify("!!!.???"), Err(StateError::Malformed));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(StateSigner::new(b"", 600).is_err());
    }
}
