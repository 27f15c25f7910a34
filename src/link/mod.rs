//! OAuth account linking.
//!
//! One linking attempt moves through [`LinkStage`]s:
//!
//! ```text
//! initiated -> code_received -> token_exchanged -> profile_fetched -> persisted
//!                    \________________\_________________\__________-> failed(reason)
//! ```
//!
//! The callback half lives in [`complete_link`]: exactly one token exchange,
//! one profile call and one upsert per successful attempt, no retries. Every
//! failure maps to a [`LinkError`] whose `code()` travels back to the
//! integration page as the `error` query parameter.

mod state;

#[cfg(test)]
mod tests;

pub use state::{LinkState, StateError, StateSigner};

use crate::credentials::TokenCipher;
use crate::models::{Platform, SocialAccount};
use crate::platforms::{ExchangeError, PlatformApi};
use crate::store::{LinkedAccount, Store};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Progress of one linking attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStage {
    Initiated,
    CodeReceived,
    TokenExchanged,
    ProfileFetched,
    Persisted,
}

impl LinkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStage::Initiated => "initiated",
            LinkStage::CodeReceived => "code_received",
            LinkStage::TokenExchanged => "token_exchanged",
            LinkStage::ProfileFetched => "profile_fetched",
            LinkStage::Persisted => "persisted",
        }
    }
}

/// Query (or form) parameters of a platform callback.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Terminal failure of a linking attempt.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The user or the platform aborted on the consent screen.
    #[error("platform returned error '{error}'")]
    Denied {
        error: String,
        description: Option<String>,
    },

    #[error("no authorization code provided")]
    NoCode,

    #[error("invalid state")]
    InvalidState,

    #[error("{0} credentials not configured")]
    Config(Platform),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("profile fetch failed")]
    ProfileFetch(#[source] anyhow::Error),

    #[error("{0} did not return a user id")]
    NoUserId(Platform),

    #[error("link failed")]
    Failed(#[source] anyhow::Error),
}

impl LinkError {
    /// Machine-readable code for the `error` query parameter.
    pub fn code(&self) -> &str {
        match self {
            LinkError::Denied { error, .. } => error,
            LinkError::NoCode => "no_code",
            LinkError::InvalidState => "invalid_state",
            LinkError::Config(_) => "config",
            LinkError::TokenExchange(_) => "token_exchange",
            LinkError::ProfileFetch(_) => "profile_fetch",
            LinkError::NoUserId(_) => "no_user_id",
            LinkError::Failed(_) => "failed",
        }
    }

    /// Human-readable text for the `error_description` query parameter.
    pub fn description(&self) -> Option<String> {
        match self {
            LinkError::Denied { description, .. } => description.clone(),
            LinkError::NoCode => Some("No authorization code provided".to_string()),
            LinkError::InvalidState => {
                Some("Invalid or missing state. Please try connecting again.".to_string())
            }
            LinkError::Config(platform) => {
                Some(format!("{} credentials not configured", display_name(*platform)))
            }
            LinkError::TokenExchange(text) => Some(text.clone()),
            LinkError::ProfileFetch(_) => Some("Failed to fetch account profile".to_string()),
            LinkError::NoUserId(platform) => {
                Some(format!("{} did not return a user ID", display_name(*platform)))
            }
            LinkError::Failed(_) => {
                Some("An error occurred while connecting your account".to_string())
            }
        }
    }
}

pub fn display_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Instagram => "Instagram",
        Platform::TikTok => "TikTok",
    }
}

/// A persisted link.
#[derive(Debug)]
pub struct LinkOutcome {
    pub account: SocialAccount,
    /// False when an existing account was updated (reconnect).
    pub created: bool,
}

/// Runs the callback half of the flow: validate, exchange, fetch profile,
/// encrypt tokens, upsert.
///
/// Nothing is written unless every earlier stage succeeded.
pub async fn complete_link(
    store: &Store,
    cipher: &TokenCipher,
    signer: &StateSigner,
    client: &dyn PlatformApi,
    redirect_uri: &str,
    params: CallbackParams,
) -> Result<LinkOutcome, LinkError> {
    let platform = client.platform();

    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        return Err(LinkError::Denied {
            error,
            description: params.error_description.filter(|d| !d.is_empty()),
        });
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(LinkError::NoCode)?;
    debug!(platform = %platform, stage = LinkStage::CodeReceived.as_str(), "Link callback received");

    let claims = params
        .state
        .as_deref()
        .ok_or(StateError::Malformed)
        .and_then(|s| signer.verify(s))
        .map_err(|e| {
            warn!(platform = %platform, error = %e, "Rejected OAuth state");
            LinkError::InvalidState
        })?;

    let creator = store
        .get_creator(&claims.creator_id)
        .map_err(LinkError::Failed)?;
    if !matches!(&creator, Some(c) if c.agency_id == claims.agency_id) {
        warn!(
            platform = %platform,
            creator_id = %claims.creator_id,
            agency_id = %claims.agency_id,
            "OAuth state names an unknown creator/agency pair"
        );
        return Err(LinkError::InvalidState);
    }

    if !client.is_configured() {
        return Err(LinkError::Config(platform));
    }

    let grant = client
        .exchange_code(&code, redirect_uri)
        .await
        .map_err(|e| match e {
            ExchangeError::Rejected {
                status,
                description,
            } => {
                warn!(platform = %platform, status, "Token exchange rejected");
                LinkError::TokenExchange(description)
            }
            ExchangeError::Transport(err) => {
                warn!(platform = %platform, error = %err, "Token exchange request failed");
                LinkError::TokenExchange(err.to_string())
            }
        })?;
    debug!(platform = %platform, stage = LinkStage::TokenExchanged.as_str(), "Token exchanged");

    let profile = client.fetch_profile(&grant.access_token).await.map_err(|e| {
        warn!(platform = %platform, error = %e, "Profile fetch failed");
        LinkError::ProfileFetch(e)
    })?;
    debug!(platform = %platform, stage = LinkStage::ProfileFetched.as_str(), "Profile fetched");

    let identity = client
        .identify(&grant, &profile)
        .ok_or(LinkError::NoUserId(platform))?;

    let access_token = cipher
        .encrypt(&grant.access_token)
        .map_err(LinkError::Failed)?;
    let refresh_token = grant
        .refresh_token
        .as_deref()
        .map(|t| cipher.encrypt(t))
        .transpose()
        .map_err(LinkError::Failed)?;

    let meta = if profile.meta.is_object() {
        profile.meta
    } else {
        serde_json::json!({})
    };

    let (account, created) = store
        .upsert_linked_account(&LinkedAccount {
            creator_id: claims.creator_id,
            agency_id: claims.agency_id,
            platform,
            external_id: identity.external_id,
            handle: identity.handle,
            access_token,
            refresh_token,
            token_expires_at: grant.expires_at,
            meta,
        })
        .map_err(LinkError::Failed)?;

    info!(
        platform = %platform,
        account_id = %account.id,
        creator_id = %account.creator_id,
        created,
        stage = LinkStage::Persisted.as_str(),
        "Social account linked"
    );

    Ok(LinkOutcome { account, created })
}
