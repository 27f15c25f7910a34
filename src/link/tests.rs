use super::*;
use crate::credentials::{Credentials, KEY_SIZE};
use crate::models::AccountStatus;
use crate::platforms::{AccountIdentity, ContentItem, RemoteProfile};
use crate::store::NewCreator;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Canned platform responses with call counters.
struct FakePlatform {
    configured: bool,
    exchange: Mutex<Option<Result<Credentials, ExchangeError>>>,
    profile: Option<RemoteProfile>,
    exchange_calls: AtomicUsize,
    profile_calls: AtomicUsize,
}

impl FakePlatform {
    fn ok(external_id: &str, username: &str) -> Self {
        Self {
            configured: true,
            exchange: Mutex::new(None),
            profile: Some(RemoteProfile {
                external_id: Some(external_id.to_string()),
                name: Some(username.to_string()),
                meta: serde_json::json!({"followers_count": 12}),
            }),
            exchange_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
        }
    }

    fn with_exchange(self, result: Result<Credentials, ExchangeError>) -> Self {
        *self.exchange.lock().unwrap() = Some(result);
        self
    }
}

fn grant(token: &str) -> Credentials {
    Credentials {
        access_token: token.to_string(),
        refresh_token: Some(format!("{}-refresh", token)),
        expires_at: None,
        user_id: None,
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn authorize_url(&self, state: &str, _redirect_uri: &str) -> Option<String> {
        Some(format!("https://fake.example/authorize?state={}", state))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<Credentials, ExchangeError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        match self.exchange.lock().unwrap().take() {
            Some(result) => result,
            None => Ok(grant(&format!("token-for-{}", code))),
        }
    }

    async fn fetch_profile(&self, _access_token: &str) -> anyhow::Result<RemoteProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile
            .clone()
            .ok_or_else(|| anyhow::anyhow!("profile endpoint returned 500"))
    }

    fn identify(&self, grant: &Credentials, profile: &RemoteProfile) -> Option<AccountIdentity> {
        let external_id = profile.external_id.clone().or_else(|| grant.user_id.clone())?;
        Some(AccountIdentity {
            handle: format!("@{}", profile.name.clone().unwrap_or_default()),
            external_id,
        })
    }

    async fn fetch_recent_content(
        &self,
        _access_token: &str,
        _external_id: &str,
        _limit: u32,
    ) -> anyhow::Result<Vec<ContentItem>> {
        Ok(Vec::new())
    }
}

struct Fixture {
    store: Store,
    cipher: TokenCipher,
    signer: StateSigner,
    creator_id: String,
    agency_id: String,
}

fn fixture() -> Fixture {
    let store = Store::in_memory().unwrap();
    let owner = store
        .create_user("owner@urie.demo", None, "agency_user", &Default::default())
        .unwrap();
    let agency = store
        .create_agency("Agency", "agency", &owner.id, serde_json::json!({}))
        .unwrap();
    let creator = store
        .create_creator(&NewCreator {
            agency_id: &agency.id,
            user_id: None,
            display_name: "Creator",
            notes: None,
            tags: &[],
        })
        .unwrap();

    Fixture {
        store,
        cipher: TokenCipher::new([7u8; KEY_SIZE]),
        signer: StateSigner::new(b"link-tests", 600).unwrap(),
        creator_id: creator.id,
        agency_id: agency.id,
    }
}

impl Fixture {
    fn params(&self, code: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(self.signer.sign(&self.creator_id, &self.agency_id).unwrap()),
            error: None,
            error_description: None,
        }
    }

    async fn run(
        &self,
        client: &FakePlatform,
        params: CallbackParams,
    ) -> Result<LinkOutcome, LinkError> {
        complete_link(
            &self.store,
            &self.cipher,
            &self.signer,
            client,
            "http://localhost:3000/api/auth/instagram/callback",
            params,
        )
        .await
    }

    fn account_count(&self) -> usize {
        self.store
            .list_creator_accounts(&self.creator_id)
            .unwrap()
            .len()
    }
}

#[tokio::test]
async fn test_link_persists_encrypted_tokens() {
    let fx = fixture();
    let client = FakePlatform::ok("999", "demo");

    let outcome = fx.run(&client, fx.params("abc")).await.unwrap();
    assert!(outcome.created);

    let account = fx
        .store
        .get_social_account(&outcome.account.id)
        .unwrap()
        .unwrap();
    assert_eq!(account.external_id.as_deref(), Some("999"));
    assert_eq!(account.handle, "@demo");
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.meta["followers_count"], 12);

    let stored = account.access_token.unwrap();
    assert_ne!(stored, "token-for-abc");
    assert_eq!(fx.cipher.decrypt(&stored).unwrap(), "token-for-abc");
    let refresh = account.refresh_token.unwrap();
    assert_eq!(fx.cipher.decrypt(&refresh).unwrap(), "token-for-abc-refresh");

    assert_eq!(client.exchange_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.profile_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_relinking_same_external_id_updates_in_place() {
    let fx = fixture();

    let first = fx
        .run(&FakePlatform::ok("999", "demo"), fx.params("one"))
        .await
        .unwrap();
    let second = fx
        .run(&FakePlatform::ok("999", "demo_renamed"), fx.params("two"))
        .await
        .unwrap();

    assert!(!second.created);
    assert_eq!(second.account.id, first.account.id);
    assert_eq!(second.account.handle, "@demo_renamed");
    assert_eq!(fx.account_count(), 1);
}

#[tokio::test]
async fn test_reconnect_reactivates_revoked_account() {
    let fx = fixture();
    let first = fx
        .run(&FakePlatform::ok("999", "demo"), fx.params("one"))
        .await
        .unwrap();
    fx.store.revoke_social_account(&first.account.id).unwrap();

    let again = fx
        .run(&FakePlatform::ok("999", "demo"), fx.params("two"))
        .await
        .unwrap();
    assert_eq!(again.account.id, first.account.id);
    assert_eq!(again.account.status, AccountStatus::Active);
    assert!(again.account.access_token.is_some());
}

#[tokio::test]
async fn test_platform_error_short_circuits() {
    let fx = fixture();
    let client = FakePlatform::ok("999", "demo");
    let params = CallbackParams {
        error: Some("access_denied".to_string()),
        error_description: Some("The user denied your request".to_string()),
        ..fx.params("abc")
    };

    let err = fx.run(&client, params).await.unwrap_err();
    assert_eq!(err.code(), "access_denied");
    assert_eq!(
        err.description().as_deref(),
        Some("The user denied your request")
    );
    assert_eq!(client.exchange_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.account_count(), 0);
}

#[tokio::test]
async fn test_missing_code() {
    let fx = fixture();
    let params = CallbackParams {
        code: None,
        ..fx.params("abc")
    };
    let err = fx
        .run(&FakePlatform::ok("999", "demo"), params)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "no_code");
}

#[tokio::test]
async fn test_invalid_states() {
    let fx = fixture();
    let client = FakePlatform::ok("999", "demo");

    let missing = CallbackParams {
        state: None,
        ..fx.params("abc")
    };
    assert_eq!(fx.run(&client, missing).await.unwrap_err().code(), "invalid_state");

    let foreign = StateSigner::new(b"someone-else", 600).unwrap();
    let forged = CallbackParams {
        state: Some(foreign.sign(&fx.creator_id, &fx.agency_id).unwrap()),
        ..fx.params("abc")
    };
    assert_eq!(fx.run(&client, forged).await.unwrap_err().code(), "invalid_state");

    let wrong_agency = CallbackParams {
        state: Some(fx.signer.sign(&fx.creator_id, "other-agency").unwrap()),
        ..fx.params("abc")
    };
    assert_eq!(
        fx.run(&client, wrong_agency).await.unwrap_err().code(),
        "invalid_state"
    );

    assert_eq!(client.exchange_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.account_count(), 0);
}

#[tokio::test]
async fn test_unconfigured_platform() {
    let fx = fixture();
    let client = FakePlatform {
        configured: false,
        ..FakePlatform::ok("999", "demo")
    };
    let err = fx.run(&client, fx.params("abc")).await.unwrap_err();
    assert_eq!(err.code(), "config");
    assert_eq!(
        err.description().as_deref(),
        Some("Instagram credentials not configured")
    );
}

#[tokio::test]
async fn test_rejected_exchange_surfaces_platform_text() {
    let fx = fixture();
    let client = FakePlatform::ok("999", "demo").with_exchange(Err(ExchangeError::Rejected {
        status: 400,
        description: "Invalid authorization code".to_string(),
    }));

    let err = fx.run(&client, fx.params("abc")).await.unwrap_err();
    assert_eq!(err.code(), "token_exchange");
    assert_eq!(
        err.description().as_deref(),
        Some("Invalid authorization code")
    );
    assert_eq!(client.profile_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.account_count(), 0);
}

#[tokio::test]
async fn test_profile_failure() {
    let fx = fixture();
    let client = FakePlatform {
        profile: None,
        ..FakePlatform::ok("999", "demo")
    };
    let err = fx.run(&client, fx.params("abc")).await.unwrap_err();
    assert_eq!(err.code(), "profile_fetch");
    assert_eq!(fx.account_count(), 0);
}

#[tokio::test]
async fn test_missing_external_id() {
    let fx = fixture();
    let client = FakePlatform {
        profile: Some(RemoteProfile::default()),
        ..FakePlatform::ok("999", "demo")
    };
    let err = fx.run(&client, fx.params("abc")).await.unwrap_err();
    assert_eq!(err.code(), "no_user_id");
    assert_eq!(fx.account_count(), 0);
}

#[test]
fn test_stage_names() {
    let stages = [
        LinkStage::Initiated,
        LinkStage::CodeReceived,
        LinkStage::TokenExchanged,
        LinkStage::ProfileFetched,
        LinkStage::Persisted,
    ];
    let names: Vec<_> = stages.iter().map(LinkStage::as_str).collect();
    assert_eq!(
        names,
        vec![
            "initiated",
            "code_received",
            "token_exchanged",
            "profile_fetched",
            "persisted"
        ]
    );
}
