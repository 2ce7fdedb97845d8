//! End-to-end session tests over in-memory and on-disk stores.
//!
//! Every test builds its own store and session with injected salt, profile
//! and email clients, so nothing touches the network and no test depends
//! on another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use mysocial_auth::config::{
    DERIVATION_PATH_KEY, IMPORTED_ADDRESS_KEY, JWT_KEY, LEGACY_PRIVATE_KEY_KEY, MNEMONIC_KEY,
    OLDEST_IMPORTED_KEY_KEY,
};
use mysocial_auth::credential::{fallback_salt, OfflineSaltService, SaltService};
use mysocial_auth::identity::assertion::encode_unsigned;
use mysocial_auth::mailer::{ContactOutcome, EmailProvider, WelcomeEmail};
use mysocial_auth::profile::{MySocialProfile, ProfileFetcher, ProfileIndex};
use mysocial_auth::session::welcome_marker_key;
use mysocial_auth::{
    AuthConfig, AuthError, AuthMethod, AuthSession, CredentialDeriver, CredentialStore,
    IdentityAssertion, KeyValueStore, MemoryStore, MysAddress, SledStore, WelcomeOutcome,
};

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                       abandon abandon abandon abandon abandon about";

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Answers with a fixed salt and counts calls.
struct FixedSalt {
    salt: &'static str,
    calls: AtomicUsize,
}

impl FixedSalt {
    fn new(salt: &'static str) -> Arc<Self> {
        Arc::new(Self {
            salt,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SaltService for FixedSalt {
    async fn fetch_salt(&self, _assertion: &IdentityAssertion) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.salt.to_string())
    }
}

/// Blocks inside `fetch_salt` until released, so a test can act while a
/// sign-in is in flight.
#[derive(Default)]
struct GatedSalt {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl SaltService for GatedSalt {
    async fn fetch_salt(&self, _assertion: &IdentityAssertion) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok("424242".to_string())
    }
}

/// Serves one profile for every address, optionally gated.
#[derive(Default)]
struct StubIndex {
    profile: Option<MySocialProfile>,
    gate: Option<(Notify, Notify)>,
    calls: AtomicUsize,
}

#[async_trait]
impl ProfileIndex for StubIndex {
    async fn fetch_profile(
        &self,
        _address: &MysAddress,
    ) -> Result<Option<MySocialProfile>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        Ok(self.profile.clone())
    }

    async fn profile_exists(&self, _address: &MysAddress) -> Result<bool, AuthError> {
        Ok(self.profile.is_some())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl EmailProvider for RecordingMailer {
    async fn contact_exists(&self, _email: &str) -> Result<bool, AuthError> {
        Ok(false)
    }

    async fn add_contact(
        &self,
        _email: &str,
        _first_name: Option<&str>,
        _last_name: Option<&str>,
    ) -> Result<ContactOutcome, AuthError> {
        Ok(ContactOutcome::Added { id: None })
    }

    async fn send_welcome(&self, email: &WelcomeEmail) -> Result<Option<String>, AuthError> {
        self.sent.lock().push(email.to.clone());
        Ok(Some("msg_1".into()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn token(sub: &str) -> String {
    encode_unsigned(&json!({
        "iss": "https://accounts.google.com",
        "sub": sub,
        "email": format!("user{sub}@example.com"),
        "name": "Ada Lovelace",
        "given_name": "Ada",
        "family_name": "Lovelace",
    }))
}

fn session_with(kv: Arc<MemoryStore>, salt: Arc<dyn SaltService>) -> AuthSession {
    AuthSession::builder(AuthConfig::default(), kv)
        .salt_service(salt)
        .build()
        .expect("session")
}

fn offline_session(kv: Arc<MemoryStore>) -> AuthSession {
    session_with(kv, Arc::new(OfflineSaltService))
}

fn sample_profile() -> MySocialProfile {
    MySocialProfile {
        username: Some("ada".into()),
        display_name: Some("Ada".into()),
        ..MySocialProfile::default()
    }
}

// ---------------------------------------------------------------------------
// Identity wallets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identity_derivation_is_deterministic_across_clients() {
    let a = offline_session(Arc::new(MemoryStore::new()));
    let b = offline_session(Arc::new(MemoryStore::new()));

    let first = a.sign_in_with_identity(&token("108")).await.expect("sign in a");
    let second = b.sign_in_with_identity(&token("108")).await.expect("sign in b");
    assert_eq!(first.address, second.address);

    let expected = CredentialDeriver::from_subject_and_salt("108", &fallback_salt("108"));
    assert_eq!(first.address, expected.address);
}

#[tokio::test]
async fn different_salts_give_different_addresses() {
    let a = session_with(Arc::new(MemoryStore::new()), FixedSalt::new("111"));
    let b = session_with(Arc::new(MemoryStore::new()), FixedSalt::new("222"));

    let first = a.sign_in_with_identity(&token("7")).await.unwrap();
    let second = b.sign_in_with_identity(&token("7")).await.unwrap();
    assert_ne!(first.address, second.address);
}

#[tokio::test]
async fn restore_reuses_pinned_salt_without_network() {
    let kv = Arc::new(MemoryStore::new());
    let salt = FixedSalt::new("98765");
    let address = session_with(kv.clone(), salt.clone())
        .sign_in_with_identity(&token("55"))
        .await
        .unwrap()
        .address;
    assert_eq!(salt.calls(), 1);

    let restored = session_with(kv, salt.clone());
    assert_eq!(restored.restore().await.unwrap(), Some(AuthMethod::Google));
    assert_eq!(restored.address(), Some(address));
    assert_eq!(salt.calls(), 1);
    assert_eq!(
        restored.user_info().and_then(|u| u.given_name).as_deref(),
        Some("Ada")
    );
}

#[tokio::test]
async fn token_without_subject_is_rejected() {
    let session = offline_session(Arc::new(MemoryStore::new()));
    let token = encode_unsigned(&json!({ "email": "nobody@example.com" }));
    assert_eq!(
        session.sign_in_with_identity(&token).await.unwrap_err(),
        AuthError::MissingSubject
    );
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn concurrent_sign_ins_share_one_derivation() {
    let kv = Arc::new(MemoryStore::new());
    let salt = Arc::new(GatedSalt::default());
    let session = session_with(kv, salt.clone());

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.sign_in_with_identity(&token("31")).await }
    });
    salt.entered.notified().await;
    assert_eq!(session.sign_ins_in_flight(), 1);

    let second = tokio::spawn({
        let session = session.clone();
        async move { session.sign_in_with_identity(&token("31")).await }
    });
    tokio::task::yield_now().await;
    salt.release.notify_one();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(salt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.sign_ins_in_flight(), 0);
}

#[tokio::test]
async fn sign_in_finishing_after_sign_out_is_discarded() {
    let kv = Arc::new(MemoryStore::new());
    let salt = Arc::new(GatedSalt::default());
    let session = session_with(kv.clone(), salt.clone());

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.sign_in_with_identity(&token("77")).await }
    });
    salt.entered.notified().await;

    let report = session.sign_out().unwrap();
    assert_eq!(report.flights_cancelled, 1);
    salt.release.notify_one();

    assert_eq!(pending.await.unwrap().unwrap_err(), AuthError::StaleSession);
    assert!(!session.is_authenticated());
    assert_eq!(kv.get(JWT_KEY).unwrap(), None);
    assert_eq!(kv.get(&CredentialStore::salt_key("77")).unwrap(), None);
    assert_eq!(kv.get(&CredentialStore::private_key_key("77")).unwrap(), None);
}

// ---------------------------------------------------------------------------
// Imported wallets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mnemonic_import_survives_restart() {
    let kv = Arc::new(MemoryStore::new());
    let imported = offline_session(kv.clone())
        .import_mnemonic(ABANDON, None)
        .unwrap();

    let restored = offline_session(kv.clone());
    assert_eq!(restored.restore().await.unwrap(), Some(AuthMethod::Imported));
    assert_eq!(restored.address(), Some(imported.address));
    assert_eq!(kv.get(LEGACY_PRIVATE_KEY_KEY).unwrap(), None);
    assert!(kv.get(DERIVATION_PATH_KEY).unwrap().is_some());
}

#[tokio::test]
async fn upper_case_mnemonic_without_checksum_survives_restart() {
    let kv = Arc::new(MemoryStore::new());
    let phrase = vec!["ABANDON"; 12].join(" ");
    let imported = offline_session(kv.clone())
        .import_mnemonic(&phrase, None)
        .unwrap();
    assert_eq!(
        kv.get(MNEMONIC_KEY).unwrap(),
        Some(phrase.to_lowercase())
    );

    let restored = offline_session(kv);
    assert_eq!(restored.restore().await.unwrap(), Some(AuthMethod::Imported));
    assert_eq!(restored.address(), Some(imported.address));
}

#[tokio::test]
async fn decimal_private_key_import_survives_restart() {
    let kv = Arc::new(MemoryStore::new());
    let decimal = vec!["7"; 32].join(",");
    let imported = offline_session(kv.clone())
        .import_private_key(&decimal)
        .unwrap();

    assert_eq!(kv.get(LEGACY_PRIVATE_KEY_KEY).unwrap().as_deref(), Some(decimal.as_str()));
    assert_eq!(kv.get(MNEMONIC_KEY).unwrap(), None);

    let restored = offline_session(kv);
    restored.restore().await.unwrap();
    assert_eq!(restored.address(), Some(imported.address));
}

#[tokio::test]
async fn bad_key_material_is_rejected_before_storage() {
    let kv = Arc::new(MemoryStore::new());
    let session = offline_session(kv.clone());

    assert!(matches!(
        session.import_private_key("0x1234"),
        Err(AuthError::InvalidKeyLength { expected: 32, got: 2 })
    ));
    assert!(matches!(
        session.import_mnemonic("abandon abandon abandon", None),
        Err(AuthError::InvalidMnemonic(_))
    ));
    assert!(kv.is_empty());
}

#[tokio::test]
async fn tampered_address_clears_the_imported_wallet() {
    let kv = Arc::new(MemoryStore::new());
    offline_session(kv.clone()).generate_wallet().unwrap();

    let other = offline_session(Arc::new(MemoryStore::new()))
        .import_private_key(&format!("0x{}", "22".repeat(32)))
        .unwrap();
    kv.set(IMPORTED_ADDRESS_KEY, &other.address.to_string()).unwrap();

    let restored = offline_session(kv.clone());
    assert_eq!(restored.restore().await.unwrap(), None);
    assert_eq!(kv.get(MNEMONIC_KEY).unwrap(), None);
    assert_eq!(kv.get(IMPORTED_ADDRESS_KEY).unwrap(), None);
}

#[tokio::test]
async fn tampered_identity_record_signs_out_and_keeps_the_salt() {
    let kv = Arc::new(MemoryStore::new());
    let original = offline_session(kv.clone())
        .sign_in_with_identity(&token("sub123"))
        .await
        .unwrap();
    let pinned = kv.get(&CredentialStore::salt_key("sub123")).unwrap();
    assert_eq!(pinned.as_deref(), Some(fallback_salt("sub123").as_str()));

    let other = CredentialDeriver::from_subject_and_salt("someone-else", "1");
    kv.set(
        &CredentialStore::identity_address_key("sub123"),
        &other.address.to_string(),
    )
    .unwrap();

    // A salt service that would hand out a different salt if asked.
    let salt = FixedSalt::new("555");
    let restored = session_with(kv.clone(), salt.clone());
    assert_eq!(restored.restore().await.unwrap(), None);
    assert!(!restored.is_authenticated());
    assert_eq!(salt.calls(), 0);
    assert_eq!(kv.get(JWT_KEY).unwrap(), None);
    assert_eq!(kv.get(&CredentialStore::private_key_key("sub123")).unwrap(), None);
    assert_eq!(kv.get(&CredentialStore::identity_address_key("sub123")).unwrap(), None);
    assert_eq!(kv.get(&CredentialStore::salt_key("sub123")).unwrap(), pinned);

    // Signing in again lands on the address the subject always had.
    let again = restored.sign_in_with_identity(&token("sub123")).await.unwrap();
    assert_eq!(again.address, original.address);
    assert_eq!(salt.calls(), 0);
}

#[tokio::test]
async fn oldest_imported_key_is_restored_and_moved() {
    let kv = Arc::new(MemoryStore::new());
    let decimal = vec!["9"; 32].join(",");
    kv.set(OLDEST_IMPORTED_KEY_KEY, &decimal).unwrap();
    let expected = CredentialDeriver::from_private_key(&decimal).unwrap();

    let restored = offline_session(kv.clone());
    assert_eq!(restored.restore().await.unwrap(), Some(AuthMethod::Imported));
    assert_eq!(restored.address(), Some(expected.address));
    assert_eq!(kv.get(OLDEST_IMPORTED_KEY_KEY).unwrap(), None);
    assert_eq!(kv.get(LEGACY_PRIVATE_KEY_KEY).unwrap(), Some(decimal));
    assert_eq!(
        kv.get(IMPORTED_ADDRESS_KEY).unwrap(),
        Some(expected.address.to_string())
    );

    // Now outside the identity namespace, it survives a Google sign-out.
    restored.sign_in_with_identity(&token("77")).await.unwrap();
    restored.sign_out().unwrap();
    let again = offline_session(kv);
    again.restore().await.unwrap();
    assert_eq!(again.address(), Some(expected.address));
}

// ---------------------------------------------------------------------------
// Sign-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn google_sign_out_wipes_identity_state_and_keeps_imported_wallet() {
    let kv = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let session = AuthSession::builder(AuthConfig::default(), kv.clone())
        .salt_service(Arc::new(OfflineSaltService))
        .mailer(mailer.clone())
        .build()
        .unwrap();

    let imported = session.import_mnemonic(ABANDON, None).unwrap();
    let identity = session.sign_in_with_identity(&token("9001")).await.unwrap();
    assert!(matches!(
        session.send_welcome_if_needed().await.unwrap(),
        WelcomeOutcome::Delivered(_)
    ));
    let marker = welcome_marker_key("user9001@example.com");
    assert!(kv.get(&marker).unwrap().is_some());
    kv.set(&ProfileFetcher::cache_key(&identity.address), "{}").unwrap();

    let report = session.sign_out().unwrap();
    assert_eq!(report.method, Some(AuthMethod::Google));
    assert!(report.welcome_marker_cleared);
    assert!(report.profile_cache_cleared);
    assert_eq!(report.keys_removed, 4);

    for key in kv.snapshot().keys() {
        assert!(!key.starts_with("google_auth_"), "left behind: {key}");
    }
    assert_eq!(kv.get(&marker).unwrap(), None);
    assert!(kv.get(MNEMONIC_KEY).unwrap().is_some());
    assert_eq!(session.auth_method(), Some(AuthMethod::Imported));
    assert_eq!(session.address(), Some(imported.address));
}

#[tokio::test]
async fn imported_sign_out_clears_imported_slot() {
    let kv = Arc::new(MemoryStore::new());
    let session = offline_session(kv.clone());
    session.import_private_key(&format!("0x{}", "33".repeat(32))).unwrap();

    let report = session.sign_out().unwrap();
    assert_eq!(report.method, Some(AuthMethod::Imported));
    assert_eq!(report.keys_removed, 2);
    assert!(kv.is_empty());
    assert_eq!(session.sign_message(b"x").unwrap_err(), AuthError::NotSignedIn);
}

// ---------------------------------------------------------------------------
// Welcome email
// ---------------------------------------------------------------------------

#[tokio::test]
async fn welcome_email_is_sent_once_per_user() {
    let kv = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let build = || {
        AuthSession::builder(AuthConfig::default(), kv.clone())
            .salt_service(Arc::new(OfflineSaltService))
            .mailer(mailer.clone())
            .build()
            .unwrap()
    };

    let session = build();
    session.sign_in_with_identity(&token("12")).await.unwrap();
    assert!(matches!(
        session.send_welcome_if_needed().await.unwrap(),
        WelcomeOutcome::Delivered(_)
    ));
    assert_eq!(
        session.send_welcome_if_needed().await.unwrap(),
        WelcomeOutcome::AlreadyWelcomed
    );

    let later = build();
    later.restore().await.unwrap();
    assert_eq!(
        later.send_welcome_if_needed().await.unwrap(),
        WelcomeOutcome::AlreadyWelcomed
    );
    assert_eq!(mailer.sent.lock().as_slice(), ["user12@example.com".to_string()]);
}

#[tokio::test]
async fn welcome_needs_an_email_claim() {
    let session = AuthSession::builder(AuthConfig::default(), Arc::new(MemoryStore::new()))
        .salt_service(Arc::new(OfflineSaltService))
        .mailer(Arc::new(RecordingMailer::default()))
        .build()
        .unwrap();
    session
        .sign_in_with_identity(&encode_unsigned(&json!({ "sub": "3" })))
        .await
        .unwrap();
    assert_eq!(
        session.send_welcome_if_needed().await.unwrap(),
        WelcomeOutcome::MissingEmail
    );
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn profile_refresh_caches_found_profiles() {
    let kv = Arc::new(MemoryStore::new());
    let index = Arc::new(StubIndex {
        profile: Some(sample_profile()),
        ..StubIndex::default()
    });
    let session = AuthSession::builder(AuthConfig::default(), kv.clone())
        .salt_service(Arc::new(OfflineSaltService))
        .profile_index(index.clone())
        .build()
        .unwrap();
    let cred = session.generate_wallet().unwrap();

    assert_eq!(session.refresh_profile().await.unwrap(), Some(sample_profile()));
    assert_eq!(session.refresh_profile().await.unwrap(), Some(sample_profile()));
    assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    assert!(kv.get(&ProfileFetcher::cache_key(&cred.address)).unwrap().is_some());
    assert!(!session.needs_profile_creation());
}

#[tokio::test]
async fn missing_profile_is_not_cached() {
    let kv = Arc::new(MemoryStore::new());
    let index = Arc::new(StubIndex::default());
    let session = AuthSession::builder(AuthConfig::default(), kv.clone())
        .salt_service(Arc::new(OfflineSaltService))
        .profile_index(index.clone())
        .build()
        .unwrap();
    session.generate_wallet().unwrap();

    assert_eq!(session.refresh_profile().await.unwrap(), None);
    assert_eq!(session.refresh_profile().await.unwrap(), None);
    assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    assert!(session.needs_profile_creation());
}

#[tokio::test]
async fn profile_arriving_after_sign_out_is_dropped() {
    let kv = Arc::new(MemoryStore::new());
    let index = Arc::new(StubIndex {
        profile: Some(sample_profile()),
        gate: Some((Notify::new(), Notify::new())),
        ..StubIndex::default()
    });
    let session = AuthSession::builder(AuthConfig::default(), kv.clone())
        .salt_service(Arc::new(OfflineSaltService))
        .profile_index(index.clone())
        .build()
        .unwrap();
    let cred = session.generate_wallet().unwrap();

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.refresh_profile().await }
    });
    let (entered, release) = index.gate.as_ref().unwrap();
    entered.notified().await;
    session.sign_out().unwrap();
    release.notify_one();

    assert_eq!(pending.await.unwrap().unwrap_err(), AuthError::StaleSession);
    assert_eq!(kv.get(&ProfileFetcher::cache_key(&cred.address)).unwrap(), None);
    assert_eq!(session.profile(), None);
}

// ---------------------------------------------------------------------------
// On-disk persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sled_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("auth-db");

    let (identity, imported) = {
        let kv = Arc::new(SledStore::open(&path).expect("open"));
        let session = AuthSession::builder(AuthConfig::default(), kv)
            .salt_service(FixedSalt::new("5150"))
            .build()
            .unwrap();
        let imported = session.import_mnemonic(ABANDON, None).unwrap();
        let identity = session.sign_in_with_identity(&token("64")).await.unwrap();
        (identity.address, imported.address)
    };

    let kv = Arc::new(SledStore::open(&path).expect("reopen"));
    let session = AuthSession::builder(AuthConfig::default(), kv)
        .salt_service(Arc::new(OfflineSaltService))
        .build()
        .unwrap();
    assert_eq!(session.restore().await.unwrap(), Some(AuthMethod::Google));
    assert_eq!(session.address(), Some(identity));

    session.sign_out().unwrap();
    assert_eq!(session.address(), Some(imported));
}
