//! # Auth Session
//!
//! The composition root. An [`AuthSession`] owns the key-value store, the
//! deriver, the salt resolver and the optional profile and email clients,
//! all injected through [`AuthSessionBuilder`]. There are no globals: two
//! sessions over two stores never see each other.
//!
//! ## State machine
//!
//! ```text
//! Empty ──restore()──▶ Restoring ──▶ Active
//!   ▲                      │
//!   │                      └──(corrupt record cleared)──▶ Empty
//!   └──────────sign_out()──────────── Active
//! ```
//!
//! Two wallets can be live at once: an identity wallet and an imported one.
//! The identity wallet wins for [`AuthSession::auth_method`], signing and
//! profile lookups. Signing out of it falls back to the imported wallet.
//!
//! ## Single-flight sign-in
//!
//! Identity sign-ins are keyed by subject. A second call for a subject that
//! is already being derived joins the running derivation and receives a
//! clone of its result; the salt service is asked at most once.
//!
//! ## Session epochs
//!
//! Every sign-out increments the epoch. Network-bound work records the
//! epoch it started in and re-checks it, under the state lock, before
//! touching state or storage. Work that finishes in a later epoch returns
//! [`AuthError::StaleSession`] and removes the salt it pinned, unless the
//! same subject has signed in again since.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AuthConfig, DEFAULT_SITE_URL, WELCOME_EMAIL_PREFIX};
use crate::credential::{
    CredentialDeriver, DerivedCredential, HttpSaltService, ResolvedSalt, SaltResolver, SaltService,
};
use crate::crypto::{DerivationPath, MysKeypair, MysSignature};
use crate::error::AuthError;
use crate::identity::{IdentityAssertion, MysAddress, UserInfo};
use crate::mailer::{onboard_user, EmailProvider, OnboardingReport, ResendClient};
use crate::profile::{HttpProfileIndex, MySocialProfile, ProfileDraft, ProfileFetcher, ProfileIndex};
use crate::storage::{CredentialRecord, CredentialStore, KeyValueStore, SlotLoad, WalletSlot};

type SignInFuture = Shared<BoxFuture<'static, Result<DerivedCredential, AuthError>>>;

/// How the active wallet was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Google identity token, salted and hashed.
    Google,
    /// Imported mnemonic or raw key, or a generated wallet.
    Imported,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Google => write!(f, "google"),
            Self::Imported => write!(f, "imported"),
        }
    }
}

/// What [`AuthSession::sign_out`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOutReport {
    /// Method that was active, if any.
    pub method: Option<AuthMethod>,
    pub address: Option<MysAddress>,
    /// Credential keys deleted from storage.
    pub keys_removed: usize,
    pub profile_cache_cleared: bool,
    pub welcome_marker_cleared: bool,
    /// Sign-ins that were still running and will now resolve stale.
    pub flights_cancelled: usize,
    /// Epoch the session moved into.
    pub epoch: u64,
}

/// Result of [`AuthSession::send_welcome_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WelcomeOutcome {
    /// No identity session, or no mailer configured.
    NotApplicable,
    /// This user was welcomed before.
    AlreadyWelcomed,
    /// Another call is already onboarding.
    InProgress,
    /// The identity token carries no email address.
    MissingEmail,
    Delivered(OnboardingReport),
    Failed(OnboardingReport),
}

/// Storage key of the one-shot welcome marker for `identifier`.
pub fn welcome_marker_key(identifier: &str) -> String {
    format!("{WELCOME_EMAIL_PREFIX}{identifier}")
}

struct IdentitySession {
    assertion: IdentityAssertion,
    credential: DerivedCredential,
}

#[derive(Default)]
struct SessionState {
    identity: Option<IdentitySession>,
    imported: Option<DerivedCredential>,
    profile: Option<MySocialProfile>,
}

impl SessionState {
    fn method(&self) -> Option<AuthMethod> {
        if self.identity.is_some() {
            Some(AuthMethod::Google)
        } else if self.imported.is_some() {
            Some(AuthMethod::Imported)
        } else {
            None
        }
    }

    fn active(&self) -> Option<&DerivedCredential> {
        self.identity
            .as_ref()
            .map(|identity| &identity.credential)
            .or(self.imported.as_ref())
    }
}

struct SignInFlight {
    id: u64,
    future: SignInFuture,
}

struct SessionInner {
    config: AuthConfig,
    kv: Arc<dyn KeyValueStore>,
    store: CredentialStore,
    deriver: CredentialDeriver,
    salts: SaltResolver,
    profiles: Option<ProfileFetcher>,
    mailer: Option<Arc<dyn EmailProvider>>,
    epoch: AtomicU64,
    next_flight: AtomicU64,
    state: RwLock<SessionState>,
    flights: DashMap<String, SignInFlight>,
    welcomed: Mutex<HashSet<String>>,
    welcome_in_flight: AtomicBool,
}

/// Releases the welcome guard on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Assembles an [`AuthSession`].
///
/// Only the store is mandatory. The salt service defaults to HTTP against
/// `config.salt_service_url`; the profile index and mailer stay off unless
/// injected or [`with_http_defaults`](Self::with_http_defaults) is called.
pub struct AuthSessionBuilder {
    config: AuthConfig,
    kv: Arc<dyn KeyValueStore>,
    salt_service: Option<Arc<dyn SaltService>>,
    profile_index: Option<Arc<dyn ProfileIndex>>,
    mailer: Option<Arc<dyn EmailProvider>>,
}

impl AuthSessionBuilder {
    pub fn salt_service(mut self, service: Arc<dyn SaltService>) -> Self {
        self.salt_service = Some(service);
        self
    }

    pub fn profile_index(mut self, index: Arc<dyn ProfileIndex>) -> Self {
        self.profile_index = Some(index);
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn EmailProvider>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// HTTP clients from the config for whatever was not injected. The
    /// mailer is only created when `config.mailer` is set.
    pub fn with_http_defaults(mut self) -> Self {
        if self.profile_index.is_none() {
            self.profile_index = Some(Arc::new(HttpProfileIndex::new(
                self.config.indexer_url.clone(),
                self.config.indexer_timeout,
            )));
        }
        if self.mailer.is_none() {
            if let Some(mailer) = &self.config.mailer {
                self.mailer = Some(Arc::new(ResendClient::new(mailer.clone())));
            }
        }
        self
    }

    pub fn build(self) -> Result<AuthSession, AuthError> {
        let path: DerivationPath = self.config.derivation_path.parse()?;
        let salt_service = self.salt_service.unwrap_or_else(|| {
            Arc::new(HttpSaltService::new(
                self.config.salt_service_url.clone(),
                self.config.salt_timeout,
            ))
        });

        let inner = SessionInner {
            store: CredentialStore::new(self.kv.clone(), path.clone()),
            deriver: CredentialDeriver::new(path),
            salts: SaltResolver::new(self.kv.clone(), salt_service),
            profiles: self
                .profile_index
                .map(|index| ProfileFetcher::new(index, self.kv.clone())),
            mailer: self.mailer,
            kv: self.kv,
            config: self.config,
            epoch: AtomicU64::new(0),
            next_flight: AtomicU64::new(0),
            state: RwLock::new(SessionState::default()),
            flights: DashMap::new(),
            welcomed: Mutex::new(HashSet::new()),
            welcome_in_flight: AtomicBool::new(false),
        };
        Ok(AuthSession {
            inner: Arc::new(inner),
        })
    }
}

/// A user's sign-in state over one key-value store. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    pub fn builder(config: AuthConfig, kv: Arc<dyn KeyValueStore>) -> AuthSessionBuilder {
        AuthSessionBuilder {
            config,
            kv,
            salt_service: None,
            profile_index: None,
            mailer: None,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn epoch(&self) -> u64 {
        self.inner.epoch()
    }

    // -- Restoration --------------------------------------------------------

    /// Bring back whatever storage holds: the imported wallet, then the
    /// saved identity token, re-derived. The salt is already pinned, so
    /// restoring an identity does not touch the network.
    ///
    /// Corrupt records are discarded and skipped, not reported. A corrupt
    /// identity record also drops the saved token: the user comes back
    /// signed out, with the subject's salt still pinned.
    pub async fn restore(&self) -> Result<Option<AuthMethod>, AuthError> {
        if let Some(record) = self.inner.store.load(&WalletSlot::Imported)? {
            if self.inner.store.holds_oldest_import()? {
                debug!("Moving imported wallet to the current key layout");
                self.inner.store.save(&record)?;
            }
            let credential = record.into_credential()?;
            info!(address = %credential.address, "Imported wallet restored");
            self.inner.state.write().imported = Some(credential);
        }

        if let Some(token) = self.inner.store.identity_token()? {
            let subject = IdentityAssertion::decode(&token)
                .and_then(|assertion| assertion.subject().map(str::to_string));
            match subject {
                Ok(subject) => {
                    let slot = WalletSlot::Identity(subject);
                    if matches!(self.inner.store.load_checked(&slot)?, SlotLoad::Discarded) {
                        warn!(slot = %slot, "Saved identity wallet corrupt, signing out");
                        self.inner.store.remove_identity_token()?;
                        return Ok(self.auth_method());
                    }
                    match self.sign_in_with_identity(&token).await {
                        Ok(credential) => {
                            info!(address = %credential.address, "Identity wallet restored");
                        }
                        Err(e @ (AuthError::Storage(_) | AuthError::StaleSession)) => return Err(e),
                        Err(e) => {
                            warn!(error = %e, "Saved identity token unusable, discarding");
                            self.inner.store.remove_identity_token()?;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Saved identity token unreadable, discarding");
                    self.inner.store.remove_identity_token()?;
                }
            }
        }

        Ok(self.auth_method())
    }

    // -- Sign-in ------------------------------------------------------------

    /// Derive and persist the identity wallet for `token`.
    ///
    /// Concurrent calls for the same subject share one derivation.
    pub async fn sign_in_with_identity(&self, token: &str) -> Result<DerivedCredential, AuthError> {
        let assertion = IdentityAssertion::decode(token)?;
        let subject = assertion.subject()?.to_string();

        let flight = match self.inner.flights.entry(subject.clone()) {
            Entry::Occupied(entry) => {
                debug!(subject = %subject, "Joining in-flight sign-in");
                entry.get().future.clone()
            }
            Entry::Vacant(entry) => {
                let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
                let epoch = self.inner.epoch();
                let future = self
                    .inner
                    .clone()
                    .run_identity_sign_in(assertion, subject.clone(), epoch, id)
                    .boxed()
                    .shared();
                entry.insert(SignInFlight {
                    id,
                    future: future.clone(),
                });
                future
            }
        };

        flight.await
    }

    /// Number of identity sign-ins currently running.
    pub fn sign_ins_in_flight(&self) -> usize {
        self.inner.flights.len()
    }

    /// Import a BIP-39 phrase into the imported slot. `path` defaults to the
    /// configured derivation path.
    pub fn import_mnemonic(
        &self,
        phrase: &str,
        path: Option<&str>,
    ) -> Result<DerivedCredential, AuthError> {
        let path = path.map(str::parse::<DerivationPath>).transpose()?;
        let credential = self.inner.deriver.from_mnemonic(phrase, path.as_ref())?;
        self.inner.adopt_imported(credential)
    }

    /// Import a raw key (`0x` hex or comma-separated decimal bytes).
    pub fn import_private_key(&self, text: &str) -> Result<DerivedCredential, AuthError> {
        let credential = CredentialDeriver::from_private_key(text)?;
        self.inner.adopt_imported(credential)
    }

    /// Create a new 12-word wallet and make it the imported wallet. The
    /// phrase is in the returned credential's origin; show it once.
    pub fn generate_wallet(&self) -> Result<DerivedCredential, AuthError> {
        let credential = self.inner.deriver.generate()?;
        self.inner.adopt_imported(credential)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn auth_method(&self) -> Option<AuthMethod> {
        self.inner.state.read().method()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_method().is_some()
    }

    pub fn address(&self) -> Option<MysAddress> {
        self.inner.state.read().active().map(|c| c.address)
    }

    pub fn credential(&self) -> Option<DerivedCredential> {
        self.inner.state.read().active().cloned()
    }

    pub fn keypair(&self) -> Option<MysKeypair> {
        self.inner.state.read().active().map(|c| c.keypair.clone())
    }

    /// Profile claims of the identity session.
    pub fn user_info(&self) -> Option<UserInfo> {
        self.inner
            .state
            .read()
            .identity
            .as_ref()
            .map(|identity| identity.assertion.user_info())
    }

    /// Claims of the identity session's token.
    pub fn identity(&self) -> Option<IdentityAssertion> {
        self.inner
            .state
            .read()
            .identity
            .as_ref()
            .map(|identity| identity.assertion.clone())
    }

    pub fn sign_message(&self, message: &[u8]) -> Result<MysSignature, AuthError> {
        let state = self.inner.state.read();
        let credential = state.active().ok_or(AuthError::NotSignedIn)?;
        Ok(credential.keypair.sign(message))
    }

    // -- Profiles -----------------------------------------------------------

    /// The profile found by the last refresh.
    pub fn profile(&self) -> Option<MySocialProfile> {
        self.inner.state.read().profile.clone()
    }

    /// Signed in, refreshed, and still no profile.
    pub fn needs_profile_creation(&self) -> bool {
        let state = self.inner.state.read();
        state.active().is_some() && state.profile.is_none()
    }

    /// Look up the active wallet's profile, cache first.
    ///
    /// Without a profile index this is always `Ok(None)`.
    pub async fn refresh_profile(&self) -> Result<Option<MySocialProfile>, AuthError> {
        let address = self.address().ok_or(AuthError::NotSignedIn)?;
        let Some(fetcher) = self.inner.profiles.clone() else {
            debug!("No profile index configured");
            return Ok(None);
        };

        if let Some(profile) = fetcher.cached(&address)? {
            self.inner.state.write().profile = Some(profile.clone());
            return Ok(Some(profile));
        }

        let epoch = self.inner.epoch();
        let profile = fetcher.fetch(&address).await?;

        let mut state = self.inner.state.write();
        if self.inner.epoch() != epoch || state.active().map(|c| c.address) != Some(address) {
            debug!(address = %address, "Discarding profile fetched for an ended session");
            return Err(AuthError::StaleSession);
        }
        if let Some(profile) = &profile {
            fetcher.remember(&address, profile)?;
        }
        state.profile = profile.clone();
        Ok(profile)
    }

    /// Pre-filled profile for an identity user.
    pub fn profile_draft(&self) -> Option<ProfileDraft> {
        let state = self.inner.state.read();
        state.identity.as_ref().map(|identity| {
            ProfileDraft::from_user_info(identity.credential.address, &identity.assertion.user_info())
        })
    }

    // -- Welcome email ------------------------------------------------------

    /// Welcome an identity user once per user identifier (email, else
    /// address). Success leaves a marker in storage so later sessions skip
    /// the provider entirely.
    pub async fn send_welcome_if_needed(&self) -> Result<WelcomeOutcome, AuthError> {
        let inner = &self.inner;
        let Some(mailer) = inner.mailer.clone() else {
            return Ok(WelcomeOutcome::NotApplicable);
        };
        let (info, address, epoch) = {
            let state = inner.state.read();
            let Some(identity) = state.identity.as_ref() else {
                return Ok(WelcomeOutcome::NotApplicable);
            };
            (
                identity.assertion.user_info(),
                identity.credential.address,
                inner.epoch(),
            )
        };

        if inner
            .welcome_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(WelcomeOutcome::InProgress);
        }
        let _guard = InFlightGuard(&inner.welcome_in_flight);

        let identifier = info.email.clone().unwrap_or_else(|| address.to_string());
        if inner.welcomed.lock().contains(&identifier) {
            return Ok(WelcomeOutcome::AlreadyWelcomed);
        }
        let marker = welcome_marker_key(&identifier);
        if inner.kv.get(&marker)?.is_some() {
            inner.welcomed.lock().insert(identifier);
            return Ok(WelcomeOutcome::AlreadyWelcomed);
        }
        let Some(email) = info.email.as_deref() else {
            warn!(address = %address, "No email in identity token, skipping welcome email");
            return Ok(WelcomeOutcome::MissingEmail);
        };

        let report = onboard_user(
            &*mailer,
            email,
            info.given_name.as_deref(),
            info.family_name.as_deref(),
            inner.site_url(),
        )
        .await;
        if !report.is_success() {
            warn!(email = %email, message = %report.message(), "Welcome email failed");
            return Ok(WelcomeOutcome::Failed(report));
        }

        {
            let _state = inner.state.read();
            if inner.epoch() != epoch {
                debug!(email = %email, "Session ended during onboarding, not marking");
                return Err(AuthError::StaleSession);
            }
            inner.kv.set(&marker, &chrono::Utc::now().to_rfc3339())?;
            inner.welcomed.lock().insert(identifier);
        }
        info!(email = %email, message = %report.message(), "User onboarded");
        Ok(WelcomeOutcome::Delivered(report))
    }

    // -- Sign-out -----------------------------------------------------------

    /// End the active session.
    ///
    /// Moves to a new epoch and forgets running sign-ins, then clears the
    /// profile cache for the active address. An identity session also loses
    /// its welcome marker and every identity namespace in storage; an
    /// imported session loses the imported slot. An imported wallet
    /// survives an identity sign-out and becomes active.
    pub fn sign_out(&self) -> Result<SignOutReport, AuthError> {
        let inner = &self.inner;
        let mut state = inner.state.write();

        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let flights_cancelled = inner.flights.len();
        inner.flights.clear();

        let method = state.method();
        let address = state.active().map(|c| c.address);
        let mut report = SignOutReport {
            method,
            address,
            flights_cancelled,
            epoch,
            ..SignOutReport::default()
        };

        if let Some(address) = &address {
            let key = ProfileFetcher::cache_key(address);
            report.profile_cache_cleared = inner.kv.get(&key)?.is_some();
            inner.kv.delete(&key)?;
        }

        match method {
            Some(AuthMethod::Google) => {
                if let Some(identity) = state.identity.take() {
                    let identifier = identity
                        .assertion
                        .claims()
                        .email
                        .clone()
                        .unwrap_or_else(|| identity.credential.address.to_string());
                    let marker = welcome_marker_key(&identifier);
                    report.welcome_marker_cleared = inner.kv.get(&marker)?.is_some();
                    inner.kv.delete(&marker)?;
                    inner.welcomed.lock().remove(&identifier);
                }
                report.keys_removed = inner.store.clear_identity_namespaces()?;
            }
            Some(AuthMethod::Imported) => {
                report.keys_removed = inner.store.clear(&WalletSlot::Imported)?;
                state.imported = None;
            }
            None => {}
        }
        state.profile = None;

        info!(
            method = ?report.method,
            keys_removed = report.keys_removed,
            epoch,
            "Signed out"
        );
        Ok(report)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("AuthSession")
            .field("method", &state.method())
            .field("address", &state.active().map(|c| c.address))
            .field("epoch", &self.inner.epoch())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn site_url(&self) -> &str {
        self.config
            .mailer
            .as_ref()
            .map(|mailer| mailer.site_url.as_str())
            .unwrap_or(DEFAULT_SITE_URL)
    }

    async fn run_identity_sign_in(
        self: Arc<Self>,
        assertion: IdentityAssertion,
        subject: String,
        epoch: u64,
        flight_id: u64,
    ) -> Result<DerivedCredential, AuthError> {
        let derived = self.deriver.from_identity(&assertion, &self.salts).await;
        let outcome = derived.and_then(|(credential, salt)| {
            self.commit_identity(assertion, &subject, credential, &salt, epoch, flight_id)
        });
        self.flights.remove_if(&subject, |_, flight| flight.id == flight_id);
        outcome
    }

    fn commit_identity(
        &self,
        assertion: IdentityAssertion,
        subject: &str,
        credential: DerivedCredential,
        salt: &ResolvedSalt,
        epoch: u64,
        flight_id: u64,
    ) -> Result<DerivedCredential, AuthError> {
        let mut state = self.state.write();

        if self.epoch() != epoch {
            let reactivated = state
                .identity
                .as_ref()
                .is_some_and(|identity| identity.credential.subject() == Some(subject));
            let superseded = self
                .flights
                .get(subject)
                .is_some_and(|flight| flight.id != flight_id);
            if salt.was_persisted_now() && !reactivated && !superseded {
                self.kv.delete(&CredentialStore::salt_key(subject))?;
            }
            info!(subject = %subject, "Sign-in finished after sign-out, discarding");
            return Err(AuthError::StaleSession);
        }

        self.store.save_identity_token(assertion.raw())?;
        self.store
            .save(&CredentialRecord::from_credential(&credential))?;
        self.verify_saved(&WalletSlot::Identity(subject.to_string()), &credential)?;

        info!(
            address = %credential.address,
            salt_source = ?salt.source,
            "Identity sign-in complete"
        );
        state.identity = Some(IdentitySession {
            assertion,
            credential: credential.clone(),
        });
        state.profile = None;
        Ok(credential)
    }

    fn adopt_imported(&self, credential: DerivedCredential) -> Result<DerivedCredential, AuthError> {
        let mut state = self.state.write();
        self.store
            .save(&CredentialRecord::from_credential(&credential))?;
        self.verify_saved(&WalletSlot::Imported, &credential)?;

        info!(address = %credential.address, "Imported wallet saved");
        if state.identity.is_none() {
            state.profile = None;
        }
        state.imported = Some(credential.clone());
        Ok(credential)
    }

    /// The record just written must load back to the same address.
    fn verify_saved(&self, slot: &WalletSlot, credential: &DerivedCredential) -> Result<(), AuthError> {
        match self.store.load(slot)? {
            Some(record) if record.address == credential.address => Ok(()),
            Some(record) => Err(AuthError::AddressMismatch {
                stored: record.address.to_string(),
                derived: credential.address.to_string(),
            }),
            None => Err(AuthError::Storage(format!("{slot} did not reload after save"))),
        }
    }
}
