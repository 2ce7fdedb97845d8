//! # Salt Resolution
//!
//! The salt keeps a wallet address from being linkable to the raw identity
//! subject. Resolution order:
//!
//! 1. `google_auth_user_salt_{sub}` in the local store (no network)
//! 2. the remote salt service, given the raw identity token
//! 3. a local fallback computed from the digits of the subject
//!
//! Whatever is chosen is persisted before it is returned. Once a subject
//! has a salt on this client it never changes: a different salt is a
//! different address. A fallback salt is therefore permanent for that
//! subject until storage is cleared.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FALLBACK_SALT_DIGITS, FALLBACK_SALT_SEED_DIGITS, USER_SALT_PREFIX};
use crate::error::AuthError;
use crate::identity::IdentityAssertion;
use crate::storage::KeyValueStore;

/// A remote source of per-identity salts.
#[async_trait]
pub trait SaltService: Send + Sync {
    /// Fetch the salt for the identity in `assertion`.
    ///
    /// Any failure is reported as [`AuthError::SaltServiceUnavailable`].
    async fn fetch_salt(&self, assertion: &IdentityAssertion) -> Result<String, AuthError>;
}

/// Salt service over HTTP: `POST {"jwt": token}`, answers `{"salt": ..}`.
#[derive(Debug, Clone)]
pub struct HttpSaltService {
    url: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct SaltRequest<'a> {
    jwt: &'a str,
}

#[derive(Deserialize)]
struct SaltResponse {
    salt: serde_json::Value,
}

impl HttpSaltService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mysocial-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            http_client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SaltService for HttpSaltService {
    async fn fetch_salt(&self, assertion: &IdentityAssertion) -> Result<String, AuthError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&SaltRequest {
                jwt: assertion.raw(),
            })
            .send()
            .await
            .map_err(|e| AuthError::SaltServiceUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::SaltServiceUnavailable(format!(
                "service returned {status}"
            )));
        }

        let body: SaltResponse = response
            .json()
            .await
            .map_err(|e| {
                AuthError::SaltServiceUnavailable(format!("malformed response: {e}"))
            })?;

        // Some deployments send the salt as a JSON number.
        let salt = match body.salt {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(AuthError::SaltServiceUnavailable(format!(
                    "salt has unexpected type: {other}"
                )))
            }
        };
        // Used verbatim, whatever its alphabet, so every client that asks
        // gets the same address.
        if salt.is_empty() {
            return Err(AuthError::SaltServiceUnavailable("salt is empty".into()));
        }
        Ok(salt)
    }
}

/// A salt service that is never reachable. Every subject gets the local
/// fallback salt.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSaltService;

#[async_trait]
impl SaltService for OfflineSaltService {
    async fn fetch_salt(&self, _assertion: &IdentityAssertion) -> Result<String, AuthError> {
        Err(AuthError::SaltServiceUnavailable("offline".into()))
    }
}

/// Where a resolved salt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaltSource {
    /// Already persisted for this subject.
    Cached,
    /// Returned by the salt service and persisted just now.
    Remote,
    /// Computed locally after the salt service failed, persisted just now.
    Fallback,
}

/// A salt and its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSalt {
    pub salt: String,
    pub source: SaltSource,
}

impl ResolvedSalt {
    /// True if resolving wrote a new entry to the store.
    pub fn was_persisted_now(&self) -> bool {
        self.source != SaltSource::Cached
    }
}

/// Resolves and pins per-subject salts.
#[derive(Clone)]
pub struct SaltResolver {
    store: Arc<dyn KeyValueStore>,
    service: Arc<dyn SaltService>,
}

impl SaltResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, service: Arc<dyn SaltService>) -> Self {
        Self { store, service }
    }

    /// Storage key holding the salt for `subject`.
    pub fn storage_key(subject: &str) -> String {
        format!("{USER_SALT_PREFIX}{subject}")
    }

    /// The persisted salt for `subject`, if any.
    pub fn cached(&self, subject: &str) -> Result<Option<String>, AuthError> {
        Ok(self
            .store
            .get(&Self::storage_key(subject))?
            .filter(|salt| !salt.is_empty()))
    }

    /// Cache, then remote, then fallback. See the module docs.
    pub async fn resolve(
        &self,
        subject: &str,
        assertion: &IdentityAssertion,
    ) -> Result<ResolvedSalt, AuthError> {
        if let Some(salt) = self.cached(subject)? {
            debug!(subject = %subject, "Salt served from local store");
            return Ok(ResolvedSalt {
                salt,
                source: SaltSource::Cached,
            });
        }

        let resolved = match self.service.fetch_salt(assertion).await {
            Ok(salt) => {
                info!(subject = %subject, "Salt obtained from salt service");
                ResolvedSalt {
                    salt,
                    source: SaltSource::Remote,
                }
            }
            Err(e) => {
                warn!(
                    subject = %subject,
                    error = %e,
                    "Salt service failed, using local fallback salt"
                );
                ResolvedSalt {
                    salt: fallback_salt(subject),
                    source: SaltSource::Fallback,
                }
            }
        };

        self.store.set(&Self::storage_key(subject), &resolved.salt)?;
        Ok(resolved)
    }
}

/// Deterministic salt for when the salt service is unavailable.
///
/// Keep the digits of `subject` (or `12345` if it has none), right-pad with
/// zeros to 39 digits, truncate to 39, and print the result as an integer,
/// which drops leading zeros.
pub fn fallback_salt(subject: &str) -> String {
    let mut digits: String = subject.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        digits.push_str(FALLBACK_SALT_SEED_DIGITS);
    }
    digits.truncate(FALLBACK_SALT_DIGITS);
    while digits.len() < FALLBACK_SALT_DIGITS {
        digits.push('0');
    }

    match digits.trim_start_matches('0') {
        "" => "0".to_string(),
        significant => significant.to_string(),
    }
}
