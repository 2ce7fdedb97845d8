//! # Configuration & Constants
//!
//! Storage-key namespaces, derivation parameters, service endpoints. The
//! storage keys are shared with the web client, so renaming one orphans
//! every wallet saved under the old name. Treat them as a wire format.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Storage keys
// ---------------------------------------------------------------------------

/// The raw identity token of the active Google session.
pub const JWT_KEY: &str = "google_auth_jwt";

/// Prefix for identity-derived secret keys, suffixed with the subject.
pub const PRIVATE_KEY_PREFIX: &str = "google_auth_private_key_";

/// Prefix for per-subject salts.
pub const USER_SALT_PREFIX: &str = "google_auth_user_salt_";

/// Prefix for the address derived for a subject.
pub const IDENTITY_ADDRESS_PREFIX: &str = "google_auth_address_";

/// Mnemonic of the imported wallet.
pub const MNEMONIC_KEY: &str = "mysocial_mnemonic";

/// Derivation path paired with [`MNEMONIC_KEY`].
pub const DERIVATION_PATH_KEY: &str = "mysocial_derivation_path";

/// Address of the imported wallet.
pub const IMPORTED_ADDRESS_KEY: &str = "mysocial_address";

/// Legacy raw-key record of the imported wallet.
pub const LEGACY_PRIVATE_KEY_KEY: &str = "mysocial_private_key";

/// Oldest raw-key record of the imported wallet, written by web clients
/// that kept it beside the identity keys. Read only; migrated on restore.
pub const OLDEST_IMPORTED_KEY_KEY: &str = "google_auth_private_key_imported";

/// Prefix for cached profile JSON, suffixed with the address.
pub const PROFILE_CACHE_PREFIX: &str = "mysocial_profile_";

/// Prefix for one-shot welcome-email markers, suffixed with the user id.
pub const WELCOME_EMAIL_PREFIX: &str = "mysocial_welcome_email_sent_";

/// Slot name for wallets that did not come from an identity provider.
pub const IMPORTED_SLOT: &str = "imported";

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Default SLIP-10 path for MySocial Ed25519 accounts (coin type 784).
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/784'/0'/0'/0'";

/// Smallest accepted mnemonic, in words.
pub const MIN_MNEMONIC_WORDS: usize = 12;

/// Largest accepted mnemonic, in words.
pub const MAX_MNEMONIC_WORDS: usize = 24;

/// Word count used for freshly generated wallets (128 bits of entropy).
pub const GENERATED_MNEMONIC_WORDS: usize = 12;

/// Width of the locally computed fallback salt, in decimal digits.
pub const FALLBACK_SALT_DIGITS: usize = 39;

/// Digits used when a subject contains no digits at all.
pub const FALLBACK_SALT_SEED_DIGITS: &str = "12345";

/// Signature-scheme flag prepended to the public key before address hashing.
pub const ED25519_FLAG: u8 = 0x00;

/// Secret key length in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Default salt service endpoint (testnet).
pub const DEFAULT_SALT_SERVICE_URL: &str = "https://salt.testnet.mysocial.network/salt";

/// Default social indexer base URL (testnet).
pub const DEFAULT_INDEXER_URL: &str = "https://mys-social-indexer-testnet.up.railway.app";

/// Salt requests give up after this long and fall back to the local salt.
pub const SALT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Profile lookups give up after this long.
pub const INDEXER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default email-provider API base.
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com";

/// Default public site, used for unsubscribe/privacy links in emails.
pub const DEFAULT_SITE_URL: &str = "https://sofiswap.xyz";

/// Default sender when none is configured.
pub const DEFAULT_SENDER: &str = "brandon@sofiswap.xyz";

/// Google OAuth authorization endpoint.
pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Runtime knobs for a session. Defaults point at testnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Salt service endpoint; receives `POST {"jwt": ..}`.
    pub salt_service_url: String,
    /// Client-side timeout for the salt request.
    #[serde(with = "duration_secs")]
    pub salt_timeout: Duration,
    /// Social indexer base URL.
    pub indexer_url: String,
    /// Client-side timeout for profile lookups.
    #[serde(with = "duration_secs")]
    pub indexer_timeout: Duration,
    /// Path used for mnemonic imports and generated wallets.
    pub derivation_path: String,
    /// Transactional email settings. `None` disables welcome emails.
    pub mailer: Option<MailerConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            salt_service_url: DEFAULT_SALT_SERVICE_URL.to_string(),
            salt_timeout: SALT_REQUEST_TIMEOUT,
            indexer_url: DEFAULT_INDEXER_URL.to_string(),
            indexer_timeout: INDEXER_REQUEST_TIMEOUT,
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
            mailer: None,
        }
    }
}

/// Credentials and addresses for the email provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    /// Mailing-list audience. Without it contact upserts are skipped.
    pub audience_id: Option<String>,
    pub sender: String,
    /// Public site URL used in email footers.
    pub site_url: String,
}

impl MailerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_EMAIL_API_URL.to_string(),
            api_key: api_key.into(),
            audience_id: None,
            sender: DEFAULT_SENDER.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("audience_id", &self.audience_id)
            .field("sender", &self.sender)
            .field("site_url", &self.site_url)
            .finish()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
