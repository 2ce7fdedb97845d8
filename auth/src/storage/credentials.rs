//! # Credential Persistence
//!
//! Wallets live in one of two slots.
//!
//! | Slot               | Keys                                                   |
//! |--------------------|--------------------------------------------------------|
//! | `Identity(sub)`    | `google_auth_private_key_{sub}` (`0x` hex)             |
//! |                    | `google_auth_user_salt_{sub}`                          |
//! |                    | `google_auth_address_{sub}`                            |
//! | `Imported`         | `mysocial_mnemonic` + `mysocial_derivation_path`       |
//! |                    | or `mysocial_private_key` (comma-separated decimal)    |
//! |                    | or `google_auth_private_key_imported` (oldest, read)   |
//! |                    | `mysocial_address`                                     |
//!
//! The active identity token sits beside them under `google_auth_jwt`.
//!
//! ## Restoration
//!
//! `load` re-derives the keypair from the stored secret and compares its
//! address with the stored one. A record that does not reproduce its own
//! address is corrupt: its secret and address are deleted and `load`
//! returns `None`. The user just appears signed out. An identity slot keeps
//! its pinned salt, so the next sign-in lands on the same address.
//!
//! Sources are tried newest first: mnemonic, then `mysocial_private_key`,
//! then the oldest raw key. A record with no stored address is checked
//! against the address its secret derives; nothing is written back.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::kv::KeyValueStore;
use crate::config::{
    DERIVATION_PATH_KEY, IDENTITY_ADDRESS_PREFIX, IMPORTED_ADDRESS_KEY, IMPORTED_SLOT, JWT_KEY,
    LEGACY_PRIVATE_KEY_KEY, MNEMONIC_KEY, OLDEST_IMPORTED_KEY_KEY, PRIVATE_KEY_PREFIX,
    SECRET_KEY_LENGTH, USER_SALT_PREFIX,
};
use crate::credential::{
    format_private_key, parse_private_key, CredentialOrigin, DerivedCredential,
};
use crate::crypto::{derive_keypair_from_mnemonic, DerivationPath, MysKeypair};
use crate::error::AuthError;
use crate::identity::MysAddress;

/// Which wallet a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WalletSlot {
    /// Derived from an identity token, keyed by its subject.
    Identity(String),
    /// Imported or generated locally.
    Imported,
}

impl fmt::Display for WalletSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(subject) => write!(f, "identity:{subject}"),
            Self::Imported => write!(f, "{IMPORTED_SLOT}"),
        }
    }
}

/// The secret half of a record.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretMaterial {
    Mnemonic {
        phrase: Zeroizing<String>,
        path: DerivationPath,
    },
    PrivateKey(Zeroizing<[u8; SECRET_KEY_LENGTH]>),
}

impl SecretMaterial {
    /// Re-derive the keypair this secret stands for.
    pub fn keypair(&self) -> Result<MysKeypair, AuthError> {
        match self {
            Self::Mnemonic { phrase, path } => derive_keypair_from_mnemonic(phrase, path),
            Self::PrivateKey(bytes) => Ok(MysKeypair::from_seed(bytes)),
        }
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mnemonic { path, .. } => write!(f, "Mnemonic({path})"),
            Self::PrivateKey(_) => write!(f, "PrivateKey(..)"),
        }
    }
}

/// Everything persisted for one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub slot: WalletSlot,
    pub secret: SecretMaterial,
    /// Identity slots only.
    pub salt: Option<String>,
    pub address: MysAddress,
}

impl CredentialRecord {
    /// The record that persists `credential`.
    pub fn from_credential(credential: &DerivedCredential) -> Self {
        let (slot, secret, salt) = match &credential.origin {
            CredentialOrigin::Identity { subject, salt } => (
                WalletSlot::Identity(subject.clone()),
                SecretMaterial::PrivateKey(credential.keypair.secret_key_bytes()),
                Some(salt.clone()),
            ),
            CredentialOrigin::Mnemonic { phrase, path } => (
                WalletSlot::Imported,
                SecretMaterial::Mnemonic {
                    phrase: phrase.clone(),
                    path: path.clone(),
                },
                None,
            ),
            CredentialOrigin::PrivateKey => (
                WalletSlot::Imported,
                SecretMaterial::PrivateKey(credential.keypair.secret_key_bytes()),
                None,
            ),
        };
        Self {
            slot,
            secret,
            salt,
            address: credential.address,
        }
    }

    /// Rebuild the live credential. Fails if the secret no longer
    /// reproduces the stored address.
    pub fn into_credential(self) -> Result<DerivedCredential, AuthError> {
        let keypair = self.secret.keypair()?;
        let derived = keypair.address();
        if derived != self.address {
            return Err(AuthError::AddressMismatch {
                stored: self.address.to_string(),
                derived: derived.to_string(),
            });
        }
        let origin = match (self.slot, self.secret) {
            (WalletSlot::Identity(subject), _) => CredentialOrigin::Identity {
                subject,
                salt: self.salt.unwrap_or_default(),
            },
            (WalletSlot::Imported, SecretMaterial::Mnemonic { phrase, path }) => {
                CredentialOrigin::Mnemonic { phrase, path }
            }
            (WalletSlot::Imported, SecretMaterial::PrivateKey(_)) => CredentialOrigin::PrivateKey,
        };
        Ok(DerivedCredential {
            keypair,
            address: derived,
            origin,
        })
    }
}

/// What [`CredentialStore::load_checked`] found in a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLoad {
    Empty,
    Valid(CredentialRecord),
    /// A record was present but failed verification and has been discarded.
    Discarded,
}

impl SlotLoad {
    pub fn into_record(self) -> Option<CredentialRecord> {
        match self {
            Self::Valid(record) => Some(record),
            Self::Empty | Self::Discarded => None,
        }
    }
}

/// Reads and writes wallet records on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    default_path: DerivationPath,
}

impl CredentialStore {
    /// `default_path` applies to stored mnemonics that have no path saved
    /// next to them.
    pub fn new(kv: Arc<dyn KeyValueStore>, default_path: DerivationPath) -> Self {
        Self { kv, default_path }
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    pub fn private_key_key(subject: &str) -> String {
        format!("{PRIVATE_KEY_PREFIX}{subject}")
    }

    pub fn salt_key(subject: &str) -> String {
        format!("{USER_SALT_PREFIX}{subject}")
    }

    pub fn identity_address_key(subject: &str) -> String {
        format!("{IDENTITY_ADDRESS_PREFIX}{subject}")
    }

    // -- Records ------------------------------------------------------------

    /// Persist `record`, replacing whatever the slot held.
    pub fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        match &record.slot {
            WalletSlot::Identity(subject) => {
                let SecretMaterial::PrivateKey(bytes) = &record.secret else {
                    return Err(AuthError::Storage(
                        "identity wallets are stored as raw keys".into(),
                    ));
                };
                let hex_key = Zeroizing::new(format!("0x{}", hex::encode(bytes.as_slice())));
                self.kv.set(&Self::private_key_key(subject), &hex_key)?;
                if let Some(salt) = &record.salt {
                    self.kv.set(&Self::salt_key(subject), salt)?;
                }
                self.kv
                    .set(&Self::identity_address_key(subject), &record.address.to_string())?;
            }
            WalletSlot::Imported => {
                match &record.secret {
                    SecretMaterial::Mnemonic { phrase, path } => {
                        self.kv.set(MNEMONIC_KEY, phrase)?;
                        self.kv.set(DERIVATION_PATH_KEY, &path.to_string())?;
                        self.kv.delete(LEGACY_PRIVATE_KEY_KEY)?;
                    }
                    SecretMaterial::PrivateKey(bytes) => {
                        self.kv
                            .set(LEGACY_PRIVATE_KEY_KEY, &format_private_key(bytes.as_slice()))?;
                        self.kv.delete(MNEMONIC_KEY)?;
                        self.kv.delete(DERIVATION_PATH_KEY)?;
                    }
                }
                self.kv.delete(OLDEST_IMPORTED_KEY_KEY)?;
                self.kv.set(IMPORTED_ADDRESS_KEY, &record.address.to_string())?;
            }
        }
        debug!(slot = %record.slot, address = %record.address, "Credential record saved");
        Ok(())
    }

    /// Load and verify the record in `slot`.
    ///
    /// `Ok(None)` covers both an empty slot and a corrupt one; a corrupt
    /// slot is discarded first. `Err` is reserved for the backend failing.
    pub fn load(&self, slot: &WalletSlot) -> Result<Option<CredentialRecord>, AuthError> {
        self.load_checked(slot).map(SlotLoad::into_record)
    }

    /// Like [`load`](Self::load), but tells an empty slot from a discarded one.
    pub fn load_checked(&self, slot: &WalletSlot) -> Result<SlotLoad, AuthError> {
        let record = match self.read(slot) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(SlotLoad::Empty),
            Err(AuthError::Storage(e)) => return Err(AuthError::Storage(e)),
            Err(e) => {
                warn!(slot = %slot, error = %e, "Stored credential unreadable, discarding");
                self.discard(slot)?;
                return Ok(SlotLoad::Discarded);
            }
        };

        let derived = match record.secret.keypair() {
            Ok(keypair) => keypair.address(),
            Err(e) => {
                warn!(slot = %slot, error = %e, "Stored secret no longer derives, discarding");
                self.discard(slot)?;
                return Ok(SlotLoad::Discarded);
            }
        };
        if derived != record.address {
            let err = AuthError::AddressMismatch {
                stored: record.address.to_string(),
                derived: derived.to_string(),
            };
            warn!(slot = %slot, error = %err, "Stored credential is corrupt, discarding");
            self.discard(slot)?;
            return Ok(SlotLoad::Discarded);
        }
        Ok(SlotLoad::Valid(record))
    }

    /// Whether the imported wallet still sits under its oldest key and
    /// should be saved again under the current layout.
    pub fn holds_oldest_import(&self) -> Result<bool, AuthError> {
        Ok(self.kv.get(OLDEST_IMPORTED_KEY_KEY)?.is_some())
    }

    /// Raw read without verification.
    fn read(&self, slot: &WalletSlot) -> Result<Option<CredentialRecord>, AuthError> {
        let (secret, salt, address_key) = match slot {
            WalletSlot::Identity(subject) => {
                let Some(text) = self.kv.get(&Self::private_key_key(subject))? else {
                    return Ok(None);
                };
                (
                    Self::raw_secret(&text)?,
                    self.kv.get(&Self::salt_key(subject))?,
                    Self::identity_address_key(subject),
                )
            }
            WalletSlot::Imported => {
                let secret = if let Some(phrase) = self.kv.get(MNEMONIC_KEY)? {
                    let path = match self.kv.get(DERIVATION_PATH_KEY)? {
                        Some(path) => path.parse()?,
                        None => self.default_path.clone(),
                    };
                    SecretMaterial::Mnemonic {
                        phrase: Zeroizing::new(phrase),
                        path,
                    }
                } else if let Some(text) = self.kv.get(LEGACY_PRIVATE_KEY_KEY)? {
                    Self::raw_secret(&text)?
                } else if let Some(text) = self.kv.get(OLDEST_IMPORTED_KEY_KEY)? {
                    Self::raw_secret(&text)?
                } else {
                    return Ok(None);
                };
                (secret, None, IMPORTED_ADDRESS_KEY.to_string())
            }
        };

        let address = match self.kv.get(&address_key)? {
            Some(stored) => stored.parse()?,
            None => secret.keypair()?.address(),
        };

        Ok(Some(CredentialRecord {
            slot: slot.clone(),
            secret,
            salt,
            address,
        }))
    }

    fn raw_secret(text: &str) -> Result<SecretMaterial, AuthError> {
        let bytes = parse_private_key(text)?;
        let mut secret = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
        secret.copy_from_slice(bytes.as_slice());
        Ok(SecretMaterial::PrivateKey(secret))
    }

    /// Drop a record that failed verification. An identity slot keeps its
    /// salt: a subject's salt never changes once pinned.
    fn discard(&self, slot: &WalletSlot) -> Result<(), AuthError> {
        match slot {
            WalletSlot::Identity(subject) => {
                self.kv.delete(&Self::private_key_key(subject))?;
                self.kv.delete(&Self::identity_address_key(subject))?;
            }
            WalletSlot::Imported => {
                self.clear(slot)?;
            }
        }
        Ok(())
    }

    /// Delete every field of `slot`. Returns how many keys existed.
    pub fn clear(&self, slot: &WalletSlot) -> Result<usize, AuthError> {
        let keys = match slot {
            WalletSlot::Identity(subject) => vec![
                Self::private_key_key(subject),
                Self::salt_key(subject),
                Self::identity_address_key(subject),
            ],
            WalletSlot::Imported => vec![
                MNEMONIC_KEY.to_string(),
                DERIVATION_PATH_KEY.to_string(),
                IMPORTED_ADDRESS_KEY.to_string(),
                LEGACY_PRIVATE_KEY_KEY.to_string(),
                OLDEST_IMPORTED_KEY_KEY.to_string(),
            ],
        };
        let mut removed = 0;
        for key in &keys {
            if self.kv.get(key)?.is_some() {
                removed += 1;
            }
            self.kv.delete(key)?;
        }
        debug!(slot = %slot, removed, "Credential slot cleared");
        Ok(removed)
    }

    /// Sign-out of an identity session: the token and every subject's
    /// secrets, salts and addresses. The imported slot is untouched.
    pub fn clear_identity_namespaces(&self) -> Result<usize, AuthError> {
        let mut removed = 0;
        if self.kv.get(JWT_KEY)?.is_some() {
            self.kv.delete(JWT_KEY)?;
            removed += 1;
        }
        for prefix in [PRIVATE_KEY_PREFIX, USER_SALT_PREFIX, IDENTITY_ADDRESS_PREFIX] {
            removed += self.kv.delete_prefix(prefix)?;
        }
        Ok(removed)
    }

    // -- Identity token -----------------------------------------------------

    pub fn save_identity_token(&self, raw: &str) -> Result<(), AuthError> {
        Ok(self.kv.set(JWT_KEY, raw)?)
    }

    pub fn identity_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.kv.get(JWT_KEY)?.filter(|token| !token.is_empty()))
    }

    pub fn remove_identity_token(&self) -> Result<(), AuthError> {
        Ok(self.kv.delete(JWT_KEY)?)
    }
}
