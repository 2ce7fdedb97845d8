//! # Credential Derivation
//!
//! Every door into a wallet ends in the same place: a [`MysKeypair`] and
//! the [`MysAddress`] of its public key.
//!
//! | Door          | Secret                                        |
//! |---------------|-----------------------------------------------|
//! | Identity      | `SHA-256("{subject}_{salt}")`                 |
//! | Mnemonic      | BIP-39 seed, SLIP-10 down the derivation path |
//! | Private key   | the 32 bytes as given                         |
//!
//! All three are pure. Persisting the result is the caller's job.

use std::fmt;
use zeroize::Zeroizing;

use super::salt::{ResolvedSalt, SaltResolver};
use crate::config::{GENERATED_MNEMONIC_WORDS, SECRET_KEY_LENGTH};
use crate::crypto::{
    derive_keypair_from_mnemonic, generate_mnemonic, normalize_mnemonic, sha256_array,
    DerivationPath, MysKeypair,
};
use crate::error::AuthError;
use crate::identity::{IdentityAssertion, MysAddress};

/// Where a credential's secret came from. Enough to persist and later
/// reproduce it.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Hashed from an identity subject and its salt.
    Identity { subject: String, salt: String },
    /// Derived from a BIP-39 phrase.
    Mnemonic {
        phrase: Zeroizing<String>,
        path: DerivationPath,
    },
    /// Imported as raw secret bytes.
    PrivateKey,
}

impl fmt::Debug for CredentialOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity { subject, .. } => f
                .debug_struct("Identity")
                .field("subject", subject)
                .finish_non_exhaustive(),
            Self::Mnemonic { path, .. } => f
                .debug_struct("Mnemonic")
                .field("path", path)
                .finish_non_exhaustive(),
            Self::PrivateKey => write!(f, "PrivateKey"),
        }
    }
}

/// A keypair, its address, and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCredential {
    pub keypair: MysKeypair,
    pub address: MysAddress,
    pub origin: CredentialOrigin,
}

impl DerivedCredential {
    fn new(keypair: MysKeypair, origin: CredentialOrigin) -> Self {
        Self {
            address: keypair.address(),
            keypair,
            origin,
        }
    }

    /// Subject for identity credentials, `None` otherwise.
    pub fn subject(&self) -> Option<&str> {
        match &self.origin {
            CredentialOrigin::Identity { subject, .. } => Some(subject),
            _ => None,
        }
    }
}

/// Derives wallets. Holds the derivation path used for mnemonic imports and
/// generated wallets; everything else is stateless.
#[derive(Debug, Clone)]
pub struct CredentialDeriver {
    path: DerivationPath,
}

impl CredentialDeriver {
    pub fn new(path: DerivationPath) -> Self {
        Self { path }
    }

    pub fn derivation_path(&self) -> &DerivationPath {
        &self.path
    }

    /// Deterministic identity wallet for `subject` under `salt`.
    pub fn from_subject_and_salt(subject: &str, salt: &str) -> DerivedCredential {
        let seed = Zeroizing::new(sha256_array(format!("{subject}_{salt}").as_bytes()));
        DerivedCredential::new(
            MysKeypair::from_seed(&seed),
            CredentialOrigin::Identity {
                subject: subject.to_string(),
                salt: salt.to_string(),
            },
        )
    }

    /// Identity wallet for an assertion, resolving the salt first.
    ///
    /// Fails only on a missing subject or a storage error; an unreachable
    /// salt service degrades to the local fallback inside the resolver.
    pub async fn from_identity(
        &self,
        assertion: &IdentityAssertion,
        resolver: &SaltResolver,
    ) -> Result<(DerivedCredential, ResolvedSalt), AuthError> {
        let subject = assertion.subject()?;
        let resolved = resolver.resolve(subject, assertion).await?;
        let credential = Self::from_subject_and_salt(subject, &resolved.salt);
        Ok((credential, resolved))
    }

    /// Wallet from a mnemonic along `path`, or the configured path if `None`.
    pub fn from_mnemonic(
        &self,
        phrase: &str,
        path: Option<&DerivationPath>,
    ) -> Result<DerivedCredential, AuthError> {
        let path = path.unwrap_or(&self.path);
        let normalized = normalize_mnemonic(phrase);
        let keypair = derive_keypair_from_mnemonic(&normalized, path)?;
        Ok(DerivedCredential::new(
            keypair,
            CredentialOrigin::Mnemonic {
                phrase: normalized,
                path: path.clone(),
            },
        ))
    }

    /// Wallet from user-supplied key text. See [`parse_private_key`].
    pub fn from_private_key(text: &str) -> Result<DerivedCredential, AuthError> {
        let bytes = parse_private_key(text)?;
        let keypair = MysKeypair::from_secret_slice(bytes.as_slice())?;
        Ok(DerivedCredential::new(keypair, CredentialOrigin::PrivateKey))
    }

    /// Fresh 12-word mnemonic wallet on the configured path.
    pub fn generate(&self) -> Result<DerivedCredential, AuthError> {
        let phrase = generate_mnemonic(GENERATED_MNEMONIC_WORDS)?;
        self.from_mnemonic(&phrase, None)
    }
}

/// Decode private key text into exactly 32 bytes.
///
/// Two spellings are accepted:
/// - `0x` followed by 64 hex characters
/// - 32 comma-separated decimal byte values (the legacy storage format)
///
/// Anything that decodes to the wrong length is `InvalidKeyLength`; text
/// that does not decode at all is `InvalidPrivateKey`.
pub fn parse_private_key(text: &str) -> Result<Zeroizing<Vec<u8>>, AuthError> {
    let text = text.trim();

    let bytes = if let Some(hex_part) = text.strip_prefix("0x") {
        hex::decode(hex_part).map_err(|e| AuthError::InvalidPrivateKey(format!("bad hex: {e}")))?
    } else {
        text.split(',')
            .map(|part| {
                part.trim().parse::<u8>().map_err(|_| {
                    AuthError::InvalidPrivateKey(format!("{:?} is not a byte value", part.trim()))
                })
            })
            .collect::<Result<Vec<u8>, _>>()?
    };
    let bytes = Zeroizing::new(bytes);

    if bytes.len() != SECRET_KEY_LENGTH {
        return Err(AuthError::key_length(bytes.len()));
    }
    Ok(bytes)
}

/// Render secret bytes in the legacy comma-separated decimal format.
pub fn format_private_key(bytes: &[u8]) -> Zeroizing<String> {
    Zeroizing::new(
        bytes
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}
