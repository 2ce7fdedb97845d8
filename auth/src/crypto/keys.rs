//! # Key Management
//!
//! Ed25519 keypairs for MySocial wallets.
//!
//! Every wallet in this crate, whatever door it came through, collapses to a
//! 32-byte Ed25519 secret. Identity sign-in hashes the secret out of a
//! subject and a salt, mnemonic import walks SLIP-10, raw import takes the
//! bytes as given. From there on it is one type: [`MysKeypair`].
//!
//! Key bytes are never logged. `Debug` prints the address, nothing else.

use base64::Engine;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::SECRET_KEY_LENGTH;
use crate::error::AuthError;
use crate::identity::MysAddress;

/// Errors from raw key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secret key must be {SECRET_KEY_LENGTH} bytes, got {0}")]
    InvalidSecretLength(usize),

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::InvalidSecretLength(got) => AuthError::key_length(got),
            KeyError::InvalidPublicKey => AuthError::InvalidPrivateKey(err.to_string()),
        }
    }
}

/// A wallet keypair. The signing key is zeroized on drop by `ed25519-dalek`.
///
/// Deliberately not `Serialize`: persisting a secret goes through
/// [`crate::storage::CredentialStore`], which knows the storage format.
pub struct MysKeypair {
    signing_key: SigningKey,
}

/// Public half of a wallet keypair.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MysPublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysSignature {
    bytes: Vec<u8>,
}

impl MysKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Keypair from a 32-byte seed. In Ed25519 the seed *is* the secret key,
    /// so the same seed always yields the same keypair.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Keypair from a byte slice that must be exactly 32 bytes long.
    pub fn from_secret_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSecretLength(bytes.len()))?;
        let seed = Zeroizing::new(seed);
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> MysPublicKey {
        MysPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The wallet address for this keypair.
    pub fn address(&self) -> MysAddress {
        self.public_key().to_address()
    }

    pub fn sign(&self, message: &[u8]) -> MysSignature {
        MysSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &MysSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret bytes, wiped when the returned value drops.
    ///
    /// Needed to persist raw-key and identity wallets. Do not log.
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl Clone for MysKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.secret_key_bytes())
    }
}

impl fmt::Debug for MysKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MysKeypair({})", self.address())
    }
}

impl PartialEq for MysKeypair {
    /// Compares public keys only; secret comparison is not constant-time here.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for MysKeypair {}

// ---------------------------------------------------------------------------
// MysPublicKey
// ---------------------------------------------------------------------------

impl MysPublicKey {
    /// Validates length and that the bytes decode to a curve point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_address(&self) -> MysAddress {
        MysAddress::from_public_key(self)
    }

    pub fn verify(&self, message: &[u8], signature: &MysSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }
}

impl fmt::Display for MysPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.bytes))
    }
}

impl fmt::Debug for MysPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MysPublicKey({})", &hex::encode(self.bytes)[..16])
    }
}

// ---------------------------------------------------------------------------
// MysSignature
// ---------------------------------------------------------------------------

impl MysSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64, the encoding the indexer expects for profile signatures.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl fmt::Debug for MysSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(&self.bytes);
        write!(f, "MysSignature({}..)", &hex_str[..hex_str.len().min(16)])
    }
}
