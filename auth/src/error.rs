//! Crate-level error type.
//!
//! Every fallible public operation returns [`AuthError`]. Backend errors
//! (`sled`, `reqwest`) are flattened to strings on the way in: a single
//! derivation may be awaited by several callers at once, and they all
//! receive a clone of the same result.

use thiserror::Error;

/// Errors surfaced by derivation, persistence and session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The mnemonic has the wrong word count or fails BIP-39 validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// The decoded private key is not exactly 32 bytes.
    #[error("invalid private key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength {
        /// Required length.
        expected: usize,
        /// Length that was decoded.
        got: usize,
    },

    /// The private key text could not be decoded at all.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The derivation path is not a hardened SLIP-10 path.
    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// The identity token is not a decodable `header.payload.signature` triple.
    #[error("malformed identity assertion: {0}")]
    MalformedAssertion(String),

    /// The identity token carries no `sub` claim.
    #[error("identity assertion has no subject")]
    MissingSubject,

    /// The remote salt service failed. Handled internally by falling back.
    #[error("salt service unavailable: {0}")]
    SaltServiceUnavailable(String),

    /// A persisted secret no longer reproduces its persisted address.
    #[error("address mismatch: stored {stored}, derived {derived}")]
    AddressMismatch {
        /// Address found in storage.
        stored: String,
        /// Address re-derived from the stored secret.
        derived: String,
    },

    /// A string is not a well-formed MySocial address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A URL given to or built by the sign-in flow does not parse.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The key-value backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The profile indexer failed.
    #[error("profile lookup failed: {0}")]
    Profile(String),

    /// The email provider failed.
    #[error("email delivery failed: {0}")]
    Email(String),

    /// The operation needs an active wallet and there is none.
    #[error("not signed in")]
    NotSignedIn,

    /// The session was signed out while the operation was in flight.
    #[error("session ended while the operation was in flight")]
    StaleSession,
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Key-length error for a 32-byte secret.
    pub fn key_length(got: usize) -> Self {
        AuthError::InvalidKeyLength {
            expected: crate::config::SECRET_KEY_LENGTH,
            got,
        }
    }
}
