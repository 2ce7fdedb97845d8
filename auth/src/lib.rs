// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MySocial Auth: Core Library
//!
//! Client-side wallet sign-in for MySocial. A visitor ends up holding an
//! Ed25519 keypair and a MySocial address through one of three doors:
//!
//! - **Google sign-in**: the subject of a Google ID token plus a per-user
//!   salt is hashed into a seed. Same subject, same salt, same address.
//! - **Mnemonic import**: BIP-39 phrase, SLIP-10 derivation along
//!   `m/44'/784'/0'/0'/0'`.
//! - **Raw key import**: 32 bytes, as `0x` hex or comma-separated decimals.
//!
//! Everything derived is persisted through a small key-value abstraction and
//! re-validated on restore: a stored record whose secret no longer
//! reproduces its stored address is wiped, never trusted.
//!
//! ## Modules
//!
//! - **crypto**: keypairs, hashing, mnemonic and SLIP-10 derivation.
//! - **identity**: addresses, identity-token decoding, OAuth URL helpers.
//! - **credential**: the deriver and the salt resolver.
//! - **storage**: key-value backends and the credential store.
//! - **profile**: read-through profile lookups against the social indexer.
//! - **mailer**: welcome email and mailing-list boundary.
//! - **session**: the composition root tying the above together.
//! - **config**: constants and runtime configuration.

pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod mailer;
pub mod profile;
pub mod session;
pub mod storage;

pub use config::AuthConfig;
pub use credential::{CredentialDeriver, CredentialOrigin, DerivedCredential, SaltResolver};
pub use error::{AuthError, AuthResult};
pub use identity::{IdentityAssertion, MysAddress, UserInfo};
pub use session::{AuthMethod, AuthSession, AuthSessionBuilder, SignOutReport, WelcomeOutcome};
pub use storage::{CredentialStore, KeyValueStore, MemoryStore, SledStore, WalletSlot};
