//! # Identity Module
//!
//! Who the visitor is, as far as this crate can tell:
//!
//! 1. **Address**: the `0x`-prefixed BLAKE2b digest of an Ed25519 public
//!    key. What the indexer and the chain key everything by.
//! 2. **Assertion**: a Google ID token, decoded but *not* verified. The
//!    salt service and the chain's relying parties verify signatures; we
//!    only need the subject and a few profile claims.
//! 3. **OAuth**: building the implicit-flow sign-in URL and pulling the
//!    `id_token` back out of the redirect.

pub mod address;
pub mod assertion;
pub mod oauth;

pub use address::MysAddress;
pub use assertion::{Audience, IdentityAssertion, IdentityClaims, UserInfo};
pub use oauth::{extract_id_token, google_sign_in_url};
