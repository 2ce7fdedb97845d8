//! Wallet derivation: identity, mnemonic and raw-key credentials, and the
//! salt that makes identity wallets unlinkable.

pub mod deriver;
pub mod salt;

pub use deriver::{
    format_private_key, parse_private_key, CredentialDeriver, CredentialOrigin, DerivedCredential,
};
pub use salt::{
    fallback_salt, HttpSaltService, OfflineSaltService, ResolvedSalt, SaltResolver, SaltService,
    SaltSource,
};
