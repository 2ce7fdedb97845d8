//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited crates:
//!
//! - **Ed25519** (`ed25519-dalek`) for wallet keys and signatures.
//! - **SHA-256** for the identity seed, **BLAKE2b-256** for addresses.
//! - **BIP-39** (`bip39`) mnemonics and **SLIP-10** Ed25519 derivation
//!   (`hmac` + SHA-512).
//!
//! Nothing in here touches storage or the network.

pub mod hash;
pub mod keys;
pub mod mnemonic;

pub use hash::{blake2b256, sha256_array};
pub use keys::{KeyError, MysKeypair, MysPublicKey, MysSignature};
pub use mnemonic::{
    derive_keypair_from_mnemonic, generate_mnemonic, normalize_mnemonic, DerivationPath,
};
