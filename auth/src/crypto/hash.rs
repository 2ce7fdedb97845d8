//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256** turns `"{subject}_{salt}"` into the 32-byte identity seed.
//!   The web client computes the same digest with WebCrypto, so this must
//!   stay plain SHA-256 over the UTF-8 bytes.
//! - **BLAKE2b-256** hashes `flag || public_key` into an address, matching
//!   the chain's own address scheme.

use blake2::digest::consts::U32;
use blake2::Blake2b;
use sha2::{Digest, Sha256};

type Blake2b256 = Blake2b<U32>;

/// SHA-256 digest as a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// BLAKE2b with a 256-bit output over the concatenation of `parts`.
pub fn blake2b256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
