//! # BIP-39 Mnemonics & SLIP-10 Derivation
//!
//! Mnemonic wallets follow the chain's standard: BIP-39 seed with an empty
//! passphrase, then SLIP-10 Ed25519 derivation down a fully hardened path,
//! `m/44'/784'/0'/0'/0'` by default. SLIP-10 has no non-hardened Ed25519
//! derivation, so a path with an unhardened segment is rejected outright.
//!
//! Imported phrases are lowercased and must be 12 to 24 English wordlist
//! words. Their checksum is not enforced: the web client seeds phrases with
//! a bad checksum, and a wallet it imports must import here too. Generated
//! phrases always carry a valid checksum.

use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use super::keys::MysKeypair;
use crate::config::{MAX_MNEMONIC_WORDS, MIN_MNEMONIC_WORDS};
use crate::error::AuthError;

type HmacSha512 = Hmac<Sha512>;

const HARDENED_OFFSET: u32 = 0x8000_0000;
const SLIP10_ED25519_KEY: &[u8] = b"ed25519 seed";

// ---------------------------------------------------------------------------
// Derivation paths
// ---------------------------------------------------------------------------

/// A parsed, fully hardened derivation path.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivationPath {
    /// Child indexes with the hardened bit already set.
    indexes: Vec<u32>,
}

impl DerivationPath {
    pub fn indexes(&self) -> &[u32] {
        &self.indexes
    }
}

impl FromStr for DerivationPath {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| AuthError::InvalidDerivationPath(format!("{s}: {why}"));

        let mut segments = s.trim().split('/');
        if segments.next() != Some("m") {
            return Err(invalid("must start with 'm'"));
        }

        let indexes = segments
            .map(|segment| {
                let raw = segment
                    .strip_suffix('\'')
                    .ok_or_else(|| invalid("ed25519 only supports hardened segments"))?;
                let index: u32 = raw.parse().map_err(|_| invalid("segment is not a number"))?;
                if index >= HARDENED_OFFSET {
                    return Err(invalid("segment out of range"));
                }
                Ok(index | HARDENED_OFFSET)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if indexes.is_empty() {
            return Err(invalid("path has no segments"));
        }
        Ok(Self { indexes })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for index in &self.indexes {
            write!(f, "/{}'", index & !HARDENED_OFFSET)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivationPath({self})")
    }
}

// ---------------------------------------------------------------------------
// Mnemonics
// ---------------------------------------------------------------------------

/// Number of whitespace-separated words in a phrase.
pub fn word_count(phrase: &str) -> usize {
    phrase.split_whitespace().count()
}

/// Lowercase and collapse whitespace. Phrases are seeded and stored in
/// this form.
pub fn normalize_mnemonic(phrase: &str) -> Zeroizing<String> {
    Zeroizing::new(
        phrase
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Word-count gate followed by wordlist parsing. The checksum is not
/// checked.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, AuthError> {
    let normalized = normalize_mnemonic(phrase);
    let words = word_count(&normalized);
    if !(MIN_MNEMONIC_WORDS..=MAX_MNEMONIC_WORDS).contains(&words) {
        return Err(AuthError::InvalidMnemonic(format!(
            "must be {MIN_MNEMONIC_WORDS}-{MAX_MNEMONIC_WORDS} words, got {words}"
        )));
    }
    Mnemonic::parse_in_normalized_without_checksum_check(Language::English, &normalized)
        .map_err(|e| AuthError::InvalidMnemonic(e.to_string()))
}

/// Generate a new English mnemonic of `words` words from OS entropy.
pub fn generate_mnemonic(words: usize) -> Result<Zeroizing<String>, AuthError> {
    if words % 3 != 0 || !(MIN_MNEMONIC_WORDS..=MAX_MNEMONIC_WORDS).contains(&words) {
        return Err(AuthError::InvalidMnemonic(format!(
            "cannot generate a {words}-word mnemonic"
        )));
    }
    // 32 bits of entropy per 3 words.
    let mut entropy = Zeroizing::new(vec![0u8; words / 3 * 4]);
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| AuthError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Derive a keypair from `phrase` along `path` (SLIP-10, Ed25519).
pub fn derive_keypair_from_mnemonic(
    phrase: &str,
    path: &DerivationPath,
) -> Result<MysKeypair, AuthError> {
    let mnemonic = parse_mnemonic(phrase)?;
    let seed = Zeroizing::new(mnemonic.to_seed(""));
    let secret = slip10_derive(seed.as_slice(), path)?;
    Ok(MysKeypair::from_seed(&secret))
}

/// SLIP-10 master key from `seed`, then hardened children down `path`.
fn slip10_derive(seed: &[u8], path: &DerivationPath) -> Result<Zeroizing<[u8; 32]>, AuthError> {
    let derivation_error = |e: hmac::digest::InvalidLength| {
        AuthError::InvalidDerivationPath(format!("hmac key rejected: {e}"))
    };

    let mut mac = HmacSha512::new_from_slice(SLIP10_ED25519_KEY).map_err(derivation_error)?;
    mac.update(seed);
    let mut output = Zeroizing::new([0u8; 64]);
    output.copy_from_slice(&mac.finalize().into_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    let mut chain_code = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&output[..32]);
    chain_code.copy_from_slice(&output[32..]);

    for index in path.indexes() {
        let mut mac = HmacSha512::new_from_slice(chain_code.as_slice()).map_err(derivation_error)?;
        mac.update(&[0x00]);
        mac.update(key.as_slice());
        mac.update(&index.to_be_bytes());
        output.copy_from_slice(&mac.finalize().into_bytes());

        key.copy_from_slice(&output[..32]);
        chain_code.copy_from_slice(&output[32..]);
    }

    Ok(key)
}
