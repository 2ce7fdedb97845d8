//! # MySocial Addresses
//!
//! ```text
//! public_key (32 bytes)
//!     -> BLAKE2b-256(0x00 || public_key)
//!     -> "0x" + lowercase hex (66 chars)
//! ```
//!
//! The leading flag byte names the signature scheme (0x00 = Ed25519), so
//! two schemes can never collide on the same address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ED25519_FLAG;
use crate::crypto::hash::blake2b256;
use crate::crypto::keys::MysPublicKey;
use crate::error::AuthError;

/// A 32-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MysAddress([u8; 32]);

impl MysAddress {
    pub fn from_public_key(pk: &MysPublicKey) -> Self {
        Self(blake2b256(&[[ED25519_FLAG].as_slice(), pk.as_bytes().as_slice()]))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x123456...abcdef`, for log lines and terminal output.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..8], &full[full.len() - 6..])
    }
}

impl FromStr for MysAddress {
    type Err = AuthError;

    /// Accepts `0x` + 64 hex characters, either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .ok_or_else(|| AuthError::InvalidAddress(format!("{s}: missing 0x prefix")))?;
        if hex_part.len() != 64 {
            return Err(AuthError::InvalidAddress(format!(
                "{s}: expected 64 hex characters, got {}",
                hex_part.len()
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| AuthError::InvalidAddress(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for MysAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MysAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MysAddress({self})")
    }
}

impl Serialize for MysAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MysAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
