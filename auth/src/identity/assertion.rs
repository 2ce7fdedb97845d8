//! # Identity Assertions
//!
//! A Google ID token is `base64url(header).base64url(payload).signature`.
//! We decode the payload and nothing else. Signature trust belongs to the
//! salt service and to whoever later checks the wallet's zkLogin proof, so
//! a forged token here only ever produces a wallet the forger already
//! controls.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// `aud` may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

/// Claims carried by the token payload. Unknown claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<Audience>,
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
    pub iat: Option<i64>,
    pub jti: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

/// Profile fields worth showing to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

/// A decoded, unverified identity token.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityAssertion {
    raw: String,
    claims: IdentityClaims,
}

impl IdentityAssertion {
    /// Decode the payload segment of `token` as JSON claims.
    ///
    /// Surrounding whitespace is trimmed; the raw (trimmed) token is kept
    /// because the salt service wants it verbatim.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let raw = token.trim();
        let mut segments = raw.split('.');
        let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
            return Err(AuthError::MalformedAssertion(
                "expected header.payload.signature".into(),
            ));
        };

        // Google omits padding; some proxies add it back.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .map_err(|e| AuthError::MalformedAssertion(format!("payload is not base64url: {e}")))?;

        let claims: IdentityClaims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedAssertion(format!("payload is not JSON: {e}")))?;

        Ok(Self {
            raw: raw.to_string(),
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// The `sub` claim. An empty subject counts as missing.
    pub fn subject(&self) -> Result<&str, AuthError> {
        match self.claims.sub.as_deref() {
            Some(sub) if !sub.is_empty() => Ok(sub),
            _ => Err(AuthError::MissingSubject),
        }
    }

    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            name: self.claims.name.clone(),
            email: self.claims.email.clone(),
            picture: self.claims.picture.clone(),
            given_name: self.claims.given_name.clone(),
            family_name: self.claims.family_name.clone(),
        }
    }

    /// True when `exp` is present and not after `unix_secs`.
    pub fn is_expired_at(&self, unix_secs: i64) -> bool {
        self.claims.exp.is_some_and(|exp| exp <= unix_secs)
    }
}

impl std::fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The raw token is a bearer credential for the salt service.
        f.debug_struct("IdentityAssertion")
            .field("sub", &self.claims.sub)
            .field("email", &self.claims.email)
            .field("exp", &self.claims.exp)
            .finish_non_exhaustive()
    }
}

/// Build an unsigned token around `claims`. Test and tooling helper; the
/// signature segment is a fixed placeholder.
pub fn encode_unsigned(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}
