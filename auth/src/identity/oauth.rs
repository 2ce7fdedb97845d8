//! Google OAuth implicit flow: the sign-in redirect and the callback.
//!
//! The provider redirects back with `#id_token=...` in the fragment. Some
//! proxies rewrite that into the query string, so both are checked,
//! fragment first.

use reqwest::Url;

use crate::config::GOOGLE_AUTH_ENDPOINT;
use crate::error::AuthError;

/// Build the Google authorization URL requesting an ID token.
///
/// `redirect_uri` must be an absolute URL.
pub fn google_sign_in_url(
    client_id: &str,
    redirect_uri: &str,
    nonce: &str,
) -> Result<String, AuthError> {
    Url::parse(redirect_uri)
        .map_err(|e| AuthError::InvalidUrl(format!("redirect URI {redirect_uri:?}: {e}")))?;
    let url = Url::parse_with_params(
        GOOGLE_AUTH_ENDPOINT,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "id_token"),
            ("scope", "openid profile email"),
            ("nonce", nonce),
        ],
    )
    .map_err(|e| AuthError::InvalidUrl(format!("{GOOGLE_AUTH_ENDPOINT}: {e}")))?;
    Ok(url.into())
}

/// Pull `id_token` out of a callback URL, if present.
pub fn extract_id_token(callback_url: &str) -> Option<String> {
    let url = Url::parse(callback_url).ok()?;
    url.fragment()
        .and_then(|fragment| form_param(fragment, "id_token"))
        .or_else(|| url.query().and_then(|query| form_param(query, "id_token")))
        .filter(|token| !token.is_empty())
}

/// Look up `key` in an `a=b&c=d` string, decoded the way a query string is.
fn form_param(encoded: &str, key: &str) -> Option<String> {
    let url = Url::parse(&format!("http://callback.invalid/?{encoded}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
