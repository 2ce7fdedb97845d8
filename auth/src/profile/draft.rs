//! Pre-filled profile data for a new identity user.

use serde::{Deserialize, Serialize};

use crate::identity::{MysAddress, UserInfo};

const MAX_USERNAME_LEN: usize = 20;
const FALLBACK_USERNAME: &str = "user";
const FALLBACK_DISPLAY_NAME: &str = "User";

/// Suggested values for the profile-creation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    pub address: MysAddress,
    pub username: Option<String>,
    pub display_name: String,
    pub bio: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

impl ProfileDraft {
    /// Draft from the identity provider's profile claims.
    ///
    /// The username comes from the email's local part, else the full name.
    pub fn from_user_info(address: MysAddress, info: &UserInfo) -> Self {
        let display_name = info
            .name
            .clone()
            .or_else(|| info.given_name.clone())
            .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string());

        let bio = format!(
            "Welcome to MySocial! I'm {} to be here.",
            info.given_name.as_deref().unwrap_or("excited")
        );

        let username = match (&info.email, &info.name) {
            (Some(email), _) => Some(suggest_username(email.split('@').next().unwrap_or(""))),
            (None, Some(name)) => Some(suggest_username(name)),
            (None, None) => None,
        };

        Self {
            address,
            username,
            display_name,
            bio,
            email: info.email.clone(),
            avatar: info.picture.clone(),
        }
    }
}

/// Lowercase ASCII alphanumerics, at most 20 of them, no leading digits.
/// Falls back to `user` when nothing survives.
pub fn suggest_username(input: &str) -> String {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(MAX_USERNAME_LEN)
        .collect();
    match cleaned.trim_start_matches(|c: char| c.is_ascii_digit()) {
        "" => FALLBACK_USERNAME.to_string(),
        name => name.to_string(),
    }
}
