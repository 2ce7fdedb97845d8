//! # Social Indexer Client
//!
//! Read-only access to `GET {base}/profiles/address/{address}`.
//!
//! The indexer reports a missing profile two ways: a plain 404, or a 200
//! whose body is `{"error": "Profile not found"}`. Both mean "no profile".
//! Any other non-2xx status is a real failure.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::AuthError;
use crate::identity::MysAddress;

/// A profile as served by the indexer. Every field the indexer may omit or
/// null out is optional, and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MySocialProfile {
    pub id: Option<i64>,
    pub owner_address: Option<String>,
    pub profile_id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub profile_photo: Option<String>,
    pub cover_photo: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub followers_count: u64,
    pub following_count: u64,
    pub post_count: u64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub x_username: Option<String>,
    pub github_username: Option<String>,
}

/// Where profiles are looked up.
#[async_trait]
pub trait ProfileIndex: Send + Sync {
    /// The profile for `address`, or `None` if it has none.
    async fn fetch_profile(
        &self,
        address: &MysAddress,
    ) -> Result<Option<MySocialProfile>, AuthError>;

    /// Whether `address` has a profile. Only a plain 200 counts.
    async fn profile_exists(&self, address: &MysAddress) -> Result<bool, AuthError>;
}

/// [`ProfileIndex`] over the indexer's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProfileIndex {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpProfileIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mysocial-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    fn profile_url(&self, address: &MysAddress) -> String {
        format!("{}/profiles/address/{address}", self.base_url)
    }

    async fn get(&self, address: &MysAddress) -> Result<reqwest::Response, AuthError> {
        self.http_client
            .get(self.profile_url(address))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Profile(format!("request failed: {e}")))
    }
}

#[async_trait]
impl ProfileIndex for HttpProfileIndex {
    async fn fetch_profile(
        &self,
        address: &MysAddress,
    ) -> Result<Option<MySocialProfile>, AuthError> {
        let response = self.get(address).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(address = %address, "No profile for address");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Profile(format!("indexer returned {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Profile(format!("malformed response: {e}")))?;

        if let Some(error) = body.get("error") {
            debug!(address = %address, error = %error, "Indexer reported no profile");
            return Ok(None);
        }

        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| AuthError::Profile(format!("unexpected profile shape: {e}")))
    }

    async fn profile_exists(&self, address: &MysAddress) -> Result<bool, AuthError> {
        Ok(self.get(address).await?.status() == StatusCode::OK)
    }
}
