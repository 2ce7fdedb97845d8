//! [`EmailProvider`] over the Resend HTTP API.
//!
//! | Call            | Request                                         |
//! |-----------------|-------------------------------------------------|
//! | contact exists  | `GET  /audiences/{audience}/contacts/{email}`   |
//! | add contact     | `POST /audiences/{audience}/contacts`           |
//! | send            | `POST /emails`                                  |
//!
//! All requests carry `Authorization: Bearer {api_key}`.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::template::WelcomeEmail;
use super::{ContactOutcome, EmailProvider};
use crate::config::MailerConfig;
use crate::error::AuthError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct NewContact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    unsubscribed: bool,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ApiReply {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Resend client.
#[derive(Debug, Clone)]
pub struct ResendClient {
    config: MailerConfig,
    http_client: reqwest::Client,
}

impl ResendClient {
    pub fn new(config: MailerConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("mysocial-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// `{api_url}/{segments..}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| AuthError::Email(format!("bad api url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AuthError::Email("api url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn reply(response: reqwest::Response) -> (StatusCode, ApiReply) {
        let status = response.status();
        let reply = response.json::<ApiReply>().await.unwrap_or_default();
        (status, reply)
    }
}

#[async_trait]
impl EmailProvider for ResendClient {
    async fn contact_exists(&self, email: &str) -> Result<bool, AuthError> {
        let Some(audience) = self.config.audience_id.as_deref() else {
            return Ok(false);
        };
        let url = self.endpoint(&["audiences", audience, "contacts", email])?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| AuthError::Email(format!("contact lookup failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(AuthError::Email(format!("contact lookup returned {status}"))),
        }
    }

    async fn add_contact(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<ContactOutcome, AuthError> {
        let Some(audience) = self.config.audience_id.as_deref() else {
            return Ok(ContactOutcome::Skipped("no audience configured".into()));
        };
        let url = self.endpoint(&["audiences", audience, "contacts"])?;
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&NewContact {
                email,
                first_name,
                last_name,
                unsubscribed: false,
            })
            .send()
            .await
            .map_err(|e| AuthError::Email(format!("contact upsert failed: {e}")))?;

        let (status, reply) = Self::reply(response).await;
        if status.is_success() {
            debug!(email = %email, "Contact added to audience");
            return Ok(ContactOutcome::Added { id: reply.id });
        }
        let message = reply.message.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("already exists") {
            return Ok(ContactOutcome::AlreadyPresent);
        }
        Err(AuthError::Email(format!("contact upsert returned {status}: {message}")))
    }

    async fn send_welcome(&self, email: &WelcomeEmail) -> Result<Option<String>, AuthError> {
        let url = self.endpoint(&["emails"])?;
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(&OutgoingEmail {
                from: &self.config.sender,
                to: [&email.to],
                subject: &email.subject,
                html: &email.html,
                text: &email.text,
            })
            .send()
            .await
            .map_err(|e| AuthError::Email(format!("send failed: {e}")))?;

        let (status, reply) = Self::reply(response).await;
        if !status.is_success() {
            return Err(AuthError::Email(format!(
                "send returned {status}: {}",
                reply.message.unwrap_or_default()
            )));
        }
        info!(to = %email.to, message_id = ?reply.id, "Welcome email sent");
        Ok(reply.id)
    }
}
