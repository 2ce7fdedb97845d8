//! # Transactional Email
//!
//! New identity users get one welcome email and a spot on the mailing
//! list. A user who is already on the list has been welcomed before, so
//! finding the contact skips the email and still counts as success.

pub mod resend;
pub mod template;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::AuthError;

pub use resend::ResendClient;
pub use template::WelcomeEmail;

/// Message reported when an existing contact makes the email unnecessary.
pub const ALREADY_WELCOMED: &str = "Welcome email skipped - user already welcomed";

/// Result of adding someone to the mailing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Added { id: Option<String> },
    AlreadyPresent,
    /// Not attempted, with the reason.
    Skipped(String),
    Failed(String),
}

impl ContactOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Added { .. } | Self::AlreadyPresent)
    }
}

/// Result of the welcome email itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WelcomeStatus {
    Sent { message_id: Option<String> },
    /// The contact already existed.
    AlreadyWelcomed,
    Failed(String),
}

/// What [`onboard_user`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingReport {
    pub contact: ContactOutcome,
    pub welcome: WelcomeStatus,
}

impl OnboardingReport {
    /// The email is the goal; the contact list is a nice-to-have.
    pub fn is_success(&self) -> bool {
        !matches!(self.welcome, WelcomeStatus::Failed(_))
    }

    pub fn message(&self) -> String {
        match &self.welcome {
            WelcomeStatus::Sent { .. } => "Welcome email sent successfully!".to_string(),
            WelcomeStatus::AlreadyWelcomed => ALREADY_WELCOMED.to_string(),
            WelcomeStatus::Failed(why) => format!("Failed to send welcome email: {why}"),
        }
    }
}

/// A transactional email provider with a mailing list.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Whether `email` is already on the mailing list.
    async fn contact_exists(&self, email: &str) -> Result<bool, AuthError>;

    /// Add `email` to the mailing list. An existing contact is not an error.
    async fn add_contact(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<ContactOutcome, AuthError>;

    /// Deliver `email`; returns the provider's message id if it gave one.
    async fn send_welcome(&self, email: &WelcomeEmail) -> Result<Option<String>, AuthError>;
}

/// Put a new user on the mailing list and welcome them, once.
///
/// Provider errors are folded into the report rather than returned.
pub async fn onboard_user(
    provider: &dyn EmailProvider,
    email: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    site_url: &str,
) -> OnboardingReport {
    let exists = provider.contact_exists(email).await.unwrap_or_else(|e| {
        // Treat an unreachable list as "not there yet".
        warn!(email = %email, error = %e, "Contact lookup failed");
        false
    });
    if exists {
        debug!(email = %email, "Contact exists, skipping welcome email");
        return OnboardingReport {
            contact: ContactOutcome::AlreadyPresent,
            welcome: WelcomeStatus::AlreadyWelcomed,
        };
    }

    let contact = provider
        .add_contact(email, first_name, last_name)
        .await
        .unwrap_or_else(|e| ContactOutcome::Failed(e.to_string()));
    if !contact.is_success() {
        debug!(email = %email, outcome = ?contact, "Contact list subscription skipped");
    }

    let message = WelcomeEmail::render(email, first_name, last_name, site_url);
    let welcome = match provider.send_welcome(&message).await {
        Ok(message_id) => WelcomeStatus::Sent { message_id },
        Err(e) => WelcomeStatus::Failed(e.to_string()),
    };

    OnboardingReport { contact, welcome }
}
