//! HTTP boundary tests against local mock servers: salt service, social
//! indexer and the email provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mysocial_auth::config::MailerConfig;
use mysocial_auth::credential::{HttpSaltService, SaltService};
use mysocial_auth::crypto::MysKeypair;
use mysocial_auth::identity::assertion::encode_unsigned;
use mysocial_auth::mailer::{
    onboard_user, ContactOutcome, EmailProvider, ResendClient, WelcomeEmail, WelcomeStatus,
    ALREADY_WELCOMED,
};
use mysocial_auth::profile::{HttpProfileIndex, ProfileIndex};
use mysocial_auth::{AuthConfig, AuthError, AuthSession, IdentityAssertion, MemoryStore};

const TIMEOUT: Duration = Duration::from_secs(5);

fn assertion(sub: &str) -> IdentityAssertion {
    IdentityAssertion::decode(&encode_unsigned(&json!({ "sub": sub }))).expect("token")
}

fn resend(server: &MockServer) -> ResendClient {
    let mut config = MailerConfig::new("re_test");
    config.api_url = server.uri();
    config.audience_id = Some("aud-1".into());
    ResendClient::new(config)
}

// ---------------------------------------------------------------------------
// Salt service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn salt_service_posts_raw_token() {
    let server = MockServer::start().await;
    let assertion = assertion("100");
    Mock::given(method("POST"))
        .and(path("/salt"))
        .and(body_json(json!({ "jwt": assertion.raw() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "salt": "8675309" })))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpSaltService::new(format!("{}/salt", server.uri()), TIMEOUT);
    assert_eq!(service.fetch_salt(&assertion).await.unwrap(), "8675309");
}

#[tokio::test]
async fn salt_service_accepts_numeric_salt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "salt": 42 })))
        .mount(&server)
        .await;

    let service = HttpSaltService::new(server.uri(), TIMEOUT);
    assert_eq!(service.fetch_salt(&assertion("1")).await.unwrap(), "42");
}

#[tokio::test]
async fn salt_service_salt_is_used_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "salt": "0xbeef" })))
        .mount(&server)
        .await;

    let service = HttpSaltService::new(server.uri(), TIMEOUT);
    assert_eq!(service.fetch_salt(&assertion("1")).await.unwrap(), "0xbeef");
}

#[tokio::test]
async fn salt_service_errors_are_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/junk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "salt": "" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "salt": null })))
        .mount(&server)
        .await;

    for route in ["down", "junk", "null"] {
        let service = HttpSaltService::new(format!("{}/{route}", server.uri()), TIMEOUT);
        assert!(matches!(
            service.fetch_salt(&assertion("1")).await,
            Err(AuthError::SaltServiceUnavailable(_))
        ));
    }
}

#[tokio::test]
async fn session_asks_salt_service_once_per_subject() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/salt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "salt": "31337" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = AuthConfig {
        salt_service_url: format!("{}/salt", server.uri()),
        ..AuthConfig::default()
    };
    let session = AuthSession::builder(config, Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    let token = encode_unsigned(&json!({ "sub": "2024" }));

    let first = session.sign_in_with_identity(&token).await.unwrap();
    let second = session.sign_in_with_identity(&token).await.unwrap();
    assert_eq!(first.address, second.address);
}

// ---------------------------------------------------------------------------
// Social indexer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn indexer_found_missing_and_failing() {
    let server = MockServer::start().await;
    let found = MysKeypair::from_seed(&[1u8; 32]).address();
    let missing = MysKeypair::from_seed(&[2u8; 32]).address();
    let soft_missing = MysKeypair::from_seed(&[3u8; 32]).address();
    let broken = MysKeypair::from_seed(&[4u8; 32]).address();

    Mock::given(method("GET"))
        .and(path(format!("/profiles/address/{found}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "owner_address": found.to_string(),
            "username": "ada",
            "followers_count": 12
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/profiles/address/{missing}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/profiles/address/{soft_missing}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "Profile not found" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/profiles/address/{broken}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let index = HttpProfileIndex::new(server.uri(), TIMEOUT);

    let profile = index.fetch_profile(&found).await.unwrap().unwrap();
    assert_eq!(profile.username.as_deref(), Some("ada"));
    assert_eq!(profile.followers_count, 12);
    assert!(index.profile_exists(&found).await.unwrap());

    assert_eq!(index.fetch_profile(&missing).await.unwrap(), None);
    assert!(!index.profile_exists(&missing).await.unwrap());

    assert_eq!(index.fetch_profile(&soft_missing).await.unwrap(), None);

    assert!(matches!(
        index.fetch_profile(&broken).await,
        Err(AuthError::Profile(_))
    ));
}

// ---------------------------------------------------------------------------
// Email provider
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resend_contact_lookup_and_upsert() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audiences/aud-1/contacts/known@example.com"))
        .and(header("Authorization", "Bearer re_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c_1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/audiences/aud-1/contacts/new@example.com"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audiences/aud-1/contacts"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "validation_error",
            "message": "Contact already exists"
        })))
        .mount(&server)
        .await;

    let client = resend(&server);
    assert!(client.contact_exists("known@example.com").await.unwrap());
    assert!(!client.contact_exists("new@example.com").await.unwrap());
    assert_eq!(
        client
            .add_contact("known@example.com", Some("Ada"), None)
            .await
            .unwrap(),
        ContactOutcome::AlreadyPresent
    );
}

#[tokio::test]
async fn resend_send_carries_auth_and_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("Authorization", "Bearer re_test"))
        .and(header_exists("Idempotency-Key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email_1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = resend(&server);
    let email = WelcomeEmail::render("ada@example.com", Some("Ada"), None, "https://sofiswap.xyz");
    assert_eq!(
        client.send_welcome(&email).await.unwrap().as_deref(),
        Some("email_1")
    );
}

#[tokio::test]
async fn onboarding_skips_email_for_existing_contact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audiences/aud-1/contacts/known@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c_1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = resend(&server);
    let report = onboard_user(&client, "known@example.com", None, None, "https://sofiswap.xyz").await;
    assert!(report.is_success());
    assert_eq!(report.welcome, WelcomeStatus::AlreadyWelcomed);
    assert_eq!(report.message(), ALREADY_WELCOMED);
}

#[tokio::test]
async fn onboarding_reports_send_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audiences/aud-1/contacts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "c_2" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "domain not verified" })),
        )
        .mount(&server)
        .await;

    let client = resend(&server);
    let report = onboard_user(&client, "new@example.com", Some("Ada"), None, "https://sofiswap.xyz").await;
    assert!(!report.is_success());
    assert_eq!(report.contact, ContactOutcome::Added { id: Some("c_2".into()) });
    assert!(report.message().contains("domain not verified"));
}
