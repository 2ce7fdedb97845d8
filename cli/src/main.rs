// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MySocial Auth CLI
//!
//! Entry point for the `mysocial-auth` binary. Parses arguments, sets up
//! logging, opens the on-disk credential store, restores whatever session
//! it holds, and runs one subcommand against it.
//!
//! - `login`      sign in with a Google ID token
//! - `login-url`  print a Google sign-in URL
//! - `import`     import a mnemonic or raw key
//! - `generate`   create a new wallet
//! - `status`     show the active wallet
//! - `profile`    look up the social profile
//! - `sign`       sign a message
//! - `sign-out`   sign out and wipe local state
//! - `version`    print build version information

mod cli;
mod logging;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;

use mysocial_auth::credential::CredentialOrigin;
use mysocial_auth::identity::{extract_id_token, google_sign_in_url};
use mysocial_auth::{AuthSession, DerivedCredential, SledStore, WelcomeOutcome};

use cli::{AuthCli, Commands, GlobalArgs, ImportSource};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AuthCli::parse();
    logging::init_logging("mysocial_auth=info", cli.global.log_format);

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::LoginUrl(args) => {
            let nonce = uuid::Uuid::new_v4().simple().to_string();
            let url = google_sign_in_url(&args.client_id, &args.redirect_uri, &nonce)
                .context("cannot build sign-in URL")?;
            println!("{url}");
            Ok(())
        }
        command => {
            let session = open_session(&cli.global).await?;
            run(command, &session).await
        }
    }
}

/// Opens the sled store under the data directory and restores its session.
async fn open_session(global: &GlobalArgs) -> Result<AuthSession> {
    let db_path = global.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory: {}", db_path.display()))?;

    let store = SledStore::open(&db_path)
        .with_context(|| format!("failed to open credential store at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "credential store opened");

    let session = AuthSession::builder(global.auth_config(), Arc::new(store))
        .with_http_defaults()
        .build()
        .context("invalid configuration")?;
    session
        .restore()
        .await
        .context("failed to restore saved credentials")?;
    Ok(session)
}

async fn run(command: Commands, session: &AuthSession) -> Result<()> {
    match command {
        Commands::Login(args) => {
            let token = match (args.id_token, args.callback_url) {
                (Some(token), _) => token,
                (None, Some(url)) => extract_id_token(&url)
                    .ok_or_else(|| anyhow!("no id_token in callback URL"))?,
                (None, None) => return Err(anyhow!("an ID token or callback URL is required")),
            };
            let credential = session
                .sign_in_with_identity(&token)
                .await
                .context("sign-in failed")?;
            print_credential("Signed in with Google.", &credential);

            if !args.no_welcome {
                match session.send_welcome_if_needed().await {
                    Ok(WelcomeOutcome::Delivered(report) | WelcomeOutcome::Failed(report)) => {
                        println!("  Welcome        : {}", report.message());
                    }
                    Ok(outcome) => tracing::debug!(?outcome, "no welcome email sent"),
                    Err(e) => tracing::warn!(error = %e, "welcome email skipped"),
                }
            }
            show_profile(session).await
        }
        Commands::Import(args) => {
            let credential = match args.source {
                ImportSource::Mnemonic { phrase, path } => {
                    session.import_mnemonic(&phrase, path.as_deref())
                }
                ImportSource::Key { key } => session.import_private_key(&key),
            }
            .context("import failed")?;
            print_credential("Wallet imported.", &credential);
            Ok(())
        }
        Commands::Generate => {
            let credential = session.generate_wallet().context("wallet generation failed")?;
            print_credential("Wallet generated.", &credential);
            if let CredentialOrigin::Mnemonic { phrase, .. } = &credential.origin {
                println!();
                println!("Write this phrase down. It is not shown again:");
                println!("  {}", phrase.as_str());
            }
            Ok(())
        }
        Commands::Status(args) => {
            print_status(session, args.json);
            Ok(())
        }
        Commands::Profile => show_profile(session).await,
        Commands::Sign(args) => {
            let signature = session
                .sign_message(args.message.as_bytes())
                .context("cannot sign")?;
            let keypair = session
                .keypair()
                .ok_or_else(|| anyhow!("no active wallet"))?;
            println!("  Signature      : {}", signature.to_base64());
            println!("  Public key     : {}", keypair.public_key().to_base64());
            Ok(())
        }
        Commands::SignOut => {
            let report = session.sign_out().context("sign-out failed")?;
            match report.method {
                Some(method) => {
                    println!("Signed out ({method}).");
                    println!("  Keys removed   : {}", report.keys_removed);
                    if let Some(address) = session.address() {
                        println!("  Still active   : {address}");
                    }
                }
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Commands::LoginUrl(_) | Commands::Version => Ok(()),
    }
}

fn print_credential(headline: &str, credential: &DerivedCredential) {
    println!("{headline}");
    println!("  Address        : {}", credential.address);
    println!("  Public key     : {}", credential.keypair.public_key().to_base64());
}

async fn show_profile(session: &AuthSession) -> Result<()> {
    match session.refresh_profile().await.context("profile lookup failed")? {
        Some(profile) => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        None => {
            println!("No MySocial profile for this wallet yet.");
            if let Some(draft) = session.profile_draft() {
                println!("Suggested profile:");
                println!("{}", serde_json::to_string_pretty(&draft)?);
            }
        }
    }
    Ok(())
}

fn print_status(session: &AuthSession, json: bool) {
    let method = session.auth_method();
    let address = session.address();
    let user = session.user_info();

    if json {
        let status = serde_json::json!({
            "authenticated": method.is_some(),
            "method": method,
            "address": address.map(|a| a.to_string()),
            "email": user.as_ref().and_then(|u| u.email.clone()),
            "name": user.as_ref().and_then(|u| u.name.clone()),
        });
        println!("{status}");
        return;
    }

    match (method, address) {
        (Some(method), Some(address)) => {
            println!("Signed in.");
            println!("  Method         : {method}");
            println!("  Address        : {address}");
            if let Some(email) = user.and_then(|u| u.email) {
                println!("  Email          : {email}");
            }
        }
        _ => println!("Not signed in."),
    }
}

fn print_version() {
    println!("mysocial-auth {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", rustc_version());
}

fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
