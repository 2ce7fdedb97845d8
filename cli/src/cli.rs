//! # CLI Interface
//!
//! `clap` derive definitions for the `mysocial-auth` binary. Every global
//! option has an environment fallback, so a deployment can configure the
//! tool entirely through the environment.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use mysocial_auth::config::{
    MailerConfig, DEFAULT_DERIVATION_PATH, DEFAULT_INDEXER_URL, DEFAULT_SALT_SERVICE_URL,
    DEFAULT_SENDER, DEFAULT_SITE_URL, INDEXER_REQUEST_TIMEOUT,
};
use mysocial_auth::AuthConfig;

use crate::logging::LogFormat;

/// MySocial wallet sign-in.
///
/// Derives a MySocial wallet from a Google ID token, a BIP-39 mnemonic or a
/// raw private key, keeps it in a local store, and signs with it.
#[derive(Parser, Debug)]
#[command(
    name = "mysocial-auth",
    about = "MySocial wallet sign-in",
    version,
    propagate_version = true
)]
pub struct AuthCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding the credential store.
    #[arg(
        long,
        short = 'd',
        env = "MYSOCIAL_DATA_DIR",
        default_value = ".mysocial-auth",
        global = true
    )]
    pub data_dir: PathBuf,

    /// Salt service endpoint.
    #[arg(long, env = "MYSOCIAL_SALT_URL", default_value = DEFAULT_SALT_SERVICE_URL, global = true)]
    pub salt_url: String,

    /// Seconds to wait for the salt service before using the local fallback.
    #[arg(long, env = "MYSOCIAL_SALT_TIMEOUT", default_value_t = 15, global = true)]
    pub salt_timeout: u64,

    /// Social indexer base URL.
    #[arg(long, env = "MYSOCIAL_INDEXER_URL", default_value = DEFAULT_INDEXER_URL, global = true)]
    pub indexer_url: String,

    /// Derivation path for mnemonic imports and generated wallets.
    #[arg(
        long,
        env = "MYSOCIAL_DERIVATION_PATH",
        default_value = DEFAULT_DERIVATION_PATH,
        global = true
    )]
    pub derivation_path: String,

    /// Log output format.
    #[arg(long, value_enum, env = "MYSOCIAL_LOG_FORMAT", default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Email provider API key. Welcome emails are off without it.
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true, global = true)]
    pub resend_api_key: Option<String>,

    /// Mailing-list audience for new users.
    #[arg(long, env = "RESEND_AUDIENCE_ID", global = true)]
    pub resend_audience_id: Option<String>,

    /// Sender address for welcome emails.
    #[arg(long, env = "MYSOCIAL_EMAIL_SENDER", default_value = DEFAULT_SENDER, global = true)]
    pub email_sender: String,

    /// Public site used for links in emails.
    #[arg(long, env = "MYSOCIAL_SITE_URL", default_value = DEFAULT_SITE_URL, global = true)]
    pub site_url: String,
}

impl GlobalArgs {
    pub fn auth_config(&self) -> AuthConfig {
        let mailer = self.resend_api_key.as_ref().map(|key| MailerConfig {
            audience_id: self.resend_audience_id.clone(),
            sender: self.email_sender.clone(),
            site_url: self.site_url.clone(),
            ..MailerConfig::new(key.clone())
        });
        AuthConfig {
            salt_service_url: self.salt_url.clone(),
            salt_timeout: Duration::from_secs(self.salt_timeout),
            indexer_url: self.indexer_url.clone(),
            indexer_timeout: INDEXER_REQUEST_TIMEOUT,
            derivation_path: self.derivation_path.clone(),
            mailer,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with a Google ID token.
    Login(LoginArgs),
    /// Print a Google sign-in URL whose callback carries an ID token.
    LoginUrl(LoginUrlArgs),
    /// Import an existing wallet.
    Import(ImportArgs),
    /// Create a new 12-word wallet and import it.
    Generate,
    /// Show the active wallet.
    Status(StatusArgs),
    /// Look up the active wallet's social profile.
    Profile,
    /// Sign a UTF-8 message with the active wallet.
    Sign(SignArgs),
    /// Sign out of the active wallet and wipe its local state.
    SignOut,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `login` subcommand.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Raw Google ID token.
    #[arg(
        long,
        env = "MYSOCIAL_ID_TOKEN",
        hide_env_values = true,
        conflicts_with = "callback_url",
        required_unless_present = "callback_url"
    )]
    pub id_token: Option<String>,

    /// Full callback URL the sign-in redirect landed on.
    #[arg(long)]
    pub callback_url: Option<String>,

    /// Do not send the welcome email.
    #[arg(long)]
    pub no_welcome: bool,
}

/// Arguments for the `login-url` subcommand.
#[derive(Args, Debug)]
pub struct LoginUrlArgs {
    /// OAuth client id.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub client_id: String,

    /// Redirect URI registered for the client.
    #[arg(long, env = "GOOGLE_REDIRECT_URI", default_value = "http://localhost:3000/auth/callback")]
    pub redirect_uri: String,
}

/// Arguments for the `import` subcommand.
#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(subcommand)]
    pub source: ImportSource,
}

/// What to import.
#[derive(Subcommand, Debug)]
pub enum ImportSource {
    /// A 12 to 24 word BIP-39 phrase.
    Mnemonic {
        /// The phrase. Prefer the environment variable over the flag.
        #[arg(long, env = "MYSOCIAL_MNEMONIC", hide_env_values = true)]
        phrase: String,

        /// Derivation path; defaults to the global one.
        #[arg(long)]
        path: Option<String>,
    },
    /// A 32-byte secret key, `0x` hex or comma-separated decimal bytes.
    Key {
        #[arg(long, env = "MYSOCIAL_PRIVATE_KEY", hide_env_values = true)]
        key: String,
    },
}

/// Arguments for the `status` subcommand.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `sign` subcommand.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// Message to sign.
    pub message: String,
}
