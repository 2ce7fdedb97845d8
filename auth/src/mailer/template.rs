//! The welcome email, as plain text and minimal HTML.

use chrono::Datelike;
use reqwest::Url;

const SUBJECT: &str = "Thanks for joining SofiSwap!";
const COMMUNITY_URL: &str = "https://t.me/sofiswap_xyz";
const COMPANY: &str = "The Social Proof Foundation, LLC.";

/// A rendered welcome message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeEmail {
    pub to: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl WelcomeEmail {
    pub fn render(
        to: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        site_url: &str,
    ) -> Self {
        let year = chrono::Utc::now().year();
        let greeting_name = first_name.filter(|n| !n.is_empty());
        let unsubscribe = unsubscribe_url(site_url, to);
        let privacy = format!("{}/privacy", site_url.trim_end_matches('/'));

        let text = format!(
            "Welcome to SofiSwap, {name}!\n\
             \n\
             Thank you for joining SofiSwap. We're thrilled to have you as part of our growing community!\n\
             We're working hard to launch SofiSwap and we'll be in touch with you soon with more details.\n\
             \n\
             Join our community: {COMMUNITY_URL}\n\
             \n\
             Best regards,\n\
             The SofiSwap Team\n\
             \n\
             ---\n\
             This email was sent to {to} because you signed up for SofiSwap.\n\
             Unsubscribe: {unsubscribe}\n\
             Privacy Policy: {privacy}\n\
             \n\
             {COMPANY}\n\
             (c) {year} SofiSwap. All Rights Reserved.\n",
            name = greeting_name.unwrap_or("there"),
        );

        let html = format!(
            "<!DOCTYPE html>\
             <html><head><meta charset=\"utf-8\"><title>Welcome to SofiSwap</title></head>\
             <body style=\"font-family: system-ui, sans-serif; max-width: 600px; margin: 0 auto;\">\
             <h1>SofiSwap</h1>\
             <h2>Hello {name}!</h2>\
             <p>Thank you for joining SofiSwap. We're thrilled to have you as part of our growing community!</p>\
             <p>Join our community on <a href=\"{COMMUNITY_URL}\">Telegram</a>.</p>\
             <p>Best regards,<br><strong>The SofiSwap Team</strong></p>\
             <hr>\
             <p>This email was sent to {to_html} because you signed up for SofiSwap.</p>\
             <p><a href=\"{unsubscribe_html}\">Unsubscribe</a> | <a href=\"{privacy_html}\">Privacy Policy</a></p>\
             <p><strong>{COMPANY}</strong><br>&copy; {year} SofiSwap. All Rights Reserved.</p>\
             </body></html>",
            name = escape_html(greeting_name.unwrap_or("")),
            to_html = escape_html(to),
            unsubscribe_html = escape_html(&unsubscribe),
            privacy_html = escape_html(&privacy),
        );

        Self {
            to: to.to_string(),
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
            subject: SUBJECT.to_string(),
            html,
            text,
        }
    }
}

/// `{site}/unsubscribe?email=..` with the address form-encoded.
fn unsubscribe_url(site_url: &str, email: &str) -> String {
    let base = format!("{}/unsubscribe", site_url.trim_end_matches('/'));
    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("email", email);
            url.into()
        }
        Err(_) => base,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
