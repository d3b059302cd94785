use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

use crate::config::CONFIG;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(CONFIG.gateway_timeout_seconds.max(1)))
        .build()
        .expect("Failed to build HTTP client")
});

/// Shared client for file downloads, object storage and the generator.
pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}

/// Replaces every configured secret in `text`; error strings from the Bot API
/// client can embed the token through the request URL.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "[REDACTED]"))
}
