//! Shared blocking HTTP client construction.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

pub const USER_AGENT: &str = concat!("thinkloop/", env!("CARGO_PKG_VERSION"));

/// Blocking client with a per-request timeout.
pub fn client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .user_agent(USER_AGENT)
        .build()
        .context("build http client")
}

/// First `max` characters of a response body, for error messages.
pub fn snippet(body: &str, max: usize) -> String {
    crate::core::text::truncate_chars(body.trim(), max)
}
