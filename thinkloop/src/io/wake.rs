//! Optional pre-cycle ping for a dependency that sleeps when idle.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::io::http;

pub trait Wake {
    fn wake(&self) -> Result<()>;
}

pub struct HttpWake {
    http: Client,
    url: String,
}

impl HttpWake {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            url: url.to_string(),
        })
    }
}

impl Wake for HttpWake {
    fn wake(&self) -> Result<()> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .with_context(|| format!("GET {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("wake returned {status}"));
        }
        debug!(%status, "dependency awake");
        Ok(())
    }
}

/// Ping the dependency; failures only produce a warning.
pub fn wake_best_effort(wake: &dyn Wake) {
    if let Err(err) = wake.wake() {
        warn!(error = %format!("{err:#}"), "wake request failed");
    }
}
