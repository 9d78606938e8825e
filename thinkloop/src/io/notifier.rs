//! Cycle notifications.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::io::http::{self, snippet};

/// ntfy priority levels used by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Default,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: Priority,
}

pub trait Notifier {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Publish and log (never propagate) any failure.
pub fn notify_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    match notifier.notify(notification) {
        Ok(()) => debug!(title = %notification.title, "notification sent"),
        Err(err) => warn!(error = %format!("{err:#}"), "notification failed"),
    }
}

/// `POST {server}/{topic}` with `Title` and `Priority` headers.
pub struct NtfyNotifier {
    http: Client,
    url: String,
}

impl NtfyNotifier {
    pub fn new(server: &str, topic: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            url: format!("{}/{topic}", server.trim_end_matches('/')),
        })
    }
}

impl Notifier for NtfyNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .header("Title", header_safe(&notification.title))
            .header("Priority", notification.priority.as_str())
            .body(notification.body.clone())
            .send()
            .context("publish notification")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("ntfy publish returned {status}: {}", snippet(&body, 200)));
        }
        Ok(())
    }
}

/// Used when notifications are disabled.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        debug!(title = %notification.title, "notifier disabled");
        Ok(())
    }
}

/// Header values must be visible ASCII on one line.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}
