//! Operator command channels.
//!
//! Channels are polled once per cycle. Polling failures are logged and
//! treated as "no directives"; they never fail the cycle.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Method;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::core::types::{Directive, DirectiveSource};
use crate::io::github::GitHubClient;
use crate::io::http::{self, snippet};

/// Issues fetched per poll.
const ISSUE_PAGE_SIZE: u32 = 20;

pub trait CommandChannel {
    fn name(&self) -> &str;

    /// Pending directives, oldest first.
    fn poll(&self) -> Result<Vec<Directive>>;
}

/// Write access to the issue tracker used for comments and directive resolution.
pub trait IssueTracker {
    fn comment(&self, issue: u64, body: &str) -> Result<()>;
    fn close(&self, issue: u64) -> Result<()>;
}

/// Poll every channel in order, skipping channels that fail.
pub fn ingest(channels: &[&dyn CommandChannel]) -> Vec<Directive> {
    let mut directives = Vec::new();
    for channel in channels {
        match channel.poll() {
            Ok(found) => {
                debug!(channel = channel.name(), count = found.len(), "polled channel");
                directives.extend(found);
            }
            Err(err) => warn!(channel = channel.name(), error = %format!("{err:#}"), "channel poll failed"),
        }
    }
    directives
}

/// Acknowledge a consumed directive. Only issue directives can be resolved;
/// failures are logged.
pub fn resolve_directive(issues: Option<&dyn IssueTracker>, directive: &Directive, note: &str) {
    let (Some(issues), DirectiveSource::Issue { number }) = (issues, &directive.source) else {
        return;
    };
    if let Err(err) = issues.comment(*number, note) {
        warn!(issue = number, error = %format!("{err:#}"), "failed to comment on directive issue");
        return;
    }
    if let Err(err) = issues.close(*number) {
        warn!(issue = number, error = %format!("{err:#}"), "failed to close directive issue");
    }
}

/// Open issues carrying a label, via the GitHub REST API.
pub struct GitHubIssues {
    client: GitHubClient,
    owner: String,
    repo: String,
    label: String,
}

#[derive(Deserialize)]
struct IssueItem {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GitHubIssues {
    pub fn new(client: GitHubClient, owner: &str, repo: &str, label: &str) -> Self {
        Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            label: label.to_string(),
        }
    }

    fn issue_url(&self, suffix: &str) -> String {
        self.client.repo_url(&self.owner, &self.repo, suffix)
    }

    fn send_ok(&self, request: reqwest::blocking::RequestBuilder, what: &str) -> Result<()> {
        let response = request.send().with_context(|| what.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("{what} returned {status}: {}", snippet(&body, 200)));
        }
        Ok(())
    }
}

impl CommandChannel for GitHubIssues {
    fn name(&self) -> &str {
        "issues"
    }

    #[instrument(skip_all, fields(repo = %self.repo, label = %self.label))]
    fn poll(&self) -> Result<Vec<Directive>> {
        let per_page = ISSUE_PAGE_SIZE.to_string();
        let response = self
            .client
            .request(Method::GET, &self.issue_url("issues"))
            .query(&[
                ("state", "open"),
                ("labels", self.label.as_str()),
                ("sort", "created"),
                ("direction", "asc"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .context("list directive issues")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("list issues returned {status}: {}", snippet(&body, 200)));
        }
        let items: Vec<IssueItem> = response.json().context("decode issue list")?;
        Ok(items
            .into_iter()
            .filter(|item| item.pull_request.is_none())
            .map(|item| Directive {
                source: DirectiveSource::Issue {
                    number: item.number,
                },
                title: item.title,
                body: item.body.unwrap_or_default(),
            })
            .collect())
    }
}

impl IssueTracker for GitHubIssues {
    fn comment(&self, issue: u64, body: &str) -> Result<()> {
        let request = self
            .client
            .request(Method::POST, &self.issue_url(&format!("issues/{issue}/comments")))
            .json(&json!({ "body": body }));
        self.send_ok(request, &format!("comment on issue #{issue}"))
    }

    fn close(&self, issue: u64) -> Result<()> {
        let request = self
            .client
            .request(Method::PATCH, &self.issue_url(&format!("issues/{issue}")))
            .json(&json!({ "state": "closed" }));
        self.send_ok(request, &format!("close issue #{issue}"))
    }
}

/// Messages published to an ntfy topic, polled without holding a connection.
pub struct NtfyTopic {
    http: Client,
    url: String,
    since: String,
}

#[derive(Deserialize)]
struct NtfyEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl NtfyTopic {
    pub fn new(server: &str, topic: &str, since: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            url: format!("{}/{topic}/json", server.trim_end_matches('/')),
            since: since.to_string(),
        })
    }
}

impl CommandChannel for NtfyTopic {
    fn name(&self) -> &str {
        "ntfy"
    }

    #[instrument(skip_all, fields(since = %self.since))]
    fn poll(&self) -> Result<Vec<Directive>> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("poll", "1"), ("since", self.since.as_str())])
            .send()
            .context("poll ntfy topic")?;
        let status = response.status();
        let body = response.text().context("read ntfy poll body")?;
        if !status.is_success() {
            return Err(anyhow!("ntfy poll returned {status}: {}", snippet(&body, 200)));
        }
        Ok(parse_ntfy_stream(&body))
    }
}

/// Parse newline-delimited ntfy events, keeping `message` events in order.
fn parse_ntfy_stream(body: &str) -> Vec<Directive> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<NtfyEvent>(line) {
            Ok(event) => Some(event),
            Err(err) => {
                debug!(error = %err, "skipping malformed ntfy line");
                None
            }
        })
        .filter(|event| event.event == "message" && !event.id.is_empty())
        .filter_map(|event| {
            let message = event.message.unwrap_or_default();
            let title = event
                .title
                .filter(|t| !t.trim().is_empty())
                .or_else(|| message.lines().next().map(str::to_string))?;
            Some(Directive {
                source: DirectiveSource::Ntfy {
                    message_id: event.id,
                },
                title: title.trim().to_string(),
                body: message,
            })
        })
        .collect()
}
