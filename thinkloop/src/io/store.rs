//! Versioned document storage.
//!
//! The [`DocumentStore`] trait is the only way the controller touches the
//! memory document or action targets. Writes are conditional on the version
//! tag returned by the last read; a mismatch surfaces as
//! [`WriteOutcome::Conflict`] and is never retried here.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::io::github::GitHubClient;
use crate::io::http::snippet;

/// Opaque version identifier issued by the store (a blob sha on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Found { content: String, tag: VersionTag },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed(VersionTag),
    /// The stored version no longer matches the expected tag (or the document
    /// already exists when creation was requested).
    Conflict,
}

pub trait DocumentStore {
    fn read(&self, path: &str) -> Result<ReadOutcome>;

    /// Write `content`. `expected = None` means create-if-absent.
    fn write(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&VersionTag>,
    ) -> Result<WriteOutcome>;
}

/// Files in one repository branch, via the GitHub contents API.
pub struct GitHubContentsStore {
    client: GitHubClient,
    owner: String,
    repo: String,
    branch: Option<String>,
}

#[derive(Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

impl GitHubContentsStore {
    pub fn new(client: GitHubClient, owner: &str, repo: &str, branch: Option<&str>) -> Self {
        Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.map(str::to_string),
        }
    }

    fn url(&self, path: &str) -> String {
        self.client
            .repo_url(&self.owner, &self.repo, &format!("contents/{path}"))
    }
}

impl DocumentStore for GitHubContentsStore {
    #[instrument(skip_all, fields(repo = %self.repo, path = %path))]
    fn read(&self, path: &str) -> Result<ReadOutcome> {
        let mut request = self.client.request(Method::GET, &self.url(path));
        if let Some(branch) = &self.branch {
            request = request.query(&[("ref", branch)]);
        }
        let response = request.send().with_context(|| format!("GET {path}"))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("document not found");
            return Ok(ReadOutcome::NotFound);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("GET {path} returned {status}: {}", snippet(&body, 200)));
        }
        let file: ContentsFile = response
            .json()
            .with_context(|| format!("decode contents response for {path}"))?;
        if file.encoding != "base64" {
            return Err(anyhow!(
                "{path} returned unsupported encoding '{}'",
                file.encoding
            ));
        }
        let content = decode_content(&file.content).with_context(|| format!("decode {path}"))?;
        debug!(bytes = content.len(), sha = %file.sha, "read document");
        Ok(ReadOutcome::Found {
            content,
            tag: VersionTag::new(file.sha),
        })
    }

    #[instrument(skip_all, fields(repo = %self.repo, path = %path, create = expected.is_none()))]
    fn write(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&VersionTag>,
    ) -> Result<WriteOutcome> {
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
        });
        if let Some(tag) = expected {
            body["sha"] = json!(tag.as_str());
        }
        if let Some(branch) = &self.branch {
            body["branch"] = json!(branch);
        }
        let response = self
            .client
            .request(Method::PUT, &self.url(path))
            .json(&body)
            .send()
            .with_context(|| format!("PUT {path}"))?;
        let status = response.status();
        if is_conflict(status, expected.is_none()) {
            debug!(%status, "write rejected as conflict");
            return Ok(WriteOutcome::Conflict);
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("PUT {path} returned {status}: {}", snippet(&text, 200)));
        }
        let put: PutResponse = response
            .json()
            .with_context(|| format!("decode put response for {path}"))?;
        Ok(WriteOutcome::Committed(VersionTag::new(put.content.sha)))
    }
}

/// 409 and 412 mean a stale sha; 422 is returned when creating over an existing file.
fn is_conflict(status: StatusCode, create: bool) -> bool {
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => true,
        StatusCode::UNPROCESSABLE_ENTITY => create,
        _ => false,
    }
}

/// GitHub wraps base64 payloads at 60 columns.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).context("invalid base64")?;
    String::from_utf8(bytes).context("content is not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_base64_decodes() {
        let encoded = STANDARD.encode("{\"thoughts\": []}\n");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(
            decode_content(&wrapped).expect("decode"),
            "{\"thoughts\": []}\n"
        );
    }

    #[test]
    fn conflict_statuses() {
        assert!(is_conflict(StatusCode::CONFLICT, false));
        assert!(is_conflict(StatusCode::UNPROCESSABLE_ENTITY, true));
        assert!(!is_conflict(StatusCode::UNPROCESSABLE_ENTITY, false));
        assert!(!is_conflict(StatusCode::FORBIDDEN, true));
    }
}
