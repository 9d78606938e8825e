//! Minimal authenticated GitHub REST client shared by the store and issue channel.

use std::time::Duration;

use anyhow::Result;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};

use crate::io::http;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// `{api_base}/repos/{owner}/{repo}/{suffix}`
    pub fn repo_url(&self, owner: &str, repo: &str, suffix: &str) -> String {
        format!(
            "{}/repos/{owner}/{repo}/{}",
            self.api_base,
            suffix.trim_start_matches('/')
        )
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}
