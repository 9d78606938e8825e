//! Configuration stored in `thinkloop.toml`.
//!
//! Every table is optional; missing fields take the defaults below. Secrets
//! never live in this file: it only names the environment variables that hold
//! them.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::compactor::CompactionLimits;
use crate::core::policy::{GateLimits, PathPolicy, normalize_path};
use crate::core::state_update::HistoryCaps;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "thinkloop.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ThinkConfig {
    /// Topics rotated across cycles.
    pub missions: Vec<String>,
    pub store: StoreConfig,
    pub oracle: OracleConfig,
    pub limits: LimitsConfig,
    pub policy: PolicyConfig,
    /// Repository that file actions write to. Defaults to the store repository.
    pub actions: ActionsConfig,
    pub channels: ChannelsConfig,
    pub notifier: NotifierConfig,
    pub wake: WakeConfig,
}

/// Location of the memory document (GitHub contents API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub branch: Option<String>,
    /// Environment variable holding the API token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            path: "zenith-memory.json".to_string(),
            branch: None,
            token_env: "GITHUB_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Fixed delay before the single retry.
    pub retry_backoff_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            max_tokens: 600,
            temperature: 0.7,
            timeout_secs: 60,
            retry_backoff_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_thoughts: usize,
    pub max_insights: usize,
    pub max_seen_directives: usize,
    pub max_memory_bytes: usize,
    pub compact_keep_thoughts: usize,
    pub compact_keep_insights: usize,
    pub daily_token_budget: u64,
    pub max_actions: usize,
    pub confidence_floor: u8,
    pub self_modify_floor: u8,
    pub max_content_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_thoughts: 20,
            max_insights: 10,
            max_seen_directives: 50,
            max_memory_bytes: 50 * 1024,
            compact_keep_thoughts: 10,
            compact_keep_insights: 5,
            daily_token_budget: 100_000,
            max_actions: 3,
            confidence_floor: 8,
            self_modify_floor: 10,
            max_content_bytes: 50_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub allowed_paths: Vec<String>,
    pub allowed_prefixes: Vec<String>,
    /// The controller's own source files.
    pub self_paths: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec!["README.md".to_string()],
            allowed_prefixes: vec!["content/".to_string(), "docs/".to_string()],
            self_paths: vec![
                "thinkloop/src/main.rs".to_string(),
                "thinkloop/src/cycle.rs".to_string(),
                "thinkloop.toml".to_string(),
                ".github/workflows/think.yml".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ActionsConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ChannelsConfig {
    pub issues: IssueChannelConfig,
    pub ntfy: NtfyChannelConfig,
}

/// Open issues carrying `label` in the store repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IssueChannelConfig {
    pub enabled: bool,
    pub label: String,
    /// Comment on and close the issue once its cycle has persisted.
    pub close_on_consume: bool,
}

impl Default for IssueChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            label: "directive".to_string(),
            close_on_consume: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NtfyChannelConfig {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
    /// Poll window passed as `since` (e.g. `30m`).
    pub since: String,
    pub timeout_secs: u64,
}

impl Default for NtfyChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "https://ntfy.sh".to_string(),
            topic: String::new(),
            since: "30m".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "https://ntfy.sh".to_string(),
            topic: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WakeConfig {
    /// Optional URL pinged before the cycle (e.g. a sleeping backend).
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

fn default_missions() -> Vec<String> {
    [
        "Cross-check the last thought: agree, challenge, or build on it",
        "Revenue acceleration: the fastest path to a first sale today",
        "Audience analysis: who needs this project and where they gather",
        "Competitive scan: what makes this project distinct",
        "Content remix: take an existing asset and propose a new angle",
        "Growth: one unconventional idea to reach the first ten users",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

impl ThinkConfig {
    /// Defaults with the built-in mission list.
    pub fn with_default_missions() -> Self {
        Self {
            missions: default_missions(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.owner.trim().is_empty() || self.store.repo.trim().is_empty() {
            return Err(anyhow!("store.owner and store.repo must be set"));
        }
        if normalize_path(&self.store.path).is_none() {
            return Err(anyhow!(
                "store.path must be a repository-relative path (got '{}')",
                self.store.path
            ));
        }
        if self.missions.is_empty() {
            return Err(anyhow!("missions must contain at least one topic"));
        }
        if let Some(index) = self.missions.iter().position(|m| m.trim().is_empty()) {
            return Err(anyhow!("missions[{index}] must not be blank"));
        }
        if self.store.timeout_secs == 0 || self.oracle.timeout_secs == 0 {
            return Err(anyhow!("timeouts must be > 0"));
        }
        if self.oracle.max_tokens == 0 {
            return Err(anyhow!("oracle.max_tokens must be > 0"));
        }
        let limits = &self.limits;
        if limits.max_memory_bytes == 0 {
            return Err(anyhow!("limits.max_memory_bytes must be > 0"));
        }
        if limits.max_thoughts == 0 || limits.compact_keep_thoughts > limits.max_thoughts {
            return Err(anyhow!(
                "limits.compact_keep_thoughts must be <= limits.max_thoughts (> 0)"
            ));
        }
        if limits.compact_keep_insights > limits.max_insights {
            return Err(anyhow!(
                "limits.compact_keep_insights must be <= limits.max_insights"
            ));
        }
        if limits.confidence_floor > 10 || limits.self_modify_floor > 10 {
            return Err(anyhow!("confidence floors must be within 0..=10"));
        }
        if limits.self_modify_floor < limits.confidence_floor {
            return Err(anyhow!(
                "limits.self_modify_floor must be >= limits.confidence_floor"
            ));
        }
        if self.notifier.enabled && self.notifier.topic.trim().is_empty() {
            return Err(anyhow!("notifier.topic must be set when the notifier is enabled"));
        }
        if self.channels.ntfy.enabled && self.channels.ntfy.topic.trim().is_empty() {
            return Err(anyhow!(
                "channels.ntfy.topic must be set when the channel is enabled"
            ));
        }
        Ok(())
    }

    pub fn compaction_limits(&self) -> CompactionLimits {
        CompactionLimits {
            max_bytes: self.limits.max_memory_bytes,
            keep_thoughts: self.limits.compact_keep_thoughts,
            keep_insights: self.limits.compact_keep_insights,
            keep_seen_directives: self.limits.max_seen_directives,
        }
    }

    pub fn history_caps(&self) -> HistoryCaps {
        HistoryCaps {
            max_thoughts: self.limits.max_thoughts,
            max_insights: self.limits.max_insights,
            max_seen_directives: self.limits.max_seen_directives,
        }
    }

    pub fn gate_limits(&self) -> GateLimits {
        GateLimits {
            confidence_floor: self.limits.confidence_floor,
            self_modify_floor: self.limits.self_modify_floor,
            max_actions: self.limits.max_actions,
            max_content_bytes: self.limits.max_content_bytes,
        }
    }

    /// Allow-list for file actions. The memory document is always protected
    /// when actions target the store repository.
    pub fn path_policy(&self) -> PathPolicy {
        let protected = if self.actions_share_store_repo() {
            vec![self.store.path.clone()]
        } else {
            Vec::new()
        };
        PathPolicy::new(
            &self.policy.allowed_paths,
            &self.policy.allowed_prefixes,
            &self.policy.self_paths,
            protected,
        )
    }

    pub fn actions_owner(&self) -> &str {
        self.actions.owner.as_deref().unwrap_or(&self.store.owner)
    }

    pub fn actions_repo(&self) -> &str {
        self.actions.repo.as_deref().unwrap_or(&self.store.repo)
    }

    pub fn actions_branch(&self) -> Option<&str> {
        self.actions
            .branch
            .as_deref()
            .or(self.store.branch.as_deref())
    }

    fn actions_share_store_repo(&self) -> bool {
        self.actions_owner() == self.store.owner
            && self.actions_repo() == self.store.repo
            && self.actions_branch() == self.store.branch.as_deref()
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.oracle.retry_backoff_secs)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize config toml")
    }
}

/// Load config from a TOML file.
///
/// A missing file yields the built-in defaults (which still need a store
/// repository, so validation fails until one is configured).
pub fn load_config(path: &Path) -> Result<ThinkConfig> {
    if !path.exists() {
        let cfg = ThinkConfig::with_default_missions();
        cfg.validate()
            .with_context(|| format!("{} not found; built-in defaults", path.display()))?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: ThinkConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    if cfg.missions.is_empty() {
        cfg.missions = default_missions();
    }
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Credentials read from the environment. Never serialized, never logged.
#[derive(Clone)]
pub struct Secrets {
    pub store_token: String,
    pub oracle_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("store_token", &"<redacted>")
            .field("oracle_key", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    pub fn from_env(cfg: &ThinkConfig) -> Result<Self> {
        Self::from_lookup(cfg, |name| std::env::var(name).ok())
    }

    /// Resolve secrets through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(cfg: &ThinkConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| -> Result<String> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("environment variable {name} is not set"))
        };
        Ok(Self {
            store_token: read(&cfg.store.token_env)?,
            oracle_key: read(&cfg.oracle.api_key_env)?,
        })
    }
}
