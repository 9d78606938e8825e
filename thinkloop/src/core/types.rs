//! Persisted memory document and the transient records produced by a cycle.
//!
//! These types define the JSON contract of the shared memory document. Unknown
//! top-level fields are carried in [`MemoryDocument::extra`] so that other
//! writers of the same document keep their data.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version written by this crate.
pub const DOCUMENT_VERSION: &str = "10.0.0";
/// Value stored in `sync_source` after every successful write.
pub const SYNC_SOURCE: &str = "thinkloop";

/// Rolling memory shared across cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default = "default_version")]
    pub version: String,
    /// Number of cycles that reached the memory document (monotonic).
    #[serde(default)]
    pub cycle_count: u64,
    /// Thought entries evicted by caps or compaction since the document was created.
    #[serde(default)]
    pub compacted_count: u64,
    /// Chronological thought history, oldest first.
    #[serde(default)]
    pub thoughts: Vec<ThoughtEntry>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<BudgetRecord>,
    /// Directive ids already consumed, oldest first.
    #[serde(default)]
    pub seen_directives: Vec<String>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            cycle_count: 0,
            compacted_count: 0,
            thoughts: Vec::new(),
            insights: Vec::new(),
            token_budget: None,
            seen_directives: Vec::new(),
            last_sync: None,
            sync_source: None,
            extra: Map::new(),
        }
    }
}

impl MemoryDocument {
    /// Total number of thought entries ever recorded, including evicted ones.
    pub fn history_length(&self) -> u64 {
        self.compacted_count + self.thoughts.len() as u64
    }

    pub fn last_thought(&self) -> Option<&ThoughtEntry> {
        self.thoughts.last()
    }

    /// Serialize exactly as the document is persisted (pretty JSON, trailing newline).
    pub fn to_json(&self) -> Result<String> {
        let mut buf = serde_json::to_string_pretty(self).context("serialize memory document")?;
        buf.push('\n');
        Ok(buf)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("parse memory document")
    }

    /// Size in bytes of the persisted representation.
    pub fn serialized_len(&self) -> Result<usize> {
        Ok(self.to_json()?.len())
    }
}

/// How a thought entry came to be recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtSource {
    #[default]
    Mission,
    Directive,
    Resting,
}

/// One recorded cycle. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cycle: u64,
    #[serde(default, alias = "domain")]
    pub topic: String,
    #[serde(default)]
    pub source: ThoughtSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive_id: Option<String>,
    #[serde(default)]
    pub thought: String,
    #[serde(default = "default_score", alias = "quality_score")]
    pub score: u8,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRecord>,
}

fn default_score() -> u8 {
    5
}

/// High-scoring thought kept separately from the rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cycle: u64,
    pub insight: String,
}

/// Date-scoped token consumption counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub date: NaiveDate,
    pub tokens_used: u64,
}

/// Action vocabulary understood by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "file-create-or-update")]
    FileCreateOrUpdate,
    #[serde(rename = "issue-comment")]
    IssueComment,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::FileCreateOrUpdate => "file-create-or-update",
            ActionKind::IssueComment => "issue-comment",
            ActionKind::Unknown => "unknown",
        }
    }
}

/// Result of one proposed action. Every proposed action gets exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Ok,
    Failed,
    BlockedConfidence,
    BlockedPath,
    BlockedSize,
    /// Beyond the per-cycle action cap.
    BlockedLimit,
}

impl ActionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionOutcome::Ok => "ok",
            ActionOutcome::Failed => "failed",
            ActionOutcome::BlockedConfidence => "blocked_confidence",
            ActionOutcome::BlockedPath => "blocked_path",
            ActionOutcome::BlockedSize => "blocked_size",
            ActionOutcome::BlockedLimit => "blocked_limit",
        }
    }
}

/// Audit record of one action, persisted inside its thought entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub target: String,
    pub outcome: ActionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An action proposed by the model for this cycle only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedAction {
    WriteFile {
        path: String,
        content: String,
        message: String,
    },
    Comment {
        issue: u64,
        body: String,
    },
    /// Anything the parser could not map onto the vocabulary.
    Unknown { kind: String },
}

impl ProposedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ProposedAction::WriteFile { .. } => ActionKind::FileCreateOrUpdate,
            ProposedAction::Comment { .. } => ActionKind::IssueComment,
            ProposedAction::Unknown { .. } => ActionKind::Unknown,
        }
    }

    /// Human-readable target used in records and notifications.
    pub fn target(&self) -> String {
        match self {
            ProposedAction::WriteFile { path, .. } => path.clone(),
            ProposedAction::Comment { issue, .. } => format!("#{issue}"),
            ProposedAction::Unknown { kind } => kind.clone(),
        }
    }

    /// Payload size in bytes, checked against the content ceiling.
    pub fn payload_len(&self) -> usize {
        match self {
            ProposedAction::WriteFile { content, .. } => content.len(),
            ProposedAction::Comment { body, .. } => body.len(),
            ProposedAction::Unknown { .. } => 0,
        }
    }

    pub fn record(&self, outcome: ActionOutcome, detail: Option<String>) -> ActionRecord {
        ActionRecord {
            kind: self.kind(),
            target: self.target(),
            outcome,
            detail,
        }
    }
}

/// Where an operator directive came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveSource {
    Issue { number: u64 },
    Ntfy { message_id: String },
}

/// Operator instruction that overrides mission rotation for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub source: DirectiveSource,
    pub title: String,
    pub body: String,
}

impl Directive {
    /// Channel-qualified id, stable across polls.
    pub fn id(&self) -> String {
        match &self.source {
            DirectiveSource::Issue { number } => format!("issue:{number}"),
            DirectiveSource::Ntfy { message_id } => format!("ntfy:{message_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_top_level_fields_survive_a_round_trip() {
        let raw = r#"{"version":"9.0.0","identity":{"name":"ZENITH"},"thoughts":[]}"#;
        let doc = MemoryDocument::from_json(raw).expect("parse");
        assert_eq!(doc.version, "9.0.0");
        assert!(doc.extra.contains_key("identity"));

        let reparsed = MemoryDocument::from_json(&doc.to_json().expect("json")).expect("reparse");
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn legacy_thought_fields_are_accepted() {
        let raw = r#"{"thoughts":[{"timestamp":"2026-01-01T00:00:00Z","thought":"t","domain":"revenue","quality_score":7,"cycle":3}]}"#;
        let doc = MemoryDocument::from_json(raw).expect("parse");
        let entry = &doc.thoughts[0];
        assert_eq!(entry.topic, "revenue");
        assert_eq!(entry.score, 7);
        assert_eq!(entry.source, ThoughtSource::Mission);
    }

    #[test]
    fn outcomes_serialize_as_snake_case() {
        let json = serde_json::to_string(&ActionOutcome::BlockedConfidence).expect("json");
        assert_eq!(json, "\"blocked_confidence\"");
        let json = serde_json::to_string(&ActionKind::FileCreateOrUpdate).expect("json");
        assert_eq!(json, "\"file-create-or-update\"");
    }

    #[test]
    fn history_length_counts_evicted_entries() {
        let doc = MemoryDocument {
            compacted_count: 12,
            ..MemoryDocument::default()
        };
        assert_eq!(doc.history_length(), 12);
    }
}
