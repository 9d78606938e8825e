//! Defensive parsing of free-text oracle replies.
//!
//! A reply may carry a structured block, either fenced (```` ```json ````,
//! ```` ```actions ````) or as a bare JSON object. Anything that does not parse
//! degrades to [`Reply::PlainThought`]; this module never returns an error.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::core::types::ProposedAction;

/// Score recorded when the reply does not provide one.
pub const DEFAULT_SCORE: u8 = 5;

static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|actions)?[ \t]*\r?\n(.*?)```").expect("fenced block regex")
});
static OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("object regex"));

/// Parsed oracle reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Structured(StructuredReply),
    PlainThought(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredReply {
    pub thought: String,
    /// Self-assessed quality (1..=10) when the model provided one.
    pub score: Option<u8>,
    /// Clamped to 0..=10; 0 when absent.
    pub confidence: u8,
    pub actions: Vec<ProposedAction>,
}

impl Reply {
    pub fn thought(&self) -> &str {
        match self {
            Reply::Structured(reply) => &reply.thought,
            Reply::PlainThought(text) => text,
        }
    }

    pub fn confidence(&self) -> u8 {
        match self {
            Reply::Structured(reply) => reply.confidence,
            Reply::PlainThought(_) => 0,
        }
    }

    pub fn actions(&self) -> &[ProposedAction] {
        match self {
            Reply::Structured(reply) => &reply.actions,
            Reply::PlainThought(_) => &[],
        }
    }

    /// Score in 1..=10: explicit score, else confidence, else [`DEFAULT_SCORE`].
    pub fn score(&self) -> u8 {
        match self {
            Reply::Structured(reply) => match reply.score {
                Some(score) => score,
                None if reply.confidence >= 1 => reply.confidence,
                None => DEFAULT_SCORE,
            },
            Reply::PlainThought(_) => DEFAULT_SCORE,
        }
    }
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default, alias = "quality_score")]
    score: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    actions: Option<Value>,
}

/// Parse a reply. Never fails; malformed blocks yield `PlainThought`.
pub fn parse_reply(raw: &str) -> Reply {
    let trimmed = raw.trim();

    for caps in FENCED_RE.captures_iter(trimmed) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(parsed) = parse_block(body.as_str()) {
            let prose = format!("{}{}", &trimmed[..whole.start()], &trimmed[whole.end()..]);
            return Reply::Structured(finish(parsed, prose.trim(), trimmed));
        }
    }

    if let Some(found) = OBJECT_RE.find(trimmed) {
        if let Some(parsed) = parse_block(found.as_str()) {
            let prose = format!("{}{}", &trimmed[..found.start()], &trimmed[found.end()..]);
            return Reply::Structured(finish(parsed, prose.trim(), trimmed));
        }
    }

    Reply::PlainThought(trimmed.to_string())
}

fn parse_block(body: &str) -> Option<RawReply> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn finish(parsed: RawReply, prose: &str, raw: &str) -> StructuredReply {
    let thought = parsed
        .thought
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| (!prose.is_empty()).then(|| prose.to_string()))
        .unwrap_or_else(|| raw.to_string());
    let actions = match parsed.actions {
        Some(Value::Array(items)) => items.iter().map(parse_action).collect(),
        _ => Vec::new(),
    };
    StructuredReply {
        thought,
        score: parsed
            .score
            .as_ref()
            .and_then(as_integer)
            .map(|s| s.clamp(1, 10) as u8),
        confidence: parsed
            .confidence
            .as_ref()
            .and_then(as_integer)
            .map(|c| c.clamp(0, 10) as u8)
            .unwrap_or(0),
        actions,
    }
}

/// Accept integers, floats and numeric strings.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn field<'a>(item: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| item.get(*name).and_then(Value::as_str))
}

fn parse_action(item: &Value) -> ProposedAction {
    let kind = field(item, &["type", "kind"]).unwrap_or_default().trim();
    match kind.to_ascii_lowercase().replace('_', "-").as_str() {
        "file-create-or-update" | "write-file" | "file-write" | "create-or-update-file" => {
            let Some(path) = field(item, &["path"]) else {
                return ProposedAction::Unknown {
                    kind: format!("{kind} (missing path)"),
                };
            };
            let content = field(item, &["content"]).unwrap_or_default();
            let message = field(item, &["message"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("thinkloop: update {path}"));
            ProposedAction::WriteFile {
                path: path.to_string(),
                content: content.to_string(),
                message,
            }
        }
        "issue-comment" | "comment" => {
            let issue = item
                .get("issue")
                .or_else(|| item.get("path"))
                .and_then(as_integer)
                .filter(|n| *n > 0);
            let Some(issue) = issue else {
                return ProposedAction::Unknown {
                    kind: format!("{kind} (missing issue)"),
                };
            };
            let body = field(item, &["content", "body", "message"]).unwrap_or_default();
            ProposedAction::Comment {
                issue: issue as u64,
                body: body.to_string(),
            }
        }
        "" => ProposedAction::Unknown {
            kind: "missing type".to_string(),
        },
        _ => ProposedAction::Unknown {
            kind: kind.to_string(),
        },
    }
}
