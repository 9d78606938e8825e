//! Path allow-list and action gating.
//!
//! Gating is evaluated once per cycle, before any side effect, so the
//! executor only ever sees actions that already carry a verdict.

use std::collections::BTreeSet;

use crate::core::types::{ActionOutcome, ProposedAction};

/// Typed allow-list for file actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPolicy {
    exact: BTreeSet<String>,
    /// Directory prefixes, always stored with a trailing `/`.
    prefixes: Vec<String>,
    /// The controller's own source files; writable only above the self-modify floor.
    self_paths: BTreeSet<String>,
    /// Never writable (e.g. the memory document itself).
    protected: BTreeSet<String>,
}

/// How a path relates to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Denied,
    Allowed,
    SelfPath,
}

impl PathPolicy {
    pub fn new<I, P, S, X>(exact: I, prefixes: P, self_paths: S, protected: X) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
        X: IntoIterator,
        X::Item: AsRef<str>,
    {
        Self {
            exact: normalized_set(exact),
            prefixes: prefixes
                .into_iter()
                .filter_map(|p| normalize_path(p.as_ref().trim_end_matches('/')))
                .map(|p| format!("{p}/"))
                .collect(),
            self_paths: normalized_set(self_paths),
            protected: normalized_set(protected),
        }
    }

    pub fn classify(&self, path: &str) -> PathClass {
        let Some(path) = normalize_path(path) else {
            return PathClass::Denied;
        };
        if self.protected.contains(&path) {
            return PathClass::Denied;
        }
        if self.self_paths.contains(&path) {
            return PathClass::SelfPath;
        }
        if self.exact.contains(&path) || self.prefixes.iter().any(|p| path.starts_with(p)) {
            return PathClass::Allowed;
        }
        PathClass::Denied
    }
}

fn normalized_set<I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .filter_map(|item| normalize_path(item.as_ref()))
        .collect()
}

/// Canonical repository-relative form of `path`, or `None` if it may escape the repo.
///
/// Rejects absolute paths, `..` segments, backslashes, empty input and NUL.
/// `.` segments and repeated slashes are dropped.
pub fn normalize_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return None;
    }
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Numeric limits applied while gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    pub confidence_floor: u8,
    pub self_modify_floor: u8,
    pub max_actions: usize,
    pub max_content_bytes: usize,
}

/// Gating decision for one proposed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    /// Rejected before any side effect.
    Block {
        outcome: ActionOutcome,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedAction {
    pub action: ProposedAction,
    pub verdict: Verdict,
}

/// Gate every proposed action. Output order and length match the input.
pub fn gate_actions(
    actions: &[ProposedAction],
    confidence: u8,
    policy: &PathPolicy,
    limits: &GateLimits,
) -> Vec<GatedAction> {
    actions
        .iter()
        .enumerate()
        .map(|(idx, action)| GatedAction {
            action: action.clone(),
            verdict: gate_one(idx, action, confidence, policy, limits),
        })
        .collect()
}

fn block(outcome: ActionOutcome, reason: impl Into<String>) -> Verdict {
    Verdict::Block {
        outcome,
        reason: reason.into(),
    }
}

fn gate_one(
    idx: usize,
    action: &ProposedAction,
    confidence: u8,
    policy: &PathPolicy,
    limits: &GateLimits,
) -> Verdict {
    if confidence < limits.confidence_floor {
        return block(
            ActionOutcome::BlockedConfidence,
            format!(
                "confidence {confidence} below floor {}",
                limits.confidence_floor
            ),
        );
    }
    if idx >= limits.max_actions {
        return block(
            ActionOutcome::BlockedLimit,
            format!("over per-cycle cap of {}", limits.max_actions),
        );
    }
    if let ProposedAction::WriteFile { path, .. } = action {
        match policy.classify(path) {
            PathClass::Denied => {
                return block(ActionOutcome::BlockedPath, "path not in allow-list");
            }
            PathClass::SelfPath if confidence < limits.self_modify_floor => {
                return block(
                    ActionOutcome::BlockedConfidence,
                    format!(
                        "self-modification requires confidence {}",
                        limits.self_modify_floor
                    ),
                );
            }
            PathClass::SelfPath | PathClass::Allowed => {}
        }
    }
    if action.payload_len() > limits.max_content_bytes {
        return block(
            ActionOutcome::BlockedSize,
            format!(
                "{} bytes exceeds {}",
                action.payload_len(),
                limits.max_content_bytes
            ),
        );
    }
    Verdict::Permit
}
