//! Orchestration for a single `thinkloop run` cycle.
//!
//! Stages: wake, ingest, load memory, check budget, select topic, infer,
//! parse and execute actions, append history, compact, persist, resolve the
//! directive, notify. Every failure, including prompt rendering and
//! serialization errors, ends the cycle as [`CycleOutcome::Failed`] with one
//! notification and without writing the memory document.

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::budget::{charge, estimate_tokens, is_exhausted, roll_over};
use crate::core::compactor::compact;
use crate::core::mission::{Selection, select, select_directive};
use crate::core::policy::gate_actions;
use crate::core::reply::parse_reply;
use crate::core::state_update::{
    append_thought, begin_cycle, mark_directive_seen, resting_entry, stamp_sync,
};
use crate::core::text::truncate_chars;
use crate::core::types::{
    ActionOutcome, ActionRecord, Directive, MemoryDocument, ThoughtEntry, ThoughtSource,
};
use crate::exit_codes;
use crate::io::actions::execute_actions;
use crate::io::channels::{CommandChannel, IssueTracker, ingest, resolve_directive};
use crate::io::config::ThinkConfig;
use crate::io::memory::{load_memory, persist_memory};
use crate::io::notifier::{Notification, Notifier, Priority, notify_best_effort};
use crate::io::oracle::{CompletionRequest, Oracle, complete_with_retry};
use crate::io::prompt::{PromptInputs, render_prompt};
use crate::io::store::{DocumentStore, VersionTag, WriteOutcome};
use crate::io::wake::{Wake, wake_best_effort};

/// Characters of the thought included in notifications.
const NOTIFY_THOUGHT_CHARS: usize = 300;

/// Collaborators for one cycle.
pub struct CycleDeps<'a> {
    /// Holds the memory document.
    pub memory_store: &'a dyn DocumentStore,
    /// Repository that file actions write to.
    pub target_store: &'a dyn DocumentStore,
    pub oracle: &'a dyn Oracle,
    pub channels: Vec<&'a dyn CommandChannel>,
    pub issues: Option<&'a dyn IssueTracker>,
    pub notifier: &'a dyn Notifier,
    pub wake: Option<&'a dyn Wake>,
}

/// Stage at which a cycle gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    LoadMemory,
    Infer,
    Compact,
    Persist,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::LoadMemory => "load_memory",
            FailureStage::Infer => "infer",
            FailureStage::Compact => "compact",
            FailureStage::Persist => "persist",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed: {reason}")]
pub struct CycleFailure {
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Daily budget exhausted; a resting entry was written.
    Resting,
    /// Rotated mission repeated the last entry; nothing was written.
    DuplicateSkipped,
    Failed(CycleFailure),
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Completed => "completed",
            CycleOutcome::Resting => "resting",
            CycleOutcome::DuplicateSkipped => "duplicate_skipped",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Cycle number assigned to this run, once the memory document was loaded.
    pub cycle: Option<u64>,
    pub topic: Option<String>,
    pub directive_id: Option<String>,
    pub thought: Option<String>,
    pub score: Option<u8>,
    pub confidence: Option<u8>,
    /// Tokens charged to the daily budget by this cycle.
    pub tokens: Option<u64>,
    /// Tokens used today after this cycle.
    pub tokens_today: Option<u64>,
    pub actions: Vec<ActionRecord>,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            outcome: CycleOutcome::Completed,
            cycle: None,
            topic: None,
            directive_id: None,
            thought: None,
            score: None,
            confidence: None,
            tokens: None,
            tokens_today: None,
            actions: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            CycleOutcome::Completed | CycleOutcome::Resting | CycleOutcome::DuplicateSkipped => {
                exit_codes::OK
            }
            CycleOutcome::Failed(failure) => match failure.stage {
                FailureStage::Persist => exit_codes::PERSIST_FAILURE,
                FailureStage::LoadMemory | FailureStage::Infer | FailureStage::Compact => {
                    exit_codes::DEPENDENCY_FAILURE
                }
            },
        }
    }

    /// One-line summary printed by the CLI.
    pub fn summary_line(&self) -> String {
        let mut line = format!("outcome={}", self.outcome.as_str());
        if let Some(cycle) = self.cycle {
            line.push_str(&format!(" cycle={cycle}"));
        }
        if let Some(topic) = &self.topic {
            line.push_str(&format!(" topic={topic:?}"));
        }
        if let Some(score) = self.score {
            line.push_str(&format!(" score={score}"));
        }
        if let Some(tokens) = self.tokens {
            line.push_str(&format!(" tokens={tokens}"));
        }
        if !self.actions.is_empty() {
            let ok = self
                .actions
                .iter()
                .filter(|a| a.outcome == ActionOutcome::Ok)
                .count();
            line.push_str(&format!(" actions={ok}/{}", self.actions.len()));
        }
        if let CycleOutcome::Failed(failure) = &self.outcome {
            line.push_str(&format!(" error={:?}", failure.to_string()));
        }
        line
    }
}

/// Run one cycle against `deps`. Exactly one notification is attempted.
#[instrument(skip_all, fields(now = %now))]
pub fn run_cycle(deps: &CycleDeps<'_>, config: &ThinkConfig, now: DateTime<Utc>) -> Result<CycleReport> {
    let mut report = CycleReport::new();

    if let Some(wake) = deps.wake {
        info!(stage = "wake", "waking dependency");
        wake_best_effort(wake);
    }

    let candidates = ingest(&deps.channels);
    info!(stage = "ingest", candidates = candidates.len(), "polled command channels");

    let loaded = match load_memory(deps.memory_store, &config.store.path) {
        Ok(loaded) => loaded,
        Err(err) => {
            return Ok(fail(deps, report, FailureStage::LoadMemory, format!("{err:#}")));
        }
    };
    let mut doc = loaded.doc;
    let tag = loaded.tag;

    let budget = roll_over(doc.token_budget.take(), now.date_naive());
    let limit = config.limits.daily_token_budget;
    if is_exhausted(&budget, limit) {
        info!(stage = "budget", tokens_used = budget.tokens_used, limit, "daily budget exhausted");
        let tokens_used = budget.tokens_used;
        doc.token_budget = Some(budget);
        let cycle = begin_cycle(&mut doc);
        let entry = resting_entry(now, cycle, tokens_used, limit);
        report.cycle = Some(cycle);
        report.topic = Some(entry.topic.clone());
        report.thought = Some(entry.thought.clone());
        report.score = Some(entry.score);
        report.tokens_today = Some(tokens_used);
        append_thought(&mut doc, entry, &config.history_caps());
        report.outcome = CycleOutcome::Resting;
        return finish(deps, config, doc, tag.as_ref(), None, report, now);
    }
    doc.token_budget = Some(budget);

    let directive = select_directive(candidates, &doc.seen_directives);
    let selection = select(&doc, &config.missions, directive.as_ref());
    report.topic = Some(selection.topic().to_string());
    report.directive_id = directive.as_ref().map(Directive::id);
    info!(stage = "select", topic = selection.topic(), directive = ?report.directive_id, "selected topic");
    if let Selection::Duplicate { .. } = selection {
        report.outcome = CycleOutcome::DuplicateSkipped;
        notify_best_effort(deps.notifier, &notification(&report));
        return Ok(report);
    }

    let cycle = begin_cycle(&mut doc);
    report.cycle = Some(cycle);
    let request = match build_request(config, &doc, &selection, directive.as_ref(), cycle, now) {
        Ok(request) => request,
        Err(err) => return Ok(fail(deps, report, FailureStage::Infer, format!("{err:#}"))),
    };
    let completion = match complete_with_retry(deps.oracle, &request, config.retry_backoff()) {
        Ok(completion) => completion,
        Err(err) => return Ok(fail(deps, report, FailureStage::Infer, err.to_string())),
    };
    let cost = completion.tokens.unwrap_or_else(|| {
        estimate_tokens(request.prompt_chars(), completion.text.chars().count())
    });
    if let Some(budget) = doc.token_budget.as_mut() {
        charge(budget, cost);
        report.tokens_today = Some(budget.tokens_used);
    }
    report.tokens = Some(cost);
    info!(stage = "infer", cost, "oracle replied");

    let reply = parse_reply(&completion.text);
    let gated = gate_actions(
        reply.actions(),
        reply.confidence(),
        &config.path_policy(),
        &config.gate_limits(),
    );
    let records = execute_actions(&gated, deps.target_store, deps.issues);
    info!(stage = "actions", proposed = records.len(), confidence = reply.confidence(), "actions processed");

    let entry = ThoughtEntry {
        timestamp: now,
        cycle,
        topic: selection.topic().to_string(),
        source: if directive.is_some() {
            ThoughtSource::Directive
        } else {
            ThoughtSource::Mission
        },
        directive_id: report.directive_id.clone(),
        thought: reply.thought().to_string(),
        score: reply.score(),
        confidence: reply.confidence(),
        tokens: Some(cost),
        actions: records.clone(),
    };
    report.thought = Some(reply.thought().to_string());
    report.score = Some(reply.score());
    report.confidence = Some(reply.confidence());
    report.actions = records;

    let caps = config.history_caps();
    append_thought(&mut doc, entry, &caps);
    if let Some(directive) = &directive {
        mark_directive_seen(&mut doc, directive.id(), &caps);
    }
    finish(deps, config, doc, tag.as_ref(), directive.as_ref(), report, now)
}

fn build_request(
    config: &ThinkConfig,
    doc: &MemoryDocument,
    selection: &Selection,
    directive: Option<&Directive>,
    cycle: u64,
    now: DateTime<Utc>,
) -> Result<CompletionRequest> {
    let mut allowed = config.policy.allowed_paths.clone();
    allowed.extend(
        config
            .policy
            .allowed_prefixes
            .iter()
            .map(|p| format!("{}/", p.trim_end_matches('/'))),
    );
    let prompt = render_prompt(&PromptInputs {
        cycle,
        now,
        topic: selection.topic(),
        directive,
        doc,
        allowed,
        self_paths: config.policy.self_paths.clone(),
        confidence_floor: config.limits.confidence_floor,
        self_modify_floor: config.limits.self_modify_floor,
        max_actions: config.limits.max_actions,
    })?;
    Ok(CompletionRequest {
        system: prompt.system,
        user: prompt.user,
        max_tokens: config.oracle.max_tokens,
        temperature: config.oracle.temperature,
    })
}

/// Compact, persist, resolve the directive and notify.
fn finish(
    deps: &CycleDeps<'_>,
    config: &ThinkConfig,
    mut doc: MemoryDocument,
    tag: Option<&VersionTag>,
    directive: Option<&Directive>,
    report: CycleReport,
    now: DateTime<Utc>,
) -> Result<CycleReport> {
    stamp_sync(&mut doc, now);

    let limits = config.compaction_limits();
    let compaction = match compact(&mut doc, &limits) {
        Ok(compaction) => compaction,
        Err(err) => return Ok(fail(deps, report, FailureStage::Compact, format!("{err:#}"))),
    };
    if !compaction.within_limit {
        let reason = format!(
            "memory document is {} bytes after compaction (ceiling {})",
            compaction.size_after, limits.max_bytes
        );
        return Ok(fail(deps, report, FailureStage::Compact, reason));
    }

    match persist_memory(deps.memory_store, &config.store.path, &doc, tag) {
        Ok(WriteOutcome::Committed(new_tag)) => {
            info!(stage = "persist", tag = new_tag.as_str(), bytes = compaction.size_after, "memory persisted");
        }
        Ok(WriteOutcome::Conflict) => {
            let reason = "memory document changed since it was read".to_string();
            return Ok(fail(deps, report, FailureStage::Persist, reason));
        }
        Err(err) => return Ok(fail(deps, report, FailureStage::Persist, format!("{err:#}"))),
    }

    if let Some(directive) = directive {
        let issues = deps.issues.filter(|_| config.channels.issues.close_on_consume);
        resolve_directive(issues, directive, &resolution_note(&report));
    }

    notify_best_effort(deps.notifier, &notification(&report));
    Ok(report)
}

fn fail(deps: &CycleDeps<'_>, mut report: CycleReport, stage: FailureStage, reason: String) -> CycleReport {
    warn!(stage = stage.as_str(), %reason, "cycle failed");
    report.outcome = CycleOutcome::Failed(CycleFailure { stage, reason });
    notify_best_effort(deps.notifier, &notification(&report));
    report
}

fn resolution_note(report: &CycleReport) -> String {
    let cycle = report.cycle.unwrap_or_default();
    let thought = report.thought.as_deref().unwrap_or_default();
    format!(
        "Handled in thinkloop cycle {cycle}.\n\n> {}",
        truncate_chars(thought, NOTIFY_THOUGHT_CHARS).replace('\n', "\n> ")
    )
}

/// The single notification describing `report`.
pub fn notification(report: &CycleReport) -> Notification {
    let cycle = report
        .cycle
        .map(|c| format!("cycle {c}"))
        .unwrap_or_else(|| "cycle".to_string());
    let topic = report.topic.as_deref().unwrap_or_default();
    match &report.outcome {
        CycleOutcome::Completed => {
            let mut body = truncate_chars(
                report.thought.as_deref().unwrap_or_default(),
                NOTIFY_THOUGHT_CHARS,
            );
            push_cycle_details(&mut body, report);
            Notification {
                title: format!("thinkloop {cycle}: {}", truncate_chars(topic, 60)),
                body,
                priority: Priority::Default,
            }
        }
        CycleOutcome::Resting => Notification {
            title: format!("thinkloop {cycle}: resting"),
            body: report.thought.clone().unwrap_or_default(),
            priority: Priority::Low,
        },
        CycleOutcome::DuplicateSkipped => Notification {
            title: "thinkloop: duplicate topic skipped".to_string(),
            body: format!("Last entry already covered \"{topic}\"; nothing written."),
            priority: Priority::Low,
        },
        CycleOutcome::Failed(failure) => {
            let mut title = format!("thinkloop {cycle} failed at {}", failure.stage);
            if !topic.is_empty() {
                title.push_str(&format!(": {}", truncate_chars(topic, 60)));
            }
            let mut body = failure.reason.clone();
            if report.score.is_some() || !report.actions.is_empty() {
                push_cycle_details(&mut body, report);
            }
            Notification {
                title,
                body,
                priority: Priority::High,
            }
        }
    }
}

/// Score line plus one line per action record. Actions already executed are
/// reported even when the memory document was not written.
fn push_cycle_details(body: &mut String, report: &CycleReport) {
    body.push_str(&format!(
        "\n\nscore {}/10, confidence {}/10, tokens {}",
        report.score.unwrap_or_default(),
        report.confidence.unwrap_or_default(),
        report.tokens.unwrap_or_default()
    ));
    for action in &report.actions {
        body.push_str(&format!(
            "\n- {} {}: {}",
            action.kind.as_str(),
            action.target,
            action.outcome.as_str()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ActionKind;

    fn failed(stage: FailureStage) -> CycleReport {
        CycleReport {
            outcome: CycleOutcome::Failed(CycleFailure {
                stage,
                reason: "boom".to_string(),
            }),
            ..CycleReport::new()
        }
    }

    #[test]
    fn exit_codes_follow_failure_stage() {
        assert_eq!(CycleReport::new().exit_code(), exit_codes::OK);
        assert_eq!(
            failed(FailureStage::Infer).exit_code(),
            exit_codes::DEPENDENCY_FAILURE
        );
        assert_eq!(
            failed(FailureStage::Compact).exit_code(),
            exit_codes::DEPENDENCY_FAILURE
        );
        assert_eq!(
            failed(FailureStage::Persist).exit_code(),
            exit_codes::PERSIST_FAILURE
        );
    }

    #[test]
    fn failure_notification_is_high_priority() {
        let note = notification(&failed(FailureStage::LoadMemory));
        assert_eq!(note.priority, Priority::High);
        assert_eq!(note.title, "thinkloop cycle failed at load_memory");
        assert_eq!(note.body, "boom");
    }

    #[test]
    fn late_failure_notification_keeps_the_action_trail() {
        let report = CycleReport {
            cycle: Some(5),
            topic: Some("Growth".to_string()),
            score: Some(9),
            confidence: Some(9),
            tokens: Some(40),
            actions: vec![ActionRecord {
                kind: ActionKind::FileCreateOrUpdate,
                target: "docs/a.md".to_string(),
                outcome: ActionOutcome::Ok,
                detail: None,
            }],
            ..failed(FailureStage::Persist)
        };

        let note = notification(&report);

        assert_eq!(note.title, "thinkloop cycle 5 failed at persist: Growth");
        assert!(note.body.starts_with("boom\n\nscore 9/10, confidence 9/10"));
        assert!(note.body.contains("docs/a.md: ok"));
    }

    #[test]
    fn summary_line_lists_key_fields() {
        let report = CycleReport {
            cycle: Some(4),
            topic: Some("Growth".to_string()),
            score: Some(8),
            tokens: Some(120),
            ..CycleReport::new()
        };
        assert_eq!(
            report.summary_line(),
            "outcome=completed cycle=4 topic=\"Growth\" score=8 tokens=120"
        );
    }
}
