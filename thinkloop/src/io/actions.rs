//! Execution of gated actions.
//!
//! Every gated action yields exactly one [`ActionRecord`]; blocked actions are
//! recorded without touching any collaborator.

use tracing::{info, warn};

use crate::core::policy::{GatedAction, Verdict};
use crate::core::types::{ActionOutcome, ActionRecord, ProposedAction};
use crate::io::channels::IssueTracker;
use crate::io::store::{DocumentStore, ReadOutcome, WriteOutcome};

pub fn execute_actions(
    gated: &[GatedAction],
    target: &dyn DocumentStore,
    issues: Option<&dyn IssueTracker>,
) -> Vec<ActionRecord> {
    gated
        .iter()
        .map(|g| match &g.verdict {
            Verdict::Block { outcome, reason } => {
                info!(kind = g.action.kind().as_str(), target = %g.action.target(), outcome = outcome.as_str(), "action blocked");
                g.action.record(*outcome, Some(reason.clone()))
            }
            Verdict::Permit => execute_one(&g.action, target, issues),
        })
        .collect()
}

fn execute_one(
    action: &ProposedAction,
    target: &dyn DocumentStore,
    issues: Option<&dyn IssueTracker>,
) -> ActionRecord {
    let result = match action {
        ProposedAction::WriteFile {
            path,
            content,
            message,
        } => write_file(target, path, content, message),
        ProposedAction::Comment { issue, body } => match issues {
            Some(issues) => issues
                .comment(*issue, body)
                .map_err(|err| format!("{err:#}")),
            None => Err("no issue tracker configured".to_string()),
        },
        ProposedAction::Unknown { kind } => Err(format!("unsupported action type '{kind}'")),
    };
    match result {
        Ok(()) => {
            info!(kind = action.kind().as_str(), target = %action.target(), "action executed");
            action.record(ActionOutcome::Ok, None)
        }
        Err(reason) => {
            warn!(kind = action.kind().as_str(), target = %action.target(), %reason, "action failed");
            action.record(ActionOutcome::Failed, Some(reason))
        }
    }
}

/// Read the target's current tag (absent means create), then write at that tag.
fn write_file(
    target: &dyn DocumentStore,
    path: &str,
    content: &str,
    message: &str,
) -> Result<(), String> {
    let tag = match target.read(path) {
        Ok(ReadOutcome::Found { tag, .. }) => Some(tag),
        Ok(ReadOutcome::NotFound) => None,
        Err(err) => return Err(format!("read failed: {err:#}")),
    };
    match target.write(path, content, message, tag.as_ref()) {
        Ok(WriteOutcome::Committed(_)) => Ok(()),
        Ok(WriteOutcome::Conflict) => Err("version conflict".to_string()),
        Err(err) => Err(format!("write failed: {err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingIssues, StubStore};

    fn permit(action: ProposedAction) -> GatedAction {
        GatedAction {
            action,
            verdict: Verdict::Permit,
        }
    }

    fn write(path: &str) -> ProposedAction {
        ProposedAction::WriteFile {
            path: path.to_string(),
            content: "body".to_string(),
            message: "msg".to_string(),
        }
    }

    #[test]
    fn creates_and_updates_files() {
        let store = StubStore::new();
        store.seed("docs/existing.md", "old");
        let records = execute_actions(
            &[permit(write("docs/new.md")), permit(write("docs/existing.md"))],
            &store,
            None,
        );
        assert!(records.iter().all(|r| r.outcome == ActionOutcome::Ok));
        assert_eq!(store.content("docs/existing.md").as_deref(), Some("body"));
        assert_eq!(store.content("docs/new.md").as_deref(), Some("body"));
    }

    #[test]
    fn blocked_actions_never_reach_the_store() {
        let store = StubStore::new();
        let gated = GatedAction {
            action: write("../etc/passwd"),
            verdict: Verdict::Block {
                outcome: ActionOutcome::BlockedPath,
                reason: "path not in allow-list".to_string(),
            },
        };
        let records = execute_actions(&[gated], &store, None);
        assert_eq!(records[0].outcome, ActionOutcome::BlockedPath);
        assert!(store.writes().is_empty());
        assert_eq!(store.reads(), 0);
    }

    #[test]
    fn failures_are_recorded_per_action() {
        let store = StubStore::new();
        store.fail_writes_to("docs/broken.md");
        let issues = RecordingIssues::new();
        let records = execute_actions(
            &[
                permit(write("docs/broken.md")),
                permit(ProposedAction::Unknown {
                    kind: "deploy".to_string(),
                }),
                permit(ProposedAction::Comment {
                    issue: 9,
                    body: "noted".to_string(),
                }),
            ],
            &store,
            Some(&issues),
        );
        let outcomes: Vec<ActionOutcome> = records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![ActionOutcome::Failed, ActionOutcome::Failed, ActionOutcome::Ok]
        );
        assert_eq!(records[2].target, "#9");
        assert_eq!(issues.comments(), vec![(9, "noted".to_string())]);
    }

    #[test]
    fn comment_without_tracker_fails() {
        let store = StubStore::new();
        let records = execute_actions(
            &[permit(ProposedAction::Comment {
                issue: 1,
                body: "x".to_string(),
            })],
            &store,
            None,
        );
        assert_eq!(records[0].outcome, ActionOutcome::Failed);
    }
}
