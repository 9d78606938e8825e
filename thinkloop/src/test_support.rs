//! Test-only stubs for the cycle's collaborators.
//!
//! All stubs are single-threaded and record every call so tests can assert on
//! side effects (or their absence).

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};

use crate::core::types::Directive;
use crate::io::channels::{CommandChannel, IssueTracker};
use crate::io::config::ThinkConfig;
use crate::io::notifier::{Notification, Notifier};
use crate::io::oracle::{Completion, CompletionRequest, Oracle, OracleError};
use crate::io::store::{DocumentStore, ReadOutcome, VersionTag, WriteOutcome};
use crate::io::wake::Wake;

/// Deterministic "now" used across tests: 2026-10-19T12:00:00Z.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

/// Valid config with the default missions and no retry delay.
pub fn test_config() -> ThinkConfig {
    let mut config = ThinkConfig::with_default_missions();
    config.store.owner = "acme".to_string();
    config.store.repo = "memory".to_string();
    config.oracle.retry_backoff_secs = 0;
    config
}

pub fn completion(text: &str, tokens: Option<u64>) -> Completion {
    Completion {
        text: text.to_string(),
        tokens,
    }
}

/// One recorded `write` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub path: String,
    pub content: String,
    pub message: String,
    pub expected: Option<VersionTag>,
}

/// In-memory versioned store with the same conflict rules as the GitHub adapter.
#[derive(Default)]
pub struct StubStore {
    files: RefCell<BTreeMap<String, (String, VersionTag)>>,
    next_version: Cell<u64>,
    reads: Cell<usize>,
    writes: RefCell<Vec<WriteCall>>,
    failing_reads: RefCell<BTreeSet<String>>,
    failing_writes: RefCell<BTreeSet<String>>,
    /// Content another writer commits right after the next read of a path.
    interference: RefCell<BTreeMap<String, String>>,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> VersionTag {
        let next = self.next_version.get() + 1;
        self.next_version.set(next);
        VersionTag::new(format!("v{next}"))
    }

    /// Store `content` directly, bypassing conflict checks.
    pub fn seed(&self, path: &str, content: &str) -> VersionTag {
        let tag = self.bump();
        self.files
            .borrow_mut()
            .insert(path.to_string(), (content.to_string(), tag.clone()));
        tag
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files.borrow().get(path).map(|(content, _)| content.clone())
    }

    pub fn tag(&self, path: &str) -> Option<VersionTag> {
        self.files.borrow().get(path).map(|(_, tag)| tag.clone())
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.writes.borrow().clone()
    }

    pub fn fail_reads_of(&self, path: &str) {
        self.failing_reads.borrow_mut().insert(path.to_string());
    }

    pub fn fail_writes_to(&self, path: &str) {
        self.failing_writes.borrow_mut().insert(path.to_string());
    }

    /// Simulate a concurrent writer committing `content` right after our read.
    pub fn interfere_after_read(&self, path: &str, content: &str) {
        self.interference
            .borrow_mut()
            .insert(path.to_string(), content.to_string());
    }
}

impl DocumentStore for StubStore {
    fn read(&self, path: &str) -> Result<ReadOutcome> {
        self.reads.set(self.reads.get() + 1);
        if self.failing_reads.borrow().contains(path) {
            return Err(anyhow!("stub read failure for {path}"));
        }
        let outcome = match self.files.borrow().get(path) {
            Some((content, tag)) => ReadOutcome::Found {
                content: content.clone(),
                tag: tag.clone(),
            },
            None => ReadOutcome::NotFound,
        };
        let interfering = self.interference.borrow_mut().remove(path);
        if let Some(content) = interfering {
            self.seed(path, &content);
        }
        Ok(outcome)
    }

    fn write(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&VersionTag>,
    ) -> Result<WriteOutcome> {
        self.writes.borrow_mut().push(WriteCall {
            path: path.to_string(),
            content: content.to_string(),
            message: message.to_string(),
            expected: expected.cloned(),
        });
        if self.failing_writes.borrow().contains(path) {
            return Err(anyhow!("stub write failure for {path}"));
        }
        let current = self.tag(path);
        if current.as_ref() != expected {
            return Ok(WriteOutcome::Conflict);
        }
        Ok(WriteOutcome::Committed(self.seed(path, content)))
    }
}

/// Oracle that replays a fixed script of results.
pub struct ScriptedOracle {
    script: RefCell<VecDeque<Result<Completion, OracleError>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<Completion, OracleError>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Oracle that always answers `text` with a reported cost.
    pub fn replying(text: &str, tokens: Option<u64>) -> Self {
        Self::new(vec![Ok(completion(text, tokens))])
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        self.requests.borrow_mut().push(request.clone());
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Rejected("script exhausted".to_string())))
    }
}

/// Records notifications; optionally fails after recording.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.borrow_mut().push(notification.clone());
        if self.fail {
            return Err(anyhow!("stub notifier failure"));
        }
        Ok(())
    }
}

/// Channel returning a fixed list of directives (or failing).
pub struct StaticChannel {
    name: String,
    directives: Vec<Directive>,
    fail: bool,
    polls: Cell<usize>,
}

impl StaticChannel {
    pub fn new(name: &str, directives: Vec<Directive>) -> Self {
        Self {
            name: name.to_string(),
            directives,
            fail: false,
            polls: Cell::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.get()
    }
}

impl CommandChannel for StaticChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&self) -> Result<Vec<Directive>> {
        self.polls.set(self.polls.get() + 1);
        if self.fail {
            return Err(anyhow!("stub channel {} unavailable", self.name));
        }
        Ok(self.directives.clone())
    }
}

#[derive(Default)]
pub struct RecordingIssues {
    comments: RefCell<Vec<(u64, String)>>,
    closed: RefCell<Vec<u64>>,
}

impl RecordingIssues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.borrow().clone()
    }

    pub fn closed(&self) -> Vec<u64> {
        self.closed.borrow().clone()
    }
}

impl IssueTracker for RecordingIssues {
    fn comment(&self, issue: u64, body: &str) -> Result<()> {
        self.comments.borrow_mut().push((issue, body.to_string()));
        Ok(())
    }

    fn close(&self, issue: u64) -> Result<()> {
        self.closed.borrow_mut().push(issue);
        Ok(())
    }
}

/// Wake stub that counts calls and can fail.
#[derive(Default)]
pub struct CountingWake {
    calls: Cell<usize>,
    fail: bool,
}

impl CountingWake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Wake for CountingWake {
    fn wake(&self) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(anyhow!("stub wake failure"));
        }
        Ok(())
    }
}
