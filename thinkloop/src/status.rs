//! Read-only summary for `thinkloop status`.

use anyhow::Result;
use chrono::NaiveDate;

use crate::core::budget::roll_over;
use crate::core::mission::{Selection, select};
use crate::core::types::MemoryDocument;
use crate::io::config::ThinkConfig;
use crate::io::memory::load_memory;
use crate::io::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub exists: bool,
    pub version: String,
    pub cycle_count: u64,
    pub thoughts: usize,
    pub history_length: u64,
    pub insights: usize,
    pub seen_directives: usize,
    pub bytes: usize,
    pub max_bytes: usize,
    pub tokens_today: u64,
    pub daily_budget: u64,
    pub last_topic: Option<String>,
    pub last_score: Option<u8>,
    pub last_sync: Option<String>,
    /// What the next undirected cycle would think about.
    pub next_topic: String,
    pub next_is_duplicate: bool,
}

/// Summarize `doc` as of `today` (UTC).
pub fn summarize(doc: &MemoryDocument, exists: bool, config: &ThinkConfig, today: NaiveDate) -> Result<StatusSummary> {
    let budget = roll_over(doc.token_budget.clone(), today);
    let next = select(doc, &config.missions, None);
    let last = doc.last_thought();
    Ok(StatusSummary {
        exists,
        version: doc.version.clone(),
        cycle_count: doc.cycle_count,
        thoughts: doc.thoughts.len(),
        history_length: doc.history_length(),
        insights: doc.insights.len(),
        seen_directives: doc.seen_directives.len(),
        bytes: doc.serialized_len()?,
        max_bytes: config.limits.max_memory_bytes,
        tokens_today: budget.tokens_used,
        daily_budget: config.limits.daily_token_budget,
        last_topic: last.map(|t| t.topic.clone()),
        last_score: last.map(|t| t.score),
        last_sync: doc.last_sync.map(|ts| ts.to_rfc3339()),
        next_topic: next.topic().to_string(),
        next_is_duplicate: matches!(next, Selection::Duplicate { .. }),
    })
}

/// Load the stored document and summarize it.
pub fn status_from_store(
    store: &dyn DocumentStore,
    config: &ThinkConfig,
    today: NaiveDate,
) -> Result<StatusSummary> {
    let loaded = load_memory(store, &config.store.path)?;
    summarize(&loaded.doc, loaded.tag.is_some(), config, today)
}

pub fn render(summary: &StatusSummary) -> String {
    let mut lines = Vec::new();
    if !summary.exists {
        lines.push("memory: not created yet".to_string());
    }
    lines.push(format!(
        "version: {}  cycles: {}  history: {} ({} kept)",
        summary.version, summary.cycle_count, summary.history_length, summary.thoughts
    ));
    lines.push(format!(
        "insights: {}  seen directives: {}",
        summary.insights, summary.seen_directives
    ));
    lines.push(format!("size: {}/{} bytes", summary.bytes, summary.max_bytes));
    lines.push(format!(
        "tokens today: {}/{}",
        summary.tokens_today, summary.daily_budget
    ));
    if let Some(topic) = &summary.last_topic {
        lines.push(format!(
            "last: {topic} (score {})",
            summary.last_score.unwrap_or_default()
        ));
    }
    if let Some(sync) = &summary.last_sync {
        lines.push(format!("last sync: {sync}"));
    }
    let suffix = if summary.next_is_duplicate {
        " (would be skipped as duplicate)"
    } else {
        ""
    };
    lines.push(format!("next: {}{suffix}", summary.next_topic));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BudgetRecord;
    use crate::test_support::{StubStore, test_config};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn fresh_store_reports_first_mission() {
        let config = test_config();
        let store = StubStore::new();
        let summary = status_from_store(&store, &config, today()).expect("status");
        assert!(!summary.exists);
        assert_eq!(summary.cycle_count, 0);
        assert_eq!(summary.next_topic, config.missions[0]);
        assert!(render(&summary).contains("not created yet"));
    }

    #[test]
    fn stale_budget_reads_as_zero_today() {
        let config = test_config();
        let doc = MemoryDocument {
            cycle_count: 9,
            token_budget: Some(BudgetRecord {
                date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
                tokens_used: 5_000,
            }),
            ..MemoryDocument::default()
        };
        let summary = summarize(&doc, true, &config, today()).expect("summary");
        assert_eq!(summary.tokens_today, 0);
        assert!(render(&summary).contains("cycles: 9"));
    }
}
