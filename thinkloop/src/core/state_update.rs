//! Controller-owned updates applied to the memory document during a cycle.

use chrono::{DateTime, Utc};

use crate::core::compactor::truncate_front;
use crate::core::text::truncate_chars;
use crate::core::types::{Insight, MemoryDocument, SYNC_SOURCE, ThoughtEntry, ThoughtSource};

/// Maximum characters of model output kept in a thought entry.
pub const THOUGHT_CHARS: usize = 500;
/// Maximum characters kept in an insight.
pub const INSIGHT_CHARS: usize = 200;
/// Thoughts scoring at least this are copied into the insights list.
pub const INSIGHT_SCORE: u8 = 8;
/// Topic recorded for budget abstentions.
pub const RESTING_TOPIC: &str = "resting";

/// Bounds applied on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCaps {
    pub max_thoughts: usize,
    pub max_insights: usize,
    pub max_seen_directives: usize,
}

/// Advance the cycle counter and return the new cycle number.
pub fn begin_cycle(doc: &mut MemoryDocument) -> u64 {
    doc.cycle_count += 1;
    doc.cycle_count
}

/// Append a thought, evicting the oldest beyond `caps.max_thoughts`.
///
/// Also copies high-scoring thoughts into the insights list.
pub fn append_thought(doc: &mut MemoryDocument, mut entry: ThoughtEntry, caps: &HistoryCaps) {
    entry.thought = truncate_chars(&entry.thought, THOUGHT_CHARS);
    if entry.source != ThoughtSource::Resting && entry.score >= INSIGHT_SCORE {
        doc.insights.push(Insight {
            timestamp: entry.timestamp,
            cycle: entry.cycle,
            insight: truncate_chars(&entry.thought, INSIGHT_CHARS),
        });
        truncate_front(&mut doc.insights, caps.max_insights);
    }
    doc.thoughts.push(entry);
    let evicted = truncate_front(&mut doc.thoughts, caps.max_thoughts);
    doc.compacted_count += evicted as u64;
}

pub fn mark_directive_seen(doc: &mut MemoryDocument, id: String, caps: &HistoryCaps) {
    if doc.seen_directives.contains(&id) {
        return;
    }
    doc.seen_directives.push(id);
    truncate_front(&mut doc.seen_directives, caps.max_seen_directives);
}

pub fn stamp_sync(doc: &mut MemoryDocument, now: DateTime<Utc>) {
    doc.last_sync = Some(now);
    doc.sync_source = Some(SYNC_SOURCE.to_string());
}

/// Minimal entry recorded when the daily budget is exhausted.
pub fn resting_entry(now: DateTime<Utc>, cycle: u64, tokens_used: u64, limit: u64) -> ThoughtEntry {
    ThoughtEntry {
        timestamp: now,
        cycle,
        topic: RESTING_TOPIC.to_string(),
        source: ThoughtSource::Resting,
        directive_id: None,
        thought: format!("Daily token budget reached ({tokens_used}/{limit}); resting."),
        score: 1,
        confidence: 0,
        tokens: None,
        actions: Vec::new(),
    }
}
