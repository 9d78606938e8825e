//! Size ceiling enforcement for the memory document.
//!
//! Eviction is strictly FIFO: recency is the only retention criterion.

use anyhow::Result;
use tracing::debug;

use crate::core::types::MemoryDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionLimits {
    pub max_bytes: usize,
    /// Thoughts kept by the first compaction pass.
    pub keep_thoughts: usize,
    /// Insights kept by the first compaction pass.
    pub keep_insights: usize,
    pub keep_seen_directives: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub size_before: usize,
    pub size_after: usize,
    pub evicted_thoughts: usize,
    pub evicted_insights: usize,
    pub within_limit: bool,
}

/// Drop the oldest items so that at most `keep` remain. Returns how many were dropped.
pub fn truncate_front<T>(items: &mut Vec<T>, keep: usize) -> usize {
    let excess = items.len().saturating_sub(keep);
    items.drain(..excess);
    excess
}

/// Bring the serialized document under `limits.max_bytes`.
///
/// First pass truncates every bounded sequence to its compaction cap. If the
/// document is still too large, thoughts and then insights are dropped one at a
/// time, oldest first. `within_limit` is false only when the unbounded parts of
/// the document alone exceed the ceiling.
pub fn compact(doc: &mut MemoryDocument, limits: &CompactionLimits) -> Result<CompactionReport> {
    let size_before = doc.serialized_len()?;
    let mut report = CompactionReport {
        size_before,
        size_after: size_before,
        evicted_thoughts: 0,
        evicted_insights: 0,
        within_limit: size_before <= limits.max_bytes,
    };
    if report.within_limit {
        return Ok(report);
    }

    report.evicted_thoughts += truncate_front(&mut doc.thoughts, limits.keep_thoughts);
    doc.compacted_count += report.evicted_thoughts as u64;
    report.evicted_insights += truncate_front(&mut doc.insights, limits.keep_insights);
    truncate_front(&mut doc.seen_directives, limits.keep_seen_directives);
    let mut size = doc.serialized_len()?;

    while size > limits.max_bytes && !doc.thoughts.is_empty() {
        doc.thoughts.remove(0);
        doc.compacted_count += 1;
        report.evicted_thoughts += 1;
        size = doc.serialized_len()?;
    }
    while size > limits.max_bytes && !doc.insights.is_empty() {
        doc.insights.remove(0);
        report.evicted_insights += 1;
        size = doc.serialized_len()?;
    }

    report.size_after = size;
    report.within_limit = size <= limits.max_bytes;
    debug!(
        size_before,
        size_after = size,
        evicted_thoughts = report.evicted_thoughts,
        evicted_insights = report.evicted_insights,
        "compacted memory document"
    );
    Ok(report)
}
