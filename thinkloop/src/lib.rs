//! Scheduled thinking loop with a shared, versioned memory document.
//!
//! Each invocation runs exactly one cycle: ingest an operator directive, load
//! the memory document, check the daily token budget, pick a topic, ask the
//! oracle, run the gated actions it proposes, then compact and conditionally
//! write the document back and publish one notification.
//!
//! - **[`core`]**: Pure, deterministic logic (document model, budget, topic
//!   selection, reply parsing, gating, compaction). No I/O.
//! - **[`io`]**: Adapters behind traits (document store, oracle, command
//!   channels, notifier, wake) plus configuration and prompt rendering.
//!
//! [`cycle`] drives one cycle over those traits; [`status`] summarizes the
//! stored document.

pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
