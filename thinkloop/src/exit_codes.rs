//! Stable exit codes for thinkloop CLI commands.

/// Cycle completed, rested, or skipped a duplicate topic.
pub const OK: i32 = 0;
/// Invalid invocation, configuration, or missing secret.
pub const INVALID: i32 = 1;
/// A dependency failed: memory load, oracle call, or compaction.
pub const DEPENDENCY_FAILURE: i32 = 2;
/// The memory document could not be written (conflict or store error).
pub const PERSIST_FAILURE: i32 = 3;
