//! Deterministic, pure logic for a single cycle.
//!
//! Core modules must be free of I/O side effects. They operate on the
//! in-memory document and return deterministic outputs suitable for tests.

pub mod budget;
pub mod compactor;
pub mod mission;
pub mod policy;
pub mod reply;
pub mod state_update;
pub mod text;
pub mod types;
