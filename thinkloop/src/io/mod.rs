//! Side-effecting adapters used by the cycle controller.

pub mod actions;
pub mod channels;
pub mod config;
pub mod github;
pub mod http;
pub mod memory;
pub mod notifier;
pub mod oracle;
pub mod prompt;
pub mod store;
pub mod wake;
