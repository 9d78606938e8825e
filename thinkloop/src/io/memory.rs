//! Loading and persisting the memory document through a [`DocumentStore`].

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::types::MemoryDocument;
use crate::io::store::{DocumentStore, ReadOutcome, VersionTag, WriteOutcome};

/// Memory document together with the tag it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMemory {
    pub doc: MemoryDocument,
    /// `None` when the document does not exist yet.
    pub tag: Option<VersionTag>,
}

/// Read and parse the memory document. A missing document yields a fresh one.
pub fn load_memory(store: &dyn DocumentStore, path: &str) -> Result<LoadedMemory> {
    match store.read(path).with_context(|| format!("read memory {path}"))? {
        ReadOutcome::Found { content, tag } => {
            let doc = MemoryDocument::from_json(&content)
                .with_context(|| format!("parse memory {path}"))?;
            debug!(
                cycle_count = doc.cycle_count,
                thoughts = doc.thoughts.len(),
                bytes = content.len(),
                "loaded memory"
            );
            Ok(LoadedMemory {
                doc,
                tag: Some(tag),
            })
        }
        ReadOutcome::NotFound => {
            info!(path, "memory document not found; starting fresh");
            Ok(LoadedMemory {
                doc: MemoryDocument::default(),
                tag: None,
            })
        }
    }
}

/// Commit message for a cycle's write.
pub fn commit_message(cycle: u64) -> String {
    format!("thinkloop: cycle {cycle}")
}

/// Conditionally write `doc` at the tag it was loaded with.
pub fn persist_memory(
    store: &dyn DocumentStore,
    path: &str,
    doc: &MemoryDocument,
    tag: Option<&VersionTag>,
) -> Result<WriteOutcome> {
    let body = doc.to_json()?;
    store
        .write(path, &body, &commit_message(doc.cycle_count), tag)
        .with_context(|| format!("write memory {path}"))
}
