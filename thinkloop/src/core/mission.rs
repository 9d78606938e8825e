//! Deterministic topic selection for a cycle.

use crate::core::types::{Directive, MemoryDocument};

/// Topic used when the mission list is empty and no directive is pending.
pub const FALLBACK_TOPIC: &str = "Open reflection";

/// What the cycle will think about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// An operator directive overrides rotation.
    Directive { topic: String },
    /// Rotated mission at `index`.
    Mission { index: usize, topic: String },
    /// The rotated mission repeats the most recent entry; skip the cycle.
    Duplicate { topic: String },
}

impl Selection {
    pub fn topic(&self) -> &str {
        match self {
            Selection::Directive { topic }
            | Selection::Mission { topic, .. }
            | Selection::Duplicate { topic } => topic,
        }
    }
}

/// Pick the topic for this cycle.
///
/// Rotation index is `history_length % missions.len()`, where history length
/// counts evicted entries so rotation keeps advancing once the history is capped.
pub fn select(doc: &MemoryDocument, missions: &[String], directive: Option<&Directive>) -> Selection {
    if let Some(directive) = directive {
        return Selection::Directive {
            topic: directive_topic(directive),
        };
    }

    let (index, topic) = rotated_mission(doc, missions);
    let repeats_last = doc
        .last_thought()
        .is_some_and(|last| last.topic == topic);
    if repeats_last {
        return Selection::Duplicate { topic };
    }
    Selection::Mission { index, topic }
}

fn rotated_mission(doc: &MemoryDocument, missions: &[String]) -> (usize, String) {
    if missions.is_empty() {
        return (0, FALLBACK_TOPIC.to_string());
    }
    let index = (doc.history_length() % missions.len() as u64) as usize;
    (index, missions[index].clone())
}

fn directive_topic(directive: &Directive) -> String {
    let title = directive.title.trim();
    if title.is_empty() {
        format!("Directive {}", directive.id())
    } else {
        format!("Directive: {title}")
    }
}

/// First polled directive that has not been consumed by an earlier cycle.
pub fn select_directive(candidates: Vec<Directive>, seen: &[String]) -> Option<Directive> {
    candidates
        .into_iter()
        .find(|candidate| !seen.contains(&candidate.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DirectiveSource, ThoughtEntry, ThoughtSource};
    use chrono::{TimeZone, Utc};

    fn missions() -> Vec<String> {
        ["alpha", "beta", "gamma"]
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    fn entry(topic: &str) -> ThoughtEntry {
        ThoughtEntry {
            timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap(),
            cycle: 1,
            topic: topic.to_string(),
            source: ThoughtSource::Mission,
            directive_id: None,
            thought: "t".to_string(),
            score: 5,
            confidence: 0,
            tokens: None,
            actions: Vec::new(),
        }
    }

    fn directive(number: u64) -> Directive {
        Directive {
            source: DirectiveSource::Issue { number },
            title: "Ship the landing page".to_string(),
            body: "today".to_string(),
        }
    }

    #[test]
    fn empty_history_selects_first_mission() {
        let doc = MemoryDocument::default();
        assert_eq!(
            select(&doc, &missions(), None),
            Selection::Mission {
                index: 0,
                topic: "alpha".to_string()
            }
        );
    }

    #[test]
    fn rotation_counts_compacted_entries() {
        let doc = MemoryDocument {
            compacted_count: 4,
            thoughts: vec![entry("gamma")],
            ..MemoryDocument::default()
        };
        // history length 5 -> index 2 ("gamma") repeats the last entry.
        assert_eq!(
            select(&doc, &missions(), None),
            Selection::Duplicate {
                topic: "gamma".to_string()
            }
        );
    }

    #[test]
    fn directive_overrides_duplicate_skip() {
        let doc = MemoryDocument {
            thoughts: vec![entry("beta")],
            ..MemoryDocument::default()
        };
        let single = vec!["beta".to_string()];
        assert!(matches!(
            select(&doc, &single, None),
            Selection::Duplicate { .. }
        ));
        let selection = select(&doc, &single, Some(&directive(7)));
        assert_eq!(
            selection,
            Selection::Directive {
                topic: "Directive: Ship the landing page".to_string()
            }
        );
    }

    #[test]
    fn seen_directives_are_skipped() {
        let picked = select_directive(
            vec![directive(1), directive(2)],
            &["issue:1".to_string()],
        )
        .expect("directive");
        assert_eq!(picked.id(), "issue:2");
    }

    #[test]
    fn empty_mission_list_falls_back() {
        let doc = MemoryDocument::default();
        assert_eq!(select(&doc, &[], None).topic(), FALLBACK_TOPIC);
    }
}
