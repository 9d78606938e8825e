//! Prompt rendering for the oracle call.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::text::truncate_chars;
use crate::core::types::{Directive, MemoryDocument};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

/// Recent thoughts quoted in the prompt.
pub const RECENT_THOUGHTS: usize = 3;
/// Characters kept per quoted thought.
pub const RECENT_THOUGHT_CHARS: usize = 80;
const RECENT_INSIGHTS: usize = 3;

/// Everything the templates need for one cycle.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub cycle: u64,
    pub now: DateTime<Utc>,
    pub topic: &'a str,
    pub directive: Option<&'a Directive>,
    pub doc: &'a MemoryDocument,
    /// Exact paths and directory prefixes the model may write to.
    pub allowed: Vec<String>,
    pub self_paths: Vec<String>,
    pub confidence_floor: u8,
    pub self_modify_floor: u8,
    pub max_actions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Serialize)]
struct DirectiveContext {
    id: String,
    title: String,
    body: String,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("user", USER_TEMPLATE)
            .expect("user template should be valid");
        Self { env }
    }

    fn render(&self, input: &PromptInputs<'_>) -> Result<RenderedPrompt> {
        let system = self.env.get_template("system")?.render(context! {
            allowed => &input.allowed,
            self_paths => &input.self_paths,
            confidence_floor => input.confidence_floor,
            self_modify_floor => input.self_modify_floor,
            max_actions => input.max_actions,
        })?;
        let directive = input.directive.map(|d| DirectiveContext {
            id: d.id(),
            title: d.title.trim().to_string(),
            body: d.body.trim().to_string(),
        });
        let user = self.env.get_template("user")?.render(context! {
            cycle => input.cycle,
            now => input.now.to_rfc3339_opts(SecondsFormat::Secs, true),
            topic => input.topic,
            directive => directive,
            recent => recent_thoughts(input.doc),
            insights => recent_insights(input.doc),
        })?;
        Ok(RenderedPrompt { system, user })
    }
}

/// Last few thoughts, oldest first, each shortened to one line.
fn recent_thoughts(doc: &MemoryDocument) -> Vec<String> {
    let skip = doc.thoughts.len().saturating_sub(RECENT_THOUGHTS);
    doc.thoughts[skip..]
        .iter()
        .map(|t| {
            let line = t.thought.replace('\n', " ");
            format!("[{}] {}", t.topic, truncate_chars(line.trim(), RECENT_THOUGHT_CHARS))
        })
        .collect()
}

fn recent_insights(doc: &MemoryDocument) -> Vec<String> {
    let skip = doc.insights.len().saturating_sub(RECENT_INSIGHTS);
    doc.insights[skip..]
        .iter()
        .map(|i| truncate_chars(&i.insight.replace('\n', " "), RECENT_THOUGHT_CHARS))
        .collect()
}

pub fn render_prompt(input: &PromptInputs<'_>) -> Result<RenderedPrompt> {
    let rendered = PromptEngine::new().render(input)?;
    debug!(
        system_chars = rendered.system.len(),
        user_chars = rendered.user.len(),
        "rendered prompt"
    );
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DirectiveSource, ThoughtEntry, ThoughtSource};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap()
    }

    fn entry(i: u64) -> ThoughtEntry {
        ThoughtEntry {
            timestamp: now(),
            cycle: i,
            topic: format!("topic-{i}"),
            source: ThoughtSource::Mission,
            directive_id: None,
            thought: format!("thought {i} {}", "z".repeat(200)),
            score: 5,
            confidence: 0,
            tokens: None,
            actions: Vec::new(),
        }
    }

    fn inputs<'a>(doc: &'a MemoryDocument, directive: Option<&'a Directive>) -> PromptInputs<'a> {
        PromptInputs {
            cycle: 7,
            now: now(),
            topic: "Revenue acceleration",
            directive,
            doc,
            allowed: vec!["docs/".to_string()],
            self_paths: vec!["thinkloop/src/main.rs".to_string()],
            confidence_floor: 8,
            self_modify_floor: 10,
            max_actions: 3,
        }
    }

    #[test]
    fn user_prompt_quotes_last_three_thoughts() {
        let doc = MemoryDocument {
            thoughts: (1..=5).map(entry).collect(),
            ..MemoryDocument::default()
        };
        let prompt = render_prompt(&inputs(&doc, None)).expect("render");
        assert!(prompt.user.contains("Cycle 7 at 2026-10-19T09:30:00Z"));
        assert!(prompt.user.contains("Mission: Revenue acceleration"));
        assert!(!prompt.user.contains("topic-2"));
        assert!(prompt.user.contains("[topic-3]"));
        assert!(prompt.user.contains("[topic-5]"));
        assert!(!prompt.user.contains(&"z".repeat(RECENT_THOUGHT_CHARS)));
    }

    #[test]
    fn directive_replaces_mission() {
        let doc = MemoryDocument::default();
        let directive = Directive {
            source: DirectiveSource::Issue { number: 42 },
            title: "Draft the FAQ".to_string(),
            body: "Cover pricing.".to_string(),
        };
        let prompt = render_prompt(&inputs(&doc, Some(&directive))).expect("render");
        assert!(prompt.user.contains("Operator directive (issue:42): Draft the FAQ"));
        assert!(prompt.user.contains("Cover pricing."));
        assert!(!prompt.user.contains("Mission:"));
    }

    #[test]
    fn system_prompt_states_gates() {
        let doc = MemoryDocument::default();
        let prompt = render_prompt(&inputs(&doc, None)).expect("render");
        assert!(prompt.system.contains("at least 8"));
        assert!(prompt.system.contains("`docs/`"));
        assert!(prompt.system.contains("requires confidence 10"));
    }
}
