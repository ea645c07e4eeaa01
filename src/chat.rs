//! Prompt assembly and per-project conversation history.
//!
//! Retrieved passages are folded into a bounded system prompt in rank order;
//! the passage list returned alongside the prompt is exactly the list that
//! made it into the prompt, in the same order, so citations always match
//! what the model actually saw.

use std::collections::HashMap;

use crate::models::{ConversationTurn, RetrievedPassage, Role, SourceRef};

/// Fixed instruction preamble for every grounded completion.
pub const SYSTEM_PREAMBLE: &str = "You are a careful assistant answering questions about a user's \
uploaded documents. Ground every statement in the context passages below. If the passages do not \
contain the answer, say so instead of guessing.";

/// The assembled prompt plus the passages that were actually included.
#[derive(Debug)]
pub struct AssembledPrompt {
    pub system: String,
    /// Passages included in the prompt, in prompt order.
    pub passages: Vec<RetrievedPassage>,
}

/// Build the system prompt from ranked passages, keeping their total text
/// under `max_context_chars`. Passages are taken in rank order; the first
/// passage that would overflow the budget is dropped along with everything
/// after it, so the included set is always a rank-order prefix.
pub fn assemble_prompt(passages: Vec<RetrievedPassage>, max_context_chars: usize) -> AssembledPrompt {
    let mut system = String::from(SYSTEM_PREAMBLE);
    system.push_str("\n\nContext passages:\n");

    let mut included = Vec::new();
    let mut used_chars = 0usize;

    for passage in passages {
        let chars = passage.text.chars().count();
        if used_chars + chars > max_context_chars && !included.is_empty() {
            break;
        }
        used_chars += chars;
        system.push_str(&format!("[passage {}] {}\n", included.len() + 1, passage.text));
        included.push(passage);
    }

    AssembledPrompt {
        system,
        passages: included,
    }
}

/// In-memory, session-local conversation history keyed by project id.
/// Cleared explicitly; never persisted.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: HashMap<String, Vec<ConversationTurn>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_user(&mut self, project_id: &str, text: &str) {
        self.turns
            .entry(project_id.to_string())
            .or_default()
            .push(ConversationTurn {
                role: Role::User,
                text: text.to_string(),
                sources: Vec::new(),
            });
    }

    pub fn record_assistant(&mut self, project_id: &str, text: &str, sources: Vec<SourceRef>) {
        self.turns
            .entry(project_id.to_string())
            .or_default()
            .push(ConversationTurn {
                role: Role::Assistant,
                text: text.to_string(),
                sources,
            });
    }

    pub fn history(&self, project_id: &str) -> &[ConversationTurn] {
        self.turns.get(project_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self, project_id: &str) {
        self.turns.remove(project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Span;

    fn passage(id: &str, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            snippet_id: id.to_string(),
            document_id: "d1".to_string(),
            span: Span::new(0, text.chars().count()),
            text: text.to_string(),
            similarity: 0.9,
        }
    }

    #[test]
    fn prompt_contains_preamble_and_passages_in_order() {
        let prompt = assemble_prompt(
            vec![passage("s1", "first passage"), passage("s2", "second passage")],
            1000,
        );
        assert!(prompt.system.starts_with(SYSTEM_PREAMBLE));
        let p1 = prompt.system.find("[passage 1] first passage").unwrap();
        let p2 = prompt.system.find("[passage 2] second passage").unwrap();
        assert!(p1 < p2);
        assert_eq!(prompt.passages.len(), 2);
        assert_eq!(prompt.passages[0].snippet_id, "s1");
    }

    #[test]
    fn context_budget_truncates_to_a_rank_prefix() {
        let prompt = assemble_prompt(
            vec![
                passage("s1", "0123456789"),
                passage("s2", "0123456789"),
                passage("s3", "0123456789"),
            ],
            20,
        );
        assert_eq!(prompt.passages.len(), 2);
        assert!(!prompt.system.contains("[passage 3]"));
    }

    #[test]
    fn at_least_one_passage_survives_a_tiny_budget() {
        let prompt = assemble_prompt(vec![passage("s1", "a very long passage text")], 5);
        assert_eq!(prompt.passages.len(), 1);
    }

    #[test]
    fn log_records_and_clears_per_project() {
        let mut log = ConversationLog::new();
        log.record_user("p1", "hello");
        log.record_assistant(
            "p1",
            "answer",
            vec![SourceRef {
                document_id: "d1".to_string(),
                span: Span::new(0, 4),
            }],
        );
        log.record_user("p2", "other project");

        assert_eq!(log.history("p1").len(), 2);
        assert_eq!(log.history("p1")[1].role, Role::Assistant);
        assert_eq!(log.history("p1")[1].sources.len(), 1);

        log.clear("p1");
        assert!(log.history("p1").is_empty());
        assert_eq!(log.history("p2").len(), 1);
    }
}
