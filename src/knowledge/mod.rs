//! Knowledge base of categorized facts that ground the bot's answers.

pub mod model;

pub use model::{FactCategory, KnowledgeEntry, PendingFact};

/// Render the knowledge base as labeled prompt lines, one fact per line.
pub fn render_for_prompt(entries: &[KnowledgeEntry]) -> String {
    entries
        .iter()
        .map(KnowledgeEntry::as_prompt_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_lines() {
        let entries = vec![
            KnowledgeEntry::new(FactCategory::Author, "Bio", "Ten years in design"),
            KnowledgeEntry::new(FactCategory::Rules, "Pricing", "Never quote prices"),
        ];
        assert_eq!(
            render_for_prompt(&entries),
            "[AUTHOR] Bio: Ten years in design\n[RULES] Pricing: Never quote prices"
        );
        assert_eq!(render_for_prompt(&[]), "");
    }
}
