//! Canned replies and the prompts sent to the completion service.

use crate::catalog::ContentItem;
use crate::knowledge::{self, FactCategory, KnowledgeEntry};
use crate::store::{HistoryRole, HistoryTurn};

pub const GREETING: &str = "Welcome! How can I help you today?";
pub const APOLOGY: &str = "I'm having trouble thinking right now. Please try again later.";

/// Reply-keyboard labels. Matched literally against inbound text.
pub const TALK_LABEL: &str = "💬 Talk to me";
pub const MATERIALS_LABEL: &str = "🎁 My materials";
pub const ADMIN_PANEL_LABEL: &str = "Admin Panel";

pub const TALK_REPLY: &str = "I'm listening! Ask me anything.";
pub const NO_MATERIALS_REPLY: &str = "You have not received any materials yet.";
pub const MENU_PROMPT: &str = "Anything else? The menu below is always here for you.";

pub const LEARNING_ON: &str = "🧠 Learning mode is on. Tell me about yourself, your products, \
your rules. I will suggest facts for you to approve. Send /learn again to stop.";
pub const LEARNING_OFF: &str = "Learning mode is off. Back to normal chat.";
pub const LEARNING_REMINDER: &str = "You are still in learning mode. Send /learn to leave it.";
pub const LEARNING_BLOCKED: &str =
    "Let's finish picking your first material before switching to learning mode.";
pub const NO_FACTS: &str = "I didn't find any facts in that message.";

/// Labeled list of materials the contact already received.
pub fn materials_list(items: &[ContentItem]) -> String {
    let mut out = String::from("Your materials:\n");
    for item in items {
        out.push_str("\n• ");
        out.push_str(&item.name);
    }
    out
}

/// Default chat prompt: instruction, knowledge, history, then the new message.
pub fn chat_prompt(
    system: &str,
    facts: &[KnowledgeEntry],
    history: &[HistoryTurn],
    message: &str,
) -> String {
    let mut prompt = String::from(system.trim());

    if !facts.is_empty() {
        prompt.push_str("\n\nFacts you know:\n");
        prompt.push_str(&knowledge::render_for_prompt(facts));
    }
    push_history(&mut prompt, history);
    prompt.push_str("\n\nUser: ");
    prompt.push_str(message);
    prompt.push_str("\nAssistant:");
    prompt
}

/// First onboarding question. Only names and descriptions leave the catalog.
pub fn discovery_prompt(catalog: &[ContentItem]) -> String {
    let mut prompt = String::from(
        "You are welcoming a new visitor on behalf of an expert who shares free materials.\n\
         For your reference only, these materials exist:\n",
    );
    for item in catalog {
        prompt.push_str(&format!("- {}: {}\n", item.name, item.description));
    }
    prompt.push_str(
        "\nAsk exactly ONE short, friendly clarifying question to find out what the visitor \
         needs right now. Do NOT list, name or describe the materials unless the visitor \
         asks to see them.",
    );
    prompt
}

/// Per-message onboarding prompt with the three permitted output shapes.
pub fn onboarding_prompt(catalog: &[ContentItem], history: &[HistoryTurn], message: &str) -> String {
    let mut prompt = String::from(
        "You help a new visitor pick the single most useful free material.\n\nMaterials:\n",
    );
    for item in catalog {
        prompt.push_str(&format!(
            "- id: {} | {}: {}\n",
            item.trigger_id, item.name, item.description
        ));
    }
    prompt.push_str(
        "\nDo exactly one of the following:\n\
         1. If you are confident which material fits best, reply with ONLY this JSON object: \
         {\"recommendation\": \"<id>\", \"reason\": \"<one or two sentences addressed to the visitor>\"}\n\
         2. If the visitor explicitly asked to see everything, list the materials in plain language.\n\
         3. Otherwise ask ONE short clarifying question in plain text.",
    );
    push_history(&mut prompt, history);
    prompt.push_str("\n\nUser: ");
    prompt.push_str(message);
    prompt.push_str("\nAssistant:");
    prompt
}

/// Fact extraction prompt. The operator's message is sent alone.
pub fn extraction_prompt(message: &str) -> String {
    let categories = FactCategory::ALL
        .iter()
        .map(FactCategory::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Extract up to 3 standalone facts from the text below that an assistant could use to \
         answer questions on the author's behalf.\n\
         Return ONLY a JSON array of objects {{\"category\", \"title\", \"content\"}}. \
         category is one of: {categories}. title is at most 60 characters. \
         Return [] if the text holds no useful facts.\n\n\
         Text:\n{message}"
    )
}

/// How a proposed fact is shown to the operator.
pub fn render_fact(category: FactCategory, title: &str, content: &str) -> String {
    format!("📌 {}\n\n{title}\n{content}", category.label())
}

fn push_history(prompt: &mut String, history: &[HistoryTurn]) {
    if history.is_empty() {
        return;
    }
    prompt.push_str("\n\nChat history:");
    for turn in history {
        let speaker = match turn.role {
            HistoryRole::User => "User",
            HistoryRole::Assistant => "Assistant",
        };
        prompt.push_str(&format!("\n{speaker}: {}", turn.text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ContentKind;
    use chrono::Utc;

    fn turn(role: HistoryRole, text: &str) -> HistoryTurn {
        HistoryTurn {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn chat_prompt_sections_in_order() {
        let knowledge = vec![KnowledgeEntry::new(FactCategory::Faq, "Refunds", "14 days")];
        let history = vec![turn(HistoryRole::User, "hi"), turn(HistoryRole::Assistant, "hello")];
        let prompt = chat_prompt("Be kind.", &knowledge, &history, "refund?");

        let system = prompt.find("Be kind.").unwrap();
        let facts = prompt.find("[FAQ] Refunds: 14 days").unwrap();
        let past = prompt.find("User: hi\nAssistant: hello").unwrap();
        let new = prompt.rfind("User: refund?").unwrap();
        assert!(system < facts && facts < past && past < new);
        assert!(prompt.ends_with("Assistant:"));
    }

    #[test]
    fn chat_prompt_skips_empty_sections() {
        let prompt = chat_prompt("Sys", &[], &[], "q");
        assert_eq!(prompt, "Sys\n\nUser: q\nAssistant:");
    }

    #[test]
    fn discovery_prompt_never_leaks_payloads() {
        let catalog = vec![
            ContentItem::new("promo1", "Checklist", ContentKind::Link, "https://secret.example/x")
                .with_description("Launch steps"),
        ];
        let prompt = discovery_prompt(&catalog);
        assert!(prompt.contains("Checklist: Launch steps"));
        assert!(!prompt.contains("secret.example"));
        assert!(!prompt.contains("promo1"));
    }

    #[test]
    fn onboarding_prompt_lists_trigger_ids() {
        let catalog = vec![ContentItem::new("promo1", "Checklist", ContentKind::Text, "SECRET-PAYLOAD")];
        let prompt = onboarding_prompt(&catalog, &[], "I want to launch");
        assert!(prompt.contains("id: promo1"));
        assert!(!prompt.contains("SECRET-PAYLOAD"));
        assert!(prompt.contains("User: I want to launch"));
    }

    #[test]
    fn extraction_prompt_names_every_category() {
        let prompt = extraction_prompt("I run a six week course.");
        for category in FactCategory::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.ends_with("I run a six week course."));
    }
}
