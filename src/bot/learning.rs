//! Learning mode: operator speech is mined for facts, each one offered for
//! approval with a pair of buttons.
//!
//! Proposed facts are stored in `pending_facts` under a UUID and the buttons
//! carry only that id (`fact:ok:<id>` / `fact:no:<id>`). A decision takes the
//! row atomically, so pressing a button twice is harmless.

use serde::Deserialize;
use uuid::Uuid;

use crate::bot::{BotContext, prompts};
use crate::channels::{Button, Keyboard};
use crate::contacts::Contact;
use crate::knowledge::{FactCategory, PendingFact};
use crate::llm::structured::extract_json_array;
use crate::store::{AuditEvent, AuditKind};

/// Most facts proposed for one message.
pub const MAX_FACTS_PER_MESSAGE: usize = 3;

const ACCEPT_PREFIX: &str = "fact:ok:";
const REJECT_PREFIX: &str = "fact:no:";

#[derive(Debug, Deserialize)]
struct RawFact {
    category: String,
    title: String,
    content: String,
}

/// An operator's answer to a proposed fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(Uuid),
    Reject(Uuid),
}

impl Decision {
    /// Parse button callback data. Returns `None` for anything else.
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(id) = data.strip_prefix(ACCEPT_PREFIX) {
            return Uuid::parse_str(id).ok().map(Self::Accept);
        }
        if let Some(id) = data.strip_prefix(REJECT_PREFIX) {
            return Uuid::parse_str(id).ok().map(Self::Reject);
        }
        None
    }

    fn id(&self) -> Uuid {
        match self {
            Self::Accept(id) | Self::Reject(id) => *id,
        }
    }
}

/// Accept/reject buttons for a pending fact.
pub fn decision_keyboard(id: Uuid) -> Keyboard {
    Keyboard::Inline(vec![vec![
        Button::callback("✅ Save", format!("{ACCEPT_PREFIX}{id}")),
        Button::callback("❌ Skip", format!("{REJECT_PREFIX}{id}")),
    ]])
}

/// Keep well-formed facts with a known category, at most three.
fn sanitize(raw: Vec<RawFact>) -> Vec<(FactCategory, String, String)> {
    raw.into_iter()
        .filter_map(|fact| {
            let category = match fact.category.parse::<FactCategory>() {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!("Dropping extracted fact: {e}");
                    return None;
                }
            };
            let title = fact.title.trim().to_string();
            let content = fact.content.trim().to_string();
            (!title.is_empty() && !content.is_empty()).then_some((category, title, content))
        })
        .take(MAX_FACTS_PER_MESSAGE)
        .collect()
}

/// Toggle learning mode for an operator.
pub(crate) async fn toggle(ctx: &BotContext, contact: &Contact, chat_id: &str) {
    let contact_id = contact.id();
    let next = match contact.mode.toggle_learning() {
        Ok(next) => next,
        Err(e) => {
            tracing::info!(contact_id, "Learning toggle refused: {e}");
            ctx.reply(contact_id, chat_id, prompts::LEARNING_BLOCKED, None).await;
            return;
        }
    };

    if !ctx.set_mode(contact_id, contact.mode, next).await {
        ctx.reply(contact_id, chat_id, prompts::APOLOGY, None).await;
        return;
    }

    let (text, details) = match next {
        crate::contacts::ContactMode::Learning => (prompts::LEARNING_ON, "learning mode on"),
        _ => (prompts::LEARNING_OFF, "learning mode off"),
    };
    ctx.audit(AuditEvent::new(AuditKind::AdminAction, details).for_contact(contact_id))
        .await;
    ctx.reply(contact_id, chat_id, text, None).await;
}

/// Extract facts from one operator message and offer each for approval.
/// Returns how many facts were offered.
pub(crate) async fn handle_message(
    ctx: &BotContext,
    contact: &Contact,
    chat_id: &str,
    text: &str,
) -> usize {
    let contact_id = contact.id();

    let Some(completion) = ctx
        .complete(contact_id, "fact extraction", &prompts::extraction_prompt(text))
        .await
    else {
        ctx.reply(contact_id, chat_id, prompts::APOLOGY, None).await;
        return 0;
    };

    let facts = match extract_json_array::<Vec<RawFact>>(&completion) {
        Some(raw) => sanitize(raw),
        None => {
            tracing::warn!(contact_id, "Fact extraction returned no JSON array");
            Vec::new()
        }
    };

    if facts.is_empty() {
        ctx.reply(contact_id, chat_id, prompts::NO_FACTS, None).await;
        return 0;
    }

    let mut offered = 0;
    for (category, title, content) in facts {
        let fact = PendingFact::new(contact_id, category, title, content);
        if let Err(e) = ctx.db.insert_pending_fact(&fact).await {
            tracing::warn!(contact_id, "Failed to store pending fact: {e}");
            continue;
        }
        let rendered = prompts::render_fact(fact.category, &fact.title, &fact.content);
        if ctx
            .reply(contact_id, chat_id, &rendered, Some(&decision_keyboard(fact.id)))
            .await
            .is_some()
        {
            offered += 1;
        }
    }
    offered
}

/// Apply an accept/reject button press.
pub(crate) async fn decide(
    ctx: &BotContext,
    operator_id: &str,
    chat_id: &str,
    message_id: i64,
    callback_id: &str,
    decision: Decision,
) {
    let toast = match ctx.db.take_pending_fact(decision.id()).await {
        Ok(Some(fact)) => match decision {
            Decision::Accept(_) => accept(ctx, operator_id, fact).await,
            Decision::Reject(_) => {
                tracing::info!(operator_id, fact_id = %fact.id, "Fact rejected");
                Some("Skipped")
            }
        },
        Ok(None) => Some("Already handled"),
        Err(e) => {
            tracing::warn!(operator_id, "Failed to load pending fact: {e}");
            None
        }
    };

    // Keep the buttons when the decision could not be applied so it can be retried.
    if toast.is_some() {
        if let Err(e) = ctx.platform.edit_message_controls(chat_id, message_id, None).await {
            tracing::warn!(chat_id, message_id, "Failed to remove decision buttons: {e}");
        }
    }

    let text = toast.unwrap_or("Something went wrong, please try again");
    if let Err(e) = ctx.platform.answer_callback(callback_id, Some(text)).await {
        tracing::warn!(callback_id, "Failed to answer callback: {e}");
    }
}

/// Persist an accepted fact. On failure the pending row is put back.
async fn accept(ctx: &BotContext, operator_id: &str, fact: PendingFact) -> Option<&'static str> {
    let entry = fact.clone().into_entry();
    match ctx.db.insert_knowledge(&entry).await {
        Ok(()) => {
            tracing::info!(operator_id, entry_id = %entry.id, category = entry.category.as_str(), "Fact saved");
            ctx.audit(
                AuditEvent::new(AuditKind::AdminAction, format!("fact saved: {}", entry.title))
                    .for_contact(operator_id)
                    .with_metadata(serde_json::json!({
                        "category": entry.category.as_str(),
                        "entry_id": entry.id,
                    })),
            )
            .await;
            Some("Saved")
        }
        Err(e) => {
            tracing::warn!(operator_id, "Failed to save fact: {e}");
            if let Err(e) = ctx.db.insert_pending_fact(&fact).await {
                tracing::warn!(operator_id, fact_id = %fact.id, "Failed to restore pending fact: {e}");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(category: &str, title: &str, content: &str) -> RawFact {
        RawFact {
            category: category.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    #[test]
    fn decision_parse() {
        let id = Uuid::new_v4();
        assert_eq!(Decision::parse(&format!("fact:ok:{id}")), Some(Decision::Accept(id)));
        assert_eq!(Decision::parse(&format!("fact:no:{id}")), Some(Decision::Reject(id)));
        assert_eq!(Decision::parse("fact:ok:not-a-uuid"), None);
        assert_eq!(Decision::parse("menu:open"), None);
    }

    #[test]
    fn keyboard_carries_only_the_id() {
        let id = Uuid::new_v4();
        let Keyboard::Inline(rows) = decision_keyboard(id) else {
            panic!("expected inline keyboard");
        };
        let data: Vec<_> = rows[0]
            .iter()
            .map(|b| match b {
                Button::Callback { data, .. } => data.clone(),
                Button::Url { .. } => panic!("unexpected url button"),
            })
            .collect();
        assert_eq!(data, vec![format!("fact:ok:{id}"), format!("fact:no:{id}")]);
        // Telegram caps callback data at 64 bytes.
        assert!(data.iter().all(|d| d.len() <= 64));
    }

    #[test]
    fn sanitize_skips_unknown_categories_and_caps_count() {
        let facts = sanitize(vec![
            raw("gossip", "x", "y"),
            raw("Product", "Course", "Six weeks"),
            raw("faq", " ", "empty title"),
            raw("author", "Bio", "Designer"),
            raw("tone", "Voice", "Warm"),
            raw("rules", "Never", "Quote prices"),
        ]);
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0], (FactCategory::Product, "Course".into(), "Six weeks".into()));
        assert_eq!(facts[2].0, FactCategory::Tone);
    }
}
