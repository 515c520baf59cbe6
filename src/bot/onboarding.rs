//! Onboarding: first-contact needs discovery ending in one recommendation.
//!
//! The only way out of the loop is a structurally valid
//! `{recommendation, reason}` object that names an active item. Anything
//! else the model says is relayed as a plain reply and the mode stays on.

use serde::Deserialize;

use crate::bot::{BotContext, delivery, prompts};
use crate::catalog::ContentItem;
use crate::contacts::Contact;
use crate::store::HistoryTurn;

#[derive(Debug, Deserialize)]
struct Recommendation {
    recommendation: String,
    reason: String,
}

/// What one onboarding turn did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingOutcome {
    /// A question or listing was relayed; still onboarding.
    Continued,
    /// An item was recommended and delivered; onboarding is over.
    Recommended { trigger_id: String },
    /// The catalog is empty; onboarding was dropped and nothing was sent.
    Abandoned,
    /// The completion failed; an apology was sent.
    Failed,
}

/// Enter onboarding on a bare `/start` and ask the first discovery question.
pub(crate) async fn start(ctx: &BotContext, contact: &Contact, chat_id: &str, catalog: &[ContentItem]) {
    let contact_id = contact.id();

    match contact.mode.start_onboarding() {
        Ok(next) => {
            ctx.set_mode(contact_id, contact.mode, next).await;
        }
        Err(e) => {
            tracing::warn!(contact_id, "Not entering onboarding: {e}");
            return;
        }
    }

    ctx.reply(contact_id, chat_id, prompts::GREETING, None).await;

    let question = ctx
        .complete(contact_id, "discovery", &prompts::discovery_prompt(catalog))
        .await;
    let text = question.as_deref().unwrap_or(prompts::APOLOGY);
    ctx.reply(contact_id, chat_id, text, None).await;
}

/// Handle one message from a contact in onboarding mode.
pub(crate) async fn handle_message(
    ctx: &BotContext,
    contact: &Contact,
    chat_id: &str,
    history: &[HistoryTurn],
    text: &str,
) -> OnboardingOutcome {
    let contact_id = contact.id();

    let catalog = match ctx.db.list_active_items().await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(contact_id, "Failed to load catalog for onboarding: {e}");
            ctx.reply(contact_id, chat_id, prompts::APOLOGY, None).await;
            return OnboardingOutcome::Failed;
        }
    };

    if catalog.is_empty() {
        abandon(ctx, contact).await;
        return OnboardingOutcome::Abandoned;
    }

    let prompt = prompts::onboarding_prompt(&catalog, history, text);
    let Some(completion) = ctx.complete(contact_id, "onboarding", &prompt).await else {
        ctx.reply(contact_id, chat_id, prompts::APOLOGY, None).await;
        return OnboardingOutcome::Failed;
    };

    let picked = crate::llm::structured::extract_json_object::<Recommendation>(&completion)
        .and_then(|rec| {
            catalog
                .iter()
                .find(|item| item.active && item.trigger_id == rec.recommendation.trim())
                .map(|item| (item, rec.reason))
        });

    let Some((item, reason)) = picked else {
        ctx.reply(contact_id, chat_id, &completion, None).await;
        return OnboardingOutcome::Continued;
    };

    tracing::info!(contact_id, trigger = %item.trigger_id, "Onboarding recommended an item");
    if !reason.trim().is_empty() {
        ctx.reply(contact_id, chat_id, reason.trim(), None).await;
    }
    delivery::deliver(ctx, contact, chat_id, item).await;

    match contact.mode.finish_onboarding() {
        Ok(next) => {
            ctx.set_mode(contact_id, contact.mode, next).await;
        }
        Err(e) => tracing::warn!(contact_id, "Cannot finish onboarding: {e}"),
    }

    OnboardingOutcome::Recommended {
        trigger_id: item.trigger_id.clone(),
    }
}

/// Drop out of onboarding when there is nothing to recommend.
pub(crate) async fn abandon(ctx: &BotContext, contact: &Contact) {
    match contact.mode.abandon_onboarding() {
        Ok(next) => {
            tracing::info!(contact_id = contact.id(), "Catalog is empty; leaving onboarding");
            ctx.set_mode(contact.id(), contact.mode, next).await;
        }
        Err(e) => tracing::debug!(contact_id = contact.id(), "Nothing to abandon: {e}"),
    }
}
