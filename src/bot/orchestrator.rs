//! Per-event decision logic.
//!
//! Every inbound event runs under its contact's lock: the contact record is
//! upserted, then the event is routed by the first matching rule:
//!
//! 1. `/start <trigger>` naming an active item delivers it, whatever the mode.
//! 2. A bare `/start` enters onboarding, or greets when the catalog is empty.
//! 3. The menu labels get static answers.
//! 4. `/learn` from an operator toggles learning mode.
//! 5. Onboarding and learning contacts go to their mode handler.
//! 6. Everything else is default chat.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;

use crate::bot::command::Command;
use crate::bot::learning::{self, Decision};
use crate::bot::{BotContext, BotDeps, delivery, main_menu, onboarding, prompts};
use crate::catalog::ContentItem;
use crate::channels::telegram::EventStream;
use crate::channels::InboundEvent;
use crate::config::{BotConfig, DEFAULT_SYSTEM_PROMPT, settings_keys};
use crate::contacts::{Contact, ContactLocks, ContactMode};
use crate::error::DatabaseError;
use crate::store::{AuditEvent, AuditKind, HistoryRole, HistoryTurn};

/// Routes inbound events to the mode handlers.
pub struct Orchestrator {
    ctx: BotContext,
    locks: ContactLocks,
}

impl Orchestrator {
    pub fn new(deps: BotDeps, config: BotConfig) -> Self {
        Self {
            ctx: BotContext::new(deps, config),
            locks: ContactLocks::new(),
        }
    }

    /// Handle events until the stream ends. Each event runs on its own task;
    /// events from the same contact still run one at a time.
    pub async fn run(self: Arc<Self>, mut events: EventStream) {
        tracing::info!("Orchestrator ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        tracing::info!("Update stream ended, shutting down...");
                        break;
                    }
                },
            };

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = this.handle(event).await {
                    tracing::error!("Error handling event: {e}");
                }
            });
        }
    }

    /// Handle one inbound event.
    ///
    /// Only a failure to load the contact record is returned; everything past
    /// that point degrades to a logged, user-visible fallback.
    pub async fn handle(&self, event: InboundEvent) -> Result<(), DatabaseError> {
        let _guard = self.locks.acquire(&event.sender().id).await;
        let contact = self.ctx.db.upsert_contact(event.sender(), Utc::now()).await?;

        match event {
            InboundEvent::Message { chat_id, text, .. } => {
                self.handle_text(&contact, &chat_id, &text).await;
            }
            InboundEvent::Callback {
                chat_id,
                message_id,
                callback_id,
                data,
                ..
            } => {
                self.handle_callback(&contact, &chat_id, message_id, &callback_id, &data)
                    .await;
            }
        }
        Ok(())
    }

    async fn handle_text(&self, contact: &Contact, chat_id: &str, text: &str) {
        let ctx = &self.ctx;
        let contact_id = contact.id();

        // Read history before logging this turn so the prompt does not repeat it.
        let history = match ctx.db.recent_history(contact_id, ctx.config.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(contact_id, "Failed to load history: {e}");
                Vec::new()
            }
        };
        ctx.log_turn(contact_id, HistoryRole::User, text).await;

        let is_operator = ctx.authorizer.is_operator(&contact.profile);
        tracing::debug!(contact_id, mode = %contact.mode, is_operator, "Inbound message");

        match Command::parse(text) {
            Command::Start { payload } => {
                if let Some(item) = self.resolve_trigger(payload.as_deref()).await {
                    delivery::deliver(ctx, contact, chat_id, &item).await;
                    return;
                }
                self.bare_start(contact, chat_id, is_operator).await;
            }
            Command::Talk => {
                ctx.reply(contact_id, chat_id, prompts::TALK_REPLY, None).await;
            }
            Command::Materials => self.list_materials(contact, chat_id).await,
            Command::Learn if is_operator => learning::toggle(ctx, contact, chat_id).await,
            Command::Learn | Command::Text => {
                self.handle_in_mode(contact, chat_id, &history, text, is_operator)
                    .await;
            }
        }
    }

    async fn handle_in_mode(
        &self,
        contact: &Contact,
        chat_id: &str,
        history: &[HistoryTurn],
        text: &str,
        is_operator: bool,
    ) {
        let ctx = &self.ctx;
        match contact.mode {
            ContactMode::Onboarding => {
                let outcome = onboarding::handle_message(ctx, contact, chat_id, history, text).await;
                tracing::debug!(contact_id = contact.id(), ?outcome, "Onboarding turn");
                if outcome == onboarding::OnboardingOutcome::Abandoned {
                    self.chat(contact, chat_id, history, text).await;
                }
            }
            ContactMode::Learning if is_operator => {
                learning::handle_message(ctx, contact, chat_id, text).await;
            }
            ContactMode::Learning => {
                // Operator rights were withdrawn while learning was on.
                tracing::info!(contact_id = contact.id(), "Non-operator in learning mode; leaving it");
                ctx.set_mode(contact.id(), contact.mode, ContactMode::None).await;
                self.chat(contact, chat_id, history, text).await;
            }
            ContactMode::None => self.chat(contact, chat_id, history, text).await,
        }
    }

    /// An active item for a deep-link payload, if there is one.
    async fn resolve_trigger(&self, payload: Option<&str>) -> Option<ContentItem> {
        let trigger = payload?;
        match self.ctx.db.find_content_item(trigger).await {
            Ok(Some(item)) if item.active => Some(item),
            Ok(Some(_)) => {
                tracing::info!(trigger, "Deep link to inactive item; treating as bare start");
                None
            }
            Ok(None) => {
                tracing::info!(trigger, "Deep link to unknown trigger; treating as bare start");
                None
            }
            Err(e) => {
                tracing::warn!(trigger, "Failed to look up trigger: {e}");
                None
            }
        }
    }

    async fn bare_start(&self, contact: &Contact, chat_id: &str, is_operator: bool) {
        let ctx = &self.ctx;
        let contact_id = contact.id();

        ctx.audit(AuditEvent::new(AuditKind::BotStart, "/start").for_contact(contact_id))
            .await;

        if is_operator {
            if let Some(url) = ctx.config.admin_panel_url.as_deref() {
                if let Err(e) = ctx
                    .platform
                    .set_menu_button(chat_id, prompts::ADMIN_PANEL_LABEL, url)
                    .await
                {
                    tracing::warn!(contact_id, "Failed to set admin menu button: {e}");
                }
            }
        }

        if contact.mode == ContactMode::Learning {
            let text = format!("{}\n\n{}", prompts::GREETING, prompts::LEARNING_REMINDER);
            ctx.reply(contact_id, chat_id, &text, None).await;
            return;
        }

        let catalog = match ctx.db.list_active_items().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(contact_id, "Failed to load catalog: {e}");
                Vec::new()
            }
        };

        if catalog.is_empty() {
            onboarding::abandon(ctx, contact).await;
            ctx.reply(contact_id, chat_id, prompts::GREETING, Some(&main_menu()))
                .await;
            return;
        }

        onboarding::start(ctx, contact, chat_id, &catalog).await;
    }

    async fn list_materials(&self, contact: &Contact, chat_id: &str) {
        let ctx = &self.ctx;
        let mut items = Vec::new();
        for trigger in &contact.consumed_triggers {
            match ctx.db.find_content_item(trigger).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(e) => tracing::warn!(contact_id = contact.id(), trigger, "Failed to load item: {e}"),
            }
        }

        let text = if items.is_empty() {
            prompts::NO_MATERIALS_REPLY.to_string()
        } else {
            prompts::materials_list(&items)
        };
        ctx.reply(contact.id(), chat_id, &text, None).await;
    }

    /// Default chat: one grounded completion, or the apology.
    async fn chat(&self, contact: &Contact, chat_id: &str, history: &[HistoryTurn], text: &str) {
        let ctx = &self.ctx;
        let contact_id = contact.id();

        let system = match ctx.db.get_setting(settings_keys::SYSTEM_PROMPT).await {
            Ok(Some(prompt)) if !prompt.trim().is_empty() => prompt,
            Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
            Err(e) => {
                tracing::warn!("Failed to load system prompt: {e}");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        };
        let facts = match ctx.db.list_knowledge().await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!("Failed to load knowledge: {e}");
                Vec::new()
            }
        };

        let prompt = prompts::chat_prompt(&system, &facts, history, text);
        let answer = ctx.complete(contact_id, "chat", &prompt).await;
        ctx.reply(
            contact_id,
            chat_id,
            answer.as_deref().unwrap_or(prompts::APOLOGY),
            None,
        )
        .await;
    }

    async fn handle_callback(
        &self,
        contact: &Contact,
        chat_id: &str,
        message_id: i64,
        callback_id: &str,
        data: &str,
    ) {
        let ctx = &self.ctx;

        if let Some(decision) = Decision::parse(data) {
            if ctx.authorizer.is_operator(&contact.profile) {
                learning::decide(ctx, contact.id(), chat_id, message_id, callback_id, decision)
                    .await;
                return;
            }
            tracing::warn!(contact_id = contact.id(), "Fact decision from a non-operator ignored");
        } else {
            tracing::debug!(contact_id = contact.id(), data, "Unhandled callback");
        }

        if let Err(e) = ctx.platform.answer_callback(callback_id, None).await {
            tracing::warn!(callback_id, "Failed to answer callback: {e}");
        }
    }
}
