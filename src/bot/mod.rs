//! Conversational core: the orchestrator and its three mode handlers.

pub mod command;
pub mod delivery;
pub mod learning;
pub mod onboarding;
pub mod orchestrator;
pub mod prompts;

pub use orchestrator::Orchestrator;

use std::sync::Arc;

use crate::auth::Authorizer;
use crate::channels::{ChatPlatform, Keyboard};
use crate::config::BotConfig;
use crate::contacts::ContactMode;
use crate::llm::LlmProvider;
use crate::store::{AuditEvent, AuditKind, Database, HistoryRole};

/// Collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct BotDeps {
    pub db: Arc<dyn Database>,
    pub llm: Arc<dyn LlmProvider>,
    pub platform: Arc<dyn ChatPlatform>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Shared state for the handlers of one bot.
///
/// Every helper here is best-effort: failures are logged and reported back as
/// `None`/`false`, never raised, so one failed step cannot abort a turn.
pub(crate) struct BotContext {
    pub db: Arc<dyn Database>,
    pub llm: Arc<dyn LlmProvider>,
    pub platform: Arc<dyn ChatPlatform>,
    pub authorizer: Arc<dyn Authorizer>,
    pub config: BotConfig,
}

impl BotContext {
    pub fn new(deps: BotDeps, config: BotConfig) -> Self {
        Self {
            db: deps.db,
            llm: deps.llm,
            platform: deps.platform,
            authorizer: deps.authorizer,
            config,
        }
    }

    /// Send to the contact's chat and log the outbound turn.
    pub async fn reply(
        &self,
        contact_id: &str,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Option<i64> {
        match self.platform.send_text(chat_id, text, keyboard).await {
            Ok(message_id) => {
                self.log_turn(contact_id, HistoryRole::Assistant, text).await;
                Some(message_id)
            }
            Err(e) => {
                tracing::warn!(contact_id, chat_id, "Reply failed: {e}");
                None
            }
        }
    }

    pub async fn log_turn(&self, contact_id: &str, role: HistoryRole, text: &str) {
        if let Err(e) = self.db.append_history(contact_id, role, text).await {
            tracing::warn!(contact_id, "Failed to log {} turn: {e}", role.as_str());
        }
    }

    /// One completion call. Failures are logged and audited.
    pub async fn complete(&self, contact_id: &str, step: &'static str, prompt: &str) -> Option<String> {
        match self.llm.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!(contact_id, step, "Completion was empty");
                None
            }
            Err(e) => {
                tracing::warn!(contact_id, step, model = self.llm.model_name(), "Completion failed: {e}");
                self.audit(
                    AuditEvent::new(AuditKind::Error, format!("{step}: {e}")).for_contact(contact_id),
                )
                .await;
                None
            }
        }
    }

    pub async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.db.record_event(&event).await {
            tracing::warn!(kind = event.kind.as_str(), "Failed to write audit event: {e}");
        }
    }

    /// Persist a mode change computed by a transition function.
    pub async fn set_mode(&self, contact_id: &str, from: ContactMode, to: ContactMode) -> bool {
        if from == to {
            return true;
        }
        match self.db.update_contact_mode(contact_id, from, to).await {
            Ok(true) => {
                tracing::info!(contact_id, %from, %to, "Contact mode changed");
                true
            }
            Ok(false) => {
                tracing::warn!(contact_id, %from, %to, "Contact mode changed concurrently");
                false
            }
            Err(e) => {
                tracing::warn!(contact_id, %from, %to, "Failed to store contact mode: {e}");
                false
            }
        }
    }

    /// Send a message to every operator chat; each send fails on its own.
    pub async fn notify_operators(&self, text: &str) {
        for operator in self.config.operator_chat_ids() {
            if let Err(e) = self.platform.send_text(operator, text, None).await {
                tracing::warn!(operator, "Operator notification failed: {e}");
            }
        }
    }
}

/// The standing navigation menu.
pub fn main_menu() -> Keyboard {
    Keyboard::Menu(vec![vec![
        prompts::TALK_LABEL.to_string(),
        prompts::MATERIALS_LABEL.to_string(),
    ]])
}
