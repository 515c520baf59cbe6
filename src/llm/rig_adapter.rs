//! Bridges a rig `CompletionModel` to [`LlmProvider`].

use async_trait::async_trait;
use rig::agent::{Agent, AgentBuilder};
use rig::completion::{CompletionModel, Prompt, PromptError};

use crate::error::LlmError;
use crate::llm::provider::LlmProvider;

/// Upper bound on completion length. Replies are chat-sized.
const MAX_TOKENS: u64 = 1024;

/// rig agent without tools or preamble; the whole prompt is the user turn.
pub struct RigAdapter<M: CompletionModel> {
    agent: Agent<M>,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel + 'static> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            agent: AgentBuilder::new(model).max_tokens(MAX_TOKENS).build(),
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M: CompletionModel + 'static> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let completion = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| classify_error(self.provider, e))?;

        tracing::debug!(
            model = %self.model_name,
            prompt_chars = prompt.len(),
            completion_chars = completion.len(),
            "Completion received"
        );
        Ok(completion)
    }
}

/// Map rig's error into our taxonomy by inspecting the provider message.
fn classify_error(provider: &str, error: PromptError) -> LlmError {
    let reason = error.to_string();
    let lower = reason.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("overloaded") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if lower.contains("401") || lower.contains("authentication") || lower.contains("api key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason,
        }
    }
}
