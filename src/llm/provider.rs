//! The completion-service seam.

use async_trait::async_trait;

use crate::error::LlmError;

/// A stateless text-completion service: prompt in, completion out.
///
/// No streaming and no structured-output mode are assumed. Callers that want
/// structure pull it out of the returned text with [`crate::llm::structured`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
