//! Error types for leadbot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Chat platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    /// The platform answered, but refused the call.
    #[error("Channel {name} rejected the call ({code}): {description}")]
    Api {
        name: String,
        code: u16,
        description: String,
    },

    #[error("Invalid update format: {0}")]
    InvalidUpdate(String),

    #[error("Rate limited on channel {name}")]
    RateLimited { name: String },
}

impl ChannelError {
    /// Whether retrying this send to the same recipient can never succeed
    /// (the contact blocked the bot, the chat is gone, the account is deactivated).
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Api {
                code, description, ..
            } => {
                let description = description.to_ascii_lowercase();
                *code == 403
                    || description.contains("blocked")
                    || description.contains("not found")
                    || description.contains("deactivated")
            }
            _ => false,
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Content catalog errors surfaced to the operator.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Trigger id '{0}' is already used by another item")]
    DuplicateTrigger(String),

    #[error("Invalid content item: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Bulk dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid broadcast request: {0}")]
    InvalidRequest(String),

    #[error("Failed to load recipients: {0}")]
    Recipients(#[from] DatabaseError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
