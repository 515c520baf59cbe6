//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Built-in chat instruction used when the operator has not set one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the friendly assistant of an expert who shares free materials with their audience.
Answer briefly and warmly, in the language the user writes in.
Ground every answer in the facts you are given. If you do not know something, say so \
and offer to pass the question to the expert.";

/// Built-in bio message used when the `bio_message` setting is missing.
pub const DEFAULT_BIO_MESSAGE: &str = "\
Hi, it's me again!\n\nWhile you are exploring the materials, let me tell you a bit about myself.";

/// Highest number of history turns that may be fed into a chat prompt.
pub const MAX_HISTORY_LIMIT: usize = 10;

/// Settings keys in the `settings` table.
pub mod settings_keys {
    pub const SYSTEM_PROMPT: &str = "main_system_prompt";
    pub const BIO_MESSAGE: &str = "bio_message";
    pub const BIO_PHOTO: &str = "bio_photo";
}

/// How the bot receives Telegram updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Long-poll `getUpdates`.
    Polling,
    /// Telegram POSTs updates to `/telegram/webhook`.
    Webhook,
}

/// Bot behaviour configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Operator identities allowed into learning mode.
    pub admin_ids: Vec<String>,
    /// Web-app URL set as the operator's menu button on `/start`.
    pub admin_panel_url: Option<String>,
    /// How many past turns are fed into chat and onboarding prompts.
    pub history_limit: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            admin_panel_url: None,
            history_limit: MAX_HISTORY_LIMIT,
        }
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_ids = std::env::var("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let history_limit: usize = env_parse("LEADBOT_HISTORY_LIMIT", MAX_HISTORY_LIMIT)?;

        Ok(Self {
            admin_ids,
            admin_panel_url: std::env::var("ADMIN_PANEL_URL").ok(),
            history_limit: history_limit.min(MAX_HISTORY_LIMIT),
        })
    }

    /// Admin ids that can be messaged. Usernames and `*` are skipped.
    pub fn operator_chat_ids(&self) -> impl Iterator<Item = &str> {
        self.admin_ids.iter().map(String::as_str).filter(|id| {
            let digits = id.strip_prefix('-').unwrap_or(id);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        })
    }
}

/// Bulk dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause between two consecutive recipient sends.
    pub send_delay: Duration,
    /// Cron expression for the bio batch.
    pub bio_schedule: String,
    /// Contacts younger than this have not "settled" yet.
    pub bio_min_age: chrono::Duration,
    /// Contacts older than this predate the bio feature.
    pub bio_max_age: chrono::Duration,
    /// Maximum contacts handled per bio tick.
    pub bio_batch_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_delay: Duration::from_millis(50),
            bio_schedule: "0 */5 * * * *".to_string(),
            bio_min_age: chrono::Duration::minutes(20),
            bio_max_age: chrono::Duration::hours(24),
            bio_batch_size: 50,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let bio_schedule =
            std::env::var("LEADBOT_BIO_SCHEDULE").unwrap_or(defaults.bio_schedule);
        cron::Schedule::from_str(&bio_schedule).map_err(|e| ConfigError::InvalidValue {
            key: "LEADBOT_BIO_SCHEDULE".into(),
            message: e.to_string(),
        })?;

        Ok(Self {
            send_delay: Duration::from_millis(env_parse("LEADBOT_SEND_DELAY_MS", 50)?),
            bio_schedule,
            bio_min_age: chrono::Duration::minutes(env_parse("LEADBOT_BIO_MIN_AGE_MIN", 20)?),
            bio_max_age: chrono::Duration::hours(env_parse("LEADBOT_BIO_MAX_AGE_HOURS", 24)?),
            bio_batch_size: env_parse("LEADBOT_BIO_BATCH", 50)?,
        })
    }
}

/// Process-level settings read by the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub telegram_token: String,
    pub db_path: PathBuf,
    pub http_port: u16,
    pub update_mode: UpdateMode,
    /// JSON file of catalog items loaded at startup.
    pub catalog_seed: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let db_path = std::env::var("LEADBOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/leadbot.db"));

        let update_mode = match std::env::var("LEADBOT_TELEGRAM_MODE").as_deref() {
            Ok("webhook") => UpdateMode::Webhook,
            Ok("polling") | Err(_) => UpdateMode::Polling,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LEADBOT_TELEGRAM_MODE".into(),
                    message: format!("expected 'polling' or 'webhook', got '{other}'"),
                });
            }
        };

        Ok(Self {
            telegram_token,
            db_path,
            http_port: env_parse("LEADBOT_HTTP_PORT", 8080)?,
            update_mode,
            catalog_seed: std::env::var("LEADBOT_CATALOG_SEED").ok().map(PathBuf::from),
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_defaults_match_bio_window() {
        let config = DispatchConfig::default();
        assert_eq!(config.send_delay, Duration::from_millis(50));
        assert_eq!(config.bio_min_age, chrono::Duration::minutes(20));
        assert_eq!(config.bio_max_age, chrono::Duration::hours(24));
        assert_eq!(config.bio_batch_size, 50);
    }

    #[test]
    fn default_bio_schedule_parses() {
        let config = DispatchConfig::default();
        assert!(cron::Schedule::from_str(&config.bio_schedule).is_ok());
    }

    #[test]
    fn env_parse_falls_back_to_default() {
        let value: u64 = env_parse("LEADBOT_TEST_UNSET_KEY_42", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn operator_chat_ids_skip_usernames_and_wildcard() {
        let config = BotConfig {
            admin_ids: vec!["7".into(), "boss".into(), "*".into(), "-100200".into()],
            ..BotConfig::default()
        };
        assert_eq!(config.operator_chat_ids().collect::<Vec<_>>(), vec!["7", "-100200"]);
    }

    #[test]
    fn history_limit_defaults_to_cap() {
        assert_eq!(BotConfig::default().history_limit, MAX_HISTORY_LIMIT);
    }
}
