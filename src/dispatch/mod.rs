//! Bulk dispatch: on-demand broadcasts and the scheduled bio batch.
//!
//! Both entry points share one primitive: recipients are sent to one after
//! the other with a fixed pause in between, and a failed recipient is counted
//! and logged without stopping the run.

pub mod bio;
pub mod broadcast;

pub use bio::BioReport;
pub use broadcast::{BroadcastRequest, Outgoing};

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::channels::{ChatPlatform, MediaSource};
use crate::config::DispatchConfig;
use crate::contacts::Contact;
use crate::error::ChannelError;
use crate::store::Database;

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Runs broadcasts and bio batches against the contact store.
pub struct DispatchEngine {
    db: Arc<dyn Database>,
    platform: Arc<dyn ChatPlatform>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        db: Arc<dyn Database>,
        platform: Arc<dyn ChatPlatform>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            platform,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Throttle: every send but the first waits `send_delay`.
    async fn pace(&self, index: usize) {
        if index > 0 && !self.config.send_delay.is_zero() {
            tokio::time::sleep(self.config.send_delay).await;
        }
    }

    /// One recipient, one message. Failures are logged here and returned.
    async fn send_one(&self, contact: &Contact, outgoing: &Outgoing) -> Result<(), ChannelError> {
        let result = self.send_outgoing(contact.id(), outgoing).await;
        if let Err(e) = &result {
            tracing::warn!(contact_id = contact.id(), "Dispatch send failed: {e}");
        }
        result
    }

    async fn send_outgoing(&self, chat_id: &str, outgoing: &Outgoing) -> Result<(), ChannelError> {
        match outgoing {
            Outgoing::Text(body) => self.platform.send_text(chat_id, body, None).await.map(drop),
            Outgoing::Media {
                kind,
                reference,
                caption,
            } => {
                let source = MediaSource::Reference(reference.clone());
                let caption = caption.as_deref().filter(|c| !c.trim().is_empty());
                self.platform.send_media(chat_id, *kind, &source, caption).await
            }
        }
    }
}

/// Spawn the background task that runs the bio batch on its cron schedule.
pub fn spawn_bio_ticker(engine: Arc<DispatchEngine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = match cron::Schedule::from_str(&engine.config.bio_schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::error!("Invalid bio schedule, ticker not started: {e}");
                return;
            }
        };
        tracing::info!(schedule = %engine.config.bio_schedule, "Bio ticker started");

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::info!("Bio schedule has no further fire times");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match engine.run_bio_batch(Utc::now()).await {
                Ok(report) if report.total > 0 => {
                    tracing::info!(
                        total = report.total,
                        sent = report.sent,
                        failed = report.failed,
                        retired = report.retired,
                        "Bio batch complete"
                    );
                }
                Ok(_) => tracing::debug!("Bio batch: nobody due"),
                Err(e) => tracing::error!("Bio batch failed: {e}"),
            }
        }
    })
}
