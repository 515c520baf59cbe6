//! The one-time bio message, sent once a new contact has settled in.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channels::MediaKind;
use crate::config::{DEFAULT_BIO_MESSAGE, settings_keys};
use crate::dispatch::{DispatchEngine, Outgoing};
use crate::error::DispatchError;

/// Outcome of one bio tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BioReport {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Failed recipients marked done because they can never be reached.
    pub retired: usize,
}

impl DispatchEngine {
    /// Send the bio to every due contact.
    ///
    /// A contact is marked done after a successful send, and also after a
    /// permanent failure (blocked, chat gone). Transient failures stay
    /// unmarked and are retried on a later tick.
    pub async fn run_bio_batch(&self, now: DateTime<Utc>) -> Result<BioReport, DispatchError> {
        let outgoing = self.bio_message().await;
        let candidates = self
            .db
            .find_bio_candidates(
                now,
                self.config.bio_min_age,
                self.config.bio_max_age,
                self.config.bio_batch_size,
            )
            .await?;

        let mut report = BioReport {
            total: candidates.len(),
            ..BioReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }
        tracing::info!(due = candidates.len(), "Sending bio batch");

        for (i, contact) in candidates.iter().enumerate() {
            self.pace(i).await;
            let mark = match self.send_one(contact, &outgoing).await {
                Ok(()) => {
                    report.sent += 1;
                    true
                }
                Err(e) => {
                    report.failed += 1;
                    let permanent = e.is_permanent();
                    if permanent {
                        report.retired += 1;
                    }
                    permanent
                }
            };

            if mark {
                if let Err(e) = self.db.mark_bio_sent(contact.id()).await {
                    tracing::warn!(contact_id = contact.id(), "Failed to mark bio sent: {e}");
                }
            }
        }

        Ok(report)
    }

    /// The configured bio: photo with caption when `bio_photo` is set.
    async fn bio_message(&self) -> Outgoing {
        let text = match self.db.get_setting(settings_keys::BIO_MESSAGE).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => DEFAULT_BIO_MESSAGE.to_string(),
            Err(e) => {
                tracing::warn!("Failed to load bio message, using default: {e}");
                DEFAULT_BIO_MESSAGE.to_string()
            }
        };
        let photo = match self.db.get_setting(settings_keys::BIO_PHOTO).await {
            Ok(photo) => photo.filter(|p| !p.trim().is_empty()),
            Err(e) => {
                tracing::warn!("Failed to load bio photo: {e}");
                None
            }
        };

        match photo {
            Some(reference) => Outgoing::Media {
                kind: MediaKind::Photo,
                reference,
                caption: Some(text),
            },
            None => Outgoing::Text(text),
        }
    }
}
