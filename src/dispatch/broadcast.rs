//! Operator-triggered broadcast to a contact segment.

use serde::Deserialize;

use crate::channels::MediaKind;
use crate::contacts::Segment;
use crate::dispatch::{DispatchEngine, DispatchReport};
use crate::error::DispatchError;

/// Broadcast request as posted by the admin panel.
///
/// `type` and `magnetId` are accepted as aliases for the panel's field names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    /// `all`, or `magnet` for contacts who received `trigger`.
    #[serde(default)]
    pub segment: String,
    #[serde(default, alias = "magnetId")]
    pub trigger: Option<String>,
    #[serde(default)]
    pub message: String,
    /// `text` (default), `photo` or `document`.
    #[serde(default, alias = "type")]
    pub attachment_kind: Option<String>,
    /// Platform file id or public URL of the attachment.
    #[serde(default)]
    pub attachment: Option<String>,
}

/// What every recipient is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Media {
        kind: MediaKind,
        reference: String,
        caption: Option<String>,
    },
}

impl BroadcastRequest {
    /// Check the request and resolve it into a segment and a message.
    pub fn validate(&self) -> Result<(Segment, Outgoing), DispatchError> {
        let segment = match self.segment.trim() {
            "all" => Segment::All,
            "magnet" => {
                let trigger = self
                    .trigger
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        DispatchError::InvalidRequest("a trigger is required for this segment".into())
                    })?;
                Segment::ConsumedTrigger(trigger.to_string())
            }
            other => {
                return Err(DispatchError::InvalidRequest(format!(
                    "unknown segment '{other}'"
                )));
            }
        };

        let message = self.message.trim();
        let kind = self.attachment_kind.as_deref().map(str::trim).unwrap_or("text");
        let media_kind = match kind {
            "text" => {
                if message.is_empty() {
                    return Err(DispatchError::InvalidRequest("message text is required".into()));
                }
                return Ok((segment, Outgoing::Text(message.to_string())));
            }
            "photo" => MediaKind::Photo,
            "document" => MediaKind::Document,
            other => {
                return Err(DispatchError::InvalidRequest(format!(
                    "unknown message type '{other}'"
                )));
            }
        };

        let reference = self
            .attachment
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| DispatchError::InvalidRequest(format!("an attachment is required for type '{kind}'")))?;

        Ok((
            segment,
            Outgoing::Media {
                kind: media_kind,
                reference: reference.to_string(),
                caption: (!message.is_empty()).then(|| message.to_string()),
            },
        ))
    }
}

impl DispatchEngine {
    /// Send one message to a whole segment. Not resumable; the report is the
    /// only record of the run.
    pub async fn broadcast(&self, request: &BroadcastRequest) -> Result<DispatchReport, DispatchError> {
        let (segment, outgoing) = request.validate()?;
        let recipients = self.db.find_contacts(&segment).await?;

        tracing::info!(?segment, recipients = recipients.len(), "Broadcast started");

        let mut report = DispatchReport {
            total: recipients.len(),
            ..DispatchReport::default()
        };
        for (i, contact) in recipients.iter().enumerate() {
            self.pace(i).await;
            match self.send_one(contact, &outgoing).await {
                Ok(()) => report.sent += 1,
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            total = report.total,
            sent = report.sent,
            failed = report.failed,
            "Broadcast complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> BroadcastRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn text_to_everyone() {
        let (segment, outgoing) = request(serde_json::json!({"segment": "all", "message": "Hi"}))
            .validate()
            .unwrap();
        assert_eq!(segment, Segment::All);
        assert_eq!(outgoing, Outgoing::Text("Hi".into()));
    }

    #[test]
    fn panel_field_names_are_accepted() {
        let (segment, outgoing) = request(serde_json::json!({
            "segment": "magnet",
            "magnetId": "promo1",
            "type": "photo",
            "attachment": "AgACAgIAAx",
            "message": "New photo"
        }))
        .validate()
        .unwrap();
        assert_eq!(segment, Segment::ConsumedTrigger("promo1".into()));
        assert_eq!(
            outgoing,
            Outgoing::Media {
                kind: MediaKind::Photo,
                reference: "AgACAgIAAx".into(),
                caption: Some("New photo".into()),
            }
        );
    }

    #[test]
    fn document_without_caption() {
        let (_, outgoing) = request(serde_json::json!({
            "segment": "all",
            "attachmentKind": "document",
            "attachment": "https://example.com/guide.pdf"
        }))
        .validate()
        .unwrap();
        assert!(matches!(outgoing, Outgoing::Media { caption: None, kind: MediaKind::Document, .. }));
    }

    #[test]
    fn invalid_requests() {
        let cases = [
            serde_json::json!({"segment": "all"}),
            serde_json::json!({"segment": "all", "message": "   "}),
            serde_json::json!({"segment": "magnet", "message": "Hi"}),
            serde_json::json!({"segment": "vip", "message": "Hi"}),
            serde_json::json!({"segment": "all", "type": "video", "attachment": "x"}),
            serde_json::json!({"segment": "all", "type": "photo", "message": "no file"}),
        ];
        for case in cases {
            let result = request(case.clone()).validate();
            assert!(
                matches!(result, Err(DispatchError::InvalidRequest(_))),
                "expected invalid: {case}"
            );
        }
    }
}
