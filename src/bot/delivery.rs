//! Gated content delivery.
//!
//! First consumption is decided by the store (`mark_trigger_consumed` adds
//! the trigger atomically), so a repeated or concurrent delivery of the same
//! trigger is a revisit: the content is resent but the operator notification,
//! audit entry, follow-ups and menu are not. Every send is its own step and a
//! failed step never blocks the ones after it.

use std::sync::LazyLock;

use regex::Regex;

use crate::bot::{BotContext, main_menu, prompts};
use crate::catalog::{ContentItem, ContentKind};
use crate::channels::{Button, Keyboard, MediaKind, MediaSource};
use crate::contacts::Contact;
use crate::store::{AuditEvent, AuditKind, HistoryRole};

const OPEN_LABEL: &str = "🔗 Open";

/// `example.com`, `sub.example.co/path?q=1`
static BARE_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}(?:[/?#]\S*)?$")
        .expect("static domain regex")
});

/// `@channel_name`
static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@([A-Za-z0-9_]{4,32})$").expect("static handle regex"));

/// What a delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub first_time: bool,
}

/// Turn a link payload into a fully qualified URL.
///
/// Bare domains get `https://`, `@handles` become `t.me` links. Returns `None`
/// for anything that is not recognisably a link.
pub fn normalize_link(payload: &str) -> Option<String> {
    let payload = payload.trim();
    let lower = payload.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("tg://") {
        return Some(payload.to_string());
    }
    if let Some(caps) = HANDLE_RE.captures(payload) {
        return Some(format!("https://t.me/{}", &caps[1]));
    }
    if BARE_DOMAIN_RE.is_match(payload) {
        return Some(format!("https://{payload}"));
    }
    None
}

/// Deliver `item` to `contact` in `chat_id`.
pub(crate) async fn deliver(
    ctx: &BotContext,
    contact: &Contact,
    chat_id: &str,
    item: &ContentItem,
) -> Delivery {
    let contact_id = contact.id();
    let first_time = match ctx.db.mark_trigger_consumed(contact_id, &item.trigger_id).await {
        Ok(added) => added,
        Err(e) => {
            // Fall back to the snapshot taken when the event arrived.
            tracing::warn!(contact_id, trigger = %item.trigger_id, "Failed to record consumption: {e}");
            !contact.has_consumed(&item.trigger_id)
        }
    };

    tracing::info!(contact_id, trigger = %item.trigger_id, first_time, "Delivering content item");

    if first_time {
        ctx.notify_operators(&format!(
            "🎯 {} ({}) received \"{}\" via {}",
            contact.profile.display_name(),
            contact_id,
            item.name,
            item.trigger_id
        ))
        .await;
        ctx.audit(
            AuditEvent::new(AuditKind::LeadMagnetConsumed, format!("Received {}", item.name))
                .for_contact(contact_id)
                .with_metadata(serde_json::json!({ "trigger": item.trigger_id })),
        )
        .await;
    }

    send_payload(ctx, contact_id, chat_id, item).await;

    if first_time {
        for follow_up in &item.follow_ups {
            ctx.reply(contact_id, chat_id, follow_up, None).await;
        }
        ctx.reply(contact_id, chat_id, prompts::MENU_PROMPT, Some(&main_menu()))
            .await;
    }

    Delivery { first_time }
}

async fn send_payload(ctx: &BotContext, contact_id: &str, chat_id: &str, item: &ContentItem) {
    let welcome = item.welcome();

    match item.kind {
        ContentKind::Link => match normalize_link(&item.payload) {
            Some(url) => {
                let keyboard = Keyboard::Inline(vec![vec![Button::url(OPEN_LABEL, url)]]);
                ctx.reply(contact_id, chat_id, &welcome, Some(&keyboard)).await;
            }
            None => {
                tracing::warn!(trigger = %item.trigger_id, "Link payload is not a URL; sending as text");
                ctx.reply(contact_id, chat_id, &format!("{welcome}\n\n{}", item.payload), None)
                    .await;
            }
        },
        ContentKind::Text => {
            ctx.reply(contact_id, chat_id, &welcome, None).await;
            ctx.reply(contact_id, chat_id, &item.payload, None).await;
        }
        ContentKind::File => {
            ctx.reply(contact_id, chat_id, &welcome, None).await;
            let source = MediaSource::Reference(item.payload.clone());
            match ctx
                .platform
                .send_media(chat_id, MediaKind::Document, &source, None)
                .await
            {
                Ok(()) => {
                    ctx.log_turn(contact_id, HistoryRole::Assistant, &format!("[file] {}", item.name))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(contact_id, trigger = %item.trigger_id, "Media send failed, sending reference: {e}");
                    ctx.reply(contact_id, chat_id, &format!("📎 {}", item.payload), None)
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_urls_are_kept() {
        assert_eq!(
            normalize_link("https://example.com/a?b=1").as_deref(),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(normalize_link(" http://x.io ").as_deref(), Some("http://x.io"));
    }

    #[test]
    fn bare_domains_get_https() {
        assert_eq!(normalize_link("example.com").as_deref(), Some("https://example.com"));
        assert_eq!(
            normalize_link("docs.example.co/guide.pdf").as_deref(),
            Some("https://docs.example.co/guide.pdf")
        );
        assert_eq!(normalize_link("t.me/channel").as_deref(), Some("https://t.me/channel"));
    }

    #[test]
    fn handles_become_telegram_links() {
        assert_eq!(normalize_link("@my_channel").as_deref(), Some("https://t.me/my_channel"));
    }

    #[test]
    fn prose_is_not_a_link() {
        assert!(normalize_link("just some words").is_none());
        assert!(normalize_link("").is_none());
        assert!(normalize_link("@a").is_none());
    }
}
