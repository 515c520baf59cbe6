//! Content catalog of gated items keyed by a unique trigger id.

pub mod model;

pub use model::{ContentItem, ContentKind};

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{CatalogError, DatabaseError};
use crate::store::Database;

/// Telegram only carries `[A-Za-z0-9_-]{1,64}` in a `/start` payload.
static TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static trigger regex")
});

/// Whether `trigger_id` can be carried in a deep link.
pub fn is_valid_trigger(trigger_id: &str) -> bool {
    TRIGGER_RE.is_match(trigger_id)
}

/// Add a new item to the catalog.
///
/// A trigger id already in use is reported as [`CatalogError::DuplicateTrigger`]
/// so the operator can pick another one; it is never renamed silently.
pub async fn create_item(db: &dyn Database, item: &ContentItem) -> Result<(), CatalogError> {
    if !is_valid_trigger(&item.trigger_id) {
        return Err(CatalogError::Invalid(format!(
            "trigger id '{}' must be 1-64 characters of letters, digits, '_' or '-'",
            item.trigger_id
        )));
    }
    if item.name.trim().is_empty() {
        return Err(CatalogError::Invalid("name is required".into()));
    }
    if item.payload.trim().is_empty() {
        return Err(CatalogError::Invalid("payload is required".into()));
    }

    match db.insert_content_item(item).await {
        Ok(()) => {
            tracing::info!(trigger = %item.trigger_id, kind = item.kind.as_str(), "Content item created");
            Ok(())
        }
        Err(DatabaseError::Constraint(_)) => {
            Err(CatalogError::DuplicateTrigger(item.trigger_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// One catalog entry in a seed file.
#[derive(Debug, Deserialize)]
struct SeedItem {
    trigger_id: String,
    name: String,
    #[serde(default)]
    description: String,
    kind: ContentKind,
    payload: String,
    #[serde(default)]
    welcome_text: Option<String>,
    #[serde(default)]
    follow_ups: Vec<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Load catalog items from a JSON array. Items whose trigger already exists
/// are skipped, so seeding the same file twice is harmless. Returns how many
/// items were added.
pub async fn seed_from_json(db: &dyn Database, json: &str) -> Result<usize, CatalogError> {
    let seeds: Vec<SeedItem> = serde_json::from_str(json)
        .map_err(|e| CatalogError::Invalid(format!("unreadable seed file: {e}")))?;

    let mut added = 0;
    for seed in seeds {
        let mut item = ContentItem::new(seed.trigger_id, seed.name, seed.kind, seed.payload)
            .with_description(seed.description)
            .with_follow_ups(seed.follow_ups);
        item.welcome_text = seed.welcome_text;
        item.active = seed.active;

        match create_item(db, &item).await {
            Ok(()) => added += 1,
            Err(CatalogError::DuplicateTrigger(trigger)) => {
                tracing::debug!(%trigger, "Seed item already present");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn seeding_is_repeatable() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let json = r#"[
            {"trigger_id": "promo1", "name": "Checklist", "kind": "link", "payload": "example.com",
             "follow_ups": ["Enjoy!"]},
            {"trigger_id": "old", "name": "Old", "kind": "text", "payload": "body", "active": false}
        ]"#;

        assert_eq!(seed_from_json(&db, json).await.unwrap(), 2);
        assert_eq!(seed_from_json(&db, json).await.unwrap(), 0);

        let active = db.list_active_items().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].follow_ups, vec!["Enjoy!".to_string()]);
    }

    #[tokio::test]
    async fn malformed_seed_is_invalid() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(matches!(
            seed_from_json(&db, r#"[{"trigger_id": "x"}]"#).await,
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn trigger_charset() {
        assert!(is_valid_trigger("promo1"));
        assert!(is_valid_trigger("spring_sale-2024"));
        assert!(!is_valid_trigger(""));
        assert!(!is_valid_trigger("has space"));
        assert!(!is_valid_trigger("emoji🎁"));
        assert!(!is_valid_trigger(&"a".repeat(65)));
    }

    #[tokio::test]
    async fn duplicate_trigger_is_a_distinct_error() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let item = ContentItem::new("promo1", "Guide", ContentKind::Link, "example.com");
        create_item(&db, &item).await.unwrap();

        let again = ContentItem::new("promo1", "Other", ContentKind::Text, "body");
        let err = create_item(&db, &again).await.unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTrigger(ref t) if t == "promo1"));
    }

    #[tokio::test]
    async fn invalid_items_are_rejected_before_insert() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let item = ContentItem::new("bad id", "Guide", ContentKind::Link, "example.com");
        assert!(matches!(
            create_item(&db, &item).await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(db.find_content_item("bad id").await.unwrap().is_none());
    }
}
