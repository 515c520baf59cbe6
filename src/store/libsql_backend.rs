//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! fixed-width RFC 3339 (millisecond, `Z`) so they compare lexically.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{ContentItem, ContentKind};
use crate::contacts::{Contact, ContactMode, ContactProfile, Segment};
use crate::error::DatabaseError;
use crate::knowledge::{FactCategory, KnowledgeEntry, PendingFact};
use crate::store::migrations;
use crate::store::traits::{AuditEvent, AuditKind, Database, HistoryRole, HistoryTurn};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_contacts(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<Contact>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut contacts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            contacts.push(row_to_contact(&row)?);
        }
        Ok(contacts)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Unit separator; never appears in a valid trigger id.
const TRIGGER_SEP: char = '\u{1f}';

/// Column order used by [`row_to_contact`]:
/// 0:id, 1:username, 2:first_name, 3:last_name, 4:mode, 5:bio_sent,
/// 6:created_at, 7:last_seen_at, 8:consumed triggers (joined)
const CONTACT_COLUMNS: &str = "c.id, c.username, c.first_name, c.last_name, c.mode, c.bio_sent, \
     c.created_at, c.last_seen_at, \
     (SELECT group_concat(ct.trigger_id, char(31)) FROM consumed_triggers ct WHERE ct.contact_id = c.id)";

fn row_to_contact(row: &libsql::Row) -> Result<Contact, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("contact row parse: {e}"));

    let id: String = row.get(0).map_err(parse)?;
    let mode_str: String = row.get(4).map_err(parse)?;
    let bio_sent: i64 = row.get(5).map_err(parse)?;
    let created_str: String = row.get(6).map_err(parse)?;
    let seen_str: String = row.get(7).map_err(parse)?;
    let consumed: Option<String> = row.get(8).ok();

    let consumed_triggers: BTreeSet<String> = consumed
        .as_deref()
        .map(|joined| {
            joined
                .split(TRIGGER_SEP)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Contact {
        profile: ContactProfile {
            id,
            username: row.get(1).ok(),
            first_name: row.get(2).ok(),
            last_name: row.get(3).ok(),
        },
        consumed_triggers,
        mode: mode_str.parse().unwrap_or_default(),
        bio_sent: bio_sent != 0,
        created_at: parse_datetime(&created_str),
        last_seen_at: parse_datetime(&seen_str),
    })
}

/// 0:trigger_id, 1:name, 2:description, 3:kind, 4:payload, 5:welcome_text,
/// 6:follow_ups, 7:active, 8:created_at, 9:updated_at
const ITEM_COLUMNS: &str = "trigger_id, name, description, kind, payload, welcome_text, \
     follow_ups, active, created_at, updated_at";

fn row_to_item(row: &libsql::Row) -> Result<ContentItem, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("content item row parse: {e}"));

    let kind_str: String = row.get(3).map_err(parse)?;
    let kind: ContentKind = kind_str.parse().map_err(DatabaseError::Serialization)?;
    let follow_ups_str: String = row.get(6).map_err(parse)?;
    let follow_ups: Vec<String> = serde_json::from_str(&follow_ups_str)
        .map_err(|e| DatabaseError::Serialization(format!("follow_ups: {e}")))?;
    let active: i64 = row.get(7).map_err(parse)?;
    let created_str: String = row.get(8).map_err(parse)?;
    let updated_str: String = row.get(9).map_err(parse)?;

    Ok(ContentItem {
        trigger_id: row.get(0).map_err(parse)?,
        name: row.get(1).map_err(parse)?,
        description: row.get::<String>(2).unwrap_or_default(),
        kind,
        payload: row.get(4).map_err(parse)?,
        welcome_text: row.get(5).ok(),
        follow_ups,
        active: active != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_knowledge(row: &libsql::Row) -> Result<KnowledgeEntry, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("knowledge row parse: {e}"));

    let id_str: String = row.get(0).map_err(parse)?;
    let category_str: String = row.get(1).map_err(parse)?;
    let keywords_str: String = row.get(4).map_err(parse)?;
    let created_str: String = row.get(5).map_err(parse)?;
    let updated_str: String = row.get(6).map_err(parse)?;

    Ok(KnowledgeEntry {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("knowledge id: {e}")))?,
        category: category_str
            .parse::<FactCategory>()
            .map_err(DatabaseError::Serialization)?,
        title: row.get(2).map_err(parse)?,
        content: row.get(3).map_err(parse)?,
        keywords: serde_json::from_str(&keywords_str).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_pending_fact(row: &libsql::Row) -> Result<PendingFact, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("pending fact row parse: {e}"));

    let id_str: String = row.get(0).map_err(parse)?;
    let category_str: String = row.get(2).map_err(parse)?;
    let created_str: String = row.get(5).map_err(parse)?;

    Ok(PendingFact {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("pending fact id: {e}")))?,
        operator_id: row.get(1).map_err(parse)?,
        category: category_str
            .parse::<FactCategory>()
            .map_err(DatabaseError::Serialization)?,
        title: row.get(3).map_err(parse)?,
        content: row.get(4).map_err(parse)?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Contacts ────────────────────────────────────────────────────

    async fn upsert_contact(
        &self,
        profile: &ContactProfile,
        seen_at: DateTime<Utc>,
    ) -> Result<Contact, DatabaseError> {
        let now = ts(seen_at);
        self.conn()
            .execute(
                "INSERT INTO contacts (id, username, first_name, last_name, mode, bio_sent, created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, 'none', 0, ?5, ?5)
                 ON CONFLICT (id) DO UPDATE SET
                    username = COALESCE(excluded.username, contacts.username),
                    first_name = COALESCE(excluded.first_name, contacts.first_name),
                    last_name = COALESCE(excluded.last_name, contacts.last_name),
                    last_seen_at = excluded.last_seen_at",
                params![
                    profile.id.as_str(),
                    opt_text(profile.username.as_deref()),
                    opt_text(profile.first_name.as_deref()),
                    opt_text(profile.last_name.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_contact: {e}")))?;

        self.get_contact(&profile.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "contact".into(),
                id: profile.id.clone(),
            })
    }

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, DatabaseError> {
        let mut contacts = self
            .query_contacts(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts c WHERE c.id = ?1"),
                params![id],
                "get_contact",
            )
            .await?;
        Ok(contacts.pop())
    }

    async fn update_contact_mode(
        &self,
        id: &str,
        from: ContactMode,
        to: ContactMode,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE contacts SET mode = ?1 WHERE id = ?2 AND mode = ?3",
                params![to.as_str(), id, from.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_contact_mode: {e}")))?;

        debug!(contact_id = %id, from = %from, to = %to, applied = count > 0, "Contact mode update");
        Ok(count > 0)
    }

    async fn mark_trigger_consumed(
        &self,
        contact_id: &str,
        trigger_id: &str,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO consumed_triggers (contact_id, trigger_id, consumed_at)
                 VALUES (?1, ?2, ?3)",
                params![contact_id, trigger_id, ts(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_trigger_consumed: {e}")))?;
        Ok(count > 0)
    }

    async fn find_contacts(&self, segment: &Segment) -> Result<Vec<Contact>, DatabaseError> {
        match segment {
            Segment::All => {
                self.query_contacts(
                    &format!("SELECT {CONTACT_COLUMNS} FROM contacts c ORDER BY c.created_at, c.id"),
                    (),
                    "find_contacts",
                )
                .await
            }
            Segment::ConsumedTrigger(trigger) => {
                self.query_contacts(
                    &format!(
                        "SELECT {CONTACT_COLUMNS} FROM contacts c
                         WHERE EXISTS (SELECT 1 FROM consumed_triggers x
                                       WHERE x.contact_id = c.id AND x.trigger_id = ?1)
                         ORDER BY c.created_at, c.id"
                    ),
                    params![trigger.as_str()],
                    "find_contacts",
                )
                .await
            }
        }
    }

    async fn find_bio_candidates(
        &self,
        now: DateTime<Utc>,
        min_age: chrono::Duration,
        max_age: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Contact>, DatabaseError> {
        let newest = ts(now - min_age);
        let oldest = ts(now - max_age);
        self.query_contacts(
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts c
                 WHERE c.bio_sent = 0 AND c.created_at <= ?1 AND c.created_at >= ?2
                 ORDER BY c.created_at, c.id
                 LIMIT ?3"
            ),
            params![newest, oldest, limit_param(limit)],
            "find_bio_candidates",
        )
        .await
    }

    async fn mark_bio_sent(&self, contact_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE contacts SET bio_sent = 1 WHERE id = ?1",
                params![contact_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_bio_sent: {e}")))?;
        Ok(())
    }

    // ── Catalog ─────────────────────────────────────────────────────

    async fn insert_content_item(&self, item: &ContentItem) -> Result<(), DatabaseError> {
        let follow_ups = serde_json::to_string(&item.follow_ups)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!("INSERT INTO content_items ({ITEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    item.trigger_id.as_str(),
                    item.name.as_str(),
                    item.description.as_str(),
                    item.kind.as_str(),
                    item.payload.as_str(),
                    opt_text(item.welcome_text.as_deref()),
                    follow_ups,
                    i64::from(item.active),
                    ts(item.created_at),
                    ts(item.updated_at),
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("trigger id '{}' already exists", item.trigger_id))
                } else {
                    DatabaseError::Query(format!("insert_content_item: {e}"))
                }
            })?;
        Ok(())
    }

    async fn find_content_item(
        &self,
        trigger_id: &str,
    ) -> Result<Option<ContentItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM content_items WHERE trigger_id = ?1"),
                params![trigger_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_content_item: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_content_item: {e}"))),
        }
    }

    async fn list_active_items(&self) -> Result<Vec<ContentItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM content_items WHERE active = 1 ORDER BY created_at, trigger_id"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_items: {e}")))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_items: {e}")))?
        {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }

    // ── Knowledge ───────────────────────────────────────────────────

    async fn insert_knowledge(&self, entry: &KnowledgeEntry) -> Result<(), DatabaseError> {
        let keywords = serde_json::to_string(&entry.keywords)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO knowledge_entries (id, category, title, content, keywords, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id.to_string(),
                    entry.category.as_str(),
                    entry.title.as_str(),
                    entry.content.as_str(),
                    keywords,
                    ts(entry.created_at),
                    ts(entry.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_knowledge: {e}")))?;

        debug!(entry_id = %entry.id, category = entry.category.as_str(), "Knowledge entry stored");
        Ok(())
    }

    async fn list_knowledge(&self) -> Result<Vec<KnowledgeEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, category, title, content, keywords, created_at, updated_at
                 FROM knowledge_entries ORDER BY category, created_at",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_knowledge: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_knowledge: {e}")))?
        {
            entries.push(row_to_knowledge(&row)?);
        }
        Ok(entries)
    }

    async fn insert_pending_fact(&self, fact: &PendingFact) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO pending_facts (id, operator_id, category, title, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    fact.id.to_string(),
                    fact.operator_id.as_str(),
                    fact.category.as_str(),
                    fact.title.as_str(),
                    fact.content.as_str(),
                    ts(fact.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_pending_fact: {e}")))?;
        Ok(())
    }

    async fn take_pending_fact(&self, id: Uuid) -> Result<Option<PendingFact>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "DELETE FROM pending_facts WHERE id = ?1
                 RETURNING id, operator_id, category, title, content, created_at",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("take_pending_fact: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_pending_fact(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("take_pending_fact: {e}"))),
        }
    }

    // ── History ─────────────────────────────────────────────────────

    async fn append_history(
        &self,
        contact_id: &str,
        role: HistoryRole,
        text: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO message_log (contact_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![contact_id, role.as_str(), text, ts(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_history: {e}")))?;
        Ok(())
    }

    async fn recent_history(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role, text, created_at FROM (
                    SELECT id, role, text, created_at FROM message_log
                    WHERE contact_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
                params![contact_id, limit_param(limit)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_history: {e}")))?;

        let mut turns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_history: {e}")))?
        {
            let role: String = row.get(0).unwrap_or_default();
            let text: String = row.get(1).unwrap_or_default();
            let created: String = row.get(2).unwrap_or_default();
            turns.push(HistoryTurn::from_row(&role, text, parse_datetime(&created)));
        }
        Ok(turns)
    }

    // ── Audit log ───────────────────────────────────────────────────

    async fn record_event(&self, event: &AuditEvent) -> Result<(), DatabaseError> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO system_logs (kind, contact_id, details, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.kind.as_str(),
                    opt_text(event.contact_id.as_deref()),
                    event.details.as_str(),
                    opt_text(metadata.as_deref()),
                    ts(event.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_event: {e}")))?;
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<AuditEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT kind, contact_id, details, metadata, created_at
                 FROM system_logs ORDER BY id DESC LIMIT ?1",
                params![limit_param(limit)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_events: {e}")))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_events: {e}")))?
        {
            let kind: String = row.get(0).unwrap_or_default();
            let metadata: Option<String> = row.get(3).ok();
            let created: String = row.get(4).unwrap_or_default();
            events.push(AuditEvent {
                kind: AuditKind::parse(&kind),
                contact_id: row.get(1).ok(),
                details: row.get(2).unwrap_or_default(),
                metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                created_at: parse_datetime(&created),
            });
        }
        Ok(events)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, ts(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;
        Ok(())
    }
}
