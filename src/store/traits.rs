//! `Database` trait: the single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ContentItem;
use crate::contacts::{Contact, ContactMode, ContactProfile, Segment};
use crate::error::DatabaseError;
use crate::knowledge::{KnowledgeEntry, PendingFact};

/// Who spoke a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// One logged turn of a contact's conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryTurn {
    pub(crate) fn from_row(role: &str, text: String, created_at: DateTime<Utc>) -> Self {
        Self {
            role: HistoryRole::parse(role),
            text,
            created_at,
        }
    }
}

/// Audit log categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    BotStart,
    LeadMagnetConsumed,
    AdminAction,
    Error,
    Other,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotStart => "bot_start",
            Self::LeadMagnetConsumed => "lead_magnet_consumed",
            Self::AdminAction => "admin_action",
            Self::Error => "error",
            Self::Other => "other",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "bot_start" => Self::BotStart,
            "lead_magnet_consumed" => Self::LeadMagnetConsumed,
            "admin_action" => Self::AdminAction,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// An audit log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub contact_id: Option<String>,
    pub details: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            contact_id: None,
            details: details.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_contact(mut self, contact_id: impl Into<String>) -> Self {
        self.contact_id = Some(contact_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Backend-agnostic database trait covering contacts, catalog, knowledge,
/// conversation history, the audit log and runtime settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Contacts ────────────────────────────────────────────────────

    /// Create the contact on first sight, otherwise refresh its profile and
    /// `last_seen_at`. Returns the stored record.
    async fn upsert_contact(
        &self,
        profile: &ContactProfile,
        seen_at: DateTime<Utc>,
    ) -> Result<Contact, DatabaseError>;

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, DatabaseError>;

    /// Compare-and-set the contact's mode. Returns `false` when the stored
    /// mode was not `from` (a concurrent writer got there first).
    async fn update_contact_mode(
        &self,
        id: &str,
        from: ContactMode,
        to: ContactMode,
    ) -> Result<bool, DatabaseError>;

    /// Record that `trigger_id` was delivered. Returns `true` only for the
    /// call that actually added it.
    async fn mark_trigger_consumed(
        &self,
        contact_id: &str,
        trigger_id: &str,
    ) -> Result<bool, DatabaseError>;

    /// All contacts in a broadcast segment, oldest first.
    async fn find_contacts(&self, segment: &Segment) -> Result<Vec<Contact>, DatabaseError>;

    /// Contacts without a bio whose age is within `[min_age, max_age]`.
    async fn find_bio_candidates(
        &self,
        now: DateTime<Utc>,
        min_age: chrono::Duration,
        max_age: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Contact>, DatabaseError>;

    async fn mark_bio_sent(&self, contact_id: &str) -> Result<(), DatabaseError>;

    // ── Catalog ─────────────────────────────────────────────────────

    /// Insert a catalog item. A taken trigger id yields
    /// [`DatabaseError::Constraint`].
    async fn insert_content_item(&self, item: &ContentItem) -> Result<(), DatabaseError>;

    /// Look up an item by trigger, active or not.
    async fn find_content_item(&self, trigger_id: &str)
    -> Result<Option<ContentItem>, DatabaseError>;

    async fn list_active_items(&self) -> Result<Vec<ContentItem>, DatabaseError>;

    // ── Knowledge ───────────────────────────────────────────────────

    async fn insert_knowledge(&self, entry: &KnowledgeEntry) -> Result<(), DatabaseError>;

    async fn list_knowledge(&self) -> Result<Vec<KnowledgeEntry>, DatabaseError>;

    async fn insert_pending_fact(&self, fact: &PendingFact) -> Result<(), DatabaseError>;

    /// Atomically remove and return a pending fact. A second call for the
    /// same id returns `None`.
    async fn take_pending_fact(&self, id: Uuid) -> Result<Option<PendingFact>, DatabaseError>;

    // ── History ─────────────────────────────────────────────────────

    async fn append_history(
        &self,
        contact_id: &str,
        role: HistoryRole,
        text: &str,
    ) -> Result<(), DatabaseError>;

    /// The last `limit` turns for a contact, oldest first.
    async fn recent_history(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryTurn>, DatabaseError>;

    // ── Audit log ───────────────────────────────────────────────────

    async fn record_event(&self, event: &AuditEvent) -> Result<(), DatabaseError>;

    /// Most recent events first.
    async fn recent_events(&self, limit: usize) -> Result<Vec<AuditEvent>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}
