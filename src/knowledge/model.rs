//! Knowledge entries and the facts awaiting operator approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a fact is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Author,
    Product,
    Faq,
    Expertise,
    Tone,
    Rules,
}

impl FactCategory {
    pub const ALL: [FactCategory; 6] = [
        Self::Author,
        Self::Product,
        Self::Faq,
        Self::Expertise,
        Self::Tone,
        Self::Rules,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Product => "product",
            Self::Faq => "faq",
            Self::Expertise => "expertise",
            Self::Tone => "tone",
            Self::Rules => "rules",
        }
    }

    /// Human label shown to the operator.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Author => "About the author",
            Self::Product => "Product",
            Self::Faq => "FAQ",
            Self::Expertise => "Expertise",
            Self::Tone => "Tone of voice",
            Self::Rules => "Rules",
        }
    }
}

impl std::str::FromStr for FactCategory {
    type Err = String;

    /// Case-insensitive, since models are loose about casing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown fact category: {s}"))
    }
}

/// An approved fact used to ground chat answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub category: FactCategory,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(category: FactCategory, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category,
            title: title.into(),
            content: content.into(),
            keywords: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Renders as `[PRODUCT] Title: content` for prompts.
    pub fn as_prompt_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.category.as_str().to_ascii_uppercase(),
            self.title,
            self.content
        )
    }
}

/// A fact extracted from operator speech, waiting for accept/reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFact {
    pub id: Uuid,
    pub operator_id: String,
    pub category: FactCategory,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl PendingFact {
    pub fn new(
        operator_id: impl Into<String>,
        category: FactCategory,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operator_id: operator_id.into(),
            category,
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Accepting a fact turns it into a knowledge entry with the same fields.
    pub fn into_entry(self) -> KnowledgeEntry {
        KnowledgeEntry::new(self.category, self.title, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!("Product".parse::<FactCategory>().unwrap(), FactCategory::Product);
        assert_eq!(" FAQ ".parse::<FactCategory>().unwrap(), FactCategory::Faq);
        assert!("gossip".parse::<FactCategory>().is_err());
    }

    #[test]
    fn category_serde_matches_db_string() {
        for category in FactCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn prompt_line_format() {
        let entry = KnowledgeEntry::new(FactCategory::Product, "Course", "Six weeks, online");
        assert_eq!(entry.as_prompt_line(), "[PRODUCT] Course: Six weeks, online");
    }

    #[test]
    fn accepted_fact_keeps_its_fields() {
        let fact = PendingFact::new("7", FactCategory::Product, "T", "C");
        let entry = fact.into_entry();
        assert_eq!(entry.category, FactCategory::Product);
        assert_eq!(entry.title, "T");
        assert_eq!(entry.content, "C");
    }
}
