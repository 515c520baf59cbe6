//! Content items ("lead magnets") released through deep-link triggers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an item's payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// `payload` is a URL (or a bare domain / @handle to normalise).
    Link,
    /// `payload` is sent verbatim.
    Text,
    /// `payload` is a platform media reference.
    File,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Text => "text",
            Self::File => "file",
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link" => Ok(Self::Link),
            "text" => Ok(Self::Text),
            "file" => Ok(Self::File),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// A gated piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub trigger_id: String,
    pub name: String,
    pub description: String,
    pub kind: ContentKind,
    pub payload: String,
    pub welcome_text: Option<String>,
    pub follow_ups: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn new(
        trigger_id: impl Into<String>,
        name: impl Into<String>,
        kind: ContentKind,
        payload: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            trigger_id: trigger_id.into(),
            name: name.into(),
            description: String::new(),
            kind,
            payload: payload.into(),
            welcome_text: None,
            follow_ups: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_welcome(mut self, text: impl Into<String>) -> Self {
        self.welcome_text = Some(text.into());
        self
    }

    pub fn with_follow_ups<I, S>(mut self, follow_ups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.follow_ups = follow_ups.into_iter().map(Into::into).collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// The welcome text, or a generated one naming the item.
    pub fn welcome(&self) -> String {
        match self.welcome_text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => text.to_string(),
            None if self.description.is_empty() => format!("Here is your content: {}", self.name),
            None => format!("Here is your content: {}\n\n{}", self.name, self.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_falls_back_to_name_and_description() {
        let item = ContentItem::new("promo1", "Checklist", ContentKind::Link, "example.com")
            .with_description("Ten steps to launch");
        assert_eq!(item.welcome(), "Here is your content: Checklist\n\nTen steps to launch");

        let item = item.with_welcome("Enjoy!");
        assert_eq!(item.welcome(), "Enjoy!");
    }

    #[test]
    fn blank_welcome_is_ignored() {
        let item = ContentItem::new("t", "Guide", ContentKind::Text, "body").with_welcome("  ");
        assert_eq!(item.welcome(), "Here is your content: Guide");
    }

    #[test]
    fn kind_parses_db_strings() {
        for kind in [ContentKind::Link, ContentKind::Text, ContentKind::File] {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert!("video".parse::<ContentKind>().is_err());
    }
}
