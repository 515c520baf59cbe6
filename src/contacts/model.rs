//! Contact record and its interaction mode.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The interaction mode a contact is in. At most one is ever active.
///
/// Transitions:
/// - `None | Onboarding` → `Onboarding` on a bare `/start` with a non-empty catalog.
/// - `Onboarding` → `None` through a valid recommendation, or when the
///   catalog has nothing left to recommend.
/// - `None` ↔ `Learning` through the operator toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMode {
    #[default]
    None,
    Onboarding,
    Learning,
}

/// A transition that is not allowed from the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} while in {from} mode")]
pub struct ModeTransitionError {
    pub from: ContactMode,
    pub action: &'static str,
}

impl ContactMode {
    /// Enter (or restart) onboarding.
    pub fn start_onboarding(self) -> Result<ContactMode, ModeTransitionError> {
        match self {
            Self::None | Self::Onboarding => Ok(Self::Onboarding),
            Self::Learning => Err(ModeTransitionError {
                from: self,
                action: "start onboarding",
            }),
        }
    }

    /// Leave onboarding after a recommendation was delivered.
    pub fn finish_onboarding(self) -> Result<ContactMode, ModeTransitionError> {
        match self {
            Self::Onboarding => Ok(Self::None),
            _ => Err(ModeTransitionError {
                from: self,
                action: "finish onboarding",
            }),
        }
    }

    /// Leave onboarding because no active item is left to recommend.
    pub fn abandon_onboarding(self) -> Result<ContactMode, ModeTransitionError> {
        match self {
            Self::Onboarding => Ok(Self::None),
            _ => Err(ModeTransitionError {
                from: self,
                action: "abandon onboarding",
            }),
        }
    }

    /// Flip learning mode on or off.
    pub fn toggle_learning(self) -> Result<ContactMode, ModeTransitionError> {
        match self {
            Self::None => Ok(Self::Learning),
            Self::Learning => Ok(Self::None),
            Self::Onboarding => Err(ModeTransitionError {
                from: self,
                action: "toggle learning",
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Onboarding => "onboarding",
            Self::Learning => "learning",
        }
    }
}

impl std::str::FromStr for ContactMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "onboarding" => Ok(Self::Onboarding),
            "learning" => Ok(Self::Learning),
            other => Err(format!("unknown contact mode: {other}")),
        }
    }
}

impl std::fmt::Display for ContactMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity fields refreshed from every inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactProfile {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ContactProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    /// Best human-readable name: first name, then @username, then the id.
    pub fn display_name(&self) -> String {
        if let Some(first) = self.first_name.as_deref().filter(|s| !s.is_empty()) {
            match self.last_name.as_deref().filter(|s| !s.is_empty()) {
                Some(last) => format!("{first} {last}"),
                None => first.to_string(),
            }
        } else if let Some(username) = self.username.as_deref().filter(|s| !s.is_empty()) {
            format!("@{username}")
        } else {
            self.id.clone()
        }
    }
}

/// One durable record per contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub profile: ContactProfile,
    pub consumed_triggers: BTreeSet<String>,
    pub mode: ContactMode,
    pub bio_sent: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Contact {
    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn has_consumed(&self, trigger_id: &str) -> bool {
        self.consumed_triggers.contains(trigger_id)
    }
}

/// Audience selector for bulk sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    All,
    ConsumedTrigger(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_can_restart_but_not_from_learning() {
        assert_eq!(
            ContactMode::None.start_onboarding(),
            Ok(ContactMode::Onboarding)
        );
        assert_eq!(
            ContactMode::Onboarding.start_onboarding(),
            Ok(ContactMode::Onboarding)
        );
        assert!(ContactMode::Learning.start_onboarding().is_err());
    }

    #[test]
    fn onboarding_only_finishes_from_onboarding() {
        assert_eq!(
            ContactMode::Onboarding.finish_onboarding(),
            Ok(ContactMode::None)
        );
        assert!(ContactMode::None.finish_onboarding().is_err());
        assert!(ContactMode::Learning.finish_onboarding().is_err());
        assert_eq!(
            ContactMode::Onboarding.abandon_onboarding(),
            Ok(ContactMode::None)
        );
        assert!(ContactMode::Learning.abandon_onboarding().is_err());
    }

    #[test]
    fn learning_toggles_and_never_overlaps_onboarding() {
        assert_eq!(ContactMode::None.toggle_learning(), Ok(ContactMode::Learning));
        assert_eq!(ContactMode::Learning.toggle_learning(), Ok(ContactMode::None));

        let err = ContactMode::Onboarding.toggle_learning().unwrap_err();
        assert_eq!(err.from, ContactMode::Onboarding);
        assert_eq!(err.to_string(), "cannot toggle learning while in onboarding mode");
    }

    #[test]
    fn mode_string_roundtrip() {
        for mode in [ContactMode::None, ContactMode::Onboarding, ContactMode::Learning] {
            let parsed: ContactMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
            assert_eq!(
                serde_json::to_string(&mode).unwrap(),
                format!("\"{mode}\"")
            );
        }
        assert!("both".parse::<ContactMode>().is_err());
    }

    #[test]
    fn display_name_prefers_first_name() {
        let profile = ContactProfile::new("42")
            .with_username("jdoe")
            .with_first_name("Jane");
        assert_eq!(profile.display_name(), "Jane");

        let profile = ContactProfile::new("42").with_username("jdoe");
        assert_eq!(profile.display_name(), "@jdoe");

        assert_eq!(ContactProfile::new("42").display_name(), "42");
    }
}
