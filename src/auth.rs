//! Operator authorization.

use crate::contacts::ContactProfile;

/// Decides whether a sender may use operator-only features.
pub trait Authorizer: Send + Sync {
    fn is_operator(&self, sender: &ContactProfile) -> bool;
}

/// Allow-list of operator identities: numeric ids or usernames, `*` for everyone.
#[derive(Debug, Clone, Default)]
pub struct OperatorAllowList {
    allowed: Vec<String>,
}

impl OperatorAllowList {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Authorizer for OperatorAllowList {
    fn is_operator(&self, sender: &ContactProfile) -> bool {
        let identities = std::iter::once(sender.id.as_str()).chain(sender.username.as_deref());
        check_user_allowed(&self.allowed, identities)
    }
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().filter(|id| !id.is_empty()).collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(id: &str, username: Option<&str>) -> ContactProfile {
        let profile = ContactProfile::new(id);
        match username {
            Some(u) => profile.with_username(u),
            None => profile,
        }
    }

    #[test]
    fn allowed_by_numeric_id() {
        let list = OperatorAllowList::new(["7", "8"]);
        assert!(list.is_operator(&sender("7", None)));
        assert!(!list.is_operator(&sender("42", None)));
    }

    #[test]
    fn allowed_by_username() {
        let list = OperatorAllowList::new(["boss"]);
        assert!(list.is_operator(&sender("1", Some("boss"))));
        assert!(!list.is_operator(&sender("1", Some("Boss"))));
    }

    #[test]
    fn wildcard_allows_everyone() {
        let list = OperatorAllowList::new(["*"]);
        assert!(list.is_operator(&sender("99", None)));
    }

    #[test]
    fn empty_list_denies() {
        let list = OperatorAllowList::default();
        assert!(!list.is_operator(&sender("7", Some("boss"))));
    }

    #[test]
    fn exact_match_not_substring() {
        let list = OperatorAllowList::new(["77"]);
        assert!(!list.is_operator(&sender("7", None)));
    }
}
