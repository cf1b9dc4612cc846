//! Owner-scoped entry storage
//!
//! Every read and write takes the owner from the caller's
//! [`IdentityContext`]; there is no way to address another owner's entries.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::IdentityContext;
use crate::types::LintelError;

/// Longest accepted title, in characters
pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Uuid,
    pub owner: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating an entry. Ownership is never accepted from
/// the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEntry {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl NewEntry {
    pub fn validate(&self) -> Result<(), LintelError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(LintelError::BadRequest("title must not be empty".into()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(LintelError::BadRequest(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct EntryStore {
    /// owner -> entries, oldest first
    entries: DashMap<Uuid, Vec<Entry>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, caller: &IdentityContext) -> Vec<Entry> {
        self.entries
            .get(&caller.subject)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    pub fn create(&self, caller: &IdentityContext, new: NewEntry) -> Result<Entry, LintelError> {
        new.validate()?;

        let entry = Entry {
            id: Uuid::new_v4(),
            owner: caller.subject,
            title: new.title.trim().to_string(),
            body: new.body,
            created_at: Utc::now(),
        };
        self.entries
            .entry(caller.subject)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    /// Other owners' entries are indistinguishable from missing ones
    pub fn get(&self, caller: &IdentityContext, id: Uuid) -> Option<Entry> {
        self.entries
            .get(&caller.subject)?
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    pub fn delete(&self, caller: &IdentityContext, id: Uuid) -> bool {
        match self.entries.get_mut(&caller.subject) {
            Some(mut entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                entries.len() != before
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(identifier: &str) -> IdentityContext {
        IdentityContext {
            subject: Uuid::new_v4(),
            identifier: identifier.to_string(),
        }
    }

    fn new_entry(title: &str) -> NewEntry {
        NewEntry {
            title: title.to_string(),
            body: "body".to_string(),
        }
    }

    #[test]
    fn test_entries_are_owner_scoped() {
        let store = EntryStore::new();
        let alice = caller("a@x.com");
        let bob = caller("b@x.com");

        let entry = store.create(&alice, new_entry("first")).unwrap();
        assert_eq!(entry.owner, alice.subject);

        assert_eq!(store.list(&alice), vec![entry.clone()]);
        assert!(store.list(&bob).is_empty());
        assert!(store.get(&bob, entry.id).is_none());
        assert!(!store.delete(&bob, entry.id));
        assert_eq!(store.get(&alice, entry.id), Some(entry));
    }

    #[test]
    fn test_delete() {
        let store = EntryStore::new();
        let alice = caller("a@x.com");
        let first = store.create(&alice, new_entry("first")).unwrap();
        let second = store.create(&alice, new_entry("second")).unwrap();

        assert!(store.delete(&alice, first.id));
        assert!(!store.delete(&alice, first.id));
        assert_eq!(store.list(&alice), vec![second]);
    }

    #[test]
    fn test_title_validation() {
        let store = EntryStore::new();
        let alice = caller("a@x.com");
        assert!(store.create(&alice, new_entry("   ")).is_err());
        assert!(store
            .create(&alice, new_entry(&"x".repeat(MAX_TITLE_CHARS + 1)))
            .is_err());
        assert!(store.list(&alice).is_empty());
    }

    #[test]
    fn test_owner_field_rejected_in_body() {
        let parsed: Result<NewEntry, _> =
            serde_json::from_str(r#"{"title":"t","owner":"someone-else"}"#);
        assert!(parsed.is_err());
    }
}
