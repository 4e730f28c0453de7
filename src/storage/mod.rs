//! Local persistence: the in-memory issue table and its `SQLite` cache.
//!
//! The [`IssueStore`] is the single process-local table keyed by issue key.
//! It is constructed once at program start from [`SqliteStorage::load_all`]
//! and passed explicitly to whoever needs it; there is no ambient global
//! store.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::model::Issue;
use std::collections::BTreeMap;

/// The process-local issue table.
#[derive(Debug, Default)]
pub struct IssueStore {
    issues: BTreeMap<String, Issue>,
}

impl IssueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the store from loaded records, keyed by their keys.
    #[must_use]
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            issues: issues.into_iter().map(|i| (i.key.clone(), i)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Issue> {
        self.issues.get(key)
    }

    #[must_use]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Issue> {
        self.issues.get_mut(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.issues.contains_key(key)
    }

    /// Insert or replace a record under its own key.
    pub fn upsert(&mut self, issue: Issue) {
        self.issues.insert(issue.key.clone(), issue);
    }

    pub fn remove(&mut self, key: &str) -> Option<Issue> {
        self.issues.remove(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Issue> {
        self.issues.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Replace a temporary record with its server-acknowledged successor.
    ///
    /// The temporary entry is dropped, the new record is inserted under the
    /// server-assigned key, and any other record whose epic or parent link
    /// pointed at the temporary key is re-pointed at the new one.
    pub fn rekey(&mut self, temp_key: &str, issue: Issue) {
        let new_key = issue.key.clone();
        self.issues.remove(temp_key);

        for other in self.issues.values_mut() {
            if other.epic_link.as_deref() == Some(temp_key) {
                other.epic_link = Some(new_key.clone());
            }
            if other.parent_link.as_deref() == Some(temp_key) {
                other.parent_link = Some(new_key.clone());
            }
        }

        self.issues.insert(new_key, issue);
    }
}
