use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::RelationshipConfig;
use crate::models::Record;

use super::relationships::RelationshipIndex;

/// Named, top-level results of the preload cycle.
///
/// Lists are keyed by their configured alias. Records are shared with the
/// cache entries they came from and never mutated; derived linkage lives in
/// `relationships`.
#[derive(Debug, Clone, Default)]
pub struct DataSlots {
    lists: BTreeMap<String, Arc<Vec<Record>>>,
    current_user: Option<Arc<Record>>,
    site_users: Option<Arc<Vec<Record>>>,
    users_by_id: HashMap<i64, usize>,
    relationships: RelationshipIndex,
}

impl DataSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_list(&mut self, alias: impl Into<String>, records: Arc<Vec<Record>>) {
        self.lists.insert(alias.into(), records);
    }

    pub fn set_current_user(&mut self, user: Arc<Record>) {
        self.current_user = Some(user);
    }

    /// Store the site users and rebuild the id index.
    pub fn set_site_users(&mut self, users: Arc<Vec<Record>>) {
        self.users_by_id = users
            .iter()
            .enumerate()
            .filter_map(|(i, user)| user.id().map(|id| (id, i)))
            .collect();
        self.site_users = Some(users);
    }

    /// Rebuild parent/requirement linkage from the configured slots.
    /// Cleared when either slot is missing.
    pub fn relink(&mut self, config: &RelationshipConfig) {
        match (
            self.lists.get(&config.parent_list),
            self.lists.get(&config.requirement_list),
        ) {
            (Some(parents), Some(requirements)) => {
                self.relationships
                    .relink(parents, requirements, &config.link_field);
            }
            _ => self.relationships = RelationshipIndex::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn list(&self, alias: &str) -> Option<&Arc<Vec<Record>>> {
        self.lists.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }

    pub fn current_user(&self) -> Option<&Arc<Record>> {
        self.current_user.as_ref()
    }

    pub fn site_users(&self) -> Option<&Arc<Vec<Record>>> {
        self.site_users.as_ref()
    }

    pub fn user(&self, id: i64) -> Option<&Record> {
        let index = *self.users_by_id.get(&id)?;
        self.site_users.as_ref()?.get(index)
    }

    pub fn relationships(&self) -> &RelationshipIndex {
        &self.relationships
    }

    /// Record count per populated list slot.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.lists
            .iter()
            .map(|(alias, records)| (alias.clone(), records.len()))
            .collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.current_user.is_some() && self.site_users.is_some()
    }
}
