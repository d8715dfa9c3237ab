//! Read-only lookups over the named slots.
//!
//! None of these fail: an unpopulated slot logs a warning and yields an
//! empty result.

use tracing::warn;

use crate::models::Record;

use super::slots::DataSlots;

impl DataSlots {
    fn list_or_warn(&self, alias: &str) -> Option<&[Record]> {
        match self.list(alias) {
            Some(records) => Some(records.as_slice()),
            None => {
                warn!(alias = alias, "List slot not loaded");
                None
            }
        }
    }

    /// First `n` records of a list slot.
    pub fn sample(&self, alias: &str, n: usize) -> Vec<Record> {
        self.list_or_warn(alias)
            .map(|records| records.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    pub fn find<P>(&self, alias: &str, predicate: P) -> Vec<Record>
    where
        P: Fn(&Record) -> bool,
    {
        self.list_or_warn(alias)
            .map(|records| records.iter().filter(|&r| predicate(r)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn find_by_id(&self, alias: &str, id: i64) -> Option<Record> {
        self.list_or_warn(alias)?
            .iter()
            .find(|r| r.id() == Some(id))
            .cloned()
    }

    pub fn user_by_id(&self, id: i64) -> Option<Record> {
        if self.site_users().is_none() {
            warn!("Site users not loaded");
            return None;
        }
        self.user(id).cloned()
    }

    /// Requirement records linked to a parent, in source order.
    pub fn requirements_for(&self, requirement_list: &str, parent_id: i64) -> Vec<Record> {
        let Some(requirements) = self.list_or_warn(requirement_list) else {
            return Vec::new();
        };
        self.relationships()
            .requirement_ids(parent_id)
            .iter()
            .filter_map(|id| requirements.iter().find(|r| r.id() == Some(*id)))
            .cloned()
            .collect()
    }

    pub fn parent_of(&self, parent_list: &str, requirement_id: i64) -> Option<Record> {
        let parent_id = self.relationships().parent_id(requirement_id)?;
        self.find_by_id(parent_list, parent_id)
    }
}
