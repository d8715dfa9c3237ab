use std::collections::HashMap;

use tracing::debug;

use crate::models::Record;

/// Parent/requirement linkage, kept beside the records instead of inside them.
///
/// Every parent with an `Id` has an entry (possibly empty); every
/// requirement whose link field names a known parent is listed under it in
/// source order and has a back-reference. Every other requirement, including
/// one without an `Id`, is counted as unlinked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipIndex {
    children: HashMap<i64, Vec<i64>>,
    parents: HashMap<i64, i64>,
    unlinked: usize,
}

impl RelationshipIndex {
    pub fn build(parents: &[Record], requirements: &[Record], link_field: &str) -> Self {
        let mut index = Self::default();
        index.relink(parents, requirements, link_field);
        index
    }

    /// Recompute the index from scratch. Running it twice on the same input
    /// yields the same linkage.
    pub fn relink(&mut self, parents: &[Record], requirements: &[Record], link_field: &str) {
        self.children.clear();
        self.parents.clear();
        self.unlinked = 0;

        for id in parents.iter().filter_map(Record::id) {
            self.children.entry(id).or_default();
        }

        for requirement in requirements {
            let Some(requirement_id) = requirement.id() else {
                debug!(title = %requirement.title(), "Requirement without an Id left unlinked");
                self.unlinked += 1;
                continue;
            };
            let parent_id = requirement.get_i64(link_field);
            match parent_id.and_then(|p| self.children.get_mut(&p).map(|c| (p, c))) {
                Some((parent_id, children)) => {
                    children.push(requirement_id);
                    self.parents.insert(requirement_id, parent_id);
                }
                None => self.unlinked += 1,
            }
        }

        debug!(
            parents = self.children.len(),
            linked = self.parents.len(),
            unlinked = self.unlinked,
            "Built relationship index"
        );
    }

    /// Requirement ids linked to `parent_id`, in source order.
    /// Empty for a parent without requirements and for unknown parents.
    pub fn requirement_ids(&self, parent_id: i64) -> &[i64] {
        self.children
            .get(&parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn parent_id(&self, requirement_id: i64) -> Option<i64> {
        self.parents.get(&requirement_id).copied()
    }

    pub fn is_parent(&self, id: i64) -> bool {
        self.children.contains_key(&id)
    }

    pub fn linked_count(&self) -> usize {
        self.parents.len()
    }

    pub fn unlinked_count(&self) -> usize {
        self.unlinked
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
