//! Parent/child link graph.
//!
//! Edges point from a child page to each of its parents. A delta is
//! validated as a whole before any edge changes, then applied with removals
//! first so that re-adding a just-removed parent is a no-op.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EngineError, LinkViolation};
use crate::types::PageId;

/// Liveness of a prospective parent, as seen by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// Live page in the same site.
    Live,
    /// No such page.
    Missing,
    /// Page exists but is soft-deleted.
    Deleted,
    /// Page lives in another site.
    ForeignSite,
}

/// Requested parent changes, already resolved to page ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChange {
    /// Pages to link as parents.
    pub add: BTreeSet<PageId>,
    /// Pages to unlink.
    pub remove: BTreeSet<PageId>,
}

impl ParentChange {
    /// Whether the change names no pages at all.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Edges actually added and removed by a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentDelta {
    /// Parents that were not linked before.
    pub added: Vec<PageId>,
    /// Parents that were linked and are now gone.
    pub removed: Vec<PageId>,
}

/// Validate a change without touching any edges.
///
/// Overlap is checked first, then self-parenting, then each added target's
/// liveness in ascending id order, so the reported id is deterministic.
pub fn check_change(
    page_id: PageId,
    change: &ParentChange,
    mut target: impl FnMut(PageId) -> LinkTarget,
) -> Result<(), EngineError> {
    if let Some(overlap) = change.add.intersection(&change.remove).next() {
        return Err(EngineError::invalid_link(overlap, LinkViolation::AddRemoveOverlap));
    }
    if change.add.contains(&page_id) {
        return Err(EngineError::invalid_link(page_id, LinkViolation::SelfParent));
    }
    for &parent in &change.add {
        let violation = match target(parent) {
            LinkTarget::Live => continue,
            LinkTarget::Missing => LinkViolation::MissingPage,
            LinkTarget::Deleted => LinkViolation::DeletedPage,
            LinkTarget::ForeignSite => LinkViolation::ForeignSite,
        };
        return Err(EngineError::invalid_link(parent, violation));
    }
    Ok(())
}

/// Effective edge changes given the current parent set.
pub fn effective_delta(current: &BTreeSet<PageId>, change: &ParentChange) -> ParentDelta {
    let removed: Vec<PageId> = change.remove.intersection(current).copied().collect();
    let added: Vec<PageId> = change.add.difference(current).copied().collect();
    ParentDelta { added, removed }
}

/// In-memory edge table, indexed both ways.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    /// Child -> parents.
    parents: BTreeMap<PageId, BTreeSet<PageId>>,
    /// Parent -> children.
    children: BTreeMap<PageId, BTreeSet<PageId>>,
}

impl LinkGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a change and report its effective delta, without applying it.
    pub fn preview_delta(
        &self,
        page_id: PageId,
        change: &ParentChange,
        target: impl FnMut(PageId) -> LinkTarget,
    ) -> Result<ParentDelta, EngineError> {
        check_change(page_id, change, target)?;
        let current = self.parents.get(&page_id).cloned().unwrap_or_default();
        Ok(effective_delta(&current, change))
    }

    /// Validate and apply a change. Either every edge changes or none does.
    pub fn apply_delta(
        &mut self,
        page_id: PageId,
        change: &ParentChange,
        target: impl FnMut(PageId) -> LinkTarget,
    ) -> Result<ParentDelta, EngineError> {
        let delta = self.preview_delta(page_id, change, target)?;

        for parent in &change.remove {
            self.unlink(page_id, *parent);
        }
        for parent in &change.add {
            self.parents.entry(page_id).or_default().insert(*parent);
            self.children.entry(*parent).or_default().insert(page_id);
        }

        Ok(delta)
    }

    fn unlink(&mut self, child: PageId, parent: PageId) {
        if let Some(set) = self.parents.get_mut(&child) {
            set.remove(&parent);
            if set.is_empty() {
                self.parents.remove(&child);
            }
        }
        if let Some(set) = self.children.get_mut(&parent) {
            set.remove(&child);
            if set.is_empty() {
                self.children.remove(&parent);
            }
        }
    }

    /// Parents of a page (ordered by id).
    pub fn parents_of(&self, page_id: PageId) -> Vec<PageId> {
        self.parents
            .get(&page_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Children of a page (ordered by id).
    pub fn children_of(&self, page_id: PageId) -> Vec<PageId> {
        self.children
            .get(&page_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of edges.
    pub fn num_edges(&self) -> usize {
        self.parents.values().map(BTreeSet::len).sum()
    }
}
