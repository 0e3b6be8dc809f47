//! Append-only revision ledger.
//!
//! `append` is a compare-and-swap on the page's revision counter: it only
//! succeeds when the caller's expected prior revision number matches the
//! current one. Revisions are never mutated or removed once appended.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::types::{
    PageId, Revision, RevisionCandidate, RevisionId, RevisionNumber, RevisionSummary, SiteId,
};

/// Per-page revision lists plus the global revision id counter.
#[derive(Debug, Clone)]
pub struct RevisionLedger {
    revisions: BTreeMap<PageId, Vec<Revision>>,
    next_revision_id: i64,
}

impl Default for RevisionLedger {
    fn default() -> Self {
        Self {
            revisions: BTreeMap::new(),
            next_revision_id: 1,
        }
    }
}

impl RevisionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest revision number of a page, or 0 if it has none.
    pub fn current_number(&self, page_id: PageId) -> RevisionNumber {
        self.revisions
            .get(&page_id)
            .and_then(|list| list.last())
            .map(|rev| rev.revision_number)
            .unwrap_or(0)
    }

    /// Check a concurrency token against the current revision number.
    ///
    /// `None` skips the check.
    pub fn verify_expected(
        &self,
        page_id: PageId,
        expected: Option<RevisionNumber>,
    ) -> Result<(), EngineError> {
        let current = self.current_number(page_id);
        match expected {
            Some(expected) if expected != current => Err(EngineError::ConcurrencyConflict {
                page_id,
                expected,
                current,
            }),
            _ => Ok(()),
        }
    }

    /// Append a revision if `expected` still matches the current number.
    pub fn append(
        &mut self,
        page_id: PageId,
        site_id: SiteId,
        candidate: RevisionCandidate,
        expected: Option<RevisionNumber>,
    ) -> Result<&Revision, EngineError> {
        self.verify_expected(page_id, expected)?;

        let revision_number = self.current_number(page_id) + 1;
        let revision_id = RevisionId::new(self.next_revision_id);
        self.next_revision_id += 1;

        let revision = Revision::from_candidate(
            revision_id,
            page_id,
            site_id,
            revision_number,
            expected,
            candidate,
        );

        let list = self.revisions.entry(page_id).or_default();
        list.push(revision);
        Ok(&list[list.len() - 1])
    }

    /// Get a revision by number, or the current one for `None`.
    pub fn get(&self, page_id: PageId, number: Option<RevisionNumber>) -> Option<&Revision> {
        let list = self.revisions.get(&page_id)?;
        match number {
            None => list.last(),
            // Numbers are dense from 1, so the index is number - 1.
            Some(0) => None,
            Some(n) => list.get(n as usize - 1),
        }
    }

    /// History in descending revision order.
    ///
    /// Starts at `from` (inclusive, `None` = current) and returns at most
    /// `limit` entries (`None` = all).
    pub fn history(
        &self,
        page_id: PageId,
        from: Option<RevisionNumber>,
        limit: Option<usize>,
    ) -> Vec<RevisionSummary> {
        let Some(list) = self.revisions.get(&page_id) else {
            return Vec::new();
        };
        let start = from.unwrap_or(RevisionNumber::MAX);
        list.iter()
            .rev()
            .filter(|rev| rev.revision_number <= start)
            .take(limit.unwrap_or(usize::MAX))
            .map(Revision::summary)
            .collect()
    }

    /// Total revisions across all pages.
    pub fn len(&self) -> usize {
        self.revisions.values().map(Vec::len).sum()
    }

    /// Whether no revision was ever appended.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}
