//! In-memory page store.
//!
//! All tables sit behind one `parking_lot::RwLock`. A commit takes the write
//! guard once, validates everything, then mutates; the guard is never held
//! across an `.await`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::convert::Infallible;

use super::{
    plan_commit, CommitError, CommitReceipt, CommitTarget, CurrentState, PageCommit, PageStore,
};
use crate::error::EngineError;
use crate::ledger::RevisionLedger;
use crate::links::{LinkGraph, LinkTarget};
use crate::slug::SlugIndex;
use crate::text::TextStore;
use crate::types::{
    Page, PageId, PageScore, Revision, RevisionNumber, RevisionSummary, SiteId, UserId,
    VoteAction,
};
use crate::votes::VoteLedger;

#[derive(Debug, Default)]
struct MemoryState {
    pages: BTreeMap<PageId, Page>,
    next_page_id: i64,
    slugs: SlugIndex,
    ledger: RevisionLedger,
    links: LinkGraph,
    votes: VoteLedger,
    texts: TextStore,
}

fn link_target(pages: &BTreeMap<PageId, Page>, site_id: SiteId, page_id: PageId) -> LinkTarget {
    match pages.get(&page_id) {
        None => LinkTarget::Missing,
        Some(page) if page.site_id != site_id => LinkTarget::ForeignSite,
        Some(page) if page.is_deleted() => LinkTarget::Deleted,
        Some(_) => LinkTarget::Live,
    }
}

impl MemoryState {
    fn current_state(&self, page: &Page) -> Result<CurrentState, EngineError> {
        let latest = self.ledger.get(page.page_id, None).ok_or_else(|| {
            EngineError::Storage(format!("page {} has no revisions", page.page_id))
        })?;
        Ok(CurrentState {
            page: page.clone(),
            content: latest.content.clone(),
        })
    }

    /// Resolve the commit target to a page id plus its current state.
    fn target(&self, commit: &PageCommit) -> Result<(PageId, Option<CurrentState>), EngineError> {
        match &commit.target {
            CommitTarget::Existing(page_id) => {
                let page = self
                    .pages
                    .get(page_id)
                    .filter(|page| page.site_id == commit.site_id)
                    .ok_or_else(|| EngineError::not_found(format!("page {}", page_id)))?;
                Ok((*page_id, Some(self.current_state(page)?)))
            }
            CommitTarget::Create { slug } => match self.slugs.resolve(commit.site_id, slug) {
                Some(holder) => {
                    let page = self
                        .pages
                        .get(&holder)
                        .ok_or_else(|| EngineError::Storage(format!("dangling slug '{}'", slug)))?;
                    if page.is_deleted() {
                        return Err(EngineError::SlugConflict {
                            site_id: commit.site_id,
                            slug: slug.clone(),
                            holder,
                        });
                    }
                    Ok((holder, Some(self.current_state(page)?)))
                }
                None => Ok((PageId::new(self.next_page_id), None)),
            },
        }
    }

    fn apply(&mut self, commit: PageCommit) -> Result<CommitReceipt, EngineError> {
        let now = Utc::now();
        let site_id = commit.site_id;
        let (page_id, current) = self.target(&commit)?;

        self.ledger.verify_expected(page_id, commit.expected_revision)?;

        let parent_delta = match &commit.changes.parents {
            Some(change) => {
                let pages = &self.pages;
                Some(self.links.preview_delta(page_id, change, |id| {
                    link_target(pages, site_id, id)
                })?)
            }
            None => None,
        };

        let plan = plan_commit(&commit, current.as_ref(), parent_delta.as_ref(), now)?;
        self.slugs.ensure_available(site_id, &plan.slug, page_id)?;

        // Everything is validated; nothing below can reject.
        match &current {
            None => {
                self.slugs.reserve(site_id, &plan.slug, page_id)?;
                self.next_page_id += 1;
            }
            Some(state) => self.slugs.rename(site_id, page_id, &state.page.slug, &plan.slug)?,
        }
        if let Some(change) = &commit.changes.parents {
            let pages = &self.pages;
            self.links.apply_delta(page_id, change, |id| link_target(pages, site_id, id))?;
        }
        for text in &plan.texts {
            self.texts.put(text);
        }

        let revision = self
            .ledger
            .append(page_id, site_id, plan.candidate.clone(), commit.expected_revision)?
            .clone();
        let page = plan.page_record(page_id, site_id, current.as_ref().map(|s| &s.page), &revision);
        self.pages.insert(page_id, page.clone());

        Ok(CommitReceipt { page, revision })
    }

    fn vote(&mut self, page_id: PageId, user_id: UserId, action: VoteAction) -> Result<PageScore, EngineError> {
        match self.pages.get(&page_id) {
            Some(page) if !page.is_deleted() => {}
            _ => return Err(EngineError::not_found(format!("page {}", page_id))),
        }

        let score = self.votes.apply(page_id, user_id, action, Utc::now());
        if let Some(page) = self.pages.get_mut(&page_id) {
            page.score = score.score;
        }
        Ok(score)
    }
}

/// In-memory page store for tests and single-process deployments.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug)]
pub struct InMemoryPageStore {
    state: RwLock<MemoryState>,
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                next_page_id: 1,
                ..MemoryState::default()
            }),
        }
    }
}

impl InMemoryPageStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of pages, deleted ones included.
    pub fn num_pages(&self) -> usize {
        self.state.read().pages.len()
    }

    /// Get number of revisions across all pages.
    pub fn num_revisions(&self) -> usize {
        self.state.read().ledger.len()
    }

    /// Get number of distinct stored text bodies.
    pub fn num_texts(&self) -> usize {
        self.state.read().texts.len()
    }

    /// Get number of parent edges.
    pub fn num_edges(&self) -> usize {
        self.state.read().links.num_edges()
    }
}

#[async_trait]
impl PageStore for InMemoryPageStore {
    type Error = Infallible;

    async fn resolve_slug(&self, site_id: SiteId, slug: &str) -> Result<Option<PageId>, Self::Error> {
        Ok(self.state.read().slugs.resolve(site_id, slug))
    }

    async fn get_page(&self, page_id: PageId) -> Result<Option<Page>, Self::Error> {
        Ok(self.state.read().pages.get(&page_id).cloned())
    }

    async fn get_pages(&self, ids: &[PageId]) -> Result<Vec<Page>, Self::Error> {
        let state = self.state.read();
        let mut pages: Vec<Page> = ids
            .iter()
            .filter_map(|id| state.pages.get(id).cloned())
            .collect();
        pages.sort_by_key(|page| page.page_id);
        pages.dedup_by_key(|page| page.page_id);
        Ok(pages)
    }

    async fn get_revision(
        &self,
        page_id: PageId,
        number: Option<RevisionNumber>,
    ) -> Result<Option<Revision>, Self::Error> {
        Ok(self.state.read().ledger.get(page_id, number).cloned())
    }

    async fn history(
        &self,
        page_id: PageId,
        from: Option<RevisionNumber>,
        limit: Option<usize>,
    ) -> Result<Vec<RevisionSummary>, Self::Error> {
        Ok(self.state.read().ledger.history(page_id, from, limit))
    }

    async fn get_text(&self, hash: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.state.read().texts.get(hash).map(str::to_string))
    }

    async fn get_parents(&self, page_id: PageId) -> Result<Vec<PageId>, Self::Error> {
        Ok(self.state.read().links.parents_of(page_id))
    }

    async fn get_children(&self, page_id: PageId) -> Result<Vec<PageId>, Self::Error> {
        Ok(self.state.read().links.children_of(page_id))
    }

    async fn deleted_pages(&self, site_id: SiteId, slug: &str) -> Result<Vec<Page>, Self::Error> {
        Ok(self
            .state
            .read()
            .pages
            .values()
            .filter(|page| page.site_id == site_id && page.slug == slug && page.is_deleted())
            .cloned()
            .collect())
    }

    async fn commit(&self, commit: PageCommit) -> Result<CommitReceipt, CommitError<Self::Error>> {
        self.state.write().apply(commit).map_err(CommitError::Rejected)
    }

    async fn cast_vote(
        &self,
        page_id: PageId,
        user_id: UserId,
        action: VoteAction,
    ) -> Result<PageScore, CommitError<Self::Error>> {
        self.state
            .write()
            .vote(page_id, user_id, action)
            .map_err(CommitError::Rejected)
    }

    async fn score(&self, page_id: PageId) -> Result<PageScore, Self::Error> {
        Ok(self.state.read().votes.score(page_id))
    }
}
