//! Page storage backends.
//!
//! Every mutation reaches a backend as one [`PageCommit`]. A backend applies
//! it as a single atomic unit: token check, slug reservation or rename, link
//! delta, text bodies, revision append and page-record update either all
//! happen or none do. The shared [`plan_commit`] function computes what a
//! commit will write from the state the backend read under its lock, so
//! both backends derive revisions identically.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::compiler::CompiledOutput;
use crate::error::EngineError;
use crate::links::{ParentChange, ParentDelta};
use crate::tags::TagDelta;
use crate::text::content_hash;
use crate::types::{
    LayoutChange, Page, PageId, PageLayout, PageScore, Revision, RevisionCandidate,
    RevisionContent, RevisionDelta, RevisionKind, RevisionNumber, RevisionSummary, SiteId,
    UserId, VoteAction,
};

/// Failure of a mutating store call.
#[derive(Debug, thiserror::Error)]
pub enum CommitError<E: std::error::Error> {
    /// The commit broke a domain rule and nothing was written.
    #[error(transparent)]
    Rejected(EngineError),
    /// The backend failed.
    #[error("backend failure: {0}")]
    Backend(E),
}

impl<E: std::error::Error> CommitError<E> {
    /// Fold into an engine error, hiding the backend type.
    pub fn into_engine(self) -> EngineError {
        match self {
            Self::Rejected(error) => error,
            Self::Backend(error) => EngineError::from_store(error),
        }
    }
}

impl<E: std::error::Error> From<EngineError> for CommitError<E> {
    fn from(error: EngineError) -> Self {
        Self::Rejected(error)
    }
}

/// Which page a commit applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitTarget {
    /// Create a page at a normalized slug. If a live page already holds the
    /// slug the commit becomes an edit of that page and the token decides.
    Create {
        /// Normalized slug.
        slug: String,
    },
    /// An existing page of the commit's site.
    Existing(PageId),
}

/// Freshly compiled source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSource {
    /// Source text.
    pub wikitext: String,
    /// What the compiler made of it.
    pub output: CompiledOutput,
    /// When it was compiled.
    pub compiled_at: DateTime<Utc>,
}

/// Content fields an edit replaces. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentEdit {
    /// New title.
    pub title: Option<String>,
    /// New alt title. `Some(None)` clears it.
    pub alt_title: Option<Option<String>>,
    /// New source with its compiled form.
    pub source: Option<CompiledSource>,
}

/// How the new revision's content is derived from the current one.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentChange {
    /// Copy the latest revision's content.
    Carry,
    /// Merge edited fields over the latest revision's content.
    Edit(ContentEdit),
    /// Replace content with an earlier revision's.
    Rollback {
        /// Revision number the content came from.
        target: RevisionNumber,
        /// That revision's content.
        content: RevisionContent,
    },
}

/// Side-property changes made by a commit. `None` leaves a property alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageChanges {
    /// New normalized slug.
    pub slug: Option<String>,
    /// New deletion state.
    pub deleted: Option<bool>,
    /// New normalized tag set.
    pub tags: Option<Vec<String>>,
    /// New layout (`Some(None)` resets to the site default).
    pub layout: Option<Option<PageLayout>>,
    /// Parent edges to add and remove, resolved to ids.
    pub parents: Option<ParentChange>,
}

/// One atomic mutation of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCommit {
    /// Site the page belongs to.
    pub site_id: SiteId,
    /// Page to change or slug to create.
    pub target: CommitTarget,
    /// Kind of the revision to append.
    pub kind: RevisionKind,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Revision comments.
    pub comments: String,
    /// Concurrency token. `None` skips the check.
    pub expected_revision: Option<RevisionNumber>,
    /// Content of the new revision.
    pub content: ContentChange,
    /// Side-property changes.
    pub changes: PageChanges,
}

/// What a successful commit wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    /// Page record after the commit.
    pub page: Page,
    /// The appended revision.
    pub revision: Revision,
}

/// State a backend read for the commit's page, under its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    /// Locked page record.
    pub page: Page,
    /// Content of the latest revision.
    pub content: RevisionContent,
}

/// Everything a backend has to write for one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitPlan {
    /// Slug after the commit.
    pub slug: String,
    /// Deletion time after the commit.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Tag set after the commit.
    pub tags: Vec<String>,
    /// Layout after the commit.
    pub layout: Option<PageLayout>,
    /// The revision to append.
    pub candidate: RevisionCandidate,
    /// Text bodies to store, keyed later by their hash.
    pub texts: Vec<String>,
}

impl CommitPlan {
    /// Page record once `revision` is appended.
    pub fn page_record(
        &self,
        page_id: PageId,
        site_id: SiteId,
        current: Option<&Page>,
        revision: &Revision,
    ) -> Page {
        Page {
            page_id,
            site_id,
            slug: self.slug.clone(),
            title: self.candidate.content.title.clone(),
            created_at: current.map(|page| page.created_at).unwrap_or(revision.created_at),
            updated_at: revision.created_at,
            deleted_at: self.deleted_at,
            latest_revision_id: revision.revision_id,
            latest_revision_number: revision.revision_number,
            tags: self.tags.clone(),
            layout: self.layout,
            score: current.map(|page| page.score).unwrap_or(0),
        }
    }
}

fn source_content(
    base: Option<&RevisionContent>,
    edit: &ContentEdit,
    texts: &mut Vec<String>,
) -> Result<RevisionContent, EngineError> {
    let title = match (&edit.title, base) {
        (Some(title), _) => title.clone(),
        (None, Some(base)) => base.title.clone(),
        (None, None) => String::new(),
    };
    let alt_title = match (&edit.alt_title, base) {
        (Some(alt_title), _) => alt_title.clone(),
        (None, Some(base)) => base.alt_title.clone(),
        (None, None) => None,
    };

    match (&edit.source, base) {
        (Some(source), _) => {
            texts.push(source.wikitext.clone());
            texts.push(source.output.html.clone());
            Ok(RevisionContent {
                title,
                alt_title,
                wikitext_hash: content_hash(&source.wikitext),
                compiled_hash: content_hash(&source.output.html),
                compiled_at: source.compiled_at,
                compiled_generator: source.output.generator.clone(),
                compiled_metadata: source.output.metadata.clone(),
            })
        }
        (None, Some(base)) => Ok(RevisionContent {
            title,
            alt_title,
            ..base.clone()
        }),
        (None, None) => Err(EngineError::validation("wikitext", "required when creating a page")),
    }
}

/// Compute the revision and page state a commit produces.
///
/// `current` is `None` when the commit creates a page. `parents` is the
/// effective parent delta the backend already validated, if the commit
/// changes parents. The concurrency token is checked by the backend before
/// calling this.
pub fn plan_commit(
    commit: &PageCommit,
    current: Option<&CurrentState>,
    parents: Option<&ParentDelta>,
    now: DateTime<Utc>,
) -> Result<CommitPlan, EngineError> {
    let changes = &commit.changes;

    match (current, commit.kind) {
        (None, RevisionKind::Edit) => {}
        (None, _) => {
            return Err(EngineError::not_found(format!("page for {} revision", commit.kind)));
        }
        (Some(state), RevisionKind::Restore) if !state.page.is_deleted() => {
            return Err(EngineError::validation(
                "page",
                format!("page {} is not deleted", state.page.page_id),
            ));
        }
        (Some(state), kind) if kind != RevisionKind::Restore && state.page.is_deleted() => {
            return Err(EngineError::not_found(format!("page {}", state.page.page_id)));
        }
        (Some(_), _) => {}
    }

    let base_page = current.map(|state| &state.page);
    let old_slug = base_page.map(|page| page.slug.clone());
    let old_tags: Vec<String> = base_page.map(|page| page.tags.clone()).unwrap_or_default();
    let old_layout = base_page.and_then(|page| page.layout);

    let slug = match (&changes.slug, &old_slug) {
        (Some(new), Some(old)) if new == old => {
            return Err(EngineError::validation("new-slug", format!("page is already at '{}'", old)));
        }
        (Some(new), _) => new.clone(),
        (None, Some(old)) => old.clone(),
        (None, None) => match &commit.target {
            CommitTarget::Create { slug } => slug.clone(),
            CommitTarget::Existing(id) => return Err(EngineError::not_found(format!("page {}", id))),
        },
    };

    let deleted_at = match changes.deleted {
        Some(true) => Some(now),
        Some(false) => None,
        None => base_page.and_then(|page| page.deleted_at),
    };
    let tags = changes.tags.clone().unwrap_or_else(|| old_tags.clone());
    let layout = changes.layout.unwrap_or(old_layout);

    let mut texts = Vec::new();
    let content = match &commit.content {
        ContentChange::Carry => match current {
            Some(state) => state.content.clone(),
            None => return Err(EngineError::not_found("current revision")),
        },
        ContentChange::Edit(edit) => {
            source_content(current.map(|state| &state.content), edit, &mut texts)?
        }
        ContentChange::Rollback { content, .. } => content.clone(),
    };

    let layout_change = changes
        .layout
        .filter(|new| *new != old_layout)
        .map(|to| LayoutChange { from: old_layout, to });

    let delta = match commit.kind {
        RevisionKind::Edit => RevisionDelta::Edit {
            created: current.is_none(),
            tags: changes
                .tags
                .as_ref()
                .map(|new| TagDelta::between(&old_tags, new))
                .filter(|delta| !delta.is_empty()),
            layout: layout_change,
        },
        RevisionKind::Move => RevisionDelta::Move {
            from: old_slug.unwrap_or_default(),
            to: slug.clone(),
        },
        RevisionKind::Delete => RevisionDelta::Delete,
        RevisionKind::Restore => RevisionDelta::Restore,
        RevisionKind::Rollback => match &commit.content {
            ContentChange::Rollback { target, .. } => RevisionDelta::Rollback { target: *target },
            _ => return Err(EngineError::validation("revision-number", "rollback needs a target revision")),
        },
        RevisionKind::TagUpdate => {
            let delta = TagDelta::between(&old_tags, &tags);
            RevisionDelta::Tags { added: delta.added, removed: delta.removed }
        }
        RevisionKind::ParentUpdate => {
            let delta = parents.cloned().unwrap_or_default();
            RevisionDelta::Parents { added: delta.added, removed: delta.removed }
        }
        RevisionKind::LayoutUpdate => RevisionDelta::Layout(LayoutChange {
            from: old_layout,
            to: layout,
        }),
    };

    Ok(CommitPlan {
        slug: slug.clone(),
        deleted_at,
        tags,
        layout,
        candidate: RevisionCandidate {
            kind: commit.kind,
            user_id: commit.user_id,
            created_at: now,
            comments: commit.comments.clone(),
            slug,
            content,
            delta,
        },
        texts,
    })
}

/// Trait for page storage backends.
///
/// Implementations must guarantee deterministic ordering of results and
/// must apply [`PageStore::commit`] atomically.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Page holding a normalized slug, deleted or not.
    async fn resolve_slug(&self, site_id: SiteId, slug: &str) -> Result<Option<PageId>, Self::Error>;

    /// Fetch a page record.
    async fn get_page(&self, page_id: PageId) -> Result<Option<Page>, Self::Error>;

    /// Fetch several page records (ordered by page id, missing ids skipped).
    async fn get_pages(&self, ids: &[PageId]) -> Result<Vec<Page>, Self::Error>;

    /// Fetch a revision by number, or the current one for `None`.
    async fn get_revision(
        &self,
        page_id: PageId,
        number: Option<RevisionNumber>,
    ) -> Result<Option<Revision>, Self::Error>;

    /// Revision summaries, descending from `from` (inclusive).
    async fn history(
        &self,
        page_id: PageId,
        from: Option<RevisionNumber>,
        limit: Option<usize>,
    ) -> Result<Vec<RevisionSummary>, Self::Error>;

    /// Fetch a text body by hash.
    async fn get_text(&self, hash: &str) -> Result<Option<String>, Self::Error>;

    /// Parent page ids (ordered by page id).
    async fn get_parents(&self, page_id: PageId) -> Result<Vec<PageId>, Self::Error>;

    /// Child page ids (ordered by page id).
    async fn get_children(&self, page_id: PageId) -> Result<Vec<PageId>, Self::Error>;

    /// Deleted pages currently at a slug (ordered by page id).
    async fn deleted_pages(&self, site_id: SiteId, slug: &str) -> Result<Vec<Page>, Self::Error>;

    /// Apply one mutation atomically.
    async fn commit(&self, commit: PageCommit) -> Result<CommitReceipt, CommitError<Self::Error>>;

    /// Upsert or remove a vote on a live page and return the new score.
    async fn cast_vote(
        &self,
        page_id: PageId,
        user_id: UserId,
        action: VoteAction,
    ) -> Result<PageScore, CommitError<Self::Error>>;

    /// Vote aggregate of a page.
    async fn score(&self, page_id: PageId) -> Result<PageScore, Self::Error>;

    /// Whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::InMemoryPageStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresPageStore;
