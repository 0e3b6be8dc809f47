//! Page revision engine.
//!
//! The orchestrator behind every page action. A mutation resolves its page,
//! checks the caller, validates and normalizes input, compiles new source
//! text, and hands the store one [`PageCommit`]. Token check and every write
//! happen inside that commit, so an operation either applies fully or not at
//! all. Conflicts are surfaced, never retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::access::{AccessPolicy, AllowAll};
use crate::action::PageAction;
use crate::compiler::{
    CacheConfig, CachingCompiler, CompileContext, CompiledOutput, Compiler, EscapingCompiler,
};
use crate::config::{EngineConfig, TokenPolicy};
use crate::error::{EngineError, LinkViolation};
use crate::links::ParentChange;
use crate::slug::normalize_slug;
use crate::store::{
    CommitReceipt, CommitTarget, CompiledSource, ContentChange, ContentEdit, PageChanges,
    PageCommit, PageStore,
};
use crate::tags::normalize_tags;
use crate::types::{
    Page, PageId, PageLayout, PageReference, PageScore, PageSummary, Revision, RevisionDelta,
    RevisionId, RevisionKind, RevisionNumber, RevisionSummary, SiteId, UserId, VoteAction,
};

/// Who is changing which page, against which observed revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Site the page belongs to.
    pub site_id: SiteId,
    /// Page id or slug.
    pub page: PageReference,
    /// Already-resolved acting user. `None` is anonymous.
    pub user_id: Option<UserId>,
    /// Revision number the caller last observed.
    pub expected_revision: Option<RevisionNumber>,
    /// Free-text revision comments.
    pub comments: String,
}

impl Mutation {
    /// Anonymous mutation without a token or comments.
    pub fn new(site_id: SiteId, page: impl Into<PageReference>) -> Self {
        Self {
            site_id,
            page: page.into(),
            user_id: None,
            expected_revision: None,
            comments: String::new(),
        }
    }

    /// Builder: set the acting user.
    pub fn by(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Builder: set the concurrency token.
    pub fn expecting(mut self, revision_number: RevisionNumber) -> Self {
        self.expected_revision = Some(revision_number);
        self
    }

    /// Builder: set the revision comments.
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }
}

/// Fields an edit may change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditPayload {
    /// New source text. Required when the edit creates the page.
    pub wikitext: Option<String>,
    /// New title.
    pub title: Option<String>,
    /// `Some(None)` clears the alt title.
    pub alt_title: Option<Option<String>>,
    /// Raw tags, normalized before commit.
    pub tags: Option<Vec<String>>,
    /// `Some(None)` resets to the site default.
    pub layout: Option<Option<PageLayout>>,
}

impl EditPayload {
    /// Payload that only replaces the source text.
    pub fn source(wikitext: impl Into<String>) -> Self {
        Self {
            wikitext: Some(wikitext.into()),
            ..Self::default()
        }
    }

    /// Builder: set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder: set the tags.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// Parent links to add and remove in one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentUpdate {
    /// Pages to link as parents. Each must exist.
    pub add: Vec<PageReference>,
    /// Pages to unlink. Unknown references are skipped.
    pub remove: Vec<PageReference>,
}

/// Result of a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionOutput {
    /// Page that was changed.
    pub page_id: PageId,
    /// Site of the page.
    pub site_id: SiteId,
    /// Slug after the mutation.
    pub slug: String,
    /// Id of the appended revision.
    pub revision_id: RevisionId,
    /// Number of the appended revision. The next token to send.
    pub revision_number: RevisionNumber,
    /// What the revision changed.
    pub kind: RevisionKind,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Whether the mutation created the page.
    pub created: bool,
}

impl From<&CommitReceipt> for RevisionOutput {
    fn from(receipt: &CommitReceipt) -> Self {
        Self {
            page_id: receipt.page.page_id,
            site_id: receipt.page.site_id,
            slug: receipt.page.slug.clone(),
            revision_id: receipt.revision.revision_id,
            revision_number: receipt.revision.revision_number,
            kind: receipt.revision.kind,
            created_at: receipt.revision.created_at,
            created: matches!(receipt.revision.delta, RevisionDelta::Edit { created: true, .. }),
        }
    }
}

/// Optional text bodies to include in a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOptions {
    /// Include the source text.
    pub wikitext: bool,
    /// Include the compiled HTML.
    pub compiled_html: bool,
}

/// A page with its current revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    /// Page record.
    pub page: Page,
    /// Category derived from the slug.
    pub category: String,
    /// Title, falling back to one derived from the slug.
    pub display_title: String,
    /// Latest revision.
    pub revision: Revision,
    /// Source text, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikitext: Option<String>,
    /// Compiled HTML, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_html: Option<String>,
}

/// A single revision with optional text bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionView {
    /// Revision record.
    pub revision: Revision,
    /// Source text, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikitext: Option<String>,
    /// Compiled HTML, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_html: Option<String>,
}

/// Page revision engine over a store backend.
pub struct PageRevisionEngine<S: PageStore> {
    store: Arc<S>,
    compiler: Arc<dyn Compiler>,
    access: Arc<dyn AccessPolicy>,
    config: EngineConfig,
}

impl<S: PageStore> Clone for PageRevisionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            compiler: Arc::clone(&self.compiler),
            access: Arc::clone(&self.access),
            config: self.config.clone(),
        }
    }
}

impl<S: PageStore> PageRevisionEngine<S> {
    /// Create an engine with the escaping compiler behind a compile cache and
    /// a permit-all access policy.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let cache = CacheConfig {
            max_entries: config.compile_cache_entries,
            enabled: config.compile_cache_entries > 0,
        };
        Self {
            store,
            compiler: Arc::new(CachingCompiler::new(EscapingCompiler, cache)),
            access: Arc::new(AllowAll),
            config,
        }
    }

    /// Builder: replace the compiler.
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Builder: replace the access policy.
    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    /// The store backend.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────
    // Checks and lookups
    // ─────────────────────────────────────────────────────────────────

    fn authorize(&self, site_id: SiteId, user_id: Option<UserId>, action: PageAction) -> Result<(), EngineError> {
        let anonymous_refused = user_id.is_none()
            && (action == PageAction::Vote || !self.config.allow_anonymous_edits);
        if anonymous_refused || !self.access.permits(site_id, user_id, action) {
            tracing::warn!(site_id = %site_id, ?user_id, action = %action, "Action refused");
            return Err(EngineError::Unauthorized {
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn check_mutation(&self, mutation: &Mutation, action: PageAction) -> Result<(), EngineError> {
        self.authorize(mutation.site_id, mutation.user_id, action)?;
        if self.config.token_policy == TokenPolicy::Strict && mutation.expected_revision.is_none() {
            return Err(EngineError::validation(
                "last-revision-id",
                "a concurrency token is required",
            ));
        }
        Ok(())
    }

    fn check_title(&self, field: &str, title: &str) -> Result<(), EngineError> {
        let length = title.chars().count();
        if length > self.config.max_title_length {
            return Err(EngineError::validation(
                field,
                format!("must be at most {} characters, got {}", self.config.max_title_length, length),
            ));
        }
        Ok(())
    }

    fn normalize(&self, raw: &str) -> Result<String, EngineError> {
        normalize_slug(raw, self.config.max_slug_length)
    }

    /// Page a reference points at within a site, deleted or not.
    async fn find_page(&self, site_id: SiteId, reference: &PageReference) -> Result<Option<Page>, EngineError> {
        let page_id = match reference {
            PageReference::Id(page_id) => *page_id,
            PageReference::Slug(raw) => {
                let slug = self.normalize(raw)?;
                match self.store.resolve_slug(site_id, &slug).await.map_err(EngineError::from_store)? {
                    Some(page_id) => page_id,
                    None => return Ok(None),
                }
            }
        };
        let page = self.store.get_page(page_id).await.map_err(EngineError::from_store)?;
        Ok(page.filter(|page| page.site_id == site_id))
    }

    async fn require_page(&self, site_id: SiteId, reference: &PageReference) -> Result<Page, EngineError> {
        self.find_page(site_id, reference)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("page with {}", reference)))
    }

    async fn require_live(&self, site_id: SiteId, reference: &PageReference) -> Result<Page, EngineError> {
        let page = self.require_page(site_id, reference).await?;
        if page.is_deleted() {
            return Err(EngineError::not_found(format!("page with {}", reference)));
        }
        Ok(page)
    }

    async fn text(&self, hash: &str) -> Result<String, EngineError> {
        self.store
            .get_text(hash)
            .await
            .map_err(EngineError::from_store)?
            .ok_or_else(|| EngineError::Storage(format!("missing text body {}", hash)))
    }

    async fn texts(&self, revision: &Revision, options: TextOptions) -> Result<(Option<String>, Option<String>), EngineError> {
        let mut wikitext = None;
        let mut compiled_html = None;
        if options.wikitext {
            wikitext = Some(self.text(&revision.content.wikitext_hash).await?);
        }
        if options.compiled_html {
            compiled_html = Some(self.text(&revision.content.compiled_hash).await?);
        }
        Ok((wikitext, compiled_html))
    }

    async fn latest_revision(&self, page: &Page) -> Result<Revision, EngineError> {
        self.store
            .get_revision(page.page_id, None)
            .await
            .map_err(EngineError::from_store)?
            .ok_or_else(|| EngineError::Storage(format!("page {} has no revisions", page.page_id)))
    }

    async fn summaries(&self, ids: &[PageId]) -> Result<Vec<PageSummary>, EngineError> {
        let pages = self.store.get_pages(ids).await.map_err(EngineError::from_store)?;
        Ok(pages.iter().map(Page::summary).collect())
    }

    fn compile(&self, site_id: SiteId, slug: &str, wikitext: String) -> CompiledSource {
        let ctx = CompileContext {
            site_id,
            slug: slug.to_string(),
        };
        let output = self.compiler.compile(&ctx, &wikitext);
        CompiledSource {
            wikitext,
            output,
            compiled_at: Utc::now(),
        }
    }

    async fn commit(&self, commit: PageCommit) -> Result<RevisionOutput, EngineError> {
        let site_id = commit.site_id;
        let kind = commit.kind;
        let expected = commit.expected_revision;

        match self.store.commit(commit).await {
            Ok(receipt) => {
                tracing::info!(
                    site_id = %site_id,
                    page_id = %receipt.page.page_id,
                    revision_number = receipt.revision.revision_number,
                    kind = %kind,
                    "Committed revision"
                );
                Ok(RevisionOutput::from(&receipt))
            }
            Err(error) => {
                let error = error.into_engine();
                tracing::warn!(
                    site_id = %site_id,
                    kind = %kind,
                    ?expected,
                    code = error.code(),
                    error = %error,
                    "Commit rejected"
                );
                Err(error)
            }
        }
    }

    fn metadata_commit(&self, mutation: Mutation, page: &Page, kind: RevisionKind, changes: PageChanges) -> PageCommit {
        PageCommit {
            site_id: mutation.site_id,
            target: CommitTarget::Existing(page.page_id),
            kind,
            user_id: mutation.user_id,
            comments: mutation.comments,
            expected_revision: mutation.expected_revision,
            content: ContentChange::Carry,
            changes,
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────

    /// Edit a page, creating it when a slug reference names no page.
    pub async fn edit(&self, mutation: Mutation, payload: EditPayload) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::Edit)?;
        if let Some(title) = &payload.title {
            self.check_title("title", title)?;
        }
        if let Some(Some(alt_title)) = &payload.alt_title {
            self.check_title("alt-title", alt_title)?;
        }

        let (target, slug) = match &mutation.page {
            PageReference::Slug(raw) => {
                let slug = self.normalize(raw)?;
                (CommitTarget::Create { slug: slug.clone() }, slug)
            }
            reference @ PageReference::Id(_) => {
                let page = self.require_live(mutation.site_id, reference).await?;
                (CommitTarget::Existing(page.page_id), page.slug)
            }
        };

        let source = payload
            .wikitext
            .map(|wikitext| self.compile(mutation.site_id, &slug, wikitext));

        let commit = PageCommit {
            site_id: mutation.site_id,
            target,
            kind: RevisionKind::Edit,
            user_id: mutation.user_id,
            comments: mutation.comments,
            expected_revision: mutation.expected_revision,
            content: ContentChange::Edit(ContentEdit {
                title: payload.title,
                alt_title: payload.alt_title,
                source,
            }),
            changes: PageChanges {
                tags: payload.tags.map(normalize_tags),
                layout: payload.layout,
                ..PageChanges::default()
            },
        };
        self.commit(commit).await
    }

    /// Move a page to a new slug.
    pub async fn move_page(&self, mutation: Mutation, new_slug: &str) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::Move)?;
        let page = self.require_live(mutation.site_id, &mutation.page).await?;
        let new_slug = self.normalize(new_slug)?;
        if new_slug == page.slug {
            return Err(EngineError::validation(
                "new-slug",
                format!("page is already at '{}'", new_slug),
            ));
        }

        let changes = PageChanges {
            slug: Some(new_slug),
            ..PageChanges::default()
        };
        self.commit(self.metadata_commit(mutation, &page, RevisionKind::Move, changes))
            .await
    }

    /// Soft-delete a page. Its slug stays reserved.
    pub async fn delete(&self, mutation: Mutation) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::Delete)?;
        let page = self.require_live(mutation.site_id, &mutation.page).await?;
        let changes = PageChanges {
            deleted: Some(true),
            ..PageChanges::default()
        };
        self.commit(self.metadata_commit(mutation, &page, RevisionKind::Delete, changes))
            .await
    }

    /// Undo a soft delete, keeping the page id.
    pub async fn restore(&self, mutation: Mutation) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::Restore)?;
        let page = self.require_page(mutation.site_id, &mutation.page).await?;
        if !page.is_deleted() {
            return Err(EngineError::validation(
                "page",
                format!("page {} is not deleted", page.page_id),
            ));
        }
        let changes = PageChanges {
            deleted: Some(false),
            ..PageChanges::default()
        };
        self.commit(self.metadata_commit(mutation, &page, RevisionKind::Restore, changes))
            .await
    }

    /// Append a revision whose content mirrors revision `target`.
    pub async fn rollback(&self, mutation: Mutation, target: RevisionNumber) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::Rollback)?;
        let page = self.require_live(mutation.site_id, &mutation.page).await?;
        let revision = match target {
            0 => None,
            n => self
                .store
                .get_revision(page.page_id, Some(n))
                .await
                .map_err(EngineError::from_store)?,
        }
        .ok_or_else(|| {
            EngineError::not_found(format!("revision {} of page {}", target, page.page_id))
        })?;

        let mut commit = self.metadata_commit(mutation, &page, RevisionKind::Rollback, PageChanges::default());
        commit.content = ContentChange::Rollback {
            target,
            content: revision.content,
        };
        self.commit(commit).await
    }

    /// Cast or withdraw the acting user's vote. Appends no revision.
    pub async fn vote(
        &self,
        site_id: SiteId,
        reference: &PageReference,
        user_id: Option<UserId>,
        action: VoteAction,
    ) -> Result<PageScore, EngineError> {
        self.authorize(site_id, user_id, PageAction::Vote)?;
        let user_id = user_id.ok_or_else(|| EngineError::Unauthorized {
            action: PageAction::Vote.to_string(),
        })?;
        if let VoteAction::Set(value) = action {
            if value == 0 || value < self.config.vote_min || value > self.config.vote_max {
                return Err(EngineError::validation(
                    "value",
                    format!(
                        "must be a non-zero value between {} and {}, got {}",
                        self.config.vote_min, self.config.vote_max, value
                    ),
                ));
            }
        }

        let page = self.require_live(site_id, reference).await?;
        let score = self
            .store
            .cast_vote(page.page_id, user_id, action)
            .await
            .map_err(|error| error.into_engine())?;

        tracing::info!(
            site_id = %site_id,
            page_id = %page.page_id,
            user_id = %user_id,
            score = score.score,
            "Recorded vote"
        );
        Ok(score)
    }

    /// Change the page layout.
    pub async fn set_layout(&self, mutation: Mutation, layout: Option<PageLayout>) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::Layout)?;
        let page = self.require_live(mutation.site_id, &mutation.page).await?;
        let changes = PageChanges {
            layout: Some(layout),
            ..PageChanges::default()
        };
        self.commit(self.metadata_commit(mutation, &page, RevisionKind::LayoutUpdate, changes))
            .await
    }

    /// Replace the page's tag set.
    pub async fn set_tags<I, T>(&self, mutation: Mutation, tags: I) -> Result<RevisionOutput, EngineError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.check_mutation(&mutation, PageAction::Tags)?;
        let tags = normalize_tags(tags);
        let page = self.require_live(mutation.site_id, &mutation.page).await?;
        let changes = PageChanges {
            tags: Some(tags),
            ..PageChanges::default()
        };
        self.commit(self.metadata_commit(mutation, &page, RevisionKind::TagUpdate, changes))
            .await
    }

    /// Add and remove parent links as one delta.
    pub async fn update_parents(&self, mutation: Mutation, update: ParentUpdate) -> Result<RevisionOutput, EngineError> {
        self.check_mutation(&mutation, PageAction::ParentSet)?;
        if update.add.is_empty() && update.remove.is_empty() {
            return Err(EngineError::validation(
                "parents",
                "at least one page to add or remove is required",
            ));
        }
        if let Some(overlap) = update.add.iter().find(|reference| update.remove.contains(reference)) {
            return Err(EngineError::invalid_link(overlap, LinkViolation::AddRemoveOverlap));
        }

        let site_id = mutation.site_id;
        let page = self.require_live(site_id, &mutation.page).await?;

        let mut add = BTreeSet::new();
        for reference in &update.add {
            let page_id = match reference {
                PageReference::Id(page_id) => *page_id,
                PageReference::Slug(_) => self
                    .find_page(site_id, reference)
                    .await?
                    .map(|parent| parent.page_id)
                    .ok_or_else(|| EngineError::invalid_link(reference, LinkViolation::MissingPage))?,
            };
            add.insert(page_id);
        }

        // Removing a link that cannot exist is a no-op.
        let mut remove = BTreeSet::new();
        for reference in &update.remove {
            match reference {
                PageReference::Id(page_id) => {
                    remove.insert(*page_id);
                }
                PageReference::Slug(_) => {
                    if let Some(parent) = self.find_page(site_id, reference).await? {
                        remove.insert(parent.page_id);
                    }
                }
            }
        }

        let changes = PageChanges {
            parents: Some(ParentChange { add, remove }),
            ..PageChanges::default()
        };
        self.commit(self.metadata_commit(mutation, &page, RevisionKind::ParentUpdate, changes))
            .await
    }

    // ─────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────

    /// Live page with its current revision.
    pub async fn get_page(&self, site_id: SiteId, reference: &PageReference, options: TextOptions) -> Result<PageView, EngineError> {
        let page = self.require_live(site_id, reference).await?;
        let revision = self.latest_revision(&page).await?;
        let (wikitext, compiled_html) = self.texts(&revision, options).await?;

        tracing::debug!(site_id = %site_id, page_id = %page.page_id, "Fetched page");
        Ok(PageView {
            category: page.category().to_string(),
            display_title: page.display_title(),
            page,
            revision,
            wikitext,
            compiled_html,
        })
    }

    /// Whether a reference names a live page.
    pub async fn page_exists(&self, site_id: SiteId, reference: &PageReference) -> Result<bool, EngineError> {
        Ok(self
            .find_page(site_id, reference)
            .await?
            .is_some_and(|page| !page.is_deleted()))
    }

    /// A revision by number, or the current one for `None`. Works on
    /// deleted pages.
    pub async fn get_revision(
        &self,
        site_id: SiteId,
        reference: &PageReference,
        number: Option<RevisionNumber>,
        options: TextOptions,
    ) -> Result<RevisionView, EngineError> {
        let page = self.require_page(site_id, reference).await?;
        let revision = self
            .store
            .get_revision(page.page_id, number)
            .await
            .map_err(EngineError::from_store)?
            .ok_or_else(|| match number {
                Some(n) => EngineError::not_found(format!("revision {} of page {}", n, page.page_id)),
                None => EngineError::not_found(format!("current revision of page {}", page.page_id)),
            })?;
        let (wikitext, compiled_html) = self.texts(&revision, options).await?;

        tracing::debug!(
            site_id = %site_id,
            page_id = %page.page_id,
            revision_number = revision.revision_number,
            "Fetched revision"
        );
        Ok(RevisionView {
            revision,
            wikitext,
            compiled_html,
        })
    }

    /// Revision history, newest first. Works on deleted pages.
    pub async fn history(
        &self,
        site_id: SiteId,
        reference: &PageReference,
        from: Option<RevisionNumber>,
        limit: Option<usize>,
    ) -> Result<Vec<RevisionSummary>, EngineError> {
        let page = self.require_page(site_id, reference).await?;
        let history = self
            .store
            .history(page.page_id, from, limit)
            .await
            .map_err(EngineError::from_store)?;
        tracing::debug!(page_id = %page.page_id, count = history.len(), "Fetched history");
        Ok(history)
    }

    /// Parents of a page.
    pub async fn get_parents(&self, site_id: SiteId, reference: &PageReference) -> Result<Vec<PageSummary>, EngineError> {
        let page = self.require_page(site_id, reference).await?;
        let ids = self.store.get_parents(page.page_id).await.map_err(EngineError::from_store)?;
        self.summaries(&ids).await
    }

    /// Children of a page.
    pub async fn get_children(&self, site_id: SiteId, reference: &PageReference) -> Result<Vec<PageSummary>, EngineError> {
        let page = self.require_page(site_id, reference).await?;
        let ids = self.store.get_children(page.page_id).await.map_err(EngineError::from_store)?;
        self.summaries(&ids).await
    }

    /// Deleted pages at a slug.
    pub async fn deleted_pages(&self, site_id: SiteId, slug: &str) -> Result<Vec<PageSummary>, EngineError> {
        let slug = self.normalize(slug)?;
        let pages = self
            .store
            .deleted_pages(site_id, &slug)
            .await
            .map_err(EngineError::from_store)?;
        Ok(pages.iter().map(Page::summary).collect())
    }

    /// Vote aggregate of a live page.
    pub async fn score(&self, site_id: SiteId, reference: &PageReference) -> Result<PageScore, EngineError> {
        let page = self.require_live(site_id, reference).await?;
        self.store.score(page.page_id).await.map_err(EngineError::from_store)
    }

    /// Recompile the current source. History is not touched.
    pub async fn rerender(&self, site_id: SiteId, reference: &PageReference) -> Result<CompiledOutput, EngineError> {
        let page = self.require_live(site_id, reference).await?;
        let revision = self.latest_revision(&page).await?;
        let wikitext = self.text(&revision.content.wikitext_hash).await?;
        let source = self.compile(site_id, &page.slug, wikitext);
        Ok(source.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DenyUsers;
    use crate::store::InMemoryPageStore;

    const SITE: SiteId = SiteId::new(1);
    const USER: UserId = UserId::new(7);

    fn engine() -> PageRevisionEngine<InMemoryPageStore> {
        PageRevisionEngine::new(Arc::new(InMemoryPageStore::new()), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_edit_creates_then_appends() {
        let engine = engine();
        let created = engine
            .edit(Mutation::new(SITE, "Hello World").by(USER), EditPayload::source("hi"))
            .await
            .unwrap();
        assert!(created.created);
        assert_eq!(created.slug, "hello-world");
        assert_eq!(created.revision_number, 1);

        let edited = engine
            .edit(
                Mutation::new(SITE, created.page_id).by(USER).expecting(1),
                EditPayload::source("there").with_title("Hello"),
            )
            .await
            .unwrap();
        assert!(!edited.created);
        assert_eq!(edited.revision_number, 2);

        let view = engine
            .get_page(SITE, &PageReference::from("hello-world"), TextOptions { wikitext: true, compiled_html: true })
            .await
            .unwrap();
        assert_eq!(view.display_title, "Hello");
        assert_eq!(view.wikitext.as_deref(), Some("there"));
        assert_eq!(view.compiled_html.as_deref(), Some("<p>there</p>"));
    }

    #[tokio::test]
    async fn test_create_needs_wikitext() {
        let engine = engine();
        let err = engine
            .edit(Mutation::new(SITE, "empty").by(USER), EditPayload::default().with_title("T"))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::validation("wikitext", "required when creating a page"));
    }

    #[tokio::test]
    async fn test_anonymous_refused_by_default() {
        let engine = engine();
        let err = engine
            .edit(Mutation::new(SITE, "start"), EditPayload::source("x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");

        let open = PageRevisionEngine::new(
            Arc::new(InMemoryPageStore::new()),
            EngineConfig::default().with_anonymous_edits(true),
        );
        open.edit(Mutation::new(SITE, "start"), EditPayload::source("x")).await.unwrap();
        let err = open
            .vote(SITE, &PageReference::from("start"), None, VoteAction::Set(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[tokio::test]
    async fn test_access_policy_consulted() {
        let engine = engine().with_access_policy(Arc::new(DenyUsers::new([USER])));
        let err = engine
            .edit(Mutation::new(SITE, "start").by(USER), EditPayload::source("x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[tokio::test]
    async fn test_strict_policy_requires_token() {
        let engine = PageRevisionEngine::new(
            Arc::new(InMemoryPageStore::new()),
            EngineConfig::default().with_token_policy(TokenPolicy::Strict),
        );
        let err = engine
            .edit(Mutation::new(SITE, "start").by(USER), EditPayload::source("x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        engine
            .edit(Mutation::new(SITE, "start").by(USER).expecting(0), EditPayload::source("x"))
            .await
            .unwrap();
        // Votes never need a token.
        engine
            .vote(SITE, &PageReference::from("start"), Some(USER), VoteAction::Set(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_vote_range() {
        let engine = engine();
        engine
            .edit(Mutation::new(SITE, "start").by(USER), EditPayload::source("x"))
            .await
            .unwrap();
        let page = PageReference::from("start");
        for bad in [0, 2, -2] {
            let err = engine.vote(SITE, &page, Some(USER), VoteAction::Set(bad)).await.unwrap_err();
            assert_eq!(err.code(), "validation_error", "value {}", bad);
        }
        let score = engine.vote(SITE, &page, Some(USER), VoteAction::Set(-1)).await.unwrap();
        assert_eq!(score.score, -1);
    }

    #[tokio::test]
    async fn test_title_length_checked() {
        let engine = engine();
        let long = "x".repeat(engine.config().max_title_length + 1);
        let err = engine
            .edit(Mutation::new(SITE, "start").by(USER), EditPayload::source("x").with_title(long))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Validation {
            field: "title".to_string(),
            message: "must be at most 256 characters, got 257".to_string(),
        });
    }

    #[tokio::test]
    async fn test_edit_by_unknown_id_is_not_found() {
        let engine = engine();
        let err = engine
            .edit(Mutation::new(SITE, PageId::new(42)).by(USER), EditPayload::source("x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_rerender_appends_nothing() {
        let engine = engine();
        engine
            .edit(Mutation::new(SITE, "start").by(USER), EditPayload::source("a & b"))
            .await
            .unwrap();
        let output = engine.rerender(SITE, &PageReference::from("start")).await.unwrap();
        assert_eq!(output.html, "<p>a &amp; b</p>");
        assert_eq!(engine.store().num_revisions(), 1);
    }

    #[tokio::test]
    async fn test_parent_lists_must_not_overlap_before_resolution() {
        let engine = engine();
        engine
            .edit(Mutation::new(SITE, "child").by(USER), EditPayload::source("c"))
            .await
            .unwrap();
        let update = ParentUpdate {
            add: vec![PageReference::from("missing")],
            remove: vec![PageReference::from("missing")],
        };
        let err = engine
            .update_parents(Mutation::new(SITE, "child").by(USER), update)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidLink { reason: LinkViolation::AddRemoveOverlap, .. }
        ));

        let err = engine
            .update_parents(Mutation::new(SITE, "child").by(USER), ParentUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
