//! Immutable revision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PageId, RevisionId, RevisionNumber, SiteId, UserId};
use super::page::PageLayout;
use crate::tags::TagDelta;

/// What kind of operation produced a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisionKind {
    /// Content edit, including page creation.
    Edit,
    /// Slug change.
    Move,
    /// Soft delete.
    Delete,
    /// Undo of a soft delete.
    Restore,
    /// Copy of an earlier revision's content.
    Rollback,
    /// Tag set change.
    TagUpdate,
    /// Parent link change.
    ParentUpdate,
    /// Layout change.
    LayoutUpdate,
}

impl RevisionKind {
    /// All kinds, in declaration order.
    pub const ALL: [RevisionKind; 8] = [
        Self::Edit,
        Self::Move,
        Self::Delete,
        Self::Restore,
        Self::Rollback,
        Self::TagUpdate,
        Self::ParentUpdate,
        Self::LayoutUpdate,
    ];

    /// Stable string form, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Restore => "restore",
            Self::Rollback => "rollback",
            Self::TagUpdate => "tag-update",
            Self::ParentUpdate => "parent-update",
            Self::LayoutUpdate => "layout-update",
        }
    }

    /// Parse the persisted string form.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout transition recorded on a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutChange {
    /// Layout before the revision.
    pub from: Option<PageLayout>,
    /// Layout after the revision.
    pub to: Option<PageLayout>,
}

/// Audit record of what a revision changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevisionDelta {
    /// Content edit. Tag and layout changes made with the edit are included.
    Edit {
        /// Whether this edit created the page.
        created: bool,
        /// Tag changes, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tags: Option<TagDelta>,
        /// Layout change, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        layout: Option<LayoutChange>,
    },
    /// Slug change.
    Move {
        /// Slug before the move.
        from: String,
        /// Slug after the move.
        to: String,
    },
    /// Soft delete.
    Delete,
    /// Undo of a soft delete.
    Restore,
    /// Content copied from an earlier revision.
    Rollback {
        /// Revision number whose content was copied.
        target: RevisionNumber,
    },
    /// Tag set change.
    Tags {
        /// Tags that were added.
        added: Vec<String>,
        /// Tags that were removed.
        removed: Vec<String>,
    },
    /// Parent link change (effective edges only).
    Parents {
        /// Parents linked by this revision.
        added: Vec<PageId>,
        /// Parents unlinked by this revision.
        removed: Vec<PageId>,
    },
    /// Layout change.
    Layout(LayoutChange),
}

/// Content carried by every revision.
///
/// Text bodies are stored once in the text store; revisions only reference
/// them by hash, so metadata-only revisions and rollbacks share storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionContent {
    /// Page title.
    pub title: String,
    /// Secondary title.
    pub alt_title: Option<String>,
    /// SHA-256 (hex) of the source text.
    pub wikitext_hash: String,
    /// SHA-256 (hex) of the compiled HTML.
    pub compiled_hash: String,
    /// When the HTML was compiled.
    pub compiled_at: DateTime<Utc>,
    /// Compiler name and version.
    pub compiled_generator: String,
    /// Opaque metadata reported by the compiler.
    pub compiled_metadata: serde_json::Value,
}

/// Everything a revision needs except the identifiers the ledger assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionCandidate {
    /// What the revision changes.
    pub kind: RevisionKind,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Revision comments.
    pub comments: String,
    /// Slug after the revision.
    pub slug: String,
    /// Content after the revision.
    pub content: RevisionContent,
    /// Audit delta.
    pub delta: RevisionDelta,
}

/// One immutable historical snapshot of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Globally unique revision id.
    pub revision_id: RevisionId,
    /// Page the revision belongs to.
    pub page_id: PageId,
    /// Site of the page.
    pub site_id: SiteId,
    /// Per-page number, dense from 1.
    pub revision_number: RevisionNumber,
    /// What the revision changed.
    pub kind: RevisionKind,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Revision comments.
    pub comments: String,
    /// Slug the page had when this revision was written.
    pub slug: String,
    /// Content snapshot.
    #[serde(flatten)]
    pub content: RevisionContent,
    /// Audit delta.
    pub delta: RevisionDelta,
    /// Concurrency token the caller supplied, if any.
    pub expected_revision_number: Option<RevisionNumber>,
}

impl Revision {
    /// Build a revision from a candidate and ledger-assigned identifiers.
    pub fn from_candidate(
        revision_id: RevisionId,
        page_id: PageId,
        site_id: SiteId,
        revision_number: RevisionNumber,
        expected_revision_number: Option<RevisionNumber>,
        candidate: RevisionCandidate,
    ) -> Self {
        Self {
            revision_id,
            page_id,
            site_id,
            revision_number,
            kind: candidate.kind,
            user_id: candidate.user_id,
            created_at: candidate.created_at,
            comments: candidate.comments,
            slug: candidate.slug,
            content: candidate.content,
            delta: candidate.delta,
            expected_revision_number,
        }
    }

    /// History listing form.
    pub fn summary(&self) -> RevisionSummary {
        RevisionSummary {
            revision_id: self.revision_id,
            revision_number: self.revision_number,
            kind: self.kind,
            user_id: self.user_id,
            created_at: self.created_at,
            comments: self.comments.clone(),
            slug: self.slug.clone(),
            title: self.content.title.clone(),
            delta: self.delta.clone(),
        }
    }
}

/// Revision as listed in page history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    /// Revision id.
    pub revision_id: RevisionId,
    /// Per-page number.
    pub revision_number: RevisionNumber,
    /// What the revision changed.
    pub kind: RevisionKind,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Revision comments.
    pub comments: String,
    /// Slug at the time.
    pub slug: String,
    /// Title at the time.
    pub title: String,
    /// Audit delta.
    pub delta: RevisionDelta,
}
