//! Page records and the ways callers address them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PageId, RevisionId, RevisionNumber, SiteId};
use crate::slug::{category_of, title_from_slug};

/// How a caller addresses a page within a site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageReference {
    /// Direct page id.
    Id(PageId),
    /// Human slug, normalized before lookup.
    Slug(String),
}

impl PageReference {
    /// Build a slug reference.
    pub fn slug(slug: impl Into<String>) -> Self {
        Self::Slug(slug.into())
    }
}

impl From<PageId> for PageReference {
    fn from(id: PageId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for PageReference {
    fn from(slug: &str) -> Self {
        Self::Slug(slug.to_string())
    }
}

impl fmt::Display for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "page id {}", id),
            Self::Slug(slug) => write!(f, "slug '{}'", slug),
        }
    }
}

/// Page layout. `None` on a page means the site default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLayout {
    /// Legacy layout.
    Wikidot,
    /// Current layout.
    Wikijump,
}

impl PageLayout {
    /// Parse a layout name. Case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "wikidot" => Some(Self::Wikidot),
            "wikijump" => Some(Self::Wikijump),
            _ => None,
        }
    }

    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wikidot => "wikidot",
            Self::Wikijump => "wikijump",
        }
    }
}

impl fmt::Display for PageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable page record.
///
/// The content itself lives in the revision ledger; this record carries the
/// pointer to the latest revision plus the amendable side properties
/// (tags, layout, vote aggregate) that are not versioned per revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Stable identity.
    pub page_id: PageId,
    /// Owning site.
    pub site_id: SiteId,
    /// Current slug.
    pub slug: String,
    /// Title of the latest revision (may be empty).
    pub title: String,
    /// Creation time (first revision).
    pub created_at: DateTime<Utc>,
    /// Time of the latest revision.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Pointer to the current revision.
    pub latest_revision_id: RevisionId,
    /// Number of the current revision.
    pub latest_revision_number: RevisionNumber,
    /// Normalized tag set.
    pub tags: Vec<String>,
    /// Layout override.
    pub layout: Option<PageLayout>,
    /// Sum of all vote values.
    pub score: i64,
}

impl Page {
    /// Whether the page is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Category derived from the slug prefix.
    pub fn category(&self) -> &str {
        category_of(&self.slug)
    }

    /// Title for display, falling back to a humanized slug.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            title_from_slug(&self.slug)
        } else {
            self.title.clone()
        }
    }

    /// Compact listing form.
    pub fn summary(&self) -> PageSummary {
        PageSummary {
            page_id: self.page_id,
            site_id: self.site_id,
            slug: self.slug.clone(),
            category: self.category().to_string(),
            title: self.display_title(),
            deleted_at: self.deleted_at,
            latest_revision_number: self.latest_revision_number,
        }
    }
}

/// Compact page listing used by parent/child and deleted-page queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// Page identity.
    pub page_id: PageId,
    /// Owning site.
    pub site_id: SiteId,
    /// Current slug.
    pub slug: String,
    /// Category derived from the slug.
    pub category: String,
    /// Display title.
    pub title: String,
    /// Deletion time, if deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Latest revision number. The token for the next mutation.
    pub latest_revision_number: RevisionNumber,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_page(slug: &str, title: &str) -> Page {
        let now = Utc::now();
        Page {
            page_id: PageId::new(1),
            site_id: SiteId::new(1),
            slug: slug.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            latest_revision_id: RevisionId::new(1),
            latest_revision_number: 1,
            tags: Vec::new(),
            layout: None,
            score: 0,
        }
    }

    #[test]
    fn test_display_title_fallback() {
        assert_eq!(make_page("system:recent-changes", "").display_title(), "Recent changes");
        assert_eq!(make_page("scp-173", "SCP-173").display_title(), "SCP-173");
    }

    #[test]
    fn test_category() {
        assert_eq!(make_page("forum:start", "").category(), "forum");
        assert_eq!(make_page("start", "").category(), "_default");
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!(PageLayout::from_str("WikiJump"), Some(PageLayout::Wikijump));
        assert_eq!(PageLayout::from_str("other"), None);
    }
}
