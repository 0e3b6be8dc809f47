//! Slug normalization and the `(site, slug) -> page` index.
//!
//! A slug is held by exactly one page per site. Deleted pages keep their
//! reservation, so a slug cannot be re-created while its old page can still
//! be restored.

use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::types::{PageId, SiteId};

/// Category used for slugs without a `category:` prefix.
pub const DEFAULT_CATEGORY: &str = "_default";

fn invalid_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9_\-]+").expect("static slug pattern"))
}

fn dash_runs() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-{2,}").expect("static dash pattern"))
}

fn normalize_part(part: &str) -> String {
    let replaced = invalid_chars().replace_all(part, "-");
    let collapsed = dash_runs().replace_all(&replaced, "-");
    collapsed.trim_matches('-').to_string()
}

/// Normalize a human slug into its canonical form.
///
/// Lowercases, replaces anything outside `[a-z0-9_-]` with dashes, collapses
/// dash runs and trims dashes. The first `:` separates a category from the
/// page name; later colons are treated like any other invalid character.
pub fn normalize_slug(raw: &str, max_length: usize) -> Result<String, EngineError> {
    let lowered = raw.trim().to_lowercase();

    let slug = match lowered.split_once(':') {
        Some((category, name)) => {
            let category = normalize_part(category);
            let name = normalize_part(name);
            match (category.is_empty(), name.is_empty()) {
                (_, true) => String::new(),
                (true, false) => name,
                (false, false) => format!("{}:{}", category, name),
            }
        }
        None => normalize_part(&lowered),
    };

    if slug.is_empty() {
        return Err(EngineError::validation("slug", format!("'{}' has no usable characters", raw)));
    }
    if slug.len() > max_length {
        return Err(EngineError::validation(
            "slug",
            format!("must be at most {} characters, got {}", max_length, slug.len()),
        ));
    }

    Ok(slug)
}

/// Category prefix of a normalized slug.
pub fn category_of(slug: &str) -> &str {
    match slug.split_once(':') {
        Some((category, _)) if !category.is_empty() => category,
        _ => DEFAULT_CATEGORY,
    }
}

/// Humanized title for pages that have none: category dropped, dashes to
/// spaces, first letter upper-cased.
pub fn title_from_slug(slug: &str) -> String {
    let name = slug.split_once(':').map(|(_, name)| name).unwrap_or(slug);
    let spaced = name.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Index of slug reservations.
///
/// All methods run under the owning store's write guard, which makes
/// reserve/rename atomic per `(site, slug)` key.
#[derive(Debug, Clone, Default)]
pub struct SlugIndex {
    holders: BTreeMap<(SiteId, String), PageId>,
}

impl SlugIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Page currently holding a slug, deleted or not.
    pub fn resolve(&self, site_id: SiteId, slug: &str) -> Option<PageId> {
        self.holders.get(&(site_id, slug.to_string())).copied()
    }

    /// Check that `page_id` could take `slug` without mutating anything.
    pub fn ensure_available(
        &self,
        site_id: SiteId,
        slug: &str,
        page_id: PageId,
    ) -> Result<(), EngineError> {
        match self.resolve(site_id, slug) {
            Some(holder) if holder != page_id => Err(EngineError::SlugConflict {
                site_id,
                slug: slug.to_string(),
                holder,
            }),
            _ => Ok(()),
        }
    }

    /// Claim a free slug for a new page.
    pub fn reserve(
        &mut self,
        site_id: SiteId,
        slug: &str,
        page_id: PageId,
    ) -> Result<(), EngineError> {
        self.ensure_available(site_id, slug, page_id)?;
        self.holders.insert((site_id, slug.to_string()), page_id);
        Ok(())
    }

    /// Move a page's reservation from `old_slug` to `new_slug`.
    pub fn rename(
        &mut self,
        site_id: SiteId,
        page_id: PageId,
        old_slug: &str,
        new_slug: &str,
    ) -> Result<(), EngineError> {
        if old_slug == new_slug {
            return Ok(());
        }
        self.ensure_available(site_id, new_slug, page_id)?;

        let old_key = (site_id, old_slug.to_string());
        if self.holders.get(&old_key) == Some(&page_id) {
            self.holders.remove(&old_key);
        }
        self.holders.insert((site_id, new_slug.to_string()), page_id);
        Ok(())
    }

    /// Number of reservations.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Whether no slug is reserved.
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
