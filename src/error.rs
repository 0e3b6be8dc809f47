//! Error taxonomy shared by every engine operation.
//!
//! Every failure carries a stable machine-readable code, a human-readable
//! message, and optional structured data. [`ErrorEnvelope`] is the outbound
//! form handed to callers; it never contains a backtrace.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::types::{PageId, RevisionNumber, SiteId};

/// Why a parent link was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkViolation {
    /// A page cannot be its own parent.
    SelfParent,
    /// The target page does not exist.
    MissingPage,
    /// The target page is soft-deleted.
    DeletedPage,
    /// The target page belongs to another site.
    ForeignSite,
    /// The same page was named in both the add and the remove list.
    AddRemoveOverlap,
}

impl fmt::Display for LinkViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::SelfParent => "a page cannot be its own parent",
            Self::MissingPage => "target page does not exist",
            Self::DeletedPage => "target page is deleted",
            Self::ForeignSite => "target page belongs to another site",
            Self::AddRemoveOverlap => "page appears in both add and remove lists",
        };
        f.write_str(text)
    }
}

/// Errors returned by the revision engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Page, revision or slug is absent.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },

    /// Stale optimistic concurrency token.
    #[error("edit collision on page {page_id}: expected revision {expected}, current revision is {current}")]
    ConcurrencyConflict {
        /// Page being modified.
        page_id: PageId,
        /// Revision number the caller last observed.
        expected: RevisionNumber,
        /// Revision number actually current.
        current: RevisionNumber,
    },

    /// Slug already held by another page.
    #[error("slug '{slug}' in site {site_id} is already held by page {holder}")]
    SlugConflict {
        /// Site of the slug.
        site_id: SiteId,
        /// Contested slug.
        slug: String,
        /// Page currently holding it.
        holder: PageId,
    },

    /// Invalid parent link request.
    #[error("invalid parent link to {target}: {reason}")]
    InvalidLink {
        /// Offending page (id or reference text).
        target: String,
        /// Rule that was violated.
        reason: LinkViolation,
    },

    /// Malformed numeric or text input.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Input field name.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Acting user is not allowed to perform the operation.
    #[error("not permitted to {action}")]
    Unauthorized {
        /// Operation that was refused.
        action: String,
    },

    /// Store backend failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// Build a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Build a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build an invalid-link error.
    pub fn invalid_link(target: impl fmt::Display, reason: LinkViolation) -> Self {
        Self::InvalidLink {
            target: target.to_string(),
            reason,
        }
    }

    /// Create a storage error from any backend error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Storage(e.to_string())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::SlugConflict { .. } => "slug_conflict",
            Self::InvalidLink { .. } => "invalid_link",
            Self::Validation { .. } => "validation_error",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Structured data for the error envelope.
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { what } => Some(json!({ "what": what })),
            Self::ConcurrencyConflict { page_id, expected, current } => Some(json!({
                "page_id": page_id,
                "expected_revision_number": expected,
                "current_revision_number": current,
            })),
            Self::SlugConflict { site_id, slug, holder } => Some(json!({
                "site_id": site_id,
                "slug": slug,
                "holder_page_id": holder,
            })),
            Self::InvalidLink { target, reason } => Some(json!({
                "target": target,
                "reason": reason,
            })),
            Self::Validation { field, .. } => Some(json!({ "field": field })),
            Self::Unauthorized { action } => Some(json!({ "action": action })),
            Self::Storage(_) => None,
        }
    }

    /// Whether a client may succeed by refreshing state and resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Outbound error form: message, code and optional data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code.
    pub code: String,
    /// Structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(error: &EngineError) -> Self {
        // Backend messages can leak connection details.
        let message = match error {
            EngineError::Storage(_) => "internal storage failure".to_string(),
            other => other.to_string(),
        };
        Self {
            message,
            code: error.code().to_string(),
            data: error.data(),
        }
    }
}

impl From<EngineError> for ErrorEnvelope {
    fn from(error: EngineError) -> Self {
        Self::from(&error)
    }
}
