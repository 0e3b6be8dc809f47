//! # revision-kernel
//!
//! Append-only page revision engine for multi-tenant wikis.
//!
//! The kernel turns any sequence of page actions into a consistent history:
//!
//! > Every accepted mutation appends exactly one immutable revision, and no
//! > mutation is ever applied against a page state its caller did not see.
//!
//! ## Core Contract
//!
//! 1. Revision numbers per page are dense from 1; the latest one is current
//! 2. A stale concurrency token is rejected with `ConcurrencyConflict`
//! 3. A `(site, slug)` pair is held by at most one page, deleted pages included
//! 4. Parent links never point at the page itself, at missing or deleted
//!    pages, or across sites
//!
//! ## Architecture
//!
//! ```text
//! Action + form → ActionRequest → PageRevisionEngine → PageCommit
//!                                        ↓                 ↓
//!                                    Compiler       PageStore (Postgres or Memory)
//! ```
//!
//! ## Atomicity
//!
//! - The store applies each `PageCommit` as one unit: token check, slug
//!   change, link delta, text bodies, revision append and page pointer
//! - Commits that do not replace content copy it from the latest revision
//!   inside that unit, so stale content cannot come back

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod action;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod links;
pub mod slug;
pub mod store;
pub mod tags;
pub mod text;
pub mod types;
pub mod votes;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    LayoutChange, Page, PageId, PageLayout, PageReference, PageScore, PageSummary, Revision,
    RevisionContent, RevisionDelta, RevisionId, RevisionKind, RevisionNumber, RevisionSummary,
    SiteId, UserId, Vote, VoteAction,
};
pub use access::{AccessPolicy, AllowAll, DenyUsers};
pub use action::{dispatch, ActionRequest, ActionResponse, PageAction, PageCommand};
pub use compiler::{
    CacheConfig, CacheStats, CachingCompiler, CompileContext, CompiledOutput, Compiler,
    EscapingCompiler,
};
pub use config::{EngineConfig, TokenPolicy};
pub use engine::{
    EditPayload, Mutation, PageRevisionEngine, PageView, ParentUpdate, RevisionOutput,
    RevisionView, TextOptions,
};
pub use error::{EngineError, ErrorEnvelope, LinkViolation};
pub use ledger::RevisionLedger;
pub use links::{LinkGraph, ParentChange, ParentDelta};
pub use slug::{normalize_slug, SlugIndex};
pub use store::{CommitError, InMemoryPageStore, PageCommit, PageStore};
#[cfg(feature = "postgres")]
pub use store::PostgresPageStore;
pub use tags::{natural_cmp, normalize_tags, parse_tag_list, TagDelta};
pub use text::{content_hash, TextStore};
pub use votes::VoteLedger;

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version for persisted revision records.
/// Increment on breaking changes to any persisted type.
pub const REVISION_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
