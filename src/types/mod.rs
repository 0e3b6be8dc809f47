//! Core records for the revision kernel.

pub mod ids;
pub mod page;
pub mod revision;
pub mod vote;

pub use ids::{PageId, RevisionId, RevisionNumber, SiteId, UserId};
pub use page::{Page, PageLayout, PageReference, PageSummary};
pub use revision::{
    LayoutChange, Revision, RevisionCandidate, RevisionContent, RevisionDelta, RevisionKind,
    RevisionSummary,
};
pub use vote::{PageScore, Vote, VoteAction};
