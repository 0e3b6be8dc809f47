//! Vote side table: one signed vote per (page, user), last write wins.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::types::{PageId, PageScore, UserId, Vote, VoteAction};

/// In-memory vote rows keyed by (page, user).
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    votes: BTreeMap<(PageId, UserId), Vote>,
}

impl VoteLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert or remove a vote and return the page's new score.
    pub fn apply(
        &mut self,
        page_id: PageId,
        user_id: UserId,
        action: VoteAction,
        now: DateTime<Utc>,
    ) -> PageScore {
        match action {
            VoteAction::Set(value) => {
                self.votes.insert(
                    (page_id, user_id),
                    Vote { page_id, user_id, value, cast_at: now },
                );
            }
            VoteAction::Remove => {
                self.votes.remove(&(page_id, user_id));
            }
        }
        self.score(page_id)
    }

    /// Score of a page.
    pub fn score(&self, page_id: PageId) -> PageScore {
        PageScore::from_values(page_id, self.votes_for(page_id).map(|vote| vote.value))
    }

    /// Votes on a page, ordered by user id.
    pub fn votes_for(&self, page_id: PageId) -> impl Iterator<Item = &Vote> {
        self.votes
            .range((page_id, UserId::new(i64::MIN))..=(page_id, UserId::new(i64::MAX)))
            .map(|(_, vote)| vote)
    }

    /// A single user's vote.
    pub fn get(&self, page_id: PageId, user_id: UserId) -> Option<&Vote> {
        self.votes.get(&(page_id, user_id))
    }
}
