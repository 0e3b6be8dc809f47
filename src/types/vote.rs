//! Vote records and page scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PageId, UserId};

/// What a voter wants to do with their vote on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum VoteAction {
    /// Cast or overwrite the caller's vote.
    Set(i32),
    /// Withdraw the caller's vote.
    Remove,
}

/// One user's vote on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Page voted on.
    pub page_id: PageId,
    /// Voter.
    pub user_id: UserId,
    /// Vote value, never zero.
    pub value: i32,
    /// When the vote was last set.
    pub cast_at: DateTime<Utc>,
}

/// Vote aggregate for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScore {
    /// Page the score belongs to.
    pub page_id: PageId,
    /// Sum of all vote values.
    pub score: i64,
    /// Number of vote rows.
    pub count: u64,
    /// Number of positive votes.
    pub upvotes: u64,
    /// Number of negative votes.
    pub downvotes: u64,
}

impl PageScore {
    /// Fold a sequence of vote values into a score.
    pub fn from_values(page_id: PageId, values: impl IntoIterator<Item = i32>) -> Self {
        values.into_iter().fold(
            Self { page_id, score: 0, count: 0, upvotes: 0, downvotes: 0 },
            |mut acc, value| {
                acc.score += i64::from(value);
                acc.count += 1;
                if value > 0 {
                    acc.upvotes += 1;
                } else if value < 0 {
                    acc.downvotes += 1;
                }
                acc
            },
        )
    }
}
