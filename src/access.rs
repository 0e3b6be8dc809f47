//! Per-action authorization hook.
//!
//! Sessions and roles live outside the kernel. The embedding application
//! plugs in an [`AccessPolicy`] that answers one question: may this
//! already-resolved user perform this action on this site?

use crate::action::PageAction;
use crate::types::{SiteId, UserId};

/// Authorization decision for a resolved user.
pub trait AccessPolicy: Send + Sync {
    /// Whether `user_id` may perform `action` in `site_id`.
    ///
    /// `user_id` is `None` for anonymous callers that the engine's own
    /// anonymous-edit rule already let through.
    fn permits(&self, site_id: SiteId, user_id: Option<UserId>, action: PageAction) -> bool;
}

/// Policy that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn permits(&self, _site_id: SiteId, _user_id: Option<UserId>, _action: PageAction) -> bool {
        true
    }
}

/// Policy that refuses a fixed set of users, e.g. banned accounts.
#[derive(Debug, Clone, Default)]
pub struct DenyUsers {
    denied: std::collections::BTreeSet<UserId>,
}

impl DenyUsers {
    /// Deny every listed user for every action.
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            denied: users.into_iter().collect(),
        }
    }
}

impl AccessPolicy for DenyUsers {
    fn permits(&self, _site_id: SiteId, user_id: Option<UserId>, _action: PageAction) -> bool {
        user_id.map_or(true, |user| !self.denied.contains(&user))
    }
}
