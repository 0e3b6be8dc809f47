//! Integer identifiers for sites, pages, revisions and users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Per-page revision counter. The first revision of a page is number 1.
pub type RevisionNumber = u32;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw integer id.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the raw integer value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

integer_id!(
    /// Tenant boundary. Every page, slug and link belongs to exactly one site.
    SiteId
);

integer_id!(
    /// Stable page identity. Never reused, survives moves and deletion.
    PageId
);

integer_id!(
    /// Globally unique, monotonically increasing revision identity.
    RevisionId
);

integer_id!(
    /// Already-resolved acting user.
    UserId
);
