//! Engine configuration.
//!
//! ## Environment
//!
//! - `REVISION_TOKEN_POLICY`: `lenient` or `strict` (default: lenient)
//! - `ALLOW_ANONYMOUS_EDITS`: `true`/`false` (default: false)
//! - `VOTE_MIN` / `VOTE_MAX`: accepted vote range (default: -1 / 1)
//! - `MAX_SLUG_LENGTH`: longest normalized slug (default: 128)
//! - `MAX_TITLE_LENGTH`: longest title or alt title (default: 256)
//! - `COMPILE_CACHE_ENTRIES`: compile cache size, 0 disables (default: 1024)

use serde::{Deserialize, Serialize};

/// What to do when a mutation arrives without a concurrency token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPolicy {
    /// Skip the check.
    #[default]
    Lenient,
    /// Reject the mutation with a validation error. Votes are exempt.
    Strict,
}

impl TokenPolicy {
    /// Parse a policy name. Case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Some(Self::Lenient),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }

    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

/// Tunables for [`crate::PageRevisionEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Missing-token handling.
    pub token_policy: TokenPolicy,
    /// Whether mutations without an acting user are accepted. Votes always
    /// need a user.
    pub allow_anonymous_edits: bool,
    /// Lowest accepted vote value.
    pub vote_min: i32,
    /// Highest accepted vote value.
    pub vote_max: i32,
    /// Longest accepted normalized slug.
    pub max_slug_length: usize,
    /// Longest accepted title or alt title, in characters.
    pub max_title_length: usize,
    /// Compile cache capacity. 0 disables the cache.
    pub compile_cache_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_policy: TokenPolicy::Lenient,
            allow_anonymous_edits: false,
            vote_min: -1,
            vote_max: 1,
            max_slug_length: 128,
            max_title_length: 256,
            compile_cache_entries: 1_024,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            token_policy: std::env::var("REVISION_TOKEN_POLICY")
                .ok()
                .and_then(|s| TokenPolicy::from_str(&s))
                .unwrap_or(defaults.token_policy),
            allow_anonymous_edits: env_parse("ALLOW_ANONYMOUS_EDITS")
                .unwrap_or(defaults.allow_anonymous_edits),
            vote_min: env_parse("VOTE_MIN").unwrap_or(defaults.vote_min),
            vote_max: env_parse("VOTE_MAX").unwrap_or(defaults.vote_max),
            max_slug_length: env_parse("MAX_SLUG_LENGTH").unwrap_or(defaults.max_slug_length),
            max_title_length: env_parse("MAX_TITLE_LENGTH").unwrap_or(defaults.max_title_length),
            compile_cache_entries: env_parse("COMPILE_CACHE_ENTRIES")
                .unwrap_or(defaults.compile_cache_entries),
        };

        if config.vote_min > config.vote_max {
            tracing::warn!(
                vote_min = config.vote_min,
                vote_max = config.vote_max,
                "Inverted vote range, using defaults"
            );
            return Self {
                vote_min: defaults.vote_min,
                vote_max: defaults.vote_max,
                ..config
            };
        }

        config
    }

    /// Builder: set the token policy.
    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }

    /// Builder: allow or forbid anonymous mutations.
    pub fn with_anonymous_edits(mut self, allow: bool) -> Self {
        self.allow_anonymous_edits = allow;
        self
    }

    /// Builder: set the accepted vote range.
    pub fn with_vote_range(mut self, min: i32, max: i32) -> Self {
        self.vote_min = min;
        self.vote_max = max;
        self
    }
}
