//! PostgreSQL page store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Atomicity
//!
//! Each commit runs in one transaction. The page row is locked with
//! `SELECT ... FOR UPDATE` before the token check, and the unique index on
//! `(site_id, slug)` settles slug races between transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Executor, Postgres, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::{
    plan_commit, CommitError, CommitReceipt, CommitTarget, CurrentState, PageCommit, PageStore,
};
use crate::error::EngineError;
use crate::links::{check_change, effective_delta, LinkTarget};
use crate::text::content_hash;
use crate::types::{
    Page, PageId, PageLayout, PageScore, Revision, RevisionContent, RevisionDelta, RevisionId,
    RevisionKind, RevisionNumber, RevisionSummary, SiteId, UserId, VoteAction,
};

/// Table layout used by [`PostgresPageStore`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS page (
    page_id                 BIGSERIAL PRIMARY KEY,
    site_id                 BIGINT NOT NULL,
    slug                    TEXT NOT NULL,
    title                   TEXT NOT NULL DEFAULT '',
    created_at              TIMESTAMPTZ NOT NULL,
    updated_at              TIMESTAMPTZ NOT NULL,
    deleted_at              TIMESTAMPTZ,
    latest_revision_id      BIGINT NOT NULL DEFAULT 0,
    latest_revision_number  BIGINT NOT NULL DEFAULT 0,
    tags                    TEXT[] NOT NULL DEFAULT '{}',
    layout                  TEXT,
    score                   BIGINT NOT NULL DEFAULT 0,
    UNIQUE (site_id, slug)
);

CREATE TABLE IF NOT EXISTS page_text (
    hash        TEXT PRIMARY KEY,
    contents    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS page_revision (
    revision_id                 BIGSERIAL PRIMARY KEY,
    page_id                     BIGINT NOT NULL REFERENCES page (page_id),
    site_id                     BIGINT NOT NULL,
    revision_number             BIGINT NOT NULL,
    kind                        TEXT NOT NULL,
    user_id                     BIGINT,
    created_at                  TIMESTAMPTZ NOT NULL,
    comments                    TEXT NOT NULL DEFAULT '',
    slug                        TEXT NOT NULL,
    title                       TEXT NOT NULL,
    alt_title                   TEXT,
    wikitext_hash               TEXT NOT NULL REFERENCES page_text (hash),
    compiled_hash               TEXT NOT NULL REFERENCES page_text (hash),
    compiled_at                 TIMESTAMPTZ NOT NULL,
    compiled_generator          TEXT NOT NULL,
    compiled_metadata           JSONB NOT NULL DEFAULT '{}',
    delta                       JSONB NOT NULL,
    expected_revision_number    BIGINT,
    UNIQUE (page_id, revision_number)
);

CREATE TABLE IF NOT EXISTS page_parent (
    child_page_id   BIGINT NOT NULL REFERENCES page (page_id),
    parent_page_id  BIGINT NOT NULL REFERENCES page (page_id),
    created_at      TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (child_page_id, parent_page_id),
    CHECK (child_page_id <> parent_page_id)
);

CREATE INDEX IF NOT EXISTS page_parent_parent_idx ON page_parent (parent_page_id);

CREATE TABLE IF NOT EXISTS page_vote (
    page_id     BIGINT NOT NULL REFERENCES page (page_id),
    user_id     BIGINT NOT NULL,
    value       INTEGER NOT NULL,
    cast_at     TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (page_id, user_id)
);
"#;

const PAGE_COLUMNS: &str = "page_id, site_id, slug, title, created_at, updated_at, deleted_at, \
     latest_revision_id, latest_revision_number, tags, layout, score";

const REVISION_COLUMNS: &str = "revision_id, page_id, site_id, revision_number, kind, user_id, \
     created_at, comments, slug, title, alt_title, wikitext_hash, compiled_hash, compiled_at, \
     compiled_generator, compiled_metadata, delta, expected_revision_number";

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/wiki".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row does not decode into a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for CommitError<PostgresError> {
    fn from(error: sqlx::Error) -> Self {
        Self::Backend(PostgresError::Database(error))
    }
}

impl From<PostgresError> for CommitError<PostgresError> {
    fn from(error: PostgresError) -> Self {
        Self::Backend(error)
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

/// Conflict for a slug another page holds. A slug that is taken but has no
/// visible holder means the unique index and the table disagree.
fn slug_taken(site_id: SiteId, slug: &str, holder: Option<PageId>) -> CommitError<PostgresError> {
    match holder {
        Some(holder) => EngineError::SlugConflict {
            site_id,
            slug: slug.to_string(),
            holder,
        }
        .into(),
        None => PostgresError::Corrupt(format!("slug '{}' is taken but has no holder", slug)).into(),
    }
}

fn revision_number(value: i64, column: &str) -> Result<RevisionNumber, PostgresError> {
    RevisionNumber::try_from(value)
        .map_err(|_| PostgresError::Corrupt(format!("{} out of range: {}", column, value)))
}

fn parse_page_row(row: &PgRow) -> Result<Page, PostgresError> {
    let layout: Option<String> = row.try_get("layout")?;
    let layout = match layout {
        Some(name) => Some(
            PageLayout::from_str(&name)
                .ok_or_else(|| PostgresError::Corrupt(format!("unknown layout '{}'", name)))?,
        ),
        None => None,
    };

    Ok(Page {
        page_id: PageId::new(row.try_get("page_id")?),
        site_id: SiteId::new(row.try_get("site_id")?),
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
        latest_revision_id: RevisionId::new(row.try_get("latest_revision_id")?),
        latest_revision_number: revision_number(
            row.try_get("latest_revision_number")?,
            "latest_revision_number",
        )?,
        tags: row.try_get("tags")?,
        layout,
        score: row.try_get("score")?,
    })
}

fn parse_revision_row(row: &PgRow) -> Result<Revision, PostgresError> {
    let kind: String = row.try_get("kind")?;
    let kind = RevisionKind::from_str(&kind)
        .ok_or_else(|| PostgresError::Corrupt(format!("unknown revision kind '{}'", kind)))?;
    let Json(delta): Json<RevisionDelta> = row.try_get("delta")?;
    let expected: Option<i64> = row.try_get("expected_revision_number")?;
    let user_id: Option<i64> = row.try_get("user_id")?;

    Ok(Revision {
        revision_id: RevisionId::new(row.try_get("revision_id")?),
        page_id: PageId::new(row.try_get("page_id")?),
        site_id: SiteId::new(row.try_get("site_id")?),
        revision_number: revision_number(row.try_get("revision_number")?, "revision_number")?,
        kind,
        user_id: user_id.map(UserId::new),
        created_at: row.try_get("created_at")?,
        comments: row.try_get("comments")?,
        slug: row.try_get("slug")?,
        content: RevisionContent {
            title: row.try_get("title")?,
            alt_title: row.try_get("alt_title")?,
            wikitext_hash: row.try_get("wikitext_hash")?,
            compiled_hash: row.try_get("compiled_hash")?,
            compiled_at: row.try_get("compiled_at")?,
            compiled_generator: row.try_get("compiled_generator")?,
            compiled_metadata: row.try_get("compiled_metadata")?,
        },
        delta,
        expected_revision_number: expected
            .map(|n| revision_number(n, "expected_revision_number"))
            .transpose()?,
    })
}

fn parse_score_row(page_id: PageId, row: &PgRow) -> Result<PageScore, PostgresError> {
    let count: i64 = row.try_get("count")?;
    let upvotes: i64 = row.try_get("upvotes")?;
    let downvotes: i64 = row.try_get("downvotes")?;
    Ok(PageScore {
        page_id,
        score: row.try_get("score")?,
        count: count.max(0) as u64,
        upvotes: upvotes.max(0) as u64,
        downvotes: downvotes.max(0) as u64,
    })
}

const SCORE_QUERY: &str = r#"
    SELECT COALESCE(SUM(value), 0)::BIGINT AS score,
           COUNT(*) AS count,
           COUNT(*) FILTER (WHERE value > 0) AS upvotes,
           COUNT(*) FILTER (WHERE value < 0) AS downvotes
    FROM page_vote
    WHERE page_id = $1
"#;

/// PostgreSQL page store.
///
/// Uses connection pooling with production-tuned settings.
pub struct PostgresPageStore {
    pool: PgPool,
}

impl PostgresPageStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        self.pool.execute(SCHEMA).await?;
        tracing::info!("Page schema is up to date");
        Ok(())
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    async fn lock_by_id(
        tx: &mut Transaction<'_, Postgres>,
        site_id: SiteId,
        page_id: PageId,
    ) -> Result<Option<Page>, PostgresError> {
        let sql = format!(
            "SELECT {} FROM page WHERE page_id = $1 AND site_id = $2 FOR UPDATE",
            PAGE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(page_id.get())
            .bind(site_id.get())
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(parse_page_row).transpose()
    }

    async fn lock_by_slug(
        tx: &mut Transaction<'_, Postgres>,
        site_id: SiteId,
        slug: &str,
    ) -> Result<Option<Page>, PostgresError> {
        let sql = format!(
            "SELECT {} FROM page WHERE site_id = $1 AND slug = $2 FOR UPDATE",
            PAGE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(site_id.get())
            .bind(slug)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(parse_page_row).transpose()
    }

    async fn latest_content(
        tx: &mut Transaction<'_, Postgres>,
        page: &Page,
    ) -> Result<CurrentState, CommitError<PostgresError>> {
        let sql = format!(
            "SELECT {} FROM page_revision WHERE page_id = $1 AND revision_number = $2",
            REVISION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(page.page_id.get())
            .bind(i64::from(page.latest_revision_number))
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| {
                PostgresError::Corrupt(format!("page {} has no current revision", page.page_id))
            })?;
        Ok(CurrentState {
            page: page.clone(),
            content: parse_revision_row(&row)?.content,
        })
    }

    async fn link_targets(
        tx: &mut Transaction<'_, Postgres>,
        site_id: SiteId,
        ids: &BTreeSet<PageId>,
    ) -> Result<BTreeMap<PageId, LinkTarget>, PostgresError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let rows = sqlx::query("SELECT page_id, site_id, deleted_at FROM page WHERE page_id = ANY($1)")
            .bind(&raw)
            .fetch_all(&mut **tx)
            .await?;

        let mut targets = BTreeMap::new();
        for row in &rows {
            let page_id = PageId::new(row.try_get("page_id")?);
            let owner = SiteId::new(row.try_get("site_id")?);
            let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;
            let target = if owner != site_id {
                LinkTarget::ForeignSite
            } else if deleted_at.is_some() {
                LinkTarget::Deleted
            } else {
                LinkTarget::Live
            };
            targets.insert(page_id, target);
        }
        Ok(targets)
    }

    async fn apply_commit(
        tx: &mut Transaction<'_, Postgres>,
        commit: &PageCommit,
    ) -> Result<CommitReceipt, CommitError<PostgresError>> {
        let now = Utc::now();
        let site_id = commit.site_id;

        let mut current = match &commit.target {
            CommitTarget::Existing(page_id) => Some(
                Self::lock_by_id(tx, site_id, *page_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("page {}", page_id)))?,
            ),
            CommitTarget::Create { slug } => Self::lock_by_slug(tx, site_id, slug).await?,
        };

        // A new page claims its slug first; losing that race turns the
        // commit into an edit of the winner.
        let page_id = match current.as_ref().map(|page| page.page_id) {
            Some(page_id) => page_id,
            None => {
                let CommitTarget::Create { slug } = &commit.target else {
                    return Err(EngineError::not_found("page").into());
                };
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO page (site_id, slug, created_at, updated_at)
                    VALUES ($1, $2, $3, $3)
                    ON CONFLICT (site_id, slug) DO NOTHING
                    RETURNING page_id
                    "#,
                )
                .bind(site_id.get())
                .bind(slug)
                .bind(now)
                .fetch_optional(&mut **tx)
                .await?;

                match inserted {
                    Some(row) => PageId::new(row.try_get("page_id")?),
                    None => {
                        let holder = Self::lock_by_slug(tx, site_id, slug).await?.ok_or_else(|| {
                            PostgresError::Corrupt(format!("slug '{}' vanished", slug))
                        })?;
                        let page_id = holder.page_id;
                        current = Some(holder);
                        page_id
                    }
                }
            }
        };

        if let (CommitTarget::Create { slug }, Some(page)) = (&commit.target, &current) {
            if page.is_deleted() {
                return Err(EngineError::SlugConflict {
                    site_id,
                    slug: slug.clone(),
                    holder: page.page_id,
                }
                .into());
            }
        }

        let current_number = current.as_ref().map(|page| page.latest_revision_number).unwrap_or(0);
        if let Some(expected) = commit.expected_revision {
            if expected != current_number {
                return Err(EngineError::ConcurrencyConflict {
                    page_id,
                    expected,
                    current: current_number,
                }
                .into());
            }
        }

        let state = match &current {
            Some(page) => Some(Self::latest_content(tx, page).await?),
            None => None,
        };

        let parent_delta = match &commit.changes.parents {
            Some(change) => {
                let targets = Self::link_targets(tx, site_id, &change.add).await?;
                check_change(page_id, change, |id| {
                    targets.get(&id).copied().unwrap_or(LinkTarget::Missing)
                })?;
                let rows = sqlx::query("SELECT parent_page_id FROM page_parent WHERE child_page_id = $1")
                    .bind(page_id.get())
                    .fetch_all(&mut **tx)
                    .await?;
                let existing = rows
                    .iter()
                    .map(|row| row.try_get::<i64, _>("parent_page_id").map(PageId::new))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Some(effective_delta(&existing, change))
            }
            None => None,
        };

        let plan = plan_commit(commit, state.as_ref(), parent_delta.as_ref(), now)?;

        if let Some(state) = &state {
            if plan.slug != state.page.slug {
                let holder = Self::slug_holder(tx, site_id, &plan.slug).await?;
                if holder.is_some() {
                    return Err(slug_taken(site_id, &plan.slug, holder));
                }
            }
        }

        for text in &plan.texts {
            sqlx::query("INSERT INTO page_text (hash, contents) VALUES ($1, $2) ON CONFLICT (hash) DO NOTHING")
                .bind(content_hash(text))
                .bind(text)
                .execute(&mut **tx)
                .await?;
        }

        if let Some(delta) = &parent_delta {
            let removed: Vec<i64> = delta.removed.iter().map(|id| id.get()).collect();
            let added: Vec<i64> = delta.added.iter().map(|id| id.get()).collect();
            sqlx::query("DELETE FROM page_parent WHERE child_page_id = $1 AND parent_page_id = ANY($2)")
                .bind(page_id.get())
                .bind(&removed)
                .execute(&mut **tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO page_parent (child_page_id, parent_page_id, created_at)
                SELECT $1, parent, $3 FROM UNNEST($2::BIGINT[]) AS parent
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(page_id.get())
            .bind(&added)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }

        let number = current_number + 1;
        let candidate = plan.candidate.clone();
        let row = sqlx::query(
            r#"
            INSERT INTO page_revision (
                page_id, site_id, revision_number, kind, user_id, created_at, comments, slug,
                title, alt_title, wikitext_hash, compiled_hash, compiled_at, compiled_generator,
                compiled_metadata, delta, expected_revision_number
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING revision_id
            "#,
        )
        .bind(page_id.get())
        .bind(site_id.get())
        .bind(i64::from(number))
        .bind(candidate.kind.as_str())
        .bind(candidate.user_id.map(UserId::get))
        .bind(candidate.created_at)
        .bind(&candidate.comments)
        .bind(&candidate.slug)
        .bind(&candidate.content.title)
        .bind(&candidate.content.alt_title)
        .bind(&candidate.content.wikitext_hash)
        .bind(&candidate.content.compiled_hash)
        .bind(candidate.content.compiled_at)
        .bind(&candidate.content.compiled_generator)
        .bind(&candidate.content.compiled_metadata)
        .bind(Json(&candidate.delta))
        .bind(commit.expected_revision.map(i64::from))
        .fetch_one(&mut **tx)
        .await?;

        let revision = Revision::from_candidate(
            RevisionId::new(row.try_get("revision_id")?),
            page_id,
            site_id,
            number,
            commit.expected_revision,
            candidate,
        );
        let page = plan.page_record(page_id, site_id, current.as_ref(), &revision);

        // A slug claimed after the check above fails the update. The
        // savepoint keeps the transaction usable for the holder lookup.
        let mut savepoint = sqlx::Connection::begin(&mut **tx).await?;
        let updated = sqlx::query(
            r#"
            UPDATE page
            SET slug = $2, title = $3, updated_at = $4, deleted_at = $5,
                latest_revision_id = $6, latest_revision_number = $7, tags = $8, layout = $9
            WHERE page_id = $1
            "#,
        )
        .bind(page_id.get())
        .bind(&page.slug)
        .bind(&page.title)
        .bind(page.updated_at)
        .bind(page.deleted_at)
        .bind(page.latest_revision_id.get())
        .bind(i64::from(page.latest_revision_number))
        .bind(&page.tags)
        .bind(page.layout.map(|layout| layout.as_str()))
        .execute(&mut *savepoint)
        .await;

        match updated {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(CommitReceipt { page, revision })
            }
            Err(error) if is_unique_violation(&error) => {
                savepoint.rollback().await?;
                let holder = Self::slug_holder(tx, site_id, &page.slug).await?;
                Err(slug_taken(site_id, &page.slug, holder))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn slug_holder(
        tx: &mut Transaction<'_, Postgres>,
        site_id: SiteId,
        slug: &str,
    ) -> Result<Option<PageId>, PostgresError> {
        let row = sqlx::query("SELECT page_id FROM page WHERE site_id = $1 AND slug = $2")
            .bind(site_id.get())
            .bind(slug)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row
            .map(|row| row.try_get::<i64, _>("page_id").map(PageId::new))
            .transpose()?)
    }

    async fn score_in<'e, E>(executor: E, page_id: PageId) -> Result<PageScore, PostgresError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query(SCORE_QUERY)
            .bind(page_id.get())
            .fetch_one(executor)
            .await?;
        parse_score_row(page_id, &row)
    }
}

#[async_trait]
impl PageStore for PostgresPageStore {
    type Error = PostgresError;

    async fn resolve_slug(&self, site_id: SiteId, slug: &str) -> Result<Option<PageId>, Self::Error> {
        let row = sqlx::query("SELECT page_id FROM page WHERE site_id = $1 AND slug = $2")
            .bind(site_id.get())
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|row| row.try_get::<i64, _>("page_id").map(PageId::new))
            .transpose()?)
    }

    async fn get_page(&self, page_id: PageId) -> Result<Option<Page>, Self::Error> {
        let sql = format!("SELECT {} FROM page WHERE page_id = $1", PAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(page_id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_page_row).transpose()
    }

    async fn get_pages(&self, ids: &[PageId]) -> Result<Vec<Page>, Self::Error> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let sql = format!(
            "SELECT {} FROM page WHERE page_id = ANY($1) ORDER BY page_id",
            PAGE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(&raw).fetch_all(&self.pool).await?;
        rows.iter().map(parse_page_row).collect()
    }

    async fn get_revision(
        &self,
        page_id: PageId,
        number: Option<RevisionNumber>,
    ) -> Result<Option<Revision>, Self::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM page_revision
            WHERE page_id = $1 AND ($2::BIGINT IS NULL OR revision_number = $2)
            ORDER BY revision_number DESC
            LIMIT 1
            "#,
            REVISION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(page_id.get())
            .bind(number.map(i64::from))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_revision_row).transpose()
    }

    async fn history(
        &self,
        page_id: PageId,
        from: Option<RevisionNumber>,
        limit: Option<usize>,
    ) -> Result<Vec<RevisionSummary>, Self::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM page_revision
            WHERE page_id = $1 AND ($2::BIGINT IS NULL OR revision_number <= $2)
            ORDER BY revision_number DESC
            LIMIT $3
            "#,
            REVISION_COLUMNS
        );
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        let rows = sqlx::query(&sql)
            .bind(page_id.get())
            .bind(from.map(i64::from))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| parse_revision_row(row).map(|revision| revision.summary()))
            .collect()
    }

    async fn get_text(&self, hash: &str) -> Result<Option<String>, Self::Error> {
        let row = sqlx::query("SELECT contents FROM page_text WHERE hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("contents")).transpose()?)
    }

    async fn get_parents(&self, page_id: PageId) -> Result<Vec<PageId>, Self::Error> {
        let rows = sqlx::query(
            "SELECT parent_page_id FROM page_parent WHERE child_page_id = $1 ORDER BY parent_page_id",
        )
        .bind(page_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<i64, _>("parent_page_id").map(PageId::new))
            .collect::<Result<_, _>>()?)
    }

    async fn get_children(&self, page_id: PageId) -> Result<Vec<PageId>, Self::Error> {
        let rows = sqlx::query(
            "SELECT child_page_id FROM page_parent WHERE parent_page_id = $1 ORDER BY child_page_id",
        )
        .bind(page_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<i64, _>("child_page_id").map(PageId::new))
            .collect::<Result<_, _>>()?)
    }

    async fn deleted_pages(&self, site_id: SiteId, slug: &str) -> Result<Vec<Page>, Self::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM page
            WHERE site_id = $1 AND slug = $2 AND deleted_at IS NOT NULL
            ORDER BY page_id
            "#,
            PAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(site_id.get())
            .bind(slug)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_page_row).collect()
    }

    async fn commit(&self, commit: PageCommit) -> Result<CommitReceipt, CommitError<Self::Error>> {
        let mut tx = self.pool.begin().await?;
        // Dropping the transaction on an early return rolls it back.
        let receipt = Self::apply_commit(&mut tx, &commit).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn cast_vote(
        &self,
        page_id: PageId,
        user_id: UserId,
        action: VoteAction,
    ) -> Result<PageScore, CommitError<Self::Error>> {
        let mut tx = self.pool.begin().await?;

        let live = sqlx::query("SELECT deleted_at FROM page WHERE page_id = $1 FOR UPDATE")
            .bind(page_id.get())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get::<Option<DateTime<Utc>>, _>("deleted_at"))
            .transpose()?
            .is_some_and(|deleted_at| deleted_at.is_none());
        if !live {
            return Err(EngineError::not_found(format!("page {}", page_id)).into());
        }

        match action {
            VoteAction::Set(value) => {
                sqlx::query(
                    r#"
                    INSERT INTO page_vote (page_id, user_id, value, cast_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (page_id, user_id)
                    DO UPDATE SET value = EXCLUDED.value, cast_at = EXCLUDED.cast_at
                    "#,
                )
                .bind(page_id.get())
                .bind(user_id.get())
                .bind(value)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            }
            VoteAction::Remove => {
                sqlx::query("DELETE FROM page_vote WHERE page_id = $1 AND user_id = $2")
                    .bind(page_id.get())
                    .bind(user_id.get())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let score = Self::score_in(&mut *tx, page_id).await?;
        sqlx::query("UPDATE page SET score = $2 WHERE page_id = $1")
            .bind(page_id.get())
            .bind(score.score)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(score)
    }

    async fn score(&self, page_id: PageId) -> Result<PageScore, Self::Error> {
        Self::score_in(&self.pool, page_id).await
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
