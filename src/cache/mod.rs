pub mod schema;
pub mod types;

pub use types::PrKey;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::report::Verdict;

/// Entries older than this are read as misses.
pub const CACHE_TTL_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create cache directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("Cache schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("Cache connection lock poisoned")]
    Poisoned,

    #[error("Unknown verdict code {0} in cache")]
    UnknownVerdict(i64),
}

/// Durable PR-title and verdict tables backed by SQLite.
///
/// A store built with [`CacheStore::disabled`] has no connection: every read
/// is a miss and every write is a no-op, so callers never need to special-case
/// a run with caching turned off.
pub struct CacheStore {
    conn: Option<Mutex<Connection>>,
}

/// Whether an entry written at `stored` is still usable at `now`.
pub fn is_fresh(stored: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(stored) <= Duration::days(CACHE_TTL_DAYS)
}

impl CacheStore {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, gone when the store is dropped.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// A store that caches nothing.
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Some(Mutex::new(conn)),
        })
    }

    /// Default cache location: `$HOME/.changelog-checker/cache.db`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".changelog-checker").join("cache.db"))
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Run `f` against the connection; `Ok(None)` when caching is disabled.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<Option<T>, CacheError> {
        let Some(conn) = &self.conn else {
            return Ok(None);
        };
        let conn = conn.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(Some(f(&conn)?))
    }

    /// Cached title for `key`, or `None` when absent or older than the TTL.
    pub fn get_title(&self, key: &PrKey) -> Result<Option<String>, CacheError> {
        self.get_title_at(key, Utc::now())
    }

    pub(crate) fn get_title_at(
        &self,
        key: &PrKey,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, CacheError> {
        let row = self
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT title, fetched_at FROM github_pr_cache
                     WHERE repo_owner = ?1 AND repo_name = ?2 AND pr_number = ?3",
                    params![key.owner, key.repo, key.number as i64],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, DateTime<Utc>>(1)?)),
                )
                .optional()
            })?
            .flatten();

        match row {
            Some((title, fetched_at)) if is_fresh(fetched_at, now) => Ok(Some(title)),
            Some(_) => {
                debug!(pr = %key, "cached title is older than {} days, will refresh", CACHE_TTL_DAYS);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite the title for `key`, stamped with the current time.
    pub fn put_title(&self, key: &PrKey, title: &str) -> Result<(), CacheError> {
        self.put_title_at(key, title, Utc::now())
    }

    pub(crate) fn put_title_at(
        &self,
        key: &PrKey,
        title: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO github_pr_cache
                 (repo_owner, repo_name, pr_number, title, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key.owner, key.repo, key.number as i64, title, fetched_at],
            )
        })?;
        Ok(())
    }

    /// Cached verdict for `key`, valid only if it was computed for exactly
    /// `description` and is not older than the TTL.
    pub fn get_verdict(
        &self,
        key: &PrKey,
        description: &str,
    ) -> Result<Option<Verdict>, CacheError> {
        self.get_verdict_at(key, description, Utc::now())
    }

    pub(crate) fn get_verdict_at(
        &self,
        key: &PrKey,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Verdict>, CacheError> {
        let row = self
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT changelog_desc, status, last_validated FROM validation_cache
                     WHERE repo_owner = ?1 AND repo_name = ?2 AND pr_number = ?3",
                    params![key.owner, key.repo, key.number as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, DateTime<Utc>>(2)?,
                        ))
                    },
                )
                .optional()
            })?
            .flatten();

        let Some((stored_description, code, last_validated)) = row else {
            return Ok(None);
        };

        if stored_description != description {
            debug!(pr = %key, "changelog description changed since last validation");
            return Ok(None);
        }

        if !is_fresh(last_validated, now) {
            debug!(pr = %key, "cached verdict is older than {} days, will refresh", CACHE_TTL_DAYS);
            return Ok(None);
        }

        Verdict::from_code(code)
            .map(Some)
            .ok_or(CacheError::UnknownVerdict(code))
    }

    /// Insert or overwrite the verdict for `key` together with the description
    /// it was computed from.
    pub fn put_verdict(
        &self,
        key: &PrKey,
        description: &str,
        verdict: Verdict,
    ) -> Result<(), CacheError> {
        self.put_verdict_at(key, description, verdict, Utc::now())
    }

    pub(crate) fn put_verdict_at(
        &self,
        key: &PrKey,
        description: &str,
        verdict: Verdict,
        validated_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO validation_cache
                 (repo_owner, repo_name, pr_number, changelog_desc, status, last_validated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.owner,
                    key.repo,
                    key.number as i64,
                    description,
                    verdict.code(),
                    validated_at
                ],
            )
        })?;
        Ok(())
    }

    /// Read-through title lookup: serve a fresh cached title, otherwise run
    /// `fetch` and store what it returns.
    ///
    /// Cache failures are logged and never surface; only `fetch` errors do.
    pub async fn read_through<F, Fut, E>(&self, key: &PrKey, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        match self.get_title(key) {
            Ok(Some(title)) => {
                debug!(pr = %key, "title cache hit");
                return Ok(title);
            }
            Ok(None) => debug!(pr = %key, "title cache miss"),
            Err(e) => warn!(pr = %key, error = %e, "title cache read failed"),
        }

        let title = fetch().await?;

        if let Err(e) = self.put_title(key, &title) {
            warn!(pr = %key, error = %e, "failed to cache PR title");
        }
        Ok(title)
    }
}
