//! SQLite-backed crawl job state.
//!
//! A job directory holds `crawl.db` with every scheduled fingerprint and the
//! requests still waiting to be fetched. Requests are stored as JSON so the
//! callback (and any context it carries) survives a restart.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::CrawlRequest;

/// File name of the state database inside a job directory.
pub const STATE_FILE: &str = "crawl.db";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("could not encode request: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Persisted frontier of one crawl job.
pub struct CrawlState {
    path: PathBuf,
    conn: Connection,
}

/// What a job directory held when it was opened.
#[derive(Debug)]
pub struct SavedFrontier<C> {
    pub seen: Vec<String>,
    pub pending: Vec<CrawlRequest<C>>,
    pub started_at: Option<DateTime<Utc>>,
}

impl<C> SavedFrontier<C> {
    /// Whether the job was interrupted with requests left to fetch.
    pub fn is_resumable(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl CrawlState {
    /// Open (or create) the state database in `job_dir`.
    pub fn open(job_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(job_dir)?;
        let path = job_dir.join(STATE_FILE);
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS seen (
                fingerprint TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS pending (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL UNIQUE,
                request TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { path, conn })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved frontier. Pending requests come back in scheduling order.
    pub fn load<C: DeserializeOwned>(&self) -> Result<SavedFrontier<C>> {
        let seen = self
            .conn
            .prepare("SELECT fingerprint FROM seen")?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let raw = self
            .conn
            .prepare("SELECT request FROM pending ORDER BY seq")?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let pending = raw
            .iter()
            .map(|json| serde_json::from_str(json))
            .collect::<std::result::Result<Vec<CrawlRequest<C>>, _>>()?;

        let started_at = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'started_at'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(SavedFrontier {
            seen,
            pending,
            started_at,
        })
    }

    /// Forget everything and stamp a new start time.
    pub fn reset(&mut self, started_at: DateTime<Utc>) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM seen", [])?;
        tx.execute("DELETE FROM pending", [])?;
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('started_at', ?)",
            params![started_at.to_rfc3339()],
        )?;
        tx.commit()?;
        debug!("Reset crawl state at {}", self.path.display());
        Ok(())
    }

    /// Record a newly scheduled request.
    pub fn schedule<C: Serialize>(&self, fingerprint: &str, request: &CrawlRequest<C>) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO seen (fingerprint) VALUES (?)",
            params![fingerprint],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO pending (fingerprint, request) VALUES (?, ?)",
            params![fingerprint, json],
        )?;
        Ok(())
    }

    /// Mark a request as handled.
    pub fn complete(&self, fingerprint: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM pending WHERE fingerprint = ?",
            params![fingerprint],
        )?;
        Ok(())
    }

    /// Number of requests still waiting.
    pub fn pending_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_schedule_and_reload() {
        let dir = tempdir().unwrap();
        {
            let mut state = CrawlState::open(dir.path()).unwrap();
            state.reset(Utc::now()).unwrap();
            state
                .schedule("a", &CrawlRequest::new("https://example.com/a", "listing"))
                .unwrap();
            state
                .schedule("b", &CrawlRequest::new("https://example.com/b", "detail"))
                .unwrap();
            state.complete("a").unwrap();
        }

        let state = CrawlState::open(dir.path()).unwrap();
        let saved: SavedFrontier<String> = state.load().unwrap();
        assert!(saved.is_resumable());
        assert_eq!(saved.seen.len(), 2);
        assert_eq!(saved.pending.len(), 1);
        assert_eq!(saved.pending[0].url, "https://example.com/b");
        assert_eq!(saved.pending[0].callback, "detail");
        assert!(saved.started_at.is_some());
        assert_eq!(state.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_pending_order_is_scheduling_order() {
        let dir = tempdir().unwrap();
        let state = CrawlState::open(dir.path()).unwrap();
        for name in ["z", "a", "m"] {
            state
                .schedule(name, &CrawlRequest::new(format!("https://example.com/{}", name), ()))
                .unwrap();
        }
        let saved: SavedFrontier<()> = state.load().unwrap();
        let urls: Vec<&str> = saved.pending.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/z",
                "https://example.com/a",
                "https://example.com/m"
            ]
        );
    }

    #[test]
    fn test_reset_clears() {
        let dir = tempdir().unwrap();
        let mut state = CrawlState::open(dir.path()).unwrap();
        state
            .schedule("a", &CrawlRequest::new("https://example.com/a", ()))
            .unwrap();
        state.reset(Utc::now()).unwrap();
        let saved: SavedFrontier<()> = state.load().unwrap();
        assert!(!saved.is_resumable());
        assert!(saved.seen.is_empty());
    }
}
