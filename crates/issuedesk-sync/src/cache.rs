//! SQLite-based offline cache for issue lists, details, seen markers and boards.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use issuedesk_core::{DatabaseError, RusqliteErrorExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{Board, IssueDetail, IssueQuery, IssueSummary};

pub type CacheResult<T> = Result<T, DatabaseError>;

/// Local store consulted by the coordinator for reads and fallbacks.
///
/// Implementations serialize their own access; every call is a complete
/// unit so concurrent callers never observe a half-written list.
pub trait LocalCache: Send + Sync {
    /// Replace the cached list for `query`.
    fn save_issues(&self, query: &IssueQuery, issues: &[IssueSummary]) -> CacheResult<()>;

    /// Cached list for `query`, empty when nothing was cached.
    fn load_cached_issues(&self, query: &IssueQuery) -> CacheResult<Vec<IssueSummary>>;

    fn save_issue_detail(&self, detail: &IssueDetail) -> CacheResult<()>;

    fn load_issue_detail(&self, issue_id: &str) -> CacheResult<Option<IssueDetail>>;

    /// Remember the `updated_at` the user last looked at.
    fn mark_issue_seen(&self, issue_id: &str, updated_at: DateTime<Utc>) -> CacheResult<()>;

    /// Seen markers for the given ids; ids never seen are absent.
    fn load_issue_seen_updates(
        &self,
        issue_ids: &[String],
    ) -> CacheResult<HashMap<String, DateTime<Utc>>>;

    fn save_boards(&self, project_id: &str, boards: &[Board]) -> CacheResult<()>;

    fn load_boards(&self, project_id: &str) -> CacheResult<Vec<Board>>;

    /// Drop cached lists and details. Seen markers and boards survive.
    fn clear_cached_issues(&self) -> CacheResult<()>;
}

fn db_error(err: rusqlite::Error) -> DatabaseError {
    err.into_database_error()
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> CacheResult<String> {
    serde_json::to_string(value).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> CacheResult<T> {
    serde_json::from_str(json)
        .map_err(|e| DatabaseError::Corruption(format!("Cached {} is unreadable: {}", what, e)))
}

/// SQLite implementation of [`LocalCache`].
pub struct SqliteIssueCache {
    conn: Mutex<Connection>,
}

impl SqliteIssueCache {
    /// Open (or create) the cache at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let conn = Connection::open(path).map_err(db_error)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache.
    pub fn in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> CacheResult<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS issue_lists (
                query_key TEXT PRIMARY KEY,
                issues_json TEXT NOT NULL,
                cached_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS issue_details (
                issue_id TEXT PRIMARY KEY,
                detail_json TEXT NOT NULL,
                cached_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS issue_seen (
                issue_id TEXT PRIMARY KEY,
                seen_updated_ms INTEGER NOT NULL,
                seen_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS boards (
                project_id TEXT NOT NULL,
                board_id TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (project_id, board_id)
            );

            CREATE INDEX IF NOT EXISTS idx_boards_project ON boards(project_id, position);
            "#,
            )
            .map_err(db_error)
    }

    /// Number of cached issue lists.
    pub fn cached_list_count(&self) -> CacheResult<u32> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM issue_lists", [], |row| row.get(0))
            .map_err(db_error)
    }
}

impl LocalCache for SqliteIssueCache {
    fn save_issues(&self, query: &IssueQuery, issues: &[IssueSummary]) -> CacheResult<()> {
        let issues_json = encode(issues)?;
        let now = Utc::now().timestamp_millis();

        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO issue_lists (query_key, issues_json, cached_at) VALUES (?1, ?2, ?3)",
                params![query.cache_key(), issues_json, now],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn load_cached_issues(&self, query: &IssueQuery) -> CacheResult<Vec<IssueSummary>> {
        let issues_json: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT issues_json FROM issue_lists WHERE query_key = ?1",
                params![query.cache_key()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        match issues_json {
            Some(json) => decode(&json, "issue list"),
            None => Ok(Vec::new()),
        }
    }

    fn save_issue_detail(&self, detail: &IssueDetail) -> CacheResult<()> {
        let detail_json = encode(detail)?;
        let now = Utc::now().timestamp_millis();

        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO issue_details (issue_id, detail_json, cached_at) VALUES (?1, ?2, ?3)",
                params![detail.summary.id, detail_json, now],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn load_issue_detail(&self, issue_id: &str) -> CacheResult<Option<IssueDetail>> {
        let detail_json: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT detail_json FROM issue_details WHERE issue_id = ?1",
                params![issue_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        detail_json
            .map(|json| decode(&json, "issue detail"))
            .transpose()
    }

    fn mark_issue_seen(&self, issue_id: &str, updated_at: DateTime<Utc>) -> CacheResult<()> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO issue_seen (issue_id, seen_updated_ms, seen_at) VALUES (?1, ?2, ?3)",
                params![issue_id, updated_at.timestamp_millis(), now],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn load_issue_seen_updates(
        &self,
        issue_ids: &[String],
    ) -> CacheResult<HashMap<String, DateTime<Utc>>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT seen_updated_ms FROM issue_seen WHERE issue_id = ?1")
            .map_err(db_error)?;

        let mut seen = HashMap::new();
        for id in issue_ids {
            let ms: Option<i64> = stmt
                .query_row(params![id], |row| row.get(0))
                .optional()
                .map_err(db_error)?;
            if let Some(at) = ms.and_then(DateTime::<Utc>::from_timestamp_millis) {
                seen.insert(id.clone(), at);
            }
        }
        Ok(seen)
    }

    fn save_boards(&self, project_id: &str, boards: &[Board]) -> CacheResult<()> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_error)?;

        tx.execute("DELETE FROM boards WHERE project_id = ?1", params![project_id])
            .map_err(db_error)?;
        for (position, board) in boards.iter().enumerate() {
            tx.execute(
                "INSERT INTO boards (project_id, board_id, name, position, cached_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![project_id, board.id, board.name, position as i64, now],
            )
            .map_err(db_error)?;
        }

        tx.commit().map_err(db_error)
    }

    fn load_boards(&self, project_id: &str) -> CacheResult<Vec<Board>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT board_id, project_id, name FROM boards WHERE project_id = ?1 ORDER BY position",
            )
            .map_err(db_error)?;

        let boards = stmt
            .query_map(params![project_id], |row| {
                Ok(Board {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(boards)
    }

    fn clear_cached_issues(&self) -> CacheResult<()> {
        self.conn
            .lock()
            .execute_batch("DELETE FROM issue_lists; DELETE FROM issue_details;")
            .map_err(db_error)
    }
}
