//! `SQLite` storage for the local cache.
//!
//! Every write is an `INSERT OR REPLACE` keyed by the row's primary key, so
//! replaying a sync batch is always safe.

use crate::error::{Result, SonarError};
use crate::model::{
    CacheCounts, FeedItem, FeedTweet, Interest, RemoteSuggestion, Suggestion, SuggestionStatus,
    Tweet, TweetUser,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

/// Suffixes of the write-ahead-log and shared-memory files that travel with
/// a database file.
pub const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Sync-state key holding the RFC 3339 time of the last successful sync.
pub const LAST_SYNCED_AT: &str = "last_synced_at";

/// Path of a sidecar file (`data.db` + `-wal` -> `data.db-wal`).
#[must_use]
pub fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Delete a database file together with its sidecars. Missing files are fine.
///
/// # Errors
///
/// Returns an error if an existing file cannot be removed.
pub fn remove_database(db_path: &Path) -> Result<()> {
    let sidecars = SIDECAR_SUFFIXES.iter().map(|s| sidecar_path(db_path, s));
    for path in std::iter::once(db_path.to_path_buf()).chain(sidecars) {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SonarError::path_error("remove", path, e)),
        }
    }
    Ok(())
}

fn conversion_failure(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn timestamp_column(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(column, e))
}

/// A JSON string array; NULL reads as empty.
fn json_list_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Vec<String>> {
    row.get::<_, Option<String>>(column)?
        .map_or_else(
            || Ok(Vec::new()),
            |s| serde_json::from_str(&s).map_err(|e| conversion_failure(column, e)),
        )
}

/// Cache tables with a row count worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTable {
    Tweets,
    FeedItems,
    Suggestions,
    Interests,
}

impl CacheTable {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tweets => "tweets",
            Self::FeedItems => "feed_items",
            Self::Suggestions => "suggestions",
            Self::Interests => "interests",
        }
    }
}

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// The parent directory is created if needed. A file that exists but is
    /// not a readable database fails with [`SonarError::StoreOpen`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SonarError::path_error("create directory", parent, e))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| SonarError::store_open(db_path, e.to_string()))?;

        // Pragmas and schema are where an unreadable file first surfaces.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .and_then(|_| {
            conn.execute_batch(
                "
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                ",
            )
        })
        .map_err(|e| SonarError::store_open(db_path, e.to_string()))?;

        let storage = Self { conn };
        storage
            .migrate()
            .map_err(|e| SonarError::store_open(db_path, e.to_string()))?;
        debug!("Opened database at {}", db_path.display());
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the connection, surfacing any error from the close itself.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` refuses to close the handle.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| SonarError::from(e))
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        // The schema is idempotent and applied on every open; a file may
        // carry a user_version without our tables.
        self.create_schema()?;

        let current: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current, SCHEMA_VERSION
            );
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn create_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS tweets (
                id TEXT PRIMARY KEY,
                xid TEXT,
                text TEXT,
                created_at TEXT,
                like_count INTEGER,
                retweet_count INTEGER,
                reply_count INTEGER,
                author_username TEXT,
                author_display_name TEXT,
                author_followers_count INTEGER,
                author_following_count INTEGER
            );

            CREATE TABLE IF NOT EXISTS feed_items (
                tweet_id TEXT PRIMARY KEY,
                score REAL,
                matched_keywords TEXT,
                synced_at TEXT
            );

            CREATE TABLE IF NOT EXISTS suggestions (
                suggestion_id TEXT PRIMARY KEY,
                tweet_id TEXT,
                score REAL,
                status TEXT,
                relevance TEXT,
                projects_matched INTEGER,
                metadata TEXT,
                synced_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_suggestions_status ON suggestions(status);

            CREATE TABLE IF NOT EXISTS interests (
                id TEXT PRIMARY KEY,
                name TEXT,
                description TEXT,
                keywords TEXT,
                topics TEXT,
                created_at TEXT,
                updated_at TEXT,
                synced_at TEXT
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            ",
        )
    }

    // =========================================================================
    // Upserts
    // =========================================================================

    /// Insert or replace a tweet.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_tweet(&self, tweet: &Tweet) -> Result<()> {
        write_tweet(&self.conn, tweet)?;
        Ok(())
    }

    /// Insert or replace a feed item.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_feed_item(&self, item: &FeedItem) -> Result<()> {
        write_feed_item(&self.conn, item)
    }

    /// Insert or replace a suggestion.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        write_suggestion(&self.conn, suggestion)
    }

    /// Insert or replace an interest.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_interest(&self, interest: &Interest) -> Result<()> {
        self.conn
            .prepare_cached(
                r"
                INSERT OR REPLACE INTO interests
                (id, name, description, keywords, topics, created_at, updated_at, synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?
            .execute(params![
                interest.id,
                interest.name,
                interest.description,
                serde_json::to_string(&interest.keywords)?,
                serde_json::to_string(&interest.related_topics)?,
                interest.created_at,
                interest.updated_at,
                interest.synced_at.to_rfc3339(),
            ])?;
        Ok(())
    }

    /// Write a remote feed entry: the tweet, then its feed row, in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails; neither row is kept then.
    pub fn upsert_feed_entry(&mut self, entry: &FeedTweet, synced_at: DateTime<Utc>) -> Result<()> {
        let tx = self.conn.transaction()?;
        write_tweet(&tx, &entry.tweet)?;
        write_feed_item(&tx, &FeedItem::from_remote(entry, synced_at))?;
        tx.commit()?;
        Ok(())
    }

    /// Write a remote suggestion: the tweet, then its suggestion row, in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails; neither row is kept then.
    pub fn upsert_suggestion_entry(
        &mut self,
        entry: &RemoteSuggestion,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        write_tweet(&tx, &entry.tweet)?;
        write_suggestion(&tx, &Suggestion::from_remote(entry, synced_at))?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Sync state
    // =========================================================================

    /// Read a sync-state value.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_sync_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    }

    /// Write a sync-state value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_sync_state(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Row count of a single cache table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, table: CacheTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Row counts for all cache tables in a single query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts(&self) -> Result<CacheCounts> {
        let query = r"
            SELECT
                (SELECT COUNT(*) FROM tweets),
                (SELECT COUNT(*) FROM feed_items),
                (SELECT COUNT(*) FROM suggestions),
                (SELECT COUNT(*) FROM interests)
        ";
        Ok(self.conn.query_row(query, [], |row| {
            Ok(CacheCounts {
                tweets: row.get(0)?,
                feed_items: row.get(1)?,
                suggestions: row.get(2)?,
                interests: row.get(3)?,
            })
        })?)
    }

    /// Get a tweet by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_tweet(&self, id: &str) -> Result<Option<Tweet>> {
        Ok(self
            .conn
            .query_row(
                r"
                SELECT id, xid, text, created_at, like_count, retweet_count, reply_count,
                       author_username, author_display_name,
                       author_followers_count, author_following_count
                FROM tweets WHERE id = ?
                ",
                params![id],
                |row| {
                    Ok(Tweet {
                        id: row.get(0)?,
                        xid: row.get(1)?,
                        text: row.get(2)?,
                        created_at: row.get(3)?,
                        like_count: row.get(4)?,
                        retweet_count: row.get(5)?,
                        reply_count: row.get(6)?,
                        user: TweetUser {
                            username: row.get(7)?,
                            display_name: row.get(8)?,
                            followers_count: row.get(9)?,
                            following_count: row.get(10)?,
                        },
                    })
                },
            )
            .optional()?)
    }

    /// Get the feed row for a tweet.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_feed_item(&self, tweet_id: &str) -> Result<Option<FeedItem>> {
        Ok(self
            .conn
            .query_row(
                r"
                SELECT tweet_id, score, matched_keywords, synced_at
                FROM feed_items WHERE tweet_id = ?
                ",
                params![tweet_id],
                |row| {
                    Ok(FeedItem {
                        tweet_id: row.get(0)?,
                        score: row.get(1)?,
                        matched_keywords: json_list_column(row, 2)?,
                        synced_at: timestamp_column(row, 3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Get a suggestion by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_suggestion(&self, suggestion_id: &str) -> Result<Option<Suggestion>> {
        Ok(self
            .conn
            .query_row(
                r"
                SELECT suggestion_id, tweet_id, score, status, relevance,
                       projects_matched, metadata, synced_at
                FROM suggestions WHERE suggestion_id = ?
                ",
                params![suggestion_id],
                |row| {
                    let status: String = row.get(3)?;
                    let metadata: Option<String> = row.get(6)?;
                    Ok(Suggestion {
                        suggestion_id: row.get(0)?,
                        tweet_id: row.get(1)?,
                        score: row.get(2)?,
                        status: status
                            .parse::<SuggestionStatus>()
                            .map_err(|e| conversion_failure(3, e))?,
                        relevance: row.get(4)?,
                        projects_matched: row.get(5)?,
                        metadata: metadata
                            .map(|m| serde_json::from_str::<serde_json::Value>(&m))
                            .transpose()
                            .map_err(|e| conversion_failure(6, e))?,
                        synced_at: timestamp_column(row, 7)?,
                    })
                },
            )
            .optional()?)
    }

    /// Get an interest by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_interest(&self, id: &str) -> Result<Option<Interest>> {
        Ok(self
            .conn
            .query_row(
                r"
                SELECT id, name, description, keywords, topics, created_at, updated_at, synced_at
                FROM interests WHERE id = ?
                ",
                params![id],
                |row| {
                    Ok(Interest {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        keywords: json_list_column(row, 3)?,
                        related_topics: json_list_column(row, 4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                        synced_at: timestamp_column(row, 7)?,
                    })
                },
            )
            .optional()?)
    }
}

fn write_tweet(conn: &Connection, tweet: &Tweet) -> rusqlite::Result<()> {
    conn.prepare_cached(
        r"
        INSERT OR REPLACE INTO tweets
        (id, xid, text, created_at, like_count, retweet_count, reply_count,
         author_username, author_display_name, author_followers_count, author_following_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )?
    .execute(params![
        tweet.id,
        tweet.xid,
        tweet.text,
        tweet.created_at,
        tweet.like_count,
        tweet.retweet_count,
        tweet.reply_count,
        tweet.user.username,
        tweet.user.display_name,
        tweet.user.followers_count,
        tweet.user.following_count,
    ])?;
    Ok(())
}

fn write_feed_item(conn: &Connection, item: &FeedItem) -> Result<()> {
    conn.prepare_cached(
        r"
        INSERT OR REPLACE INTO feed_items (tweet_id, score, matched_keywords, synced_at)
        VALUES (?, ?, ?, ?)
        ",
    )?
    .execute(params![
        item.tweet_id,
        item.score,
        serde_json::to_string(&item.matched_keywords)?,
        item.synced_at.to_rfc3339(),
    ])?;
    Ok(())
}

fn write_suggestion(conn: &Connection, suggestion: &Suggestion) -> Result<()> {
    let metadata = suggestion
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.prepare_cached(
        r"
        INSERT OR REPLACE INTO suggestions
        (suggestion_id, tweet_id, score, status, relevance, projects_matched, metadata, synced_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )?
    .execute(params![
        suggestion.suggestion_id,
        suggestion.tweet_id,
        suggestion.score,
        suggestion.status.as_str(),
        suggestion.relevance,
        suggestion.projects_matched,
        metadata,
        suggestion.synced_at.to_rfc3339(),
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_tweet(id: &str, text: &str) -> Tweet {
        Tweet {
            id: id.to_string(),
            xid: format!("x{id}"),
            text: text.to_string(),
            created_at: "2025-01-08T12:00:00Z".to_string(),
            like_count: 0,
            retweet_count: 0,
            reply_count: 0,
            user: TweetUser {
                display_name: "Tester".to_string(),
                username: Some("tester".to_string()),
                followers_count: Some(10),
                following_count: None,
            },
        }
    }

    #[test]
    fn test_create_database() {
        let storage = Storage::open_memory().unwrap();
        assert_eq!(storage.counts().unwrap(), CacheCounts::default());
    }

    #[test]
    fn test_tweet_upsert_is_idempotent() {
        let storage = Storage::open_memory().unwrap();
        let tweet = create_test_tweet("1", "Original text");

        storage.upsert_tweet(&tweet).unwrap();
        storage.upsert_tweet(&tweet).unwrap();

        assert_eq!(storage.count(CacheTable::Tweets).unwrap(), 1);
        assert_eq!(storage.get_tweet("1").unwrap(), Some(tweet));
    }

    #[test]
    fn test_tweet_upsert_overwrites_all_fields() {
        let storage = Storage::open_memory().unwrap();
        storage
            .upsert_tweet(&create_test_tweet("1", "Original text"))
            .unwrap();

        let updated = Tweet {
            text: "Updated text".to_string(),
            like_count: 100,
            retweet_count: 50,
            reply_count: 7,
            user: TweetUser {
                display_name: "Renamed".to_string(),
                username: None,
                followers_count: None,
                following_count: Some(3),
            },
            ..create_test_tweet("1", "")
        };
        storage.upsert_tweet(&updated).unwrap();

        assert_eq!(storage.count(CacheTable::Tweets).unwrap(), 1);
        assert_eq!(storage.get_tweet("1").unwrap(), Some(updated));
    }

    #[test]
    fn test_feed_entry_writes_tweet_first() {
        let mut storage = Storage::open_memory().unwrap();
        let entry = FeedTweet {
            score: 0.75,
            matched_keywords: vec!["rust".to_string(), "async".to_string()],
            tweet: create_test_tweet("42", "tokio tips"),
        };

        storage.upsert_feed_entry(&entry, Utc::now()).unwrap();

        assert!(storage.get_tweet("42").unwrap().is_some());
        let item = storage.get_feed_item("42").unwrap().unwrap();
        assert!((item.score - 0.75).abs() < f64::EPSILON);
        assert_eq!(item.matched_keywords, vec!["rust", "async"]);
    }

    #[test]
    fn test_suggestion_round_trip_with_metadata() {
        let storage = Storage::open_memory().unwrap();
        let suggestion = Suggestion {
            suggestion_id: "s1".to_string(),
            tweet_id: "1".to_string(),
            score: 0.5,
            status: SuggestionStatus::Later,
            relevance: Some("high".to_string()),
            projects_matched: 2,
            metadata: Some(serde_json::json!({"source": "test"})),
            synced_at: Utc::now(),
        };
        storage.upsert_suggestion(&suggestion).unwrap();
        storage.upsert_suggestion(&suggestion).unwrap();

        let stored = storage.get_suggestion("s1").unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Later);
        assert_eq!(stored.relevance.as_deref(), Some("high"));
        assert_eq!(stored.metadata, suggestion.metadata);
        assert_eq!(storage.count(CacheTable::Suggestions).unwrap(), 1);
    }

    #[test]
    fn test_interest_lists_round_trip() {
        let storage = Storage::open_memory().unwrap();
        let interest = Interest {
            id: "p1".to_string(),
            name: "Rust".to_string(),
            description: Some("systems programming".to_string()),
            keywords: vec!["rust".to_string(), "cargo".to_string()],
            related_topics: vec!["wasm".to_string()],
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-02T00:00:00Z".to_string(),
            synced_at: Utc::now(),
        };
        storage.upsert_interest(&interest).unwrap();

        let stored = storage.get_interest("p1").unwrap().unwrap();
        assert_eq!(stored.keywords, interest.keywords);
        assert_eq!(stored.related_topics, interest.related_topics);
    }

    #[test]
    fn test_sync_state_replace_on_write() {
        let storage = Storage::open_memory().unwrap();
        assert_eq!(storage.get_sync_state(LAST_SYNCED_AT).unwrap(), None);

        storage.set_sync_state(LAST_SYNCED_AT, "a").unwrap();
        storage.set_sync_state(LAST_SYNCED_AT, "b").unwrap();
        assert_eq!(
            storage.get_sync_state(LAST_SYNCED_AT).unwrap().as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("data.db");

        let storage = Storage::open(&path).unwrap();
        storage.close().unwrap();

        assert!(path.exists());
        // Reopening applies the schema idempotently.
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.counts().unwrap(), CacheCounts::default());
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.db");
        std::fs::write(&path, "not a sqlite database\n".repeat(256)).unwrap();

        let err = Storage::open(&path).unwrap_err();
        assert!(matches!(err, SonarError::StoreOpen { .. }), "got {err:?}");
    }

    #[test]
    fn test_open_applies_schema_to_versioned_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 1; CREATE TABLE other (a);")
            .unwrap();
        drop(conn);

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.get_sync_state(LAST_SYNCED_AT).unwrap(), None);
        assert_eq!(storage.counts().unwrap(), CacheCounts::default());
    }

    #[test]
    fn test_unparseable_stored_values_are_errors() {
        let storage = Storage::open_memory().unwrap();
        storage
            .connection()
            .execute_batch(
                r#"
                INSERT INTO feed_items VALUES ('1', 0.5, '["rust"]', 'yesterday');
                INSERT INTO suggestions VALUES
                    ('s1', '1', 0.5, 'PENDING', NULL, 0, NULL, '2025-01-08T12:00:00Z'),
                    ('s2', '1', 0.5, 'INBOX', NULL, 0, '{broken', '2025-01-08T12:00:00Z');
                INSERT INTO interests VALUES
                    ('p1', 'Rust', NULL, 'rust', NULL, '', '', '2025-01-08T12:00:00Z');
                "#,
            )
            .unwrap();

        for err in [
            storage.get_feed_item("1").unwrap_err(),
            storage.get_suggestion("s1").unwrap_err(),
            storage.get_suggestion("s2").unwrap_err(),
            storage.get_interest("p1").unwrap_err(),
        ] {
            assert!(
                matches!(
                    err,
                    SonarError::DatabaseError(rusqlite::Error::FromSqlConversionFailure(..))
                ),
                "got {err:?}"
            );
        }
    }

    #[test]
    fn test_remove_database_removes_sidecars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.db");
        std::fs::write(&path, b"main").unwrap();
        std::fs::write(sidecar_path(&path, "-wal"), b"wal").unwrap();

        remove_database(&path).unwrap();
        assert!(!path.exists());
        assert!(!sidecar_path(&path, "-wal").exists());
        // Second call is a no-op.
        remove_database(&path).unwrap();
    }

    #[test]
    fn test_sidecar_path_appends_suffix() {
        let path = Path::new("/tmp/sonar/data.db");
        assert_eq!(sidecar_path(path, "-shm"), PathBuf::from("/tmp/sonar/data.db-shm"));
    }
}
