//! Full and incremental synchronization of the local cache.
//!
//! A sync starts by reading `last_synced_at`. Without it the cache is wiped
//! and rebuilt from a 7-day download; with it only the feed published since
//! then (at most one week) and the current suggestions are fetched.
//!
//! Writes are plain upserts. A failed sync keeps whatever it already wrote
//! and leaves `last_synced_at` alone, so retrying is always safe.

use crate::error::{Result, SonarError};
use crate::gateway::{DataGateway, FeedWindow};
use crate::model::Interest;
use crate::storage::{CacheTable, LAST_SYNCED_AT, Storage, remove_database};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of feed items and suggestions requested per fetch.
pub const FETCH_LIMIT: u32 = 500;

/// Feed window of a full download, in days.
pub const FULL_FEED_DAYS: u32 = 7;

/// Upper bound on the incremental feed window, in hours.
pub const MAX_WINDOW_HOURS: u32 = 168;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Which branch a sync took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

/// Counts reported after a successful sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Full: records fetched. Incremental: rows in `feed_items` afterwards.
    pub feed_count: i64,
    pub suggestions_count: i64,
    /// Interests are only fetched by a full download.
    pub interests_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_feed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_suggestions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_hours: Option<u32>,
    pub synced_at: DateTime<Utc>,
}

/// Hours of feed to request: `ceil((now - last) / 1h)`, kept within
/// `1..=MAX_WINDOW_HOURS`.
#[must_use]
pub fn fetch_window_hours(last_synced_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let elapsed = now.signed_duration_since(last_synced_at).num_milliseconds().max(0);
    let hours = (elapsed + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR;
    u32::try_from(hours.clamp(1, i64::from(MAX_WINDOW_HOURS))).unwrap_or(MAX_WINDOW_HOURS)
}

/// Next value for `last_synced_at`, at millisecond precision; never at or
/// before the previous one.
#[must_use]
pub fn next_sync_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(3);
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

fn parse_stamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_stamp(stamp: DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Run a fetch as its own task. Dropping the returned future stops waiting
/// for the result without aborting the task.
fn spawn_fetch<T, F>(fetch: F) -> impl Future<Output = Result<T>>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fetch);
    async move {
        handle
            .await
            .map_err(|e| SonarError::TaskFailed(e.to_string()))?
    }
}

/// Drives downloads and incremental syncs for one database file.
#[derive(Clone)]
pub struct SyncEngine {
    gateway: Arc<dyn DataGateway>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn DataGateway>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            db_path: db_path.into(),
        }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Incremental sync when a previous sync is recorded, full download
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or write error unchanged.
    pub async fn sync(&self) -> Result<SyncReport> {
        let storage = Storage::open(&self.db_path)?;
        let recorded = storage.get_sync_state(LAST_SYNCED_AT)?;

        match recorded.as_deref().map(|v| (v, parse_stamp(v))) {
            Some((_, Some(last))) => self.incremental(storage, last).await,
            Some((raw, None)) => {
                warn!("Ignoring unreadable {LAST_SYNCED_AT} value {raw:?}; doing a full download");
                storage.close()?;
                self.download().await
            }
            None => {
                storage.close()?;
                self.download().await
            }
        }
    }

    /// Wipe the database and rebuild it from the remote source.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or write error unchanged.
    pub async fn download(&self) -> Result<SyncReport> {
        remove_database(&self.db_path)?;
        let mut storage = Storage::open(&self.db_path)?;

        let feed = {
            let gateway = Arc::clone(&self.gateway);
            spawn_fetch(async move {
                gateway
                    .fetch_feed(FeedWindow::Days(FULL_FEED_DAYS), FETCH_LIMIT)
                    .await
            })
        };
        let suggestions = {
            let gateway = Arc::clone(&self.gateway);
            spawn_fetch(async move { gateway.fetch_suggestions(None, FETCH_LIMIT).await })
        };
        let interests = {
            let gateway = Arc::clone(&self.gateway);
            spawn_fetch(async move { gateway.fetch_interests().await })
        };
        let (feed, suggestions, interests) = tokio::try_join!(feed, suggestions, interests)?;
        debug!(
            feed = feed.len(),
            suggestions = suggestions.len(),
            interests = interests.len(),
            "Fetched full download"
        );

        let synced_at = Utc::now();
        for entry in &feed {
            storage.upsert_feed_entry(entry, synced_at)?;
        }
        for entry in &suggestions {
            storage.upsert_suggestion_entry(entry, synced_at)?;
        }
        for entry in &interests {
            storage.upsert_interest(&Interest::from_remote(entry, synced_at))?;
        }

        let stamp = next_sync_stamp(None, synced_at);
        storage.set_sync_state(LAST_SYNCED_AT, &format_stamp(stamp))?;
        storage.close()?;

        let report = SyncReport {
            mode: SyncMode::Full,
            feed_count: count_of(feed.len()),
            suggestions_count: count_of(suggestions.len()),
            interests_count: count_of(interests.len()),
            delta_feed: None,
            delta_suggestions: None,
            window_hours: None,
            synced_at: stamp,
        };
        info!(
            feed = report.feed_count,
            suggestions = report.suggestions_count,
            interests = report.interests_count,
            "Download complete"
        );
        Ok(report)
    }

    async fn incremental(
        &self,
        mut storage: Storage,
        last_synced_at: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let window_hours = fetch_window_hours(last_synced_at, Utc::now());
        debug!(window_hours, %last_synced_at, "Starting incremental sync");

        let feed = {
            let gateway = Arc::clone(&self.gateway);
            spawn_fetch(async move {
                gateway
                    .fetch_feed(FeedWindow::Hours(window_hours), FETCH_LIMIT)
                    .await
            })
        };
        let suggestions = {
            let gateway = Arc::clone(&self.gateway);
            spawn_fetch(async move { gateway.fetch_suggestions(None, FETCH_LIMIT).await })
        };
        let (feed, suggestions) = tokio::try_join!(feed, suggestions)?;

        let prev_feed = storage.count(CacheTable::FeedItems)?;
        let prev_suggestions = storage.count(CacheTable::Suggestions)?;

        let synced_at = Utc::now();
        for entry in &feed {
            storage.upsert_feed_entry(entry, synced_at)?;
        }
        for entry in &suggestions {
            storage.upsert_suggestion_entry(entry, synced_at)?;
        }

        let stamp = next_sync_stamp(Some(last_synced_at), synced_at);
        storage.set_sync_state(LAST_SYNCED_AT, &format_stamp(stamp))?;

        let feed_count = storage.count(CacheTable::FeedItems)?;
        let suggestions_count = storage.count(CacheTable::Suggestions)?;
        storage.close()?;

        let report = SyncReport {
            mode: SyncMode::Incremental,
            feed_count,
            suggestions_count,
            interests_count: 0,
            delta_feed: Some(feed_count - prev_feed),
            delta_suggestions: Some(suggestions_count - prev_suggestions),
            window_hours: Some(window_hours),
            synced_at: stamp,
        };
        info!(
            delta_feed = feed_count - prev_feed,
            delta_suggestions = suggestions_count - prev_suggestions,
            "Sync complete"
        );
        Ok(report)
    }
}

fn count_of(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
