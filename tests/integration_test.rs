//! Integration tests for sonar.
//!
//! These tests drive the library end to end:
//! - Download and incremental sync against an in-memory gateway
//! - Backup of the synced cache and restore over a newer database
//! - Restore rollback when the copied database fails verification

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sonar::{
    BackupManager, DataGateway, FeedWindow, IntegrityCheck, IntegrityVerdict, SonarError,
    SyncEngine, SyncMode,
    model::*,
    storage::{CacheTable, LAST_SYNCED_AT, Storage},
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn tweet(id: &str) -> Tweet {
    Tweet {
        id: id.to_string(),
        xid: format!("x{id}"),
        text: format!("Tweet {id} about Rust"),
        created_at: "2025-01-08T12:00:00Z".to_string(),
        like_count: 42,
        retweet_count: 7,
        reply_count: 1,
        user: TweetUser {
            display_name: "Ferris".to_string(),
            username: Some("ferris".to_string()),
            followers_count: Some(100),
            following_count: Some(10),
        },
    }
}

/// Gateway serving whatever feed is queued; records requested windows.
#[derive(Default)]
struct QueueGateway {
    feed: Mutex<Vec<FeedTweet>>,
    windows: Mutex<Vec<FeedWindow>>,
}

impl QueueGateway {
    fn queue(&self, ids: &[&str]) {
        *self.feed.lock().unwrap() = ids
            .iter()
            .map(|id| FeedTweet {
                score: 0.8,
                matched_keywords: vec!["rust".to_string(), "sqlite".to_string()],
                tweet: tweet(id),
            })
            .collect();
    }
}

#[async_trait]
impl DataGateway for QueueGateway {
    async fn fetch_feed(&self, window: FeedWindow, _limit: u32) -> sonar::Result<Vec<FeedTweet>> {
        self.windows.lock().unwrap().push(window);
        Ok(self.feed.lock().unwrap().clone())
    }

    async fn fetch_suggestions(
        &self,
        _status: Option<SuggestionStatus>,
        _limit: u32,
    ) -> sonar::Result<Vec<RemoteSuggestion>> {
        Ok(vec![RemoteSuggestion {
            suggestion_id: "s-1".to_string(),
            score: 0.9,
            projects_matched: 2,
            status: SuggestionStatus::Inbox,
            tweet: tweet("suggested"),
        }])
    }

    async fn fetch_interests(&self) -> sonar::Result<Vec<RemoteInterest>> {
        Ok(vec![RemoteInterest {
            id: "p-1".to_string(),
            name: "Rust tooling".to_string(),
            description: Some("Compilers and CLIs".to_string()),
            keywords: Some(vec!["rust".to_string()]),
            related_topics: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-02T00:00:00Z".to_string(),
        }])
    }
}

/// Reports `ok` for every file except the restore destination.
struct FailAfterCopy {
    bad: std::path::PathBuf,
}

impl IntegrityCheck for FailAfterCopy {
    fn check(&self, path: &Path) -> sonar::Result<IntegrityVerdict> {
        if path == self.bad {
            return Ok(IntegrityVerdict::new(path, "row 3 missing from index"));
        }
        Ok(IntegrityVerdict::new(path, "ok"))
    }
}

fn feed_count(path: &Path) -> i64 {
    Storage::open(path)
        .unwrap()
        .count(CacheTable::FeedItems)
        .unwrap()
}

#[tokio::test]
async fn download_then_sync_accumulates() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data.db");
    let gateway = Arc::new(QueueGateway::default());
    let engine = SyncEngine::new(Arc::clone(&gateway) as Arc<dyn DataGateway>, &db);

    gateway.queue(&["1", "2", "3"]);
    let first = engine.sync().await.unwrap();
    assert_eq!(first.mode, SyncMode::Full);
    assert_eq!(first.feed_count, 3);
    assert_eq!(first.interests_count, 1);

    gateway.queue(&["3", "4"]);
    let second = engine.sync().await.unwrap();
    assert_eq!(second.mode, SyncMode::Incremental);
    assert_eq!(second.delta_feed, Some(1));
    assert_eq!(second.feed_count, 4);
    assert_eq!(second.delta_suggestions, Some(0));
    assert!(second.synced_at > first.synced_at);

    let windows = gateway.windows.lock().unwrap().clone();
    assert_eq!(windows, vec![FeedWindow::Days(7), FeedWindow::Hours(1)]);

    let storage = Storage::open(&db).unwrap();
    let interest = storage.get_interest("p-1").unwrap().unwrap();
    assert_eq!(interest.keywords, vec!["rust".to_string()]);
    assert!(interest.related_topics.is_empty());
    let item = storage.get_feed_item("4").unwrap().unwrap();
    assert_eq!(item.matched_keywords, vec!["rust", "sqlite"]);
}

#[tokio::test]
async fn sync_backup_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data.db");
    let gateway = Arc::new(QueueGateway::default());
    let engine = SyncEngine::new(Arc::clone(&gateway) as Arc<dyn DataGateway>, &db);

    gateway.queue(&["1", "2"]);
    engine.download().await.unwrap();

    let manager = BackupManager::new();
    let backup = manager.backup(&db, None).unwrap();
    assert!(backup.backup.exists());
    assert!(backup.bytes > 0);

    gateway.queue(&["3", "4", "5"]);
    engine.sync().await.unwrap();
    assert_eq!(feed_count(&db), 5);

    let restored = manager.restore(&backup.backup, &db).unwrap();
    assert_eq!(restored.to, db);
    assert_eq!(feed_count(&db), 2);

    // The restored cache still knows when it was synced.
    let storage = Storage::open(&db).unwrap();
    assert!(storage.get_sync_state(LAST_SYNCED_AT).unwrap().is_some());
}

#[tokio::test]
async fn failed_restore_rolls_back_synced_cache() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data.db");
    let gateway = Arc::new(QueueGateway::default());
    let engine = SyncEngine::new(Arc::clone(&gateway) as Arc<dyn DataGateway>, &db);

    gateway.queue(&["1"]);
    engine.download().await.unwrap();
    let backup = BackupManager::new().backup(&db, None).unwrap();

    gateway.queue(&["2", "3"]);
    engine.sync().await.unwrap();
    let before = std::fs::read(&db).unwrap();

    let checker = FailAfterCopy { bad: db.clone() };
    let manager = BackupManager::with_checker(checker);
    let err = manager.restore(&backup.backup, &db).unwrap_err();

    assert!(matches!(err, SonarError::RestoreRolledBack { .. }));
    assert!(err.destination_preserved());
    assert_eq!(std::fs::read(&db).unwrap(), before);
    assert_eq!(feed_count(&db), 3);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains("pre-restore"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn stale_sync_state_is_capped() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data.db");
    let storage = Storage::open(&db).unwrap();
    let stale = (Utc::now() - Duration::days(30)).to_rfc3339();
    storage.set_sync_state(LAST_SYNCED_AT, &stale).unwrap();
    storage.close().unwrap();

    let gateway = Arc::new(QueueGateway::default());
    let engine = SyncEngine::new(Arc::clone(&gateway) as Arc<dyn DataGateway>, &db);
    let report = engine.sync().await.unwrap();

    assert_eq!(report.mode, SyncMode::Incremental);
    assert_eq!(report.window_hours, Some(168));
}
