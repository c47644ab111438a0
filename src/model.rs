//! Data models for the local cache and the remote payloads that feed it.
//!
//! Remote types mirror the GraphQL response shapes (camelCase on the wire);
//! local types are the rows stored by [`crate::storage::Storage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a tweet as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetUser {
    pub display_name: String,
    pub username: Option<String>,
    pub followers_count: Option<i64>,
    pub following_count: Option<i64>,
}

/// An immutable content record. Upserts overwrite every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    pub id: String,
    /// Identifier on x.com.
    pub xid: String,
    pub text: String,
    pub created_at: String,
    pub like_count: i64,
    pub retweet_count: i64,
    pub reply_count: i64,
    pub user: TweetUser,
}

/// Remote feed entry: a scored tweet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedTweet {
    pub score: f64,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    pub tweet: Tweet,
}

/// Remote inbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSuggestion {
    pub suggestion_id: String,
    pub score: f64,
    pub projects_matched: i64,
    pub status: SuggestionStatus,
    pub tweet: Tweet,
}

/// Remote interest (a "project" on the service side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInterest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub related_topics: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Inbox state of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionStatus {
    Inbox,
    Read,
    Skipped,
    Later,
    Archived,
    Replied,
}

impl SuggestionStatus {
    /// Wire and storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Read => "READ",
            Self::Skipped => "SKIPPED",
            Self::Later => "LATER",
            Self::Archived => "ARCHIVED",
            Self::Replied => "REPLIED",
        }
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INBOX" => Ok(Self::Inbox),
            "READ" => Ok(Self::Read),
            "SKIPPED" => Ok(Self::Skipped),
            "LATER" => Ok(Self::Later),
            "ARCHIVED" => Ok(Self::Archived),
            "REPLIED" => Ok(Self::Replied),
            _ => Err(format!("Invalid suggestion status: {s}")),
        }
    }
}

/// Feed association row, keyed by `tweet_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub tweet_id: String,
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub synced_at: DateTime<Utc>,
}

/// Inbox association row, keyed by `suggestion_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion_id: String,
    pub tweet_id: String,
    pub score: f64,
    pub status: SuggestionStatus,
    pub relevance: Option<String>,
    pub projects_matched: i64,
    pub metadata: Option<serde_json::Value>,
    pub synced_at: DateTime<Utc>,
}

/// Interest profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub related_topics: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub synced_at: DateTime<Utc>,
}

impl FeedItem {
    /// Build the local row for a remote feed entry.
    #[must_use]
    pub fn from_remote(entry: &FeedTweet, synced_at: DateTime<Utc>) -> Self {
        Self {
            tweet_id: entry.tweet.id.clone(),
            score: entry.score,
            matched_keywords: entry.matched_keywords.clone(),
            synced_at,
        }
    }
}

impl Suggestion {
    /// Build the local row for a remote suggestion. Relevance and metadata
    /// are not part of the sync payload.
    #[must_use]
    pub fn from_remote(entry: &RemoteSuggestion, synced_at: DateTime<Utc>) -> Self {
        Self {
            suggestion_id: entry.suggestion_id.clone(),
            tweet_id: entry.tweet.id.clone(),
            score: entry.score,
            status: entry.status,
            relevance: None,
            projects_matched: entry.projects_matched,
            metadata: None,
            synced_at,
        }
    }
}

impl Interest {
    #[must_use]
    pub fn from_remote(entry: &RemoteInterest, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            description: entry.description.clone(),
            keywords: entry.keywords.clone().unwrap_or_default(),
            related_topics: entry.related_topics.clone().unwrap_or_default(),
            created_at: entry.created_at.clone(),
            updated_at: entry.updated_at.clone(),
            synced_at,
        }
    }
}

/// Row counts for the cache tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounts {
    pub tweets: i64,
    pub feed_items: i64,
    pub suggestions: i64,
    pub interests: i64,
}
