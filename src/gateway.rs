//! Remote data gateway: the three queries the sync engine needs.
//!
//! [`DataGateway`] is the seam the engine is written against; the
//! [`GraphqlGateway`] implementation posts GraphQL documents to the Sonar API.

use crate::error::{GatewayError, SonarError};
use crate::model::{FeedTweet, RemoteInterest, RemoteSuggestion, SuggestionStatus};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Default request timeout for API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Time window for a feed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedWindow {
    Hours(u32),
    Days(u32),
}

/// Remote source of truth for the local cache.
#[async_trait::async_trait]
pub trait DataGateway: Send + Sync {
    /// Scored feed entries published inside `window`.
    async fn fetch_feed(
        &self,
        window: FeedWindow,
        limit: u32,
    ) -> Result<Vec<FeedTweet>, SonarError>;

    /// Inbox suggestions, optionally restricted to one status.
    async fn fetch_suggestions(
        &self,
        status: Option<SuggestionStatus>,
        limit: u32,
    ) -> Result<Vec<RemoteSuggestion>, SonarError>;

    /// All interest profiles.
    async fn fetch_interests(&self) -> Result<Vec<RemoteInterest>, SonarError>;
}

const TWEET_FIELDS: &str = "
        id
        xid
        text
        createdAt
        likeCount
        retweetCount
        replyCount
        user {
          displayName
          username
          followersCount
          followingCount
        }";

fn feed_query() -> String {
    format!(
        "query DataFeed($hours: Int, $days: Int, $limit: Int) {{
  feed(hours: $hours, days: $days, limit: $limit) {{
    score
    matchedKeywords
    tweet {{{TWEET_FIELDS}
    }}
  }}
}}"
    )
}

fn suggestions_query() -> String {
    format!(
        "query DataSuggestions($status: SuggestionStatus, $limit: Int) {{
  suggestions(status: $status, limit: $limit) {{
    suggestionId
    score
    projectsMatched
    status
    tweet {{{TWEET_FIELDS}
    }}
  }}
}}"
    )
}

const INTERESTS_QUERY: &str = "query DataInterests {
  projects {
    id: nanoId
    name
    description
    keywords
    relatedTopics
    createdAt
    updatedAt
  }
}";

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct FeedData {
    feed: Vec<FeedTweet>,
}

#[derive(Deserialize)]
struct SuggestionsData {
    suggestions: Vec<RemoteSuggestion>,
}

#[derive(Deserialize)]
struct InterestsData {
    projects: Vec<RemoteInterest>,
}

/// GraphQL-over-HTTP client for the Sonar API.
#[derive(Debug, Clone)]
pub struct GraphqlGateway {
    client: Client,
    api_url: String,
    token: String,
    timeout: Duration,
}

impl GraphqlGateway {
    /// Build a gateway for `api_url` authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MissingToken`] if the token is empty.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GatewayError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(GatewayError::MissingToken);
        }
        Ok(Self {
            client: Client::new(),
            api_url: api_url.into(),
            token,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, GatewayError> {
        debug!(url = %self.api_url, %variables, "GraphQL request");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    GatewayError::Unreachable(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
            });
        }

        let body: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        if let Some(first) = body.errors.into_iter().next() {
            return Err(GatewayError::Graphql(first.message));
        }
        body.data
            .ok_or_else(|| GatewayError::Decode("response contained no data".to_string()))
    }
}

#[async_trait::async_trait]
impl DataGateway for GraphqlGateway {
    async fn fetch_feed(
        &self,
        window: FeedWindow,
        limit: u32,
    ) -> Result<Vec<FeedTweet>, SonarError> {
        let data: FeedData = self
            .request(&feed_query(), feed_variables(window, limit))
            .await?;
        Ok(data.feed)
    }

    async fn fetch_suggestions(
        &self,
        status: Option<SuggestionStatus>,
        limit: u32,
    ) -> Result<Vec<RemoteSuggestion>, SonarError> {
        let variables = json!({ "status": status.map(SuggestionStatus::as_str), "limit": limit });
        let data: SuggestionsData = self.request(&suggestions_query(), variables).await?;
        Ok(data.suggestions)
    }

    async fn fetch_interests(&self) -> Result<Vec<RemoteInterest>, SonarError> {
        let data: InterestsData = self.request(INTERESTS_QUERY, json!({})).await?;
        Ok(data.projects)
    }
}

fn feed_variables(window: FeedWindow, limit: u32) -> Value {
    match window {
        FeedWindow::Hours(hours) => json!({ "hours": hours, "days": null, "limit": limit }),
        FeedWindow::Days(days) => json!({ "hours": null, "days": days, "limit": limit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        let err = GraphqlGateway::new("https://example.invalid/graphql", "  ").unwrap_err();
        assert!(matches!(err, GatewayError::MissingToken));
    }

    #[test]
    fn feed_variables_set_exactly_one_window() {
        let vars = feed_variables(FeedWindow::Hours(5), 500);
        assert_eq!(vars["hours"], 5);
        assert!(vars["days"].is_null());

        let vars = feed_variables(FeedWindow::Days(7), 500);
        assert!(vars["hours"].is_null());
        assert_eq!(vars["days"], 7);
        assert_eq!(vars["limit"], 500);
    }

    #[test]
    fn queries_embed_tweet_fields() {
        assert!(feed_query().contains("matchedKeywords"));
        assert!(feed_query().contains("followingCount"));
        assert!(suggestions_query().contains("suggestionId"));
        assert!(INTERESTS_QUERY.contains("nanoId"));
    }

    #[test]
    fn graphql_errors_decode() {
        let body: GraphqlResponse<FeedData> =
            serde_json::from_str(r#"{"data": null, "errors": [{"message": "Unauthorized"}]}"#)
                .unwrap();
        assert!(body.data.is_none());
        assert_eq!(body.errors[0].message, "Unauthorized");
    }
}
