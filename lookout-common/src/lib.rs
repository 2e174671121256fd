//! Common types and utilities shared across Lookout crates.
//!
//! This crate defines the normalized feed model handed to the dashboard, the
//! per-account diagnostics that travel next to it, and the observability
//! helpers every binary and test uses. It stays dependency-light so every
//! other crate can depend on it.
//!
//! # Overview
//!
//! - [`AccountConfig`]: one tracked account as configured
//! - [`FetchStrategy`]: which provider endpoint supplies an account's posts
//! - [`ResolvedUser`]: provider identity produced by a user lookup
//! - [`FeedItem`], [`Author`], [`MediaItem`]: the normalized post shape
//! - [`FetchOutcome`]: per-account result of one aggregation pass
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use lookout_common::{Author, PLACEHOLDER_AVATAR_URL};
//!
//! let author = Author::placeholder("yashchitneni");
//! assert_eq!(author.display_name, "yashchitneni");
//! assert_eq!(author.avatar_url, PLACEHOLDER_AVATAR_URL);
//! ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod observability;

/// Avatar shown when the provider returns no `profile_image_url`.
pub const PLACEHOLDER_AVATAR_URL: &str =
    "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?w=40&h=40&fit=crop&crop=face";

/// A tracked account. Entries are unique by username within one configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub username: String,
    pub display_name: String,
}

impl AccountConfig {
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
        }
    }

    /// Account with no configured display name; the username stands in.
    pub fn bare(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            display_name: username.clone(),
            username,
        }
    }
}

/// Which provider endpoint supplies an account's posts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// The user's own timeline.
    #[default]
    Timeline,
    /// Recent search for `from:<user> -is:retweet`.
    Search,
    /// Recent search for `@<user>`.
    Mentions,
}

impl FetchStrategy {
    /// The recent-search query, for the search-backed strategies.
    pub fn search_query(self, username: &str) -> Option<String> {
        match self {
            FetchStrategy::Timeline => None,
            FetchStrategy::Search => Some(format!("from:{username} -is:retweet")),
            FetchStrategy::Mentions => Some(format!("@{username}")),
        }
    }
}

/// How the aggregator schedules per-account fetches within one pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One account at a time, with an optional pause between accounts.
    #[default]
    Sequential,
    /// All accounts at once; the pass waits for every fetch to settle.
    Concurrent,
}

/// Provider identity for a username, valid for one aggregation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl Author {
    /// Deterministic stand-in used when the provider omits author expansion data.
    pub fn placeholder(username: &str) -> Self {
        Self {
            username: username.to_string(),
            display_name: username.to_string(),
            avatar_url: PLACEHOLDER_AVATAR_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
    Other,
}

impl MediaKind {
    pub fn from_provider(kind: Option<&str>) -> Self {
        match kind {
            Some("photo") => MediaKind::Photo,
            Some("video") => MediaKind::Video,
            Some("animated_gif") => MediaKind::AnimatedGif,
            _ => MediaKind::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub url: String,
}

/// How a post relates to other posts, derived from `referenced_tweets`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    #[default]
    Tweet,
    Retweet,
    Reply,
    Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Engagement {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
}

/// One normalized post, ready for display.
///
/// Tweet ids are only unique within one source; the aggregate feed identifies
/// items by [`FeedItem::key`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub author: Author,
    pub media: Vec<MediaItem>,
    pub source_label: String,
    pub source_username: String,
    #[serde(default)]
    pub kind: PostKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<Engagement>,
}

impl FeedItem {
    pub fn key(&self) -> (&str, &str) {
        (&self.source_username, &self.id)
    }
}

/// Per-account result of one aggregation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub username: String,
    pub success: bool,
    pub tweet_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub rate_limited: bool,
}

impl FetchOutcome {
    pub fn succeeded(username: &str, tweet_count: usize) -> Self {
        Self {
            username: username.to_string(),
            success: true,
            tweet_count,
            error_message: None,
            rate_limited: false,
        }
    }

    pub fn failed(username: &str, message: impl Into<String>) -> Self {
        Self {
            username: username.to_string(),
            success: false,
            tweet_count: 0,
            error_message: Some(message.into()),
            rate_limited: false,
        }
    }

    pub fn rate_limited(username: &str, message: impl Into<String>) -> Self {
        Self {
            rate_limited: true,
            ..Self::failed(username, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn feed_item_serializes_camel_case_without_empty_engagement() {
        let item = FeedItem {
            id: "1".into(),
            text: "hello".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            url: "https://twitter.com/alice/status/1".into(),
            author: Author::placeholder("alice"),
            media: vec![],
            source_label: "Alice".into(),
            source_username: "alice".into(),
            kind: PostKind::Tweet,
            engagement: None,
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(v["sourceLabel"], "Alice");
        assert_eq!(v["author"]["avatarUrl"], PLACEHOLDER_AVATAR_URL);
        assert!(v.get("engagement").is_none());
        assert_eq!(item.key(), ("alice", "1"));
    }

    #[test]
    fn rate_limited_outcome_is_a_failure() {
        let o = FetchOutcome::rate_limited("bob", "Rate limited");
        assert!(!o.success);
        assert!(o.rate_limited);
        assert_eq!(o.error_message.as_deref(), Some("Rate limited"));
    }

    #[test]
    fn search_strategies_build_queries() {
        assert_eq!(FetchStrategy::Timeline.search_query("a"), None);
        assert_eq!(
            FetchStrategy::Search.search_query("a").as_deref(),
            Some("from:a -is:retweet")
        );
        assert_eq!(FetchStrategy::Mentions.search_query("a").as_deref(), Some("@a"));
    }

    #[test]
    fn unknown_media_kinds_collapse_to_other() {
        assert_eq!(MediaKind::from_provider(Some("photo")), MediaKind::Photo);
        assert_eq!(MediaKind::from_provider(Some("hologram")), MediaKind::Other);
        assert_eq!(MediaKind::from_provider(None), MediaKind::Other);
    }
}
