//! Typed response bodies for the Twitter/X v2 endpoints Lookout consumes.
//!
//! Every field the provider may omit is optional and defaults, so a sparse
//! payload decodes to documented fallbacks instead of failing.
use serde::{Deserialize, Serialize};

/// `GET 2/users/by?usernames=...`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsersResponse {
    #[serde(default)]
    pub data: Option<Vec<User>>,
    /// Per-username lookup problems (e.g. suspended or unknown accounts).
    #[serde(default)]
    pub errors: Option<Vec<Problem>>,
}

/// `GET 2/users/{id}/tweets` and `GET 2/tweets/search/recent`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TweetsResponse {
    #[serde(default)]
    pub data: Option<Vec<Tweet>>,
    #[serde(default)]
    pub includes: Option<Includes>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Meta {
    #[serde(default)]
    pub result_count: Option<u32>,
    #[serde(default)]
    pub newest_id: Option<String>,
    #[serde(default)]
    pub oldest_id: Option<String>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Includes {
    #[serde(default)]
    pub users: Option<Vec<User>>,
    #[serde(default)]
    pub media: Option<Vec<Media>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub media_key: Option<String>,
    #[serde(default)]
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub public_metrics: Option<PublicMetrics>,
    #[serde(default)]
    pub referenced_tweets: Option<Vec<ReferencedTweet>>,

    // Attachments for media mapping
    #[serde(default)]
    pub attachments: Option<Attachments>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Attachments {
    #[serde(default)]
    pub media_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublicMetrics {
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default, alias = "repost_count")]
    pub retweet_count: Option<u64>,
    #[serde(default)]
    pub reply_count: Option<u64>,
    #[serde(default)]
    pub quote_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}
