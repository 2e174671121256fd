//! Thin wrapper around the Twitter/X v2 endpoints with Lookout defaults.
//!
//! Handles auth, request parameter shaping, and safe search windows before
//! delegating to the shared retrying HTTP client.
use crate::twitter::types::{TweetsResponse, UsersResponse};
use lookout_http::{Auth, HttpClient, HttpError, RequestOpts};
use std::borrow::Cow;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

const USER_FIELDS: &str = "name,username,profile_image_url,verified";
const TWEET_FIELDS: &str = "created_at,public_metrics,attachments,referenced_tweets,author_id";
const EXPANSIONS: &str = "attachments.media_keys,author_id";
const MEDIA_FIELDS: &str = "type,url,preview_image_url";

#[derive(Clone)]
pub struct TwitterApi {
    http: HttpClient,
    bearer: String,
}

impl TwitterApi {
    pub fn new(bearer_token: String) -> Result<Self, HttpError> {
        Ok(Self::with_http(HttpClient::new(DEFAULT_BASE_URL)?, bearer_token))
    }

    /// Use a preconfigured client (custom base URL, retry ceiling, sleeper).
    pub fn with_http(http: HttpClient, bearer_token: String) -> Self {
        Self {
            http,
            bearer: bearer_token,
        }
    }

    fn opts<'a>(&'a self, query: Vec<(&'a str, Cow<'a, str>)>) -> RequestOpts<'a> {
        RequestOpts {
            auth: Some(Auth::Bearer(&self.bearer)),
            query: Some(query),
            ..Default::default()
        }
    }

    /// One batched lookup for every username.
    pub async fn lookup_users(&self, usernames: &[String]) -> Result<UsersResponse, HttpError> {
        let params = vec![
            ("usernames", usernames.join(",").into()),
            ("user.fields", USER_FIELDS.into()),
        ];
        let resp: UsersResponse = self.http.get_json("2/users/by", self.opts(params)).await?;
        tracing::debug!(
            requested = usernames.len(),
            found = resp.data.as_ref().map_or(0, Vec::len),
            "twitter.users.lookup"
        );
        Ok(resp)
    }

    /// Recent tweets from one user's timeline with media and author expansions.
    pub async fn user_tweets(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> Result<TweetsResponse, HttpError> {
        // The timeline endpoint accepts 5..=100.
        let max_results = max_results.clamp(5, 100);
        let path = format!("2/users/{user_id}/tweets");
        let params = vec![
            ("max_results", max_results.to_string().into()),
            ("tweet.fields", TWEET_FIELDS.into()),
            ("expansions", EXPANSIONS.into()),
            ("media.fields", MEDIA_FIELDS.into()),
            ("user.fields", USER_FIELDS.into()),
        ];
        let resp: TweetsResponse = self.http.get_json(&path, self.opts(params)).await?;
        tracing::debug!(
            user_id,
            count = resp.data.as_ref().map_or(0, Vec::len),
            "twitter.timeline"
        );
        Ok(resp)
    }

    /// `2/tweets/search/recent` over the last seven days.
    pub async fn recent_search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<TweetsResponse, HttpError> {
        let max_results = max_results.clamp(10, 100);

        // The provider requires start >= now - 7d and end <= now - 10s. Keep
        // slack on both ends so the window is still valid on arrival.
        let now = OffsetDateTime::now_utc();
        let start = format_rfc3339(now - Duration::days(7) + Duration::minutes(1))?;
        let end = format_rfc3339(now - Duration::seconds(20))?;

        let params = vec![
            ("query", query.into()),
            ("max_results", max_results.to_string().into()),
            ("tweet.fields", TWEET_FIELDS.into()),
            ("expansions", EXPANSIONS.into()),
            ("media.fields", MEDIA_FIELDS.into()),
            ("user.fields", USER_FIELDS.into()),
            ("start_time", start.into()),
            ("end_time", end.into()),
        ];
        let resp: TweetsResponse = self
            .http
            .get_json("2/tweets/search/recent", self.opts(params))
            .await?;
        tracing::debug!(
            query,
            count = resp.data.as_ref().map_or(0, Vec::len),
            "twitter.search"
        );
        Ok(resp)
    }
}

fn format_rfc3339(t: OffsetDateTime) -> Result<String, HttpError> {
    t.format(&Rfc3339)
        .map_err(|e| HttpError::Build(format!("time format: {e}")))
}
