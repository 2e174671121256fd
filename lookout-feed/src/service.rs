//! The aggregation entry point as seen by callers: always a well-formed
//! [`FeedResponse`], whatever went wrong underneath.
use crate::aggregate::{AggregateResult, FeedAggregator};
use crate::clock::{Clock, SystemClock};
use crate::error::FeedError;
use crate::rate::{CooldownTracker, GlobalQuota};
use lookout_common::{AccountConfig, FeedItem, FetchOutcome, FetchStrategy};
use lookout_config::LookoutConfig;
use lookout_http::HttpClient;
use lookout_social::SocialError;
use lookout_social::twitter::{TweetFetcher, TwitterApi, UserResolver};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const NO_RECENT_TWEETS: &str = "No recent tweets found";
const NO_ACCOUNTS: &str = "No accounts configured";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub tweets: Vec<FeedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<FeedSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedSummary {
    pub total_tweets: usize,
    pub strategy: FetchStrategy,
    pub accounts: Vec<FetchOutcome>,
}

impl FeedResponse {
    /// Empty feed carrying `err` as the diagnostic.
    pub fn from_error(err: &FeedError) -> Self {
        Self {
            rate_limited: err.is_rate_limited().then_some(true),
            error: Some(err.to_string()),
            ..Self::default()
        }
    }

    fn from_aggregate(result: AggregateResult, strategy: FetchStrategy) -> Self {
        if result.quota_exhausted {
            return Self::from_error(&FeedError::RateLimitExceeded);
        }

        let AggregateResult {
            items,
            summary,
            rate_limited,
            ..
        } = result;

        let mut error = None;
        let mut message = None;
        if items.is_empty() {
            if rate_limited {
                error = Some(FeedError::RateLimitExceeded.to_string());
            } else if summary.iter().all(|o| o.success) {
                message = Some(NO_RECENT_TWEETS.to_string());
            } else if !summary.iter().any(|o| o.success) {
                error = summary.iter().find_map(|o| o.error_message.clone());
            }
        }

        Self {
            summary: Some(FeedSummary {
                total_tweets: items.len(),
                strategy,
                accounts: summary,
            }),
            tweets: items,
            rate_limited: rate_limited.then_some(true),
            error,
            message,
        }
    }
}

pub struct FeedService {
    /// `None` when no usable bearer token was configured.
    aggregator: Option<FeedAggregator>,
    accounts: Vec<AccountConfig>,
    strategy: FetchStrategy,
    timeout: Duration,
}

impl FeedService {
    pub fn new(
        aggregator: Option<FeedAggregator>,
        accounts: Vec<AccountConfig>,
        strategy: FetchStrategy,
    ) -> Self {
        Self {
            aggregator,
            accounts,
            strategy,
            timeout: Duration::from_secs(60),
        }
    }

    /// Caller-side bound on one aggregation pass.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wire the Twitter-backed stack described by `cfg`.
    ///
    /// A missing bearer token is not an error here; every request then answers
    /// with [`FeedError::ConfigurationMissing`].
    pub fn from_config(cfg: &LookoutConfig) -> Result<Self, FeedError> {
        let aggregator = match cfg.twitter.bearer() {
            None => {
                tracing::warn!("feed.config.missing_bearer");
                None
            }
            Some(bearer) => {
                let http = HttpClient::new(&cfg.twitter.base_url)
                    .map_err(SocialError::from)?
                    .with_timeout(cfg.twitter.timeout())
                    .with_retries(cfg.twitter.max_retries);
                let api = TwitterApi::with_http(http, bearer.to_string());
                let clock: Arc<dyn Clock> = Arc::new(SystemClock);

                let mut agg = FeedAggregator::new(
                    Arc::new(UserResolver::new(api.clone())),
                    Arc::new(TweetFetcher::new(api, cfg.twitter.strategy)),
                    CooldownTracker::new(cfg.limits.cooldown(), clock.clone()),
                )
                .with_dispatch(cfg.dispatch.mode, cfg.dispatch.delay())
                .with_max_results(cfg.twitter.max_results);
                if let Some((max_calls, window)) = cfg.limits.global_quota() {
                    agg = agg.with_quota(GlobalQuota::new(max_calls, window, clock));
                }
                Some(agg)
            }
        };

        Ok(Self::new(aggregator, cfg.account_configs(), cfg.twitter.strategy)
            .with_timeout(cfg.server.request_timeout()))
    }

    pub fn accounts(&self) -> &[AccountConfig] {
        &self.accounts
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// The configured accounts, or the explicit list when one is given.
    ///
    /// Explicit names are trimmed, stripped of a leading `@` and de-duplicated
    /// case-insensitively; names not in the configuration use the username as
    /// display name.
    pub fn select_accounts(&self, usernames: Option<&[String]>) -> Vec<AccountConfig> {
        let requested: Vec<&str> = usernames
            .unwrap_or_default()
            .iter()
            .map(|u| u.trim().trim_start_matches('@'))
            .filter(|u| !u.is_empty())
            .collect();
        if requested.is_empty() {
            return self.accounts.clone();
        }

        let mut seen = HashSet::new();
        requested
            .into_iter()
            .filter(|u| seen.insert(u.to_ascii_lowercase()))
            .map(|u| {
                self.accounts
                    .iter()
                    .find(|a| a.username.eq_ignore_ascii_case(u))
                    .cloned()
                    .unwrap_or_else(|| AccountConfig::bare(u))
            })
            .collect()
    }

    /// Run one aggregation. Never fails; problems are carried in the response.
    pub async fn feed(&self, usernames: Option<&[String]>) -> FeedResponse {
        let Some(aggregator) = &self.aggregator else {
            return FeedResponse::from_error(&FeedError::ConfigurationMissing);
        };

        let accounts = self.select_accounts(usernames);
        if accounts.is_empty() {
            return FeedResponse {
                message: Some(NO_ACCOUNTS.to_string()),
                ..FeedResponse::default()
            };
        }

        match tokio::time::timeout(self.timeout, aggregator.aggregate(&accounts)).await {
            Ok(result) => FeedResponse::from_aggregate(result, self.strategy),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    accounts = accounts.len(),
                    "feed.aggregate.timeout"
                );
                FeedResponse::from_error(&FeedError::Timeout)
            }
        }
    }
}
