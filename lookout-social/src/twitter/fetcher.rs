use async_trait::async_trait;
use lookout_common::{FeedItem, FetchStrategy, ResolvedUser};

use crate::SocialError;
use crate::traits::TimelineSource;
use crate::twitter::TwitterApi;
use crate::twitter::extract::{AuthorScope, to_feed_items};

/// Fetches a resolved user's recent posts with one provider call.
#[derive(Clone)]
pub struct TweetFetcher {
    api: TwitterApi,
    strategy: FetchStrategy,
}

impl TweetFetcher {
    pub fn new(api: TwitterApi, strategy: FetchStrategy) -> Self {
        Self { api, strategy }
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// An empty provider result is an empty feed, not an error.
    pub async fn fetch_recent(
        &self,
        user: &ResolvedUser,
        max_results: u32,
    ) -> Result<Vec<FeedItem>, SocialError> {
        let resp = match self.strategy.search_query(&user.username) {
            None => self.api.user_tweets(&user.id, max_results).await?,
            Some(query) => self.api.recent_search(&query, max_results).await?,
        };

        let scope = match self.strategy {
            FetchStrategy::Mentions => AuthorScope::Mentions,
            FetchStrategy::Timeline | FetchStrategy::Search => AuthorScope::Owner,
        };
        let items = to_feed_items(resp, user, scope);
        tracing::debug!(
            username = %user.username,
            strategy = ?self.strategy,
            count = items.len(),
            "twitter.fetch_recent"
        );
        Ok(items)
    }
}

#[async_trait]
impl TimelineSource for TweetFetcher {
    async fn fetch_recent(
        &self,
        user: &ResolvedUser,
        max_results: u32,
    ) -> Result<Vec<FeedItem>, SocialError> {
        TweetFetcher::fetch_recent(self, user, max_results).await
    }
}
