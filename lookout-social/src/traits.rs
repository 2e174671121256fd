//! Seams between the provider wrappers and the aggregator.
use async_trait::async_trait;
use lookout_common::{FeedItem, ResolvedUser};
use std::collections::HashMap;

use crate::SocialError;

/// Maps usernames to provider identities in one batched call.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Usernames the provider does not know are absent from the map.
    async fn resolve(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, ResolvedUser>, SocialError>;
}

/// Fetches one resolved user's recent posts, in provider order.
#[async_trait]
pub trait TimelineSource: Send + Sync {
    async fn fetch_recent(
        &self,
        user: &ResolvedUser,
        max_results: u32,
    ) -> Result<Vec<FeedItem>, SocialError>;
}
