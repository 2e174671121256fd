use lookout_social::SocialError;
use thiserror::Error;

/// Failures surfaced at the feed boundary. None of these escape as an HTTP
/// error status; [`crate::FeedResponse`] carries them as data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Twitter API credentials not configured")]
    ConfigurationMissing,

    #[error("Twitter API rate limit reached. Please try again in a few minutes.")]
    RateLimitExceeded,

    #[error(transparent)]
    Social(#[from] SocialError),

    #[error("Aggregation timed out")]
    Timeout,
}

impl FeedError {
    pub fn is_rate_limited(&self) -> bool {
        match self {
            FeedError::RateLimitExceeded => true,
            FeedError::Social(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}
