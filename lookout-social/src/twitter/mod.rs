//! Twitter/X API integration surface.
//!
//! [`TwitterApi`] shapes requests for the three consumed endpoints (batch user
//! lookup, user timeline, recent search). [`UserResolver`] and [`TweetFetcher`]
//! build on it and hand normalized feed items to the aggregator; `extract`
//! holds the response-to-feed-item mapping and `types` the response models.
pub mod client;
pub mod extract;
pub mod fetcher;
pub mod resolver;
pub mod types;

pub use client::TwitterApi;
pub use fetcher::TweetFetcher;
pub use resolver::UserResolver;
