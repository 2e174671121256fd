//! Multi-account feed aggregation.
//!
//! - [`rate`]: per-account cooldown and global quota, driven by a [`Clock`].
//! - [`FeedAggregator`]: one pass of resolve, fetch, merge with per-account
//!   failure isolation.
//! - [`FeedService`]: the boundary that turns every outcome, including missing
//!   credentials and timeouts, into a [`FeedResponse`].
pub mod aggregate;
pub mod clock;
pub mod error;
pub mod rate;
pub mod service;

pub use aggregate::{AggregateResult, FeedAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::FeedError;
pub use rate::{CooldownTracker, GlobalQuota, RateKey};
pub use service::{FeedResponse, FeedService, FeedSummary};
