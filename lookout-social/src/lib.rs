//! Social network clients and extractors used by Lookout.
//!
//! Only the Twitter/X pipeline exists today. Provider failures come back as
//! [`SocialError`]; rate-limit exhaustion is detectable through
//! [`SocialError::is_rate_limited`] so callers can report it as data.
pub mod error;
pub mod traits;
pub mod twitter;

pub use error::SocialError;
pub use traits::{TimelineSource, UserDirectory};
