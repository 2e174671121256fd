use lookout_http::HttpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocialError {
    /// The batch lookup matched none of the requested usernames.
    #[error("Users not found: {}", .0.join(", "))]
    UsersNotFound(Vec<String>),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl SocialError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SocialError::Http(e) if e.is_rate_limited())
    }
}
