use async_trait::async_trait;
use lookout_common::{PLACEHOLDER_AVATAR_URL, ResolvedUser};
use std::collections::HashMap;

use crate::SocialError;
use crate::traits::UserDirectory;
use crate::twitter::TwitterApi;
use crate::twitter::types::User;

/// Resolves usernames to provider ids with one `2/users/by` call.
#[derive(Clone)]
pub struct UserResolver {
    api: TwitterApi,
}

impl UserResolver {
    pub fn new(api: TwitterApi) -> Self {
        Self { api }
    }

    /// Map each requested username to its provider identity.
    ///
    /// The map is keyed by the username as requested; provider matching is
    /// case-insensitive. Fails with [`SocialError::UsersNotFound`] only when
    /// nothing matched.
    pub async fn resolve(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, ResolvedUser>, SocialError> {
        if usernames.is_empty() {
            return Ok(HashMap::new());
        }

        let resp = self.api.lookup_users(usernames).await?;
        for problem in resp.errors.iter().flatten() {
            tracing::debug!(
                value = ?problem.value,
                detail = ?problem.detail,
                "twitter.users.problem"
            );
        }

        let found = resp.data.unwrap_or_default();
        let resolved: HashMap<String, ResolvedUser> = usernames
            .iter()
            .filter_map(|name| {
                found
                    .iter()
                    .find(|u| u.username.eq_ignore_ascii_case(name))
                    .map(|u| (name.clone(), to_resolved(u)))
            })
            .collect();

        if resolved.is_empty() {
            return Err(SocialError::UsersNotFound(usernames.to_vec()));
        }
        Ok(resolved)
    }
}

fn to_resolved(user: &User) -> ResolvedUser {
    ResolvedUser {
        id: user.id.clone(),
        username: user.username.clone(),
        display_name: user.name.clone().unwrap_or_else(|| user.username.clone()),
        avatar_url: user
            .profile_image_url
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_AVATAR_URL.to_string()),
    }
}

#[async_trait]
impl UserDirectory for UserResolver {
    async fn resolve(
        &self,
        usernames: &[String],
    ) -> Result<HashMap<String, ResolvedUser>, SocialError> {
        UserResolver::resolve(self, usernames).await
    }
}
