use chrono::{DateTime, Utc};
use lookout_common::{
    Author, Engagement, FeedItem, MediaItem, MediaKind, PostKind, ResolvedUser,
};

use crate::twitter::types::{Includes, Media, Tweet, TweetsResponse, User};

/// Whose posts a response holds, which decides how authors are attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorScope {
    /// The tracked user's own posts (timeline, `from:` search).
    Owner,
    /// Posts by anyone mentioning the tracked user.
    Mentions,
}

/// Convert a tweets payload into normalized feed items, preserving provider order.
///
/// Media keys without a matching `includes.media` entry are dropped, and
/// authors missing from `includes.users` get a placeholder. Tweets without a
/// parseable `created_at` are skipped.
pub fn to_feed_items(
    resp: TweetsResponse,
    owner: &ResolvedUser,
    scope: AuthorScope,
) -> Vec<FeedItem> {
    let TweetsResponse { data, includes, .. } = resp;
    let Some(tweets) = data else {
        return Vec::new();
    };
    let includes = includes.unwrap_or_default();

    let mut items = Vec::with_capacity(tweets.len());
    for tweet in tweets {
        let Some(created_at) = parse_created_at(tweet.created_at.as_deref()) else {
            tracing::warn!(
                tweet_id = %tweet.id,
                created_at = ?tweet.created_at,
                "twitter.extract.bad_timestamp"
            );
            continue;
        };

        let author = resolve_author(&tweet, &includes, owner, scope);
        let url = match scope {
            AuthorScope::Owner => make_status_url(Some(&owner.username), &tweet.id),
            AuthorScope::Mentions => {
                let handle = (author.username != UNKNOWN_AUTHOR).then_some(author.username.as_str());
                make_status_url(handle, &tweet.id)
            }
        };

        items.push(FeedItem {
            media: resolve_media(&tweet, &includes),
            kind: post_kind(&tweet),
            engagement: tweet.public_metrics.as_ref().map(|m| Engagement {
                likes: m.like_count.unwrap_or(0),
                retweets: m.retweet_count.unwrap_or(0),
                replies: m.reply_count.unwrap_or(0),
                quotes: m.quote_count.unwrap_or(0),
            }),
            id: tweet.id,
            text: tweet.text,
            created_at,
            url,
            author,
            source_label: owner.display_name.clone(),
            source_username: owner.username.clone(),
        });
    }
    items
}

const UNKNOWN_AUTHOR: &str = "unknown";

fn parse_created_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn resolve_author(
    tweet: &Tweet,
    includes: &Includes,
    owner: &ResolvedUser,
    scope: AuthorScope,
) -> Author {
    let users = includes.users.as_deref().unwrap_or(&[]);
    let author_id = match scope {
        AuthorScope::Owner => tweet.author_id.as_deref().or(Some(owner.id.as_str())),
        AuthorScope::Mentions => tweet.author_id.as_deref(),
    };
    let found = author_id.and_then(|aid| users.iter().find(|u| u.id == aid));

    match (found, scope) {
        (Some(user), _) => author_from_user(user),
        (None, AuthorScope::Owner) => Author::placeholder(&owner.username),
        (None, AuthorScope::Mentions) => Author::placeholder(UNKNOWN_AUTHOR),
    }
}

fn author_from_user(user: &User) -> Author {
    Author {
        username: user.username.clone(),
        display_name: user.name.clone().unwrap_or_else(|| user.username.clone()),
        avatar_url: user
            .profile_image_url
            .clone()
            .unwrap_or_else(|| lookout_common::PLACEHOLDER_AVATAR_URL.to_string()),
    }
}

fn resolve_media(tweet: &Tweet, includes: &Includes) -> Vec<MediaItem> {
    let keys = tweet
        .attachments
        .as_ref()
        .and_then(|a| a.media_keys.as_deref())
        .unwrap_or(&[]);
    let all = includes.media.as_deref().unwrap_or(&[]);

    keys.iter()
        .filter_map(|k| all.iter().find(|m| m.media_key.as_deref() == Some(k.as_str())))
        .filter_map(to_media_item)
        .collect()
}

fn to_media_item(m: &Media) -> Option<MediaItem> {
    let url = m.url.as_ref().or(m.preview_image_url.as_ref())?;
    Some(MediaItem {
        kind: MediaKind::from_provider(m.kind.as_deref()),
        url: url.clone(),
    })
}

fn post_kind(tweet: &Tweet) -> PostKind {
    let refs = tweet.referenced_tweets.as_deref().unwrap_or(&[]);
    let has = |kind: &str| refs.iter().any(|r| r.kind == kind);
    if has("retweeted") {
        PostKind::Retweet
    } else if has("replied_to") {
        PostKind::Reply
    } else if has("quoted") {
        PostKind::Quote
    } else {
        PostKind::Tweet
    }
}

/// Canonical status URL if the handle is known; otherwise `/i/web/status/{id}`.
pub fn make_status_url(handle: Option<&str>, id: &str) -> String {
    match handle {
        Some(h) => format!("https://twitter.com/{h}/status/{id}"),
        None => format!("https://twitter.com/i/web/status/{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_common::PLACEHOLDER_AVATAR_URL;
    use serde_json::json;

    fn owner() -> ResolvedUser {
        ResolvedUser {
            id: "42".into(),
            username: "alice".into(),
            display_name: "Alice".into(),
            avatar_url: "https://img.example.com/alice.jpg".into(),
        }
    }

    fn parse(v: serde_json::Value) -> TweetsResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn bare_tweet_gets_placeholder_author_and_no_media() {
        let resp = parse(json!({
            "data": [{ "id": "1", "text": "hi", "created_at": "2024-01-01T00:00:00Z" }]
        }));
        let items = to_feed_items(resp, &owner(), AuthorScope::Owner);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.author.username, "alice");
        assert_eq!(item.author.avatar_url, PLACEHOLDER_AVATAR_URL);
        assert!(item.media.is_empty());
        assert_eq!(item.url, "https://twitter.com/alice/status/1");
        assert_eq!(item.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(item.engagement, None);
    }

    #[test]
    fn media_keys_join_against_includes_and_drop_dangling() {
        let resp = parse(json!({
            "data": [{
                "id": "7",
                "text": "chart",
                "author_id": "42",
                "created_at": "2024-03-05T10:00:00.000Z",
                "attachments": { "media_keys": ["3_a", "3_missing", "7_v"] },
                "public_metrics": { "like_count": 5, "retweet_count": 2, "reply_count": 1, "quote_count": 0 }
            }],
            "includes": {
                "users": [{ "id": "42", "username": "alice", "name": "Alice A." }],
                "media": [
                    { "media_key": "3_a", "type": "photo", "url": "https://img.example.com/a.jpg" },
                    { "media_key": "7_v", "type": "video", "preview_image_url": "https://img.example.com/v.jpg" }
                ]
            }
        }));
        let items = to_feed_items(resp, &owner(), AuthorScope::Owner);
        let item = &items[0];
        assert_eq!(
            item.media,
            vec![
                MediaItem { kind: MediaKind::Photo, url: "https://img.example.com/a.jpg".into() },
                MediaItem { kind: MediaKind::Video, url: "https://img.example.com/v.jpg".into() },
            ]
        );
        assert_eq!(item.author.display_name, "Alice A.");
        assert_eq!(item.author.avatar_url, PLACEHOLDER_AVATAR_URL);
        assert_eq!(item.engagement.as_ref().unwrap().likes, 5);
        assert_eq!(item.engagement.as_ref().unwrap().retweets, 2);
    }

    #[test]
    fn mentions_attribute_each_author_and_fall_back_to_unknown() {
        let resp = parse(json!({
            "data": [
                { "id": "10", "text": "@alice hey", "author_id": "9", "created_at": "2024-01-02T00:00:00Z" },
                { "id": "11", "text": "@alice yo", "author_id": "8", "created_at": "2024-01-01T00:00:00Z",
                  "referenced_tweets": [{ "type": "replied_to", "id": "3" }] }
            ],
            "includes": { "users": [{ "id": "9", "username": "bob", "profile_image_url": "https://img.example.com/bob.jpg" }] }
        }));
        let items = to_feed_items(resp, &owner(), AuthorScope::Mentions);
        assert_eq!(items[0].author.username, "bob");
        assert_eq!(items[0].url, "https://twitter.com/bob/status/10");
        assert_eq!(items[1].author.username, "unknown");
        assert_eq!(items[1].url, "https://twitter.com/i/web/status/11");
        assert_eq!(items[1].kind, PostKind::Reply);
        assert_eq!(items[1].source_username, "alice");
    }

    #[test]
    fn tweets_without_timestamps_are_skipped_in_order() {
        let resp = parse(json!({
            "data": [
                { "id": "1", "text": "a", "created_at": "2024-01-03T00:00:00Z" },
                { "id": "2", "text": "b" },
                { "id": "3", "text": "c", "created_at": "yesterday" },
                { "id": "4", "text": "d", "created_at": "2024-01-01T00:00:00Z",
                  "referenced_tweets": [{ "type": "retweeted", "id": "99" }] }
            ]
        }));
        let items = to_feed_items(resp, &owner(), AuthorScope::Owner);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["1", "4"]);
        assert_eq!(items[1].kind, PostKind::Retweet);
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let items = to_feed_items(parse(json!({ "meta": { "result_count": 0 } })), &owner(), AuthorScope::Owner);
        assert!(items.is_empty());
    }
}
