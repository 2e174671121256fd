mod common;

use common::init_test_tracing;
use lookout_config::LookoutConfigLoader;
use lookout_feed::FeedService;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_for(server: &MockServer, overlay: &str) -> FeedService {
    let yaml = format!(
        r#"
twitter:
  bearer_token: test-token
  base_url: "{uri}"
  max_retries: 0
accounts:
  - username: alice
    display_name: Alice Example
  - username: bob
    display_name: Bob Example
limits:
  global_max_calls: 0
dispatch:
  delay_ms: 0
"#,
        uri = server.uri()
    );
    let mut loader = LookoutConfigLoader::new().with_yaml_str(&yaml);
    if !overlay.is_empty() {
        loader = loader.with_yaml_str(overlay);
    }
    let cfg = loader.load().expect("config");
    FeedService::from_config(&cfg).expect("service")
}

fn user(id: &str, username: &str, name: &str) -> serde_json::Value {
    json!({ "id": id, "username": username, "name": name })
}

fn tweet(id: &str, author_id: &str, created_at: &str) -> serde_json::Value {
    json!({ "id": id, "text": format!("tweet {id}"), "author_id": author_id, "created_at": created_at })
}

async fn mount_users(server: &MockServer, usernames: &str, users: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .and(query_param("usernames", usernames))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": users })))
        .mount(server)
        .await;
}

async fn mount_timeline(server: &MockServer, user_id: &str, tweets: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/2/users/{user_id}/tweets")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": tweets })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn merges_two_accounts_newest_first() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_users(
        &server,
        "alice,bob",
        json!([user("1", "alice", "Alice"), user("2", "bob", "Bob")]),
    )
    .await;
    mount_timeline(
        &server,
        "1",
        json!([
            tweet("12", "1", "2024-05-02T00:00:00Z"),
            tweet("11", "1", "2024-05-01T00:00:00Z")
        ]),
    )
    .await;
    mount_timeline(&server, "2", json!([tweet("21", "2", "2024-05-03T00:00:00Z")])).await;

    let resp = service_for(&server, "").feed(None).await;

    let ids: Vec<_> = resp.tweets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["21", "12", "11"]);
    assert_eq!(resp.tweets[0].source_label, "Bob Example");
    assert_eq!(resp.tweets[1].source_label, "Alice Example");
    assert_eq!(resp.error, None);
    assert_eq!(resp.rate_limited, None);

    let summary = resp.summary.expect("summary");
    assert_eq!(summary.total_tweets, 3);
    assert!(summary.accounts.iter().all(|o| o.success));
}

#[tokio::test]
async fn partial_failure_keeps_sibling_results() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_users(
        &server,
        "alice,bob",
        json!([user("1", "alice", "Alice"), user("2", "bob", "Bob")]),
    )
    .await;
    mount_timeline(&server, "1", json!([tweet("11", "1", "2024-05-01T00:00:00Z")])).await;
    Mock::given(method("GET"))
        .and(path("/2/users/2/tweets"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "detail": "Service Unavailable" })))
        .mount(&server)
        .await;

    let resp = service_for(&server, "dispatch:\n  mode: concurrent")
        .feed(None)
        .await;

    assert_eq!(resp.tweets.len(), 1);
    assert_eq!(resp.error, None);
    let accounts = resp.summary.expect("summary").accounts;
    assert!(accounts[0].success);
    assert!(!accounts[1].success);
    assert!(
        accounts[1]
            .error_message
            .as_deref()
            .unwrap()
            .contains("Service Unavailable")
    );
}

#[tokio::test]
async fn second_pass_inside_cooldown_is_rate_limited_without_calls() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [user("1", "alice", "Alice"), user("2", "bob", "Bob")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_timeline(&server, "1", json!([])).await;
    mount_timeline(&server, "2", json!([])).await;

    let svc = service_for(&server, "");
    let first = svc.feed(None).await;
    assert_eq!(first.message.as_deref(), Some("No recent tweets found"));

    let second = svc.feed(None).await;
    assert!(second.tweets.is_empty());
    assert_eq!(second.rate_limited, Some(true));
    assert_eq!(
        second.error.as_deref(),
        Some("Twitter API rate limit reached. Please try again in a few minutes.")
    );
    let accounts = second.summary.expect("summary").accounts;
    assert!(
        accounts
            .iter()
            .all(|o| o.error_message.as_deref() == Some("Rate limited"))
    );
}

#[tokio::test]
async fn provider_429_marks_every_account_rate_limited() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let resp = service_for(&server, "").feed(None).await;

    assert!(resp.tweets.is_empty());
    assert_eq!(resp.rate_limited, Some(true));
    let accounts = resp.summary.expect("summary").accounts;
    assert_eq!(accounts.len(), 2);
    assert!(accounts.iter().all(|o| o.rate_limited && !o.success));
}

#[tokio::test]
async fn explicit_unknown_username_uses_handle_as_label() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_users(&server, "carol", json!([user("3", "carol", "Carol C")])).await;
    mount_timeline(&server, "3", json!([tweet("31", "3", "2024-05-01T00:00:00Z")])).await;

    let resp = service_for(&server, "")
        .feed(Some(&["carol".to_string()]))
        .await;

    assert_eq!(resp.tweets.len(), 1);
    assert_eq!(resp.tweets[0].source_label, "carol");
    assert_eq!(resp.tweets[0].author.display_name, "Carol C");
}

#[tokio::test]
async fn slow_provider_hits_caller_timeout() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let resp = service_for(&server, "server:\n  request_timeout_secs: 1")
        .feed(None)
        .await;

    assert!(resp.tweets.is_empty());
    assert_eq!(resp.error.as_deref(), Some("Aggregation timed out"));
}

#[tokio::test]
async fn missing_bearer_never_calls_provider() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = LookoutConfigLoader::new()
        .with_yaml_str(&format!(
            "twitter:\n  bearer_token: \"${{LOOKOUT_E2E_UNSET_TOKEN}}\"\n  base_url: \"{}\"\naccounts:\n  - username: alice\n",
            server.uri()
        ))
        .load()
        .unwrap();
    let resp = FeedService::from_config(&cfg).unwrap().feed(None).await;

    assert_eq!(
        resp.error.as_deref(),
        Some("Twitter API credentials not configured")
    );
}
