//! HTTP surface of the aggregation entry point.
//!
//! Every feed route answers 200 with a [`FeedResponse`]; failures travel in
//! the body so the dashboard can always parse what it gets back.
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use bytes::Bytes;
use lookout_feed::{FeedResponse, FeedService};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    feed: Arc<FeedService>,
}

/// Build the same router the binary serves.
pub fn router(feed: Arc<FeedService>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/feed", get(feed_get).post(feed_post))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { feed })
}

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    /// Comma-separated, e.g. `?usernames=alice,bob`.
    #[serde(default)]
    usernames: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedRequest {
    #[serde(default)]
    usernames: Option<Vec<String>>,
}

async fn feed_get(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Json<FeedResponse> {
    let usernames = query.usernames.as_deref().map(split_usernames);
    Json(state.feed.feed(usernames.as_deref()).await)
}

async fn feed_post(State(state): State<AppState>, body: Bytes) -> Json<FeedResponse> {
    let usernames = parse_feed_request(&body);
    Json(state.feed.feed(usernames.as_deref()).await)
}

fn split_usernames(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// An empty or unparseable body means "use the configured accounts".
fn parse_feed_request(body: &[u8]) -> Option<Vec<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice::<FeedRequest>(body) {
        Ok(req) => req.usernames,
        Err(e) => {
            tracing::warn!(error = %e, "api.feed.bad_body");
            None
        }
    }
}

pub async fn serve(feed: Arc<FeedService>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "api.listening");
    axum::serve(listener, router(feed))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("api.stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "api.signal_handler_failed");
    }
}
