//! HTTP client with safe logging, rate-limit aware retries, and flexible auth.
//!
//! - Request options: headers, `Auth`, query params, timeout, retry ceiling
//! - HTTP 429 is retried: `Retry-After` seconds when present, otherwise
//!   `2^attempt` seconds plus up to one second of jitter
//! - Other non-2xx responses fail immediately with [`HttpError::Api`]
//! - Network failures are retried only when they report rate-limit exhaustion
//! - Redacts sensitive query params and never logs secret values
//! - Optional *raw* request/response logging via `LOOKOUT_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), lookout_http::HttpError> {
//! let client = lookout_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", lookout_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! The transport, the sleep between attempts, and the jitter source are all
//! injectable (see [`HttpClient::with_transport`], [`HttpClient::with_sleeper`],
//! [`HttpClient::with_jitter`]), so retry behavior can be exercised without a
//! network or real waiting.

pub mod backoff;
pub mod transport;

pub use backoff::{Jitter, Sleeper, TokioSleeper, backoff_delay};
pub use reqwest::header;
pub use reqwest::{Method, StatusCode, Url};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "LOOKOUT_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;

const SECRET_QUERY_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_key(k: &str) -> bool {
    SECRET_QUERY_KEYS.contains(&k.to_ascii_lowercase().as_str())
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(req: &HttpRequest) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", req.method)];
    for (name, val) in redact_headers(&req.headers) {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    let (host_path, query) = redact_query(&req.url);
    let mut url = format!("{}://{}", req.url.scheme(), host_path);
    if !query.is_empty() {
        let q: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        url.push('?');
        url.push_str(&q.join("&"));
    }
    parts.push(format!("'{url}'"));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if key.eq_ignore_ascii_case("authorization") {
                "Bearer <redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: usize },
    #[error("HTTP {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    pub fn is_rate_limited(&self) -> bool {
        match self {
            HttpError::RateLimitExceeded { .. } => true,
            HttpError::Api { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            HttpError::RateLimitExceeded { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            _ => None,
        }
    }
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use lookout_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// match bearer {
///     Auth::Bearer(value) => assert_eq!(value, "token"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Custom header
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    /// Auth via query param
    Query {
        name: &'a str,
        value: Cow<'a, str>,
    },
    None,
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Header { .. } => "header",
            Auth::Query { .. } => "query",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use lookout_http::{Auth, RequestOpts};
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(1),
///     auth: Some(Auth::Bearer("demo")),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    /// Additional attempts after the first; falls back to [`HttpClient::max_retries`].
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Jitter,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use lookout_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 3);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = parse_base(base)?;
        let transport = ReqwestTransport::new().map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            transport: Arc::new(transport),
            sleeper: Arc::new(TokioSleeper),
            jitter: Jitter::random(),
            default_timeout: Duration::from_secs(15),
            max_retries: 3,
        })
    }

    /// Construct a client over an arbitrary transport.
    pub fn with_transport_at(base: &str, transport: Arc<dyn Transport>) -> Result<Self, HttpError> {
        Ok(Self {
            base: parse_base(base)?,
            transport,
            sleeper: Arc::new(TokioSleeper),
            jitter: Jitter::random(),
            default_timeout: Duration::from_secs(15),
            max_retries: 3,
        })
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// Override the retry ceiling (additional attempts after the first).
    ///
    /// ```no_run
    /// use lookout_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new("https://api.example.com")?.with_retries(5);
    /// assert_eq!(client.max_retries, 5);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// GET JSON with per-request options (headers/query/auth/timeout/retries).
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let resp = self.request(Method::GET, path, opts).await?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            log_response_meta(&resp.body);
        }

        serde_json::from_slice::<T>(&resp.body).map_err(|e| {
            let snippet = snip_body(&resp.body);
            tracing::warn!(
                serde_line=%e.line(),
                serde_col=%e.column(),
                serde_err=%e,
                body_snippet=%snippet,
                "http.response.decode_error"
            );
            HttpError::Decode(e.to_string(), snippet)
        })
    }

    /// Perform one logical call with bounded retries.
    ///
    /// Attempts are counted from zero. A 429 is retried up to the retry
    /// ceiling; once exhausted the call fails with
    /// [`HttpError::RateLimitExceeded`]. Any other non-2xx fails at once.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<HttpResponse, HttpError> {
        let req = self.build_request(method, path, &opts)?;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");
        let (host_path, redacted_q) = redact_query(&req.url);

        let mut attempt = 0usize;
        loop {
            let req_id = format!("r{}", uuid::Uuid::new_v4().simple());

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                method=%req.method,
                host_path=%host_path,
                query=?redacted_q,
                timeout_ms=req.timeout.as_millis() as u64,
                auth_kind,
                "http.request.start"
            );
            if raw_enabled() {
                let curl = make_curl(&req);
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            let t0 = Instant::now();
            let resp = match self.transport.send(&req).await {
                Ok(resp) => resp,
                Err(err) => {
                    let rate_signal = err.is_rate_limit_signal();
                    if rate_signal && attempt < max_retries {
                        let delay = backoff_delay(attempt, self.jitter.sample());
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%err,
                            "http.retrying.network"
                        );
                        self.sleeper.sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        max_retries,
                        message=%err,
                        "http.network_error"
                    );
                    return Err(if rate_signal {
                        HttpError::RateLimitExceeded {
                            attempts: attempt + 1,
                        }
                    } else {
                        HttpError::Network(err.0)
                    });
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;
            let status = resp.status;

            let req_hdr_id = resp
                .header_str("x-request-id")
                .or_else(|| resp.header_str("x-correlation-id"))
                .unwrap_or("-")
                .to_string();

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=resp.body.len(),
                x_request_id=%req_hdr_id,
                rate_limit.limit=?resp.header_str("x-rate-limit-limit"),
                rate_limit.remaining=?resp.header_str("x-rate-limit-remaining"),
                rate_limit.reset=?resp.header_str("x-rate-limit-reset"),
                "http.response.headers"
            );

            if raw_enabled() {
                let hdrs = redact_headers(&resp.headers);
                let truncated = resp.body.len() > RAW_MAX_BODY;
                let shown = &resp.body[..resp.body.len().min(RAW_MAX_BODY)];
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    %status,
                    duration_ms=dur_ms,
                    headers=?hdrs,
                    body=%String::from_utf8_lossy(shown),
                    truncated
                );
            }

            if status.is_success() {
                return Ok(resp);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_delay_secs(&resp.headers);
                if attempt < max_retries {
                    let delay = match retry_after {
                        Some(secs) => Duration::from_secs(secs),
                        None => backoff_delay(attempt, self.jitter.sample()),
                    };
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        max_retries,
                        backoff_ms=delay.as_millis() as u64,
                        retry_after_secs=?retry_after,
                        rate_limit.reset=?resp.header_str("x-rate-limit-reset"),
                        "http.retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                tracing::warn!(
                    req_id=%req_id,
                    attempts=attempt + 1,
                    rate_limit.reset=?resp.header_str("x-rate-limit-reset"),
                    "http.rate_limited"
                );
                return Err(HttpError::RateLimitExceeded {
                    attempts: attempt + 1,
                });
            }

            let message = extract_error_message_multi(&resp.body);
            tracing::warn!(
                req_id=%req_id,
                %status,
                message=%message,
                x_request_id=%req_hdr_id,
                body_snippet=%snip_body(&resp.body),
                "http.error"
            );
            return Err(HttpError::Api {
                status,
                message,
                request_id: req_hdr_id,
            });
        }
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        opts: &RequestOpts<'_>,
    ) -> Result<HttpRequest, HttpError> {
        let mut url = match Url::parse(path) {
            Ok(abs) if opts.allow_absolute => abs,
            _ => self
                .base
                .join(path)
                .map_err(|e| HttpError::Url(e.to_string()))?,
        };

        let mut pairs: Vec<(&str, &str)> = opts
            .query
            .as_ref()
            .map(|q| q.iter().map(|(k, v)| (*k, v.as_ref())).collect())
            .unwrap_or_default();

        let mut headers = opts.headers.clone().unwrap_or_default();
        match &opts.auth {
            Some(Auth::Bearer(tok)) => {
                let tok = sanitize_api_key(tok)?;
                let value = HeaderValue::from_str(&format!("Bearer {tok}"))
                    .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
                headers.insert(AUTHORIZATION, value);
            }
            Some(Auth::Header { name, value }) => {
                headers.insert(name.clone(), value.clone());
            }
            Some(Auth::Query { name, value }) => pairs.push((*name, value.as_ref())),
            Some(Auth::None) | None => {}
        }

        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            timeout: opts.timeout.unwrap_or(self.default_timeout),
        })
    }
}

// ==============================
// Helpers
// ==============================

fn parse_base(base: &str) -> Result<Url, HttpError> {
    // A base without a trailing slash would drop its last segment on join.
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&normalized).map_err(|e| HttpError::Url(e.to_string()))
}

fn extract_error_message_multi(body: &[u8]) -> String {
    // Twitter: {"errors":[{"message":"...", "detail":"...", "title":"..."}]}
    #[derive(Deserialize)]
    struct TwErrors {
        errors: Vec<TwErr>,
    }
    #[derive(Deserialize)]
    struct TwErr {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        title: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(tw) = serde_json::from_slice::<TwErrors>(body) {
        if let Some(first) = tw.errors.into_iter().next() {
            for s in [first.message, first.detail, first.title] {
                if !s.is_empty() {
                    return s;
                }
            }
        }
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for s in [m.message, m.detail, m.error] {
            if !s.is_empty() {
                return s;
            }
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

/// Pagination hints from a Twitter `meta` block, if the body has one.
fn response_meta(body: &[u8]) -> Option<(serde_json::Value, serde_json::Value)> {
    let val = serde_json::from_slice::<serde_json::Value>(body).ok()?;
    let meta = val.get("meta")?;
    Some((
        meta.get("result_count").cloned().unwrap_or_default(),
        meta.get("next_token").cloned().unwrap_or_default(),
    ))
}

fn log_response_meta(body: &[u8]) {
    if let Some((result_count, next_token)) = response_meta(body) {
        tracing::debug!(%result_count, %next_token, "http.response.meta");
    }
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    s.retain(|ch| !ch.is_ascii_whitespace());

    if s.is_empty() {
        return Err(HttpError::Build("API key is empty".into()));
    }
    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }
    Ok(s)
}

/// "host + path" and the query list with secret values redacted.
fn redact_query(url: &Url) -> (String, Vec<(String, String)>) {
    let host_path = format!("{}{}", url.host_str().unwrap_or("-"), url.path());
    let redacted = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if is_secret_key(&k) {
                "<redacted>".to_string()
            } else {
                v.to_string()
            };
            (k.to_string(), v)
        })
        .collect::<Vec<_>>();
    (host_path, redacted)
}
