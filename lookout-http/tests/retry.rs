use async_trait::async_trait;
use lookout_http::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use lookout_http::{
    Auth, HttpClient, HttpError, HttpRequest, HttpResponse, Jitter, RequestOpts, Sleeper,
    StatusCode, Transport, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Scripted = Result<HttpResponse, TransportError>;

/// Replays a fixed script; the last entry repeats once the script runs dry.
struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(req.clone());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().expect("empty script")
        }
    }
}

#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
    fn count(&self) -> usize {
        self.slept.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, dur: Duration) {
        self.slept.lock().unwrap().push(dur);
    }
}

fn too_many() -> Scripted {
    Ok(HttpResponse::with_body(StatusCode::TOO_MANY_REQUESTS, "{}"))
}

fn ok_json(body: &'static str) -> Scripted {
    Ok(HttpResponse::with_body(StatusCode::OK, body))
}

fn client(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> HttpClient {
    HttpClient::with_transport_at("https://api.example.com", transport)
        .unwrap()
        .with_sleeper(sleeper)
}

#[tokio::test]
async fn recovers_after_two_rate_limited_attempts() {
    let transport = ScriptedTransport::new(vec![too_many(), too_many(), ok_json(r#"{"ok":true}"#)]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport.clone(), sleeper.clone()).with_retries(3);

    let resp = http
        .request(lookout_http::Method::GET, "2/users/by", RequestOpts::default())
        .await
        .expect("third attempt succeeds");

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(transport.calls(), 3);
    assert_eq!(sleeper.count(), 2);
    assert!(sleeper.total() >= Duration::from_secs(1));
}

#[tokio::test]
async fn exhausted_rate_limit_fails_after_exactly_three_attempts() {
    let transport = ScriptedTransport::new(vec![too_many()]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport.clone(), sleeper.clone()).with_retries(2);

    let err = http
        .request(lookout_http::Method::GET, "2/users/by", RequestOpts::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::RateLimitExceeded { attempts: 3 }));
    assert!(err.is_rate_limited());
    assert_eq!(transport.calls(), 3);
    assert_eq!(sleeper.count(), 2);
}

#[tokio::test]
async fn backoff_without_retry_after_is_exponential_plus_jitter() {
    let transport = ScriptedTransport::new(vec![too_many(), too_many(), too_many(), ok_json("{}")]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport, sleeper.clone())
        .with_jitter(Jitter::fixed(0.5))
        .with_retries(3);

    http.request(lookout_http::Method::GET, "x", RequestOpts::default())
        .await
        .unwrap();

    let slept = sleeper.slept.lock().unwrap().clone();
    assert_eq!(
        slept,
        vec![
            Duration::from_millis(1500),
            Duration::from_millis(2500),
            Duration::from_millis(4500),
        ]
    );
}

#[tokio::test]
async fn retry_after_header_sets_the_delay() {
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
    let limited = Ok(HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, headers, "{}"));
    let transport = ScriptedTransport::new(vec![limited, ok_json("{}")]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport, sleeper.clone());

    http.request(lookout_http::Method::GET, "x", RequestOpts::default())
        .await
        .unwrap();

    assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn other_http_errors_are_not_retried() {
    let body = r#"{"errors":[{"detail":"Could not find user with username: [ghost]."}]}"#;
    let transport = ScriptedTransport::new(vec![Ok(HttpResponse::with_body(
        StatusCode::NOT_FOUND,
        body,
    ))]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport.clone(), sleeper.clone());

    let err = http
        .request(lookout_http::Method::GET, "x", RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Api {
            status, message, ..
        } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(message.contains("ghost"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls(), 1);
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn plain_network_failures_are_raised_immediately() {
    let transport = ScriptedTransport::new(vec![Err(TransportError(
        "connection reset by peer".into(),
    ))]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport.clone(), sleeper.clone());

    let err = http
        .request(lookout_http::Method::GET, "x", RequestOpts::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Network(_)));
    assert_eq!(transport.calls(), 1);
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn rate_limit_shaped_network_failures_are_retried() {
    let transport = ScriptedTransport::new(vec![
        Err(TransportError("proxy: rate limit reached".into())),
        ok_json("{}"),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let http = client(transport.clone(), sleeper.clone());

    http.request(lookout_http::Method::GET, "x", RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(transport.calls(), 2);
    assert_eq!(sleeper.count(), 1);

    let transport = ScriptedTransport::new(vec![Err(TransportError("HTTP 429".into()))]);
    let http = client(transport.clone(), Arc::new(RecordingSleeper::default())).with_retries(1);
    let err = http
        .request(lookout_http::Method::GET, "x", RequestOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::RateLimitExceeded { attempts: 2 }));
}

#[tokio::test]
async fn bearer_and_query_are_applied_once_per_attempt() {
    let transport = ScriptedTransport::new(vec![too_many(), ok_json(r#"{"n":1}"#)]);
    let http = client(transport.clone(), Arc::new(RecordingSleeper::default()));

    #[derive(serde::Deserialize)]
    struct N {
        n: u32,
    }

    let got: N = http
        .get_json(
            "2/users/by",
            RequestOpts {
                auth: Some(Auth::Bearer(" tok123 ")),
                query: Some(vec![("usernames", "a,b".into())]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(got.n, 1);

    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for req in seen.iter() {
        assert_eq!(req.headers["authorization"], "Bearer tok123");
        assert_eq!(
            req.url.as_str(),
            "https://api.example.com/2/users/by?usernames=a%2Cb"
        );
    }
}

#[tokio::test]
async fn undecodable_success_bodies_surface_as_decode_errors() {
    let transport = ScriptedTransport::new(vec![ok_json("not json")]);
    let http = client(transport, Arc::new(RecordingSleeper::default()));

    let err = http
        .get_json::<serde_json::Value>("x", RequestOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Decode(_, ref snip) if snip == "not json"));
}
