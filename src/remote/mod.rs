//! Cookie-authenticated web APIs
//!
//! Each API module exposes `connect` (credential profile to [`Session`]),
//! `probe` (cheap change fingerprint) and `fetch` (paginated listing plus
//! bounded-concurrency detail fetches). [`ApiKind`] dispatches between them.

pub mod chatgpt;
pub mod claude;
pub mod credentials;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::model::ParseResult;

pub use credentials::{CookieFile, CredentialProvider};

/// Cookie name to value
pub type Cookies = BTreeMap<String, String>;

/// Timeout for single-conversation detail requests
pub const DETAIL_TIMEOUT: Duration = Duration::from_secs(60);

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

/// Authenticated context for one API under one credential profile
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub profile: String,
    pub base: String,
    pub cookies: Cookies,
    pub headers: Vec<(String, String)>,
    /// Organization scope (Claude.ai)
    pub scope: Option<String>,
}

impl Session {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and decode the JSON body. `timeout` overrides the default.
    async fn get_json(&self, url: &str, session: &Session, timeout: Option<Duration>) -> Result<Value>;
}

/// `reqwest` transport with bounded retries and linear backoff
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::fetch("client", e))?;
        Ok(Self {
            client,
            timeout,
            retries,
            backoff: Duration::from_secs(1),
        })
    }

    fn headers(session: &Session) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &session.headers {
            match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
                (Ok(n), Ok(v)) => {
                    map.insert(n, v);
                }
                _ => debug!("dropping unencodable header {}", name),
            }
        }
        if let Ok(v) = HeaderValue::from_str(&cookie_header(&session.cookies)) {
            map.insert(COOKIE, v);
        }
        map
    }

    async fn attempt(&self, url: &str, headers: &HeaderMap, timeout: Duration) -> std::result::Result<Value, (String, bool)> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| (e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err((format!("HTTP {}", status), retryable));
        }
        response.json::<Value>().await.map_err(|e| (format!("invalid JSON: {}", e), false))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get_json(&self, url: &str, session: &Session, timeout: Option<Duration>) -> Result<Value> {
        let headers = Self::headers(session);
        let timeout = timeout.unwrap_or(self.timeout);
        let mut attempt = 0;
        loop {
            match self.attempt(url, &headers, timeout).await {
                Ok(v) => return Ok(v),
                Err((reason, retryable)) if retryable && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff * attempt;
                    warn!("{}: {}; retrying in {:?} ({}/{})", url, reason, delay, attempt, self.retries);
                    tokio::time::sleep(delay).await;
                }
                Err((reason, _)) => return Err(SyncError::fetch(url, reason)),
            }
        }
    }
}

/// `name=value; ...`, skipping pairs a header cannot carry
pub fn cookie_header(cookies: &Cookies) -> String {
    cookies
        .iter()
        .filter(|(k, v)| {
            k.chars().chain(v.chars()).all(|c| c.is_ascii() && !c.is_ascii_control())
        })
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a cheap one-item listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// `mostRecentNativeId:mostRecentUpdateTimestamp`; `None` for an empty account
    pub fingerprint: Option<String>,
    /// Update timestamp of the most recent item
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Stop after this many conversations
    pub limit: Option<usize>,
    pub page_size: usize,
    /// Concurrent detail fetches
    pub workers: usize,
    /// Skip items last updated at or before this instant
    pub since: Option<DateTime<Utc>>,
}

/// Normalized conversations and the number of detail requests that failed
#[derive(Debug, Default)]
pub struct Fetched {
    pub result: ParseResult,
    /// Listed conversations missing from `result`
    pub failed: usize,
}

impl Fetched {
    pub fn complete(result: ParseResult) -> Self {
        Self { result, failed: 0 }
    }

    pub fn extend(&mut self, other: Fetched) {
        self.result.extend(other.result);
        self.failed += other.failed;
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            page_size: 100,
            workers: 4,
            since: None,
        }
    }
}

/// Web API sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    ChatGpt,
    Claude,
}

impl ApiKind {
    pub const ALL: [ApiKind; 2] = [ApiKind::ChatGpt, ApiKind::Claude];

    pub fn name(&self) -> &'static str {
        match self {
            ApiKind::ChatGpt => "chatgpt",
            ApiKind::Claude => "claude",
        }
    }

    /// Cookie domains consulted for this API, in order
    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            ApiKind::ChatGpt => chatgpt::DOMAINS,
            ApiKind::Claude => claude::DOMAINS,
        }
    }

    /// Whether fetches honour a last-updated watermark
    pub fn filters_by_update(&self) -> bool {
        matches!(self, ApiKind::Claude)
    }

    pub async fn connect(&self, transport: &dyn Transport, credentials: &dyn CredentialProvider, profile: &str) -> Result<Session> {
        match self {
            ApiKind::ChatGpt => chatgpt::connect(transport, credentials, profile).await,
            ApiKind::Claude => claude::connect(transport, credentials, profile).await,
        }
    }

    pub async fn probe(&self, transport: &dyn Transport, session: &Session) -> Result<ProbeResult> {
        match self {
            ApiKind::ChatGpt => chatgpt::probe(transport, session).await,
            ApiKind::Claude => claude::probe(transport, session).await,
        }
    }

    pub async fn fetch(&self, transport: &dyn Transport, session: &Session, options: &FetchOptions) -> Result<Fetched> {
        match self {
            ApiKind::ChatGpt => chatgpt::fetch(transport, session, options).await,
            ApiKind::Claude => claude::fetch(transport, session, options).await,
        }
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fetch each `(detail url, listing item)` on a bounded pool and normalize
/// the responses. A failed request does not stop its siblings; it is counted
/// in [`Fetched::failed`].
pub(crate) async fn fetch_details(
    transport: &dyn Transport,
    session: &Session,
    items: Vec<(String, Value)>,
    workers: usize,
    normalize: fn(&Value) -> Option<ParseResult>,
) -> Fetched {
    let parsed: Vec<Result<Option<ParseResult>>> = stream::iter(items)
        .map(move |(url, item)| async move {
            let mut detail = transport.get_json(&url, session, Some(DETAIL_TIMEOUT)).await?;
            fill_from_listing(&mut detail, &item);
            let result = normalize(&detail);
            if result.is_none() {
                debug!("{}: detail carries no conversation id", url);
            }
            Ok(result)
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut fetched = Fetched::default();
    for p in parsed {
        match p {
            Ok(Some(result)) => fetched.result.extend(result),
            Ok(None) => {}
            Err(e) => {
                warn!("skipping conversation: {}", e);
                fetched.failed += 1;
            }
        }
    }
    fetched
}

/// Render a JSON scalar the way it appears in a fingerprint
pub(crate) fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Copy listing fields the detail response lacks
pub(crate) fn fill_from_listing(detail: &mut Value, item: &Value) {
    if let (Some(detail), Some(item)) = (detail.as_object_mut(), item.as_object()) {
        for (key, value) in item {
            if detail.get(key).map(Value::is_null).unwrap_or(true) {
                detail.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport and credentials for API tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeTransport {
        routes: HashMap<String, Value>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub fn route(mut self, url: &str, body: Value) -> Self {
            self.routes.insert(url.to_string(), body);
            self
        }

        pub fn calls_to(&self, prefix: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| u.starts_with(prefix)).count()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get_json(&self, url: &str, _session: &Session, _timeout: Option<Duration>) -> Result<Value> {
            self.calls.lock().unwrap().push(url.to_string());
            self.routes
                .get(url)
                .cloned()
                .ok_or_else(|| SyncError::fetch(url, "HTTP 404 Not Found"))
        }
    }

    /// Profile name to domain to cookies
    #[derive(Default)]
    pub struct FakeCredentials(pub HashMap<String, HashMap<String, Cookies>>);

    impl FakeCredentials {
        pub fn with(mut self, profile: &str, domain: &str) -> Self {
            let cookies: Cookies = [("session".to_string(), "tok".to_string())].into_iter().collect();
            self.0
                .entry(profile.to_string())
                .or_default()
                .insert(domain.to_string(), cookies);
            self
        }
    }

    impl CredentialProvider for FakeCredentials {
        fn cookies_for(&self, domain: &str, profile: &str) -> Result<Cookies> {
            Ok(self
                .0
                .get(profile)
                .and_then(|d| d.get(domain))
                .cloned()
                .unwrap_or_default())
        }

        fn domains(&self, profile: &str) -> Result<Vec<String>> {
            Ok(self
                .0
                .get(profile)
                .map(|d| d.keys().cloned().collect())
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_header_skips_unencodable_pairs() {
        let mut cookies = Cookies::new();
        cookies.insert("a".into(), "1".into());
        cookies.insert("b".into(), "caf\u{e9}".into());
        cookies.insert("c".into(), "x y".into());
        assert_eq!(cookie_header(&cookies), "a=1; c=x y");
    }

    #[test]
    fn test_fill_from_listing_keeps_detail_values() {
        let mut detail = json!({"title": "detail", "gizmo_id": null});
        fill_from_listing(&mut detail, &json!({"id": "x", "title": "listing", "gizmo_id": "g"}));
        assert_eq!(detail, json!({"id": "x", "title": "detail", "gizmo_id": "g"}));
    }

    #[test]
    fn test_session_headers_include_cookie() {
        let mut session = Session::default();
        session.cookies.insert("sid".into(), "v".into());
        session.headers.push(("Authorization".into(), "Bearer t".into()));
        let headers = HttpClient::headers(&session);
        assert_eq!(headers.get(COOKIE).unwrap(), "sid=v");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
    }
}
