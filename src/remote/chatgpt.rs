//! ChatGPT `backend-api`
//!
//! Authentication: browser session cookies exchanged for a bearer token at
//! `/api/auth/session`. The listing pages with `offset`/`limit` and reports a
//! `total`; the detail is the same mapping-of-nodes shape as the export.

use serde_json::Value;
use std::collections::HashSet;
use tracing::info;

use super::{
    fetch_details, scalar, Cookies, CredentialProvider, FetchOptions, Fetched, ProbeResult, Session, Transport, USER_AGENT,
};
use crate::error::{Result, SyncError};
use crate::probe::chatgpt::{native_id, normalize_conversation};

pub const DOMAINS: &[&str] = &["chatgpt.com", "chat.openai.com", "openai.com"];

/// Base URL and the cookie domains that authenticate against it
const HOSTS: &[(&str, &[&str])] = &[
    ("https://chatgpt.com", &["chatgpt.com"]),
    ("https://chat.openai.com", &["chat.openai.com", "openai.com"]),
];

fn browser_headers(base: &str) -> Vec<(String, String)> {
    [
        ("Origin", base.to_string()),
        ("Referer", format!("{}/", base)),
        ("User-Agent", USER_AGENT.to_string()),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("Sec-Fetch-Site", "same-origin".to_string()),
        ("Sec-Fetch-Mode", "cors".to_string()),
        ("Sec-Fetch-Dest", "empty".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Try each host in turn until one accepts the profile's cookies
pub async fn connect(transport: &dyn Transport, credentials: &dyn CredentialProvider, profile: &str) -> Result<Session> {
    let mut failures = vec![];

    for (base, domains) in HOSTS {
        let mut cookies = Cookies::new();
        for domain in domains.iter() {
            cookies.extend(credentials.cookies_for(domain, profile)?);
        }
        if cookies.is_empty() {
            failures.push(format!("{}: no cookies", domains.join("/")));
            continue;
        }

        let mut session = Session {
            profile: profile.to_string(),
            base: base.to_string(),
            cookies,
            headers: browser_headers(base),
            scope: None,
        };
        match transport.get_json(&session.url("/api/auth/session"), &session, None).await {
            Ok(auth) if auth.get("user").is_some() => {
                if let Some(token) = auth.get("accessToken").and_then(Value::as_str) {
                    session.headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
                }
                return Ok(session);
            }
            Ok(_) => failures.push(format!("{}: not authenticated", base)),
            Err(e) => failures.push(format!("{}: {}", base, e)),
        }
    }

    Err(SyncError::Credential {
        source_name: "chatgpt".to_string(),
        failures,
    })
}

fn listing_url(session: &Session, offset: usize, limit: usize) -> String {
    session.url(&format!("/backend-api/conversations?offset={}&limit={}", offset, limit))
}

fn listing_items(page: &Value) -> Vec<Value> {
    page.get("items").and_then(Value::as_array).cloned().unwrap_or_default()
}

/// Fingerprint of the most recent conversation
pub async fn probe(transport: &dyn Transport, session: &Session) -> Result<ProbeResult> {
    let page = transport.get_json(&listing_url(session, 0, 1), session, None).await?;
    let Some(item) = listing_items(&page).into_iter().next() else {
        return Ok(ProbeResult::default());
    };
    let updated = item.get("update_time").map(scalar).unwrap_or_default();
    Ok(ProbeResult {
        fingerprint: native_id(&item).map(|id| format!("{}:{}", id, updated)),
        last_updated: Some(updated).filter(|u| !u.is_empty()),
    })
}

/// Walk the whole listing and fetch every conversation's detail
pub async fn fetch(transport: &dyn Transport, session: &Session, options: &FetchOptions) -> Result<Fetched> {
    let mut result = Fetched::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0;
    let mut fetched = 0;
    let mut total: Option<usize> = None;

    loop {
        let page = transport
            .get_json(&listing_url(session, offset, options.page_size), session, Some(super::DETAIL_TIMEOUT))
            .await?;
        if total.is_none() {
            total = page.get("total").and_then(Value::as_u64).map(|t| t as usize);
        }
        let items = listing_items(&page);
        if items.is_empty() {
            break;
        }
        offset += items.len();

        let remaining = options.limit.map(|l| l.saturating_sub(fetched)).unwrap_or(usize::MAX);
        let batch: Vec<(String, Value)> = items
            .into_iter()
            .filter_map(|item| {
                let id = native_id(&item)?.to_string();
                seen.insert(id.clone()).then_some((id, item))
            })
            .take(remaining)
            .map(|(id, item)| (session.url(&format!("/backend-api/conversation/{}", id)), item))
            .collect();
        if batch.is_empty() {
            break;
        }

        fetched += batch.len();
        result.extend(fetch_details(transport, session, batch, options.workers, normalize_conversation).await);
        match total {
            Some(t) => info!("chatgpt: fetched {}/{}", fetched, t),
            None => info!("chatgpt: fetched {}", fetched),
        }

        if options.limit.map(|l| fetched >= l).unwrap_or(false) {
            break;
        }
        if total.map(|t| offset >= t).unwrap_or(false) {
            break;
        }
    }

    Ok(result)
}
