//! Claude.ai web API
//!
//! Requests are scoped to an organization resolved from `/api/organizations`.
//! The conversation listing is ordered most recently updated first, which
//! lets an incremental fetch stop at the first page older than its watermark.

use serde_json::Value;
use std::collections::HashSet;
use tracing::info;

use super::{fetch_details, scalar, CredentialProvider, FetchOptions, Fetched, ProbeResult, Session, Transport, USER_AGENT};
use crate::content::str_field;
use crate::error::{Result, SyncError};
use crate::probe::claude::{native_id, normalize_conversation};
use crate::probe::timestamp;

pub const DOMAINS: &[&str] = &["claude.ai"];

const BASE: &str = "https://claude.ai";

fn browser_headers() -> Vec<(String, String)> {
    [
        ("Origin", BASE.to_string()),
        ("Referer", format!("{}/", BASE)),
        ("User-Agent", USER_AGENT.to_string()),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("anthropic-client-sha", "unknown".to_string()),
        ("anthropic-client-version", "unknown".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Resolve the chat organization for the profile's session cookie
pub async fn connect(transport: &dyn Transport, credentials: &dyn CredentialProvider, profile: &str) -> Result<Session> {
    let fail = |reason: String| SyncError::Credential {
        source_name: "claude".to_string(),
        failures: vec![reason],
    };

    let cookies = credentials.cookies_for(DOMAINS[0], profile)?;
    if cookies.is_empty() {
        return Err(fail(format!("{}: no cookies", DOMAINS[0])));
    }

    let mut session = Session {
        profile: profile.to_string(),
        base: BASE.to_string(),
        cookies,
        headers: browser_headers(),
        scope: None,
    };
    let orgs = transport.get_json(&session.url("/api/organizations"), &session, None).await?;
    let orgs = orgs.as_array().map(Vec::as_slice).unwrap_or_default();

    // Prefer an organization with chat enabled over API-only ones
    let has_chat = |o: &&Value| {
        o.get("capabilities")
            .and_then(Value::as_array)
            .map(|caps| caps.iter().any(|c| c.as_str() == Some("chat")))
            .unwrap_or(false)
    };
    let org = orgs.iter().find(has_chat).or_else(|| orgs.first());
    session.scope = org.and_then(|o| str_field(o, &["uuid"]));
    if session.scope.is_none() {
        return Err(fail("could not resolve organization".to_string()));
    }
    Ok(session)
}

fn org(session: &Session) -> &str {
    session.scope.as_deref().unwrap_or_default()
}

fn listing_url(session: &Session, offset: usize, limit: usize) -> String {
    session.url(&format!(
        "/api/organizations/{}/chat_conversations?limit={}&offset={}",
        org(session),
        limit,
        offset
    ))
}

fn listing_items(page: &Value) -> Vec<Value> {
    page.as_array()
        .or_else(|| page.get("data").and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

fn updated_at(item: &Value) -> Option<String> {
    item.get("updated_at")
        .or_else(|| item.get("created_at"))
        .map(scalar)
        .filter(|s| !s.is_empty())
}

pub async fn probe(transport: &dyn Transport, session: &Session) -> Result<ProbeResult> {
    let page = transport.get_json(&listing_url(session, 0, 1), session, None).await?;
    let Some(item) = listing_items(&page).into_iter().next() else {
        return Ok(ProbeResult::default());
    };
    let last_updated = updated_at(&item);
    Ok(ProbeResult {
        fingerprint: native_id(&item).map(|id| format!("{}:{}", id, last_updated.clone().unwrap_or_default())),
        last_updated,
    })
}

/// Page the listing, fetching conversations updated after `options.since`
pub async fn fetch(transport: &dyn Transport, session: &Session, options: &FetchOptions) -> Result<Fetched> {
    let mut result = Fetched::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0;
    let mut fetched = 0;

    loop {
        let page = transport
            .get_json(&listing_url(session, offset, options.page_size), session, None)
            .await?;
        let items = listing_items(&page);
        if items.is_empty() {
            break;
        }
        let page_len = items.len();
        offset += page_len;

        let mut unseen = 0;
        let mut stale = 0;
        let remaining = options.limit.map(|l| l.saturating_sub(fetched)).unwrap_or(usize::MAX);
        let mut batch = vec![];
        for item in items {
            let Some(id) = native_id(&item).map(String::from) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            unseen += 1;
            let updated = updated_at(&item).and_then(|u| timestamp(Some(&Value::String(u))));
            if let (Some(since), Some(updated)) = (options.since, updated) {
                if updated <= since {
                    stale += 1;
                    continue;
                }
            }
            if batch.len() < remaining {
                let url = session.url(&format!("/api/organizations/{}/chat_conversations/{}", org(session), id));
                batch.push((url, item));
            }
        }

        fetched += batch.len();
        if !batch.is_empty() {
            result.extend(fetch_details(transport, session, batch, options.workers, normalize_conversation).await);
            info!("claude: fetched {}", fetched);
        }

        // A server that ignores paging repeats itself; a page of only
        // stale items means everything further down is older still
        if unseen == 0 || (unseen > 0 && stale == unseen) || page_len < options.page_size {
            break;
        }
        if options.limit.map(|l| fetched >= l).unwrap_or(false) {
            break;
        }
    }

    Ok(result)
}
