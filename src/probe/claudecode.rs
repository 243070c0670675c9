//! Claude Code session logs
//!
//! Data format: JSONL files in ~/.claude/projects/<project_hash>/<session_id>.jsonl.
//! Each line is one event; `user` and `assistant` events carry a `message`
//! whose `content` is a string or a list of typed blocks.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{file_stem, most_common, read_jsonl, timestamp, truncate_title, ThreadBuilder};
use crate::content::extract;
use crate::error::Result;
use crate::ident::gen_id;
use crate::model::{Conversation, ParseResult};

pub const SOURCE: &str = "claude-code";

/// Event types that carry a conversational message
const MESSAGE_TYPES: &[&str] = &["user", "assistant"];

pub fn normalize_sessions(files: &[PathBuf]) -> ParseResult {
    let mut result = ParseResult::new();
    for file in files {
        match normalize_session(file) {
            Ok(Some(session)) => result.extend(session),
            Ok(None) => debug!("{}: no readable messages, skipped", file.display()),
            Err(e) => warn!("{}: {}", file.display(), e),
        }
    }
    result
}

/// Normalize one session file. `None` when the session has no message text.
pub fn normalize_session(path: &Path) -> Result<Option<ParseResult>> {
    let records = read_jsonl(path)?;

    let mut session_id: Option<String> = None;
    let mut sidechain = false;
    let mut cwd: Option<String> = None;
    let mut git_branch: Option<String> = None;
    let mut version: Option<String> = None;

    for (_, record) in &records {
        if session_id.is_none() {
            session_id = record.get("sessionId").and_then(Value::as_str).map(String::from);
        }
        if cwd.is_none() {
            cwd = record.get("cwd").and_then(Value::as_str).map(String::from);
        }
        if git_branch.is_none() {
            git_branch = record
                .get("gitBranch")
                .and_then(Value::as_str)
                .filter(|b| !b.is_empty())
                .map(String::from);
        }
        if version.is_none() {
            version = record.get("version").and_then(Value::as_str).map(String::from);
        }
        sidechain |= record.get("isSidechain").and_then(Value::as_bool).unwrap_or(false);
    }

    // Resumed sessions and subagent logs reuse a sessionId, and message ids
    // are line numbers, so each file is its own conversation
    let conversation_id = gen_id(SOURCE, &file_stem(path));
    let mut thread = ThreadBuilder::new(SOURCE, conversation_id.clone());

    for (index, record) in &records {
        let Some(kind) = record.get("type").and_then(Value::as_str) else {
            continue;
        };
        if !MESSAGE_TYPES.contains(&kind) {
            continue;
        }
        let Some(message) = record.get("message") else {
            continue;
        };

        let content = extract(message.get("content").or_else(|| message.get("text")));
        let model = message
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.starts_with('<'))
            .map(String::from);
        let mut metadata = json!({});
        if let Some(uuid) = record.get("uuid").and_then(Value::as_str) {
            metadata["uuid"] = json!(uuid);
        }
        if let Some(usage) = message.get("usage") {
            metadata["usage"] = usage.clone();
        }

        thread.push(index, kind, content, timestamp(record.get("timestamp")), model, metadata);
    }

    if !thread.has_text() {
        return Ok(None);
    }

    let title = thread
        .first_text("user")
        .map(truncate_title)
        .or_else(|| cwd.as_deref().map(project_name));
    let model = most_common(thread.models());
    let created_at = thread.first_timestamp();
    let updated_at = thread.last_timestamp();

    let mut metadata = json!({ "session_id": session_id, "file": path.display().to_string() });
    if let Some(v) = version {
        metadata["version"] = json!(v);
    }
    if sidechain {
        metadata["sidechain"] = json!(true);
    }
    if let Some(remote) = cwd.as_deref().and_then(extract_git_remote) {
        metadata["git_remote"] = json!(remote);
    }

    let mut result = thread.finish();
    result.conversations.push(Conversation {
        id: conversation_id,
        source: SOURCE.to_string(),
        title,
        created_at,
        updated_at,
        model,
        cwd,
        git_branch,
        project_id: None,
        metadata,
    });
    Ok(Some(result))
}

fn project_name(cwd: &str) -> String {
    Path::new(cwd)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cwd.to_string())
}

/// `origin` URL from the working directory's git config, when still on disk
fn extract_git_remote(project_path: &str) -> Option<String> {
    let content = std::fs::read_to_string(Path::new(project_path).join(".git/config")).ok()?;
    let mut in_origin = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
        } else if in_origin {
            if let Some(url) = line.strip_prefix("url = ") {
                return Some(url.to_string());
            }
        }
    }
    None
}
