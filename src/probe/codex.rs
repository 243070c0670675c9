//! Codex CLI session logs
//!
//! Data format: JSONL rollouts under ~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl.
//! A `session_meta` event opens the file; conversation items arrive as
//! `response_item` payloads. Older rollouts write the payloads bare.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{file_stem, read_jsonl, timestamp, truncate_title, ThreadBuilder};
use crate::content::{AttachmentRef, ExtractedContent, ToolInvocation, ToolOutput};
use crate::error::Result;
use crate::ident::gen_id;
use crate::model::{Conversation, ParseResult};

pub const SOURCE: &str = "codex";

const DEFAULT_PROVIDER: &str = "openai";

/// Roles that carry harness instructions rather than conversation
const HIDDEN_ROLES: &[&str] = &["developer", "system"];

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

#[derive(Default)]
struct SessionMeta {
    id: Option<String>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    cwd: Option<String>,
    git_branch: Option<String>,
    model_provider: Option<String>,
    cli_version: Option<String>,
    originator: Option<String>,
}

impl SessionMeta {
    fn read(payload: &Value) -> Self {
        let s = |key: &str| payload.get(key).and_then(Value::as_str).map(String::from);
        SessionMeta {
            id: s("id"),
            started_at: timestamp(payload.get("timestamp")),
            cwd: s("cwd"),
            git_branch: payload
                .get("git")
                .and_then(|g| g.get("branch"))
                .and_then(Value::as_str)
                .map(String::from),
            model_provider: s("model_provider"),
            cli_version: s("cli_version"),
            originator: s("originator"),
        }
    }
}

/// Normalize one rollout file. `None` when the session has no message text.
pub fn normalize_session(path: &Path) -> Result<Option<ParseResult>> {
    let records = read_jsonl(path)?;

    let meta = records
        .iter()
        .find(|(_, r)| r.get("type").and_then(Value::as_str) == Some("session_meta"))
        .map(|(_, r)| SessionMeta::read(r.get("payload").unwrap_or(&Value::Null)))
        .unwrap_or_default();

    let natural_key = meta.id.clone().unwrap_or_else(|| file_stem(path));
    let conversation_id = gen_id(SOURCE, &natural_key);
    let mut thread = ThreadBuilder::new(SOURCE, conversation_id.clone());

    let mut current_model: Option<String> = None;
    let mut pending_reasoning: Vec<String> = vec![];

    for (index, record) in &records {
        let ts = timestamp(record.get("timestamp"));
        let (kind, payload) = match record.get("type").and_then(Value::as_str) {
            Some("response_item") => match record.get("payload") {
                Some(p) => (p.get("type").and_then(Value::as_str), p),
                None => continue,
            },
            Some("turn_context") => {
                if let Some(model) = record.pointer("/payload/model").and_then(Value::as_str) {
                    current_model = Some(model.to_string());
                }
                continue;
            }
            other => (other, record),
        };

        match kind {
            Some("message") => {
                let role = payload.get("role").and_then(Value::as_str).unwrap_or("unknown");
                if HIDDEN_ROLES.contains(&role) {
                    continue;
                }
                let mut content = message_content(payload.get("content"));
                let model = if role == "assistant" {
                    if !pending_reasoning.is_empty() {
                        content.reasoning = Some(pending_reasoning.join("\n"));
                        pending_reasoning.clear();
                    }
                    current_model.clone()
                } else {
                    None
                };
                thread.push(index, role, content, ts, model, json!({}));
            }
            Some("reasoning") => {
                let summary = payload
                    .get("summary")
                    .and_then(Value::as_array)
                    .map(|parts| {
                        parts
                            .iter()
                            .filter_map(|p| p.get("text").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                if !summary.trim().is_empty() {
                    pending_reasoning.push(summary.trim().to_string());
                }
            }
            Some("function_call") => thread.invoke(ToolInvocation {
                block_index: *index,
                id: call_id(payload),
                name: name_of(payload),
                input: parse_arguments(payload.get("arguments")),
            }),
            Some("custom_tool_call") => thread.invoke(ToolInvocation {
                block_index: *index,
                id: call_id(payload),
                name: name_of(payload),
                input: payload.get("input").cloned().unwrap_or(Value::Null),
            }),
            Some("local_shell_call") => thread.invoke(ToolInvocation {
                block_index: *index,
                id: call_id(payload),
                name: "local_shell".to_string(),
                input: payload.get("action").cloned().unwrap_or(Value::Null),
            }),
            Some("function_call_output") | Some("custom_tool_call_output") => thread.respond(ToolOutput {
                block_index: *index,
                tool_use_id: call_id(payload),
                output: payload.get("output").cloned().unwrap_or(Value::Null),
            }),
            _ => {}
        }
    }

    if !thread.has_text() {
        return Ok(None);
    }

    // Injected context blocks (`<environment_context>`, `<user_instructions>`) are not prompts
    let title = thread
        .texts("user")
        .find(|t| !t.starts_with('<'))
        .map(truncate_title)
        .or_else(|| {
            meta.cwd
                .as_deref()
                .and_then(|c| Path::new(c).file_name())
                .map(|n| n.to_string_lossy().into_owned())
        });
    let created_at = meta.started_at.or_else(|| thread.first_timestamp());
    let updated_at = thread.last_timestamp().or(created_at);

    let mut metadata = json!({ "session_id": meta.id, "file": path.display().to_string() });
    if let Some(v) = &meta.cli_version {
        metadata["cli_version"] = json!(v);
    }
    if let Some(o) = &meta.originator {
        metadata["originator"] = json!(o);
    }
    if let Some(m) = &current_model {
        metadata["last_model"] = json!(m);
    }

    let mut result = thread.finish();
    result.conversations.push(Conversation {
        id: conversation_id,
        source: SOURCE.to_string(),
        title,
        created_at,
        updated_at,
        model: Some(meta.model_provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string())),
        cwd: meta.cwd,
        git_branch: meta.git_branch,
        project_id: None,
        metadata,
    });
    Ok(Some(result))
}

/// Text and image inputs of a `message` item
fn message_content(content: Option<&Value>) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    let blocks = match content {
        Some(Value::Array(blocks)) => blocks,
        Some(Value::String(s)) => {
            out.text = s.trim().to_string();
            return out;
        }
        _ => return out,
    };

    let mut texts: Vec<&str> = vec![];
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("input_text") | Some("output_text") | Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    texts.push(t);
                }
            }
            Some("input_image") => out.attachments.push(AttachmentRef {
                filename: None,
                mime_type: Some("image".to_string()),
                size: None,
                url: block.get("image_url").and_then(Value::as_str).map(String::from),
            }),
            _ => {}
        }
    }
    out.text = texts.join("\n").trim().to_string();
    out
}

fn call_id(payload: &Value) -> Option<String> {
    payload
        .get("call_id")
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn name_of(payload: &Value) -> String {
    payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// `arguments` is a JSON document encoded as a string
fn parse_arguments(arguments: Option<&Value>) -> Value {
    match arguments {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        Some(other) => other.clone(),
        None => json!({}),
    }
}
