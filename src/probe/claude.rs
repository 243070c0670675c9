//! Claude.ai conversations
//!
//! Shared by the data export and the `chat_conversations/{uuid}` API detail:
//! a conversation object with a flat `chat_messages` list.

use serde_json::{json, Value};
use tracing::debug;

use super::{timestamp, ThreadBuilder};
use crate::content::{attachment_ref, extract, str_field, AttachmentRef};
use crate::ident::gen_id;
use crate::model::{Conversation, ParseResult};

pub const SOURCE: &str = "claude";

pub fn normalize_export(doc: &Value) -> ParseResult {
    let mut result = ParseResult::new();
    for conv in doc.as_array().map(Vec::as_slice).unwrap_or_default() {
        match normalize_conversation(conv) {
            Some(parsed) => result.extend(parsed),
            None => debug!("skipping claude conversation without uuid"),
        }
    }
    result
}

pub fn native_id(conv: &Value) -> Option<&str> {
    conv.get("uuid").or_else(|| conv.get("id")).and_then(Value::as_str)
}

/// Normalize one conversation. `None` when it carries no id.
pub fn normalize_conversation(conv: &Value) -> Option<ParseResult> {
    let native = native_id(conv)?;
    let conversation_id = gen_id(SOURCE, native);
    let project = str_field(conv, &["project_uuid"])
        .or_else(|| conv.get("project").and_then(|p| str_field(p, &["uuid"])));

    let mut thread = ThreadBuilder::new(SOURCE, conversation_id.clone());
    let messages = conv
        .get("chat_messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for (index, m) in messages.iter().enumerate() {
        let key = str_field(m, &["uuid", "id"]).unwrap_or_else(|| format!("idx:{}", index));
        let blocks = m.get("content").filter(|c| c.as_array().map(|a| !a.is_empty()).unwrap_or(false));
        let content = extract(blocks.or_else(|| m.get("text")));
        let role = m.get("sender").and_then(Value::as_str).unwrap_or("unknown");

        let mut metadata = json!({});
        if let Some(parent) = m.get("parent_message_uuid").and_then(Value::as_str) {
            metadata["parent"] = json!(parent);
        }
        thread.push(key, role, content, timestamp(m.get("created_at")), None, metadata);
        thread.attach(uploads(m));
    }

    let mut metadata = json!({});
    if let Some(p) = &project {
        metadata["project_uuid"] = json!(p);
    }
    if let Some(summary) = str_field(conv, &["summary"]).filter(|s| !s.is_empty()) {
        metadata["summary"] = json!(summary);
    }

    let mut result = thread.finish();
    result.conversations.push(Conversation {
        id: conversation_id,
        source: SOURCE.to_string(),
        title: str_field(conv, &["name", "title"]).filter(|t| !t.is_empty()),
        created_at: timestamp(conv.get("created_at")),
        updated_at: timestamp(conv.get("updated_at")),
        model: str_field(conv, &["model"]),
        cwd: None,
        git_branch: None,
        project_id: project,
        metadata,
    });
    Some(result)
}

/// Pasted documents (`attachments`) and uploaded files (`files`)
fn uploads(message: &Value) -> Vec<AttachmentRef> {
    ["attachments", "files", "files_v2"]
        .iter()
        .filter_map(|key| message.get(*key).and_then(Value::as_array))
        .flatten()
        .map(|item| {
            let mut a = attachment_ref(item);
            if a.url.is_none() {
                a.url = str_field(item, &["preview_url", "thumbnail_url"]);
            }
            if a.mime_type.is_none() {
                a.mime_type = str_field(item, &["file_kind"]);
            }
            a
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::child_id;
    use crate::model::ToolStatus;

    fn sample() -> Value {
        json!({
            "uuid": "cv-1",
            "name": "Refactor plan",
            "created_at": "2024-03-01T09:00:00.000000Z",
            "updated_at": "2024-03-01T09:05:00.000000Z",
            "project_uuid": "proj-7",
            "chat_messages": [
                {"uuid": "m1", "sender": "human", "text": "Outline the refactor",
                 "created_at": "2024-03-01T09:00:00Z",
                 "attachments": [{"file_name": "notes.txt", "file_type": "text/plain", "file_size": 120}]},
                {"uuid": "m2", "sender": "assistant", "text": "ignored when blocks exist",
                 "created_at": "2024-03-01T09:00:10Z",
                 "content": [
                    {"type": "thinking", "thinking": "consider modules"},
                    {"type": "text", "text": "Step one"},
                    {"type": "tool_use", "id": "tu", "name": "web_search", "input": {"query": "x"}},
                    {"type": "tool_result", "tool_use_id": "tu", "content": [{"type": "text", "text": "r"}]}
                 ]},
                {"uuid": "m3", "sender": "human", "text": "", "content": [],
                 "created_at": "2024-03-01T09:01:00Z"}
            ]
        })
    }

    #[test]
    fn test_normalize_conversation() {
        let result = normalize_conversation(&sample()).unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.id, gen_id(SOURCE, "cv-1"));
        assert_eq!(conv.title.as_deref(), Some("Refactor plan"));
        assert_eq!(conv.project_id.as_deref(), Some("proj-7"));

        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].id, child_id(SOURCE, &conv.id, "m1"));
        assert_eq!(result.messages[1].content, "Step one");
        assert_eq!(result.messages[1].thinking.as_deref(), Some("consider modules"));

        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.attachments[0].filename.as_deref(), Some("notes.txt"));
        assert_eq!(result.attachments[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(result.attachments[0].size, Some(120));

        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].status, ToolStatus::Complete);
    }

    #[test]
    fn test_empty_conversation_is_kept() {
        let result = normalize_conversation(&json!({"uuid": "e", "name": "", "chat_messages": []})).unwrap();
        assert_eq!(result.conversations.len(), 1);
        assert_eq!(result.conversations[0].title, None);
        assert!(result.messages.is_empty());
    }

    #[test]
    fn test_export_skips_conversations_without_id() {
        let result = normalize_export(&json!([sample(), {"name": "orphan"}]));
        assert_eq!(result.conversations.len(), 1);
        assert!(normalize_export(&json!({"not": "a list"})).is_empty());
    }
}
