//! ChatGPT conversations
//!
//! Shared by the data export (`conversations.json`, optionally zipped) and
//! the `backend-api` conversation detail, which use the same shape: a
//! `mapping` of node id to node, each node optionally holding a message.

use serde_json::{json, Value};
use tracing::debug;

use super::timestamp;
use crate::content::{attachment_ref, extract, str_field};
use crate::ident::{child_id, gen_id};
use crate::model::{Attachment, Conversation, Message, ParseResult, ToolCall, ToolStatus};

pub const SOURCE: &str = "chatgpt";

/// Normalize an export document: a list of conversations
pub fn normalize_export(doc: &Value) -> ParseResult {
    let mut result = ParseResult::new();
    for conv in doc.as_array().map(Vec::as_slice).unwrap_or_default() {
        match normalize_conversation(conv) {
            Some(parsed) => result.extend(parsed),
            None => debug!("skipping chatgpt conversation without id"),
        }
    }
    result
}

/// Native conversation id
pub fn native_id(conv: &Value) -> Option<&str> {
    conv.get("id")
        .or_else(|| conv.get("conversation_id"))
        .and_then(Value::as_str)
}

/// Normalize one conversation. `None` when it carries no id.
pub fn normalize_conversation(conv: &Value) -> Option<ParseResult> {
    let native = native_id(conv)?;
    let conversation_id = gen_id(SOURCE, native);
    let gizmo = str_field(conv, &["gizmo_id"]);

    let mut result = ParseResult::new();
    result.conversations.push(Conversation {
        id: conversation_id.clone(),
        source: SOURCE.to_string(),
        title: str_field(conv, &["title"]),
        created_at: timestamp(conv.get("create_time")),
        updated_at: timestamp(conv.get("update_time")),
        model: str_field(conv, &["default_model_slug", "model"]),
        cwd: None,
        git_branch: None,
        project_id: gizmo.clone(),
        metadata: match &gizmo {
            Some(g) => json!({ "gizmo_id": g }),
            None => json!({}),
        },
    });

    let Some(mapping) = conv.get("mapping").and_then(Value::as_object) else {
        return Some(result);
    };

    for (node_id, node) in mapping {
        let Some(message) = node.get("message").filter(|m| m.is_object()) else {
            continue;
        };
        normalize_node(&mut result, &conversation_id, node_id, message);
    }

    result.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Some(result)
}

fn normalize_node(result: &mut ParseResult, conversation_id: &str, node_id: &str, message: &Value) {
    let message_id = child_id(SOURCE, conversation_id, node_id);
    let role = message
        .pointer("/author/role")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let meta = message.get("metadata").cloned().unwrap_or_else(|| json!({}));
    let created_at = timestamp(message.get("create_time"));
    let model = str_field(&meta, &["model_slug"]);

    let content = message.get("content");
    let content_type = content.and_then(|c| c.get("content_type")).and_then(Value::as_str);
    let mut extracted = extract(content.and_then(|c| c.get("parts")));
    match content_type {
        Some("thoughts") => {
            let thoughts: Vec<&str> = content
                .and_then(|c| c.get("thoughts"))
                .and_then(Value::as_array)
                .map(|t| t.iter().filter_map(|x| x.get("content").and_then(Value::as_str)).collect())
                .unwrap_or_default();
            let joined = thoughts.join("\n").trim().to_string();
            extracted.reasoning = (!joined.is_empty()).then_some(joined);
        }
        Some("code") | Some("execution_output") if extracted.text.is_empty() => {
            extracted.text = str_field(content.unwrap_or(&Value::Null), &["text"])
                .unwrap_or_default()
                .trim()
                .to_string();
        }
        _ => {}
    }

    let plugin = meta.get("invoked_plugin").filter(|p| !p.is_null());
    let tool_call = (role == "tool" || plugin.is_some()).then(|| ToolCall {
        id: child_id(SOURCE, &message_id, "tool"),
        message_id: message_id.clone(),
        tool_name: plugin
            .and_then(|p| str_field(p, &["namespace"]))
            .or_else(|| message.pointer("/author/name").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| role.to_string()),
        input: meta.get("args").cloned().unwrap_or_else(|| json!({})),
        output: content.cloned().unwrap_or_else(|| json!({})),
        status: ToolStatus::Complete,
        duration_ms: None,
        created_at,
    });

    // Uploaded files are listed in metadata rather than in the parts
    let mut attachments = extracted.attachments;
    if let Some(files) = meta.get("attachments").and_then(Value::as_array) {
        attachments.extend(files.iter().map(attachment_ref));
    }

    if extracted.text.is_empty() && extracted.reasoning.is_none() && attachments.is_empty() && tool_call.is_none() {
        return;
    }

    result.tool_calls.extend(tool_call);
    for (n, a) in attachments.into_iter().enumerate() {
        result.attachments.push(Attachment {
            id: child_id(SOURCE, &message_id, format!("attach:{}", n)),
            message_id: message_id.clone(),
            filename: a.filename,
            mime_type: a.mime_type,
            size: a.size,
            path: None,
            url: a.url,
            created_at,
        });
    }
    result.messages.push(Message {
        id: message_id,
        conversation_id: conversation_id.to_string(),
        role: role.to_string(),
        content: extracted.text,
        thinking: extracted.reasoning,
        created_at,
        model,
        metadata: meta,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "id": "conv-1",
            "title": "Trip planning",
            "create_time": 1705314600.0,
            "update_time": 1705314700.0,
            "default_model_slug": "gpt-4o",
            "gizmo_id": "g-abc",
            "mapping": {
                "root": {"id": "root", "message": null, "children": ["n1"]},
                "n1": {"message": {
                    "author": {"role": "user"}, "create_time": 1705314601.0,
                    "content": {"content_type": "text", "parts": ["Where to go?"]}
                }},
                "n2": {"message": {
                    "author": {"role": "assistant"}, "create_time": 1705314602.0,
                    "metadata": {"model_slug": "gpt-4o"},
                    "content": {"content_type": "multimodal_text", "parts": [
                        "Look at this",
                        {"content_type": "image_asset_pointer", "asset_pointer": "file-service://img", "size_bytes": 10}
                    ]}
                }},
                "n3": {"message": {
                    "author": {"role": "tool", "name": "browser"}, "create_time": 1705314603.0,
                    "metadata": {"args": {"q": "lisbon"}},
                    "content": {"content_type": "text", "parts": [""]}
                }},
                "n4": {"message": {
                    "author": {"role": "system"}, "create_time": 1705314599.0,
                    "content": {"content_type": "text", "parts": [""]}
                }}
            }
        })
    }

    #[test]
    fn test_normalize_conversation() {
        let result = normalize_conversation(&sample()).unwrap();
        let conv = &result.conversations[0];
        assert_eq!(conv.id, gen_id(SOURCE, "conv-1"));
        assert_eq!(conv.project_id.as_deref(), Some("g-abc"));
        assert_eq!(conv.model.as_deref(), Some("gpt-4o"));
        assert_eq!(conv.created_at.unwrap().timestamp(), 1705314600);

        // empty system node dropped; tool node kept for its call
        assert_eq!(result.messages.len(), 3);
        assert_eq!(result.messages[0].role, "user");
        assert_eq!(result.messages[0].id, child_id(SOURCE, &conv.id, "n1"));
        assert_eq!(result.messages[1].model.as_deref(), Some("gpt-4o"));

        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.attachments[0].url.as_deref(), Some("file-service://img"));

        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].tool_name, "browser");
        assert_eq!(result.tool_calls[0].input, json!({"q": "lisbon"}));
        assert_eq!(result.tool_calls[0].message_id, result.messages[2].id);
    }

    #[test]
    fn test_export_skips_conversations_without_id() {
        let doc = json!([sample(), {"title": "no id", "mapping": {}}]);
        let result = normalize_export(&doc);
        assert_eq!(result.conversations.len(), 1);
    }

    #[test]
    fn test_thoughts_become_reasoning() {
        let conv = json!({"id": "c", "mapping": {"t": {"message": {
            "author": {"role": "assistant"},
            "content": {"content_type": "thoughts", "thoughts": [{"summary": "s", "content": "weighing options"}]}
        }}}});
        let result = normalize_conversation(&conv).unwrap();
        assert_eq!(result.messages[0].thinking.as_deref(), Some("weighing options"));
        assert_eq!(result.messages[0].content, "");
    }
}
