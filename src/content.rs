//! Content-union extraction
//!
//! A message `content` field is either a plain string, a list of typed blocks,
//! or missing. This module flattens any of those into text, reasoning, tool
//! invocations, tool results and attachment descriptors. It never fails: a
//! missing or odd-shaped field simply contributes nothing.

use serde_json::Value;

const ATTACHMENT_TYPES: &[&str] = &["image", "image_asset_pointer", "file"];

/// A `tool_use` block
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub block_index: usize,
    pub id: Option<String>,
    pub name: String,
    pub input: Value,
}

/// A `tool_result` block, paired to its invocation by `tool_use_id`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub block_index: usize,
    pub tool_use_id: Option<String>,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRef {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub reasoning: Option<String>,
    pub invocations: Vec<ToolInvocation>,
    pub results: Vec<ToolOutput>,
    pub attachments: Vec<AttachmentRef>,
}

impl ExtractedContent {
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    /// Anything worth keeping a message row for
    pub fn has_payload(&self) -> bool {
        self.has_text()
            || self.reasoning.is_some()
            || !self.invocations.is_empty()
            || !self.results.is_empty()
            || !self.attachments.is_empty()
    }
}

pub fn extract(content: Option<&Value>) -> ExtractedContent {
    match content {
        Some(Value::String(s)) => ExtractedContent {
            text: s.trim().to_string(),
            ..Default::default()
        },
        Some(Value::Array(blocks)) => extract_blocks(blocks),
        _ => ExtractedContent::default(),
    }
}

fn extract_blocks(blocks: &[Value]) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    let mut text_parts: Vec<&str> = vec![];
    let mut thinking_parts: Vec<&str> = vec![];

    for (index, block) in blocks.iter().enumerate() {
        let obj = match block {
            Value::String(s) => {
                text_parts.push(s);
                continue;
            }
            Value::Object(obj) => obj,
            _ => continue,
        };

        let block_type = obj.get("type").and_then(Value::as_str);
        let content_type = obj.get("content_type").and_then(Value::as_str);

        if is_attachment(block_type) || is_attachment(content_type) {
            out.attachments.push(attachment_ref(block));
            continue;
        }

        match block_type {
            Some("text") | None => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    text_parts.push(text);
                }
            }
            Some("thinking") => {
                if let Some(thinking) = block.get("thinking").and_then(Value::as_str) {
                    thinking_parts.push(thinking);
                }
            }
            Some("tool_use") => out.invocations.push(ToolInvocation {
                block_index: index,
                id: str_field(block, &["id"]),
                name: str_field(block, &["name"]).unwrap_or_else(|| "unknown".to_string()),
                input: block
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            }),
            Some("tool_result") => out.results.push(ToolOutput {
                block_index: index,
                tool_use_id: str_field(block, &["tool_use_id"]),
                output: block
                    .get("content")
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())),
            }),
            Some(_) => {}
        }
    }

    out.text = join_trimmed(&text_parts);
    let reasoning = join_trimmed(&thinking_parts);
    out.reasoning = (!reasoning.is_empty()).then_some(reasoning);
    out
}

fn is_attachment(kind: Option<&str>) -> bool {
    kind.map(|k| ATTACHMENT_TYPES.contains(&k)).unwrap_or(false)
}

pub fn attachment_ref(block: &Value) -> AttachmentRef {
    let source = block.get("source");
    AttachmentRef {
        filename: str_field(block, &["name", "file_name", "filename"]),
        mime_type: str_field(block, &["mime_type", "media_type", "file_type"])
            .or_else(|| source.and_then(|s| str_field(s, &["media_type"])))
            .or_else(|| str_field(block, &["content_type", "type"])),
        size: int_field(block, &["size", "file_size", "size_bytes"]),
        url: str_field(block, &["asset_pointer", "url"])
            .or_else(|| source.and_then(|s| str_field(s, &["url"]))),
    }
}

fn join_trimmed(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First present string value among `keys`
pub fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(String::from)
}

/// First present integer among `keys`, accepting numeric strings
pub fn int_field(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| match value.get(*k) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string() {
        let c = extract(Some(&json!("plain")));
        assert_eq!(c.text, "plain");
        assert_eq!(c.reasoning, None);
        assert!(c.invocations.is_empty());
    }

    #[test]
    fn test_thinking_and_text_blocks() {
        let content = json!([
            {"type": "thinking", "thinking": "T"},
            {"type": "text", "text": "X"}
        ]);
        let c = extract(Some(&content));
        assert_eq!(c.reasoning.as_deref(), Some("T"));
        assert_eq!(c.text, "X");
    }

    #[test]
    fn test_missing_and_odd_content_degrade_to_empty() {
        assert_eq!(extract(None), ExtractedContent::default());
        assert_eq!(extract(Some(&json!(42))), ExtractedContent::default());
        assert_eq!(extract(Some(&json!({"text": "x"}))), ExtractedContent::default());
        let c = extract(Some(&json!([{"type": "text"}, null, 7])));
        assert_eq!(c.text, "");
        assert!(!c.has_payload());
    }

    #[test]
    fn test_untyped_blocks_and_bare_strings_are_text() {
        let c = extract(Some(&json!([{"text": "a"}, "b", {"type": "text", "text": " c "}])));
        assert_eq!(c.text, "a\nb\n c");
    }

    #[test]
    fn test_tool_blocks() {
        let content = json!([
            {"type": "tool_use", "id": "tu_1", "name": "Read", "input": {"file_path": "/x"}},
            {"type": "tool_result", "tool_use_id": "tu_1", "content": "file body"},
            {"type": "tool_use"}
        ]);
        let c = extract(Some(&content));
        assert_eq!(c.invocations.len(), 2);
        assert_eq!(c.invocations[0].name, "Read");
        assert_eq!(c.invocations[0].id.as_deref(), Some("tu_1"));
        assert_eq!(c.invocations[1].name, "unknown");
        assert_eq!(c.invocations[1].input, json!({}));
        assert_eq!(c.results.len(), 1);
        assert_eq!(c.results[0].tool_use_id.as_deref(), Some("tu_1"));
        assert_eq!(c.results[0].output, json!("file body"));
        assert!(c.text.is_empty());
        assert!(c.has_payload());
    }

    #[test]
    fn test_attachment_blocks() {
        let content = json!([
            {"content_type": "image_asset_pointer", "asset_pointer": "file-service://abc", "size_bytes": 2048, "name": "shot.png"},
            {"type": "file", "file_name": "doc.pdf", "file_type": "application/pdf", "file_size": "1024"},
            {"type": "image", "source": {"type": "base64", "media_type": "image/png"}}
        ]);
        let c = extract(Some(&content));
        assert_eq!(c.attachments.len(), 3);
        assert_eq!(c.attachments[0].filename.as_deref(), Some("shot.png"));
        assert_eq!(c.attachments[0].url.as_deref(), Some("file-service://abc"));
        assert_eq!(c.attachments[0].size, Some(2048));
        assert_eq!(c.attachments[1].mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(c.attachments[1].size, Some(1024));
        assert_eq!(c.attachments[2].mime_type.as_deref(), Some("image/png"));
    }
}
