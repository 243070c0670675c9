//! Canonical entity model shared by every source
//!
//! All normalizers converge on these six shapes. Ids come from [`crate::ident`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// One normalized chat or agent session thread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    /// Working directory (local sessions only)
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    /// Project, gizmo or organization reference
    pub project_id: Option<String>,
    pub metadata: Value,
}

/// One normalized turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub thinking: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Complete,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub id: String,
    pub message_id: String,
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub status: ToolStatus,
    pub duration_ms: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub id: String,
    pub message_id: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    /// Local storage path, when the file was archived
    pub path: Option<String>,
    /// Remote URL or asset pointer
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Generated document distinct from chat text. Part of the schema contract;
/// no current source produces one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub id: String,
    pub conversation_id: String,
    pub artifact_type: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub language: Option<String>,
    pub version: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Write,
    Edit,
    MultiEdit,
    Shell,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::Write => "write",
            EditKind::Edit => "edit",
            EditKind::MultiEdit => "multiedit",
            EditKind::Shell => "shell",
        }
    }

    /// Map a file-mutating tool name (Write, Edit, MultiEdit) to its kind
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "write" => Some(EditKind::Write),
            "edit" => Some(EditKind::Edit),
            "multiedit" | "multi_edit" => Some(EditKind::MultiEdit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEdit {
    pub id: String,
    pub message_id: String,
    pub file_path: String,
    pub edit_kind: EditKind,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Output of one normalizer run, input of one merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
    pub attachments: Vec<Attachment>,
    pub artifacts: Vec<Artifact>,
    pub file_edits: Vec<FileEdit>,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, other: ParseResult) {
        self.conversations.extend(other.conversations);
        self.messages.extend(other.messages);
        self.tool_calls.extend(other.tool_calls);
        self.attachments.extend(other.attachments);
        self.artifacts.extend(other.artifacts);
        self.file_edits.extend(other.file_edits);
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0 && self.artifacts.is_empty()
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            conversations: self.conversations.len() as u64,
            messages: self.messages.len() as u64,
            tool_calls: self.tool_calls.len() as u64,
            attachments: self.attachments.len() as u64,
            file_edits: self.file_edits.len() as u64,
        }
    }

    /// Parent ids referenced by children in this batch but not defined in it.
    /// Returns (conversation ids, message ids).
    pub fn external_parents(&self) -> (HashSet<String>, HashSet<String>) {
        let conv_ids: HashSet<&str> = self.conversations.iter().map(|c| c.id.as_str()).collect();
        let msg_ids: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();

        let conversations = self
            .messages
            .iter()
            .map(|m| m.conversation_id.as_str())
            .chain(self.artifacts.iter().map(|a| a.conversation_id.as_str()))
            .filter(|id| !conv_ids.contains(id))
            .map(String::from)
            .collect();

        let messages = self
            .tool_calls
            .iter()
            .map(|t| t.message_id.as_str())
            .chain(self.attachments.iter().map(|a| a.message_id.as_str()))
            .chain(self.file_edits.iter().map(|e| e.message_id.as_str()))
            .filter(|id| !msg_ids.contains(id))
            .map(String::from)
            .collect();

        (conversations, messages)
    }

    /// Drop children whose parent is neither in this batch nor in `known`
    pub fn retain_linked(&mut self, known_conversations: &HashSet<String>, known_messages: &HashSet<String>) -> usize {
        let conv_ids: HashSet<String> = self
            .conversations
            .iter()
            .map(|c| c.id.clone())
            .chain(known_conversations.iter().cloned())
            .collect();

        let before_msgs = self.messages.len();
        self.messages.retain(|m| conv_ids.contains(&m.conversation_id));
        let before_artifacts = self.artifacts.len();
        self.artifacts.retain(|a| conv_ids.contains(&a.conversation_id));

        let msg_ids: HashSet<String> = self
            .messages
            .iter()
            .map(|m| m.id.clone())
            .chain(known_messages.iter().cloned())
            .collect();

        let before_children =
            self.tool_calls.len() + self.attachments.len() + self.file_edits.len();
        self.tool_calls.retain(|t| msg_ids.contains(&t.message_id));
        self.attachments.retain(|a| msg_ids.contains(&a.message_id));
        self.file_edits.retain(|e| msg_ids.contains(&e.message_id));
        let after_children =
            self.tool_calls.len() + self.attachments.len() + self.file_edits.len();

        (before_msgs - self.messages.len())
            + (before_artifacts - self.artifacts.len())
            + (before_children - after_children)
    }
}

/// Row counts per entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub conversations: u64,
    pub messages: u64,
    pub tool_calls: u64,
    pub attachments: u64,
    pub file_edits: u64,
}

impl EntityCounts {
    pub fn total(&self) -> u64 {
        self.conversations + self.messages + self.tool_calls + self.attachments + self.file_edits
    }

    pub fn add(&mut self, other: &EntityCounts) {
        self.conversations += other.conversations;
        self.messages += other.messages;
        self.tool_calls += other.tool_calls;
        self.attachments += other.attachments;
        self.file_edits += other.file_edits;
    }
}

impl std::fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} convs, {} msgs, {} tools, {} attachs, {} edits",
            self.conversations, self.messages, self.tool_calls, self.attachments, self.file_edits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: &str, conversation_id: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            role: "user".to_string(),
            content: "hi".to_string(),
            thinking: None,
            created_at: None,
            model: None,
            metadata: json!({}),
        }
    }

    #[test]
    fn test_edit_kind_from_tool_name() {
        assert_eq!(EditKind::from_tool_name("Write"), Some(EditKind::Write));
        assert_eq!(EditKind::from_tool_name("MultiEdit"), Some(EditKind::MultiEdit));
        assert_eq!(EditKind::from_tool_name("Read"), None);
    }

    #[test]
    fn test_external_parents_and_retain() {
        let mut result = ParseResult::new();
        result.messages.push(message("m1", "c-missing"));
        result.messages.push(message("m2", "c-stored"));

        let (convs, msgs) = result.external_parents();
        assert_eq!(convs.len(), 2);
        assert!(msgs.is_empty());

        let known: HashSet<String> = ["c-stored".to_string()].into_iter().collect();
        let dropped = result.retain_linked(&known, &HashSet::new());
        assert_eq!(dropped, 1);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].id, "m2");
    }

    #[test]
    fn test_counts_display() {
        let counts = EntityCounts {
            conversations: 1,
            messages: 2,
            ..Default::default()
        };
        assert_eq!(counts.to_string(), "1 convs, 2 msgs, 0 tools, 0 attachs, 0 edits");
    }
}
