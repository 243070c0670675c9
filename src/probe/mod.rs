//! Source normalizers
//!
//! One normalizer per source kind, dispatched by [`normalize_path`]. The two
//! session-log formats share [`ThreadBuilder`] for tool pairing, message
//! retention and file-edit projection; the two export formats expose a
//! per-conversation routine reused by the web API fetchers.

pub mod chatgpt;
pub mod claude;
pub mod claudecode;
pub mod codex;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

use crate::content::{AttachmentRef, ExtractedContent, ToolInvocation, ToolOutput};
use crate::detect::{load_document, SourceKind};
use crate::error::Result;
use crate::ident::child_id;
use crate::model::{Attachment, EditKind, FileEdit, Message, ParseResult, ToolCall, ToolStatus};

const TITLE_LIMIT: usize = 100;

/// Normalize a file-backed source.
///
/// For session-log kinds `files` restricts parsing to the given session
/// files; `None` discovers every session under `path`.
pub fn normalize_path(kind: SourceKind, path: &Path, files: Option<&[PathBuf]>) -> Result<ParseResult> {
    match kind {
        SourceKind::ClaudeCode => {
            let files = files.map(<[PathBuf]>::to_vec).unwrap_or_else(|| session_files(path));
            Ok(claudecode::normalize_sessions(&files))
        }
        SourceKind::Codex => {
            let files = files
                .map(<[PathBuf]>::to_vec)
                .unwrap_or_else(|| session_files(&path.join("sessions")));
            Ok(codex::normalize_sessions(&files))
        }
        SourceKind::ChatGptExport => Ok(chatgpt::normalize_export(&load_document(path)?)),
        SourceKind::ClaudeExport => Ok(claude::normalize_export(&load_document(path)?)),
    }
}

/// Every `*.jsonl` file under `root`, sorted
pub fn session_files(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return vec![];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
        .collect();
    files.sort();
    files
}

/// Parsed JSONL records paired with their zero-based line number.
/// Blank and malformed lines are skipped; numbering still counts them so
/// indices stay stable while a session file grows.
pub fn read_jsonl(path: &Path) -> Result<Vec<(usize, Value)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = vec![];

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(v) if v.is_object() => records.push((index, v)),
            Ok(_) => debug!("{}:{}: skipping non-object record", path.display(), index + 1),
            Err(e) => debug!("{}:{}: skipping malformed record: {}", path.display(), index + 1, e),
        }
    }

    Ok(records)
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// RFC 3339 timestamp, tolerating a missing offset
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

/// Seconds since the epoch, fractional allowed
pub fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

/// Timestamp from a JSON value that is either an ISO string or epoch seconds
pub fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_iso(s),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

/// First line of `text`, capped at 100 characters
pub fn truncate_title(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or_default();
    if first_line.chars().count() > TITLE_LIMIT {
        let head: String = first_line.chars().take(TITLE_LIMIT - 3).collect();
        format!("{}...", head)
    } else {
        first_line.to_string()
    }
}

/// Most frequent value, ties broken by first appearance
pub fn most_common<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = vec![];
    for v in values {
        match counts.iter_mut().find(|(k, _)| *k == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }
    let max = counts.iter().map(|(_, n)| *n).max()?;
    counts
        .into_iter()
        .find(|(_, n)| *n == max)
        .map(|(k, _)| k.to_string())
}

fn writer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:cat|echo|printf)\b").expect("valid writer regex"))
}

/// `>` or `>>` followed by a file name; `>&N` duplications never match
fn redirect_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#">>?\s*['"]?([^\s>|;&'"]+)"#).expect("valid redirect regex"))
}

/// Last file a writer command redirects into, ignoring devices
fn redirect_target(command: &str) -> Option<String> {
    if !writer_pattern().is_match(command) {
        return None;
    }
    redirect_pattern()
        .captures_iter(command)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|target| !target.starts_with("/dev/"))
        .last()
        .map(String::from)
}

fn stream_edit_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:sed\s+-i\S*|awk\s+-i\s+inplace)\s.*?['"]?([^\s'"]+)['"]?\s*$"#)
            .expect("valid stream-edit regex")
    })
}

fn patch_target_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\*\*\* (Add|Update) File: (.+)$").expect("valid patch header regex")
    })
}

const SHELL_TOOLS: &[&str] = &["bash", "shell", "exec_command", "local_shell", "container.exec"];

/// Shell command carried by a tool input, if any
fn shell_command(input: &Value) -> Option<String> {
    let command = input.get("command").or_else(|| input.get("cmd"))?;
    match command {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            // ["bash", "-lc", "<script>"] carries the script last
            match parts.as_slice() {
                [shell, flag, script] if flag.starts_with('-') && shell.ends_with("sh") => {
                    Some(script.to_string())
                }
                _ => Some(parts.join(" ")),
            }
        }
        _ => None,
    }
}

/// File mutations implied by a tool invocation: (kind, path, content snapshot)
pub fn project_edits(name: &str, input: &Value) -> Vec<(EditKind, String, String)> {
    if let Some(kind) = EditKind::from_tool_name(name) {
        let Some(path) = input.get("file_path").and_then(Value::as_str) else {
            return vec![];
        };
        let content = match kind {
            EditKind::MultiEdit => input
                .get("edits")
                .and_then(Value::as_array)
                .map(|edits| {
                    edits
                        .iter()
                        .filter_map(|e| e.get("new_string").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default(),
            _ => input
                .get("content")
                .or_else(|| input.get("new_string"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        return vec![(kind, path.to_string(), content)];
    }

    let lowered = name.to_ascii_lowercase();
    if lowered == "apply_patch" {
        let patch = match input {
            Value::String(s) => Some(s.as_str()),
            other => other.get("input").and_then(Value::as_str),
        };
        return patch.map(patch_edits).unwrap_or_default();
    }

    if !SHELL_TOOLS.contains(&lowered.as_str()) {
        return vec![];
    }
    let Some(command) = shell_command(input) else {
        return vec![];
    };
    if command.trim_start().starts_with("apply_patch") {
        return patch_edits(&command);
    }
    redirect_target(&command)
        .or_else(|| {
            stream_edit_pattern()
                .captures(&command)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .map(|path| vec![(EditKind::Shell, path, command.clone())])
        .unwrap_or_default()
}

/// Files named by `*** Add File:` / `*** Update File:` headers of a patch
fn patch_edits(patch: &str) -> Vec<(EditKind, String, String)> {
    patch_target_pattern()
        .captures_iter(patch)
        .map(|caps| {
            let kind = if &caps[1] == "Add" { EditKind::Write } else { EditKind::Edit };
            (kind, caps[2].trim().to_string(), patch.to_string())
        })
        .collect()
}

struct Turn {
    message: Message,
    content: ExtractedContent,
    extra_attachments: Vec<AttachmentRef>,
}

/// Accumulates the turns of one thread and settles tool pairing at the end.
///
/// Children are emitted only for turns that are themselves retained: a turn
/// is kept when it has text, reasoning, invocations, attachments, or a tool
/// result that found no invocation to pair with.
pub struct ThreadBuilder {
    source: &'static str,
    conversation_id: String,
    turns: Vec<Turn>,
    /// Invocations and results seen before the first turn
    pending: ExtractedContent,
}

impl ThreadBuilder {
    pub fn new(source: &'static str, conversation_id: impl Into<String>) -> Self {
        Self {
            source,
            conversation_id: conversation_id.into(),
            turns: vec![],
            pending: ExtractedContent::default(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Append a turn; returns its message id
    pub fn push(
        &mut self,
        discriminator: impl std::fmt::Display,
        role: &str,
        mut content: ExtractedContent,
        created_at: Option<DateTime<Utc>>,
        model: Option<String>,
        metadata: Value,
    ) -> String {
        let id = child_id(self.source, &self.conversation_id, discriminator);
        let pending = std::mem::take(&mut self.pending);
        content.invocations.extend(pending.invocations);
        content.results.extend(pending.results);

        self.turns.push(Turn {
            message: Message {
                id: id.clone(),
                conversation_id: self.conversation_id.clone(),
                role: role.to_string(),
                content: std::mem::take(&mut content.text),
                thinking: content.reasoning.take(),
                created_at,
                model,
                metadata,
            },
            content,
            extra_attachments: vec![],
        });
        id
    }

    /// Attachments described outside the content blocks of the last turn
    pub fn attach(&mut self, attachments: Vec<AttachmentRef>) {
        if let Some(turn) = self.turns.last_mut() {
            turn.extra_attachments.extend(attachments);
        }
    }

    /// Attach an invocation to the latest turn, or the next one if none yet
    pub fn invoke(&mut self, invocation: ToolInvocation) {
        match self.turns.last_mut() {
            Some(turn) => turn.content.invocations.push(invocation),
            None => self.pending.invocations.push(invocation),
        }
    }

    pub fn respond(&mut self, output: ToolOutput) {
        match self.turns.last_mut() {
            Some(turn) => turn.content.results.push(output),
            None => self.pending.results.push(output),
        }
    }

    /// True if any turn carries non-empty text
    pub fn has_text(&self) -> bool {
        self.turns.iter().any(|t| !t.message.content.is_empty())
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.turns.iter().filter_map(|t| t.message.created_at).max()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.turns.iter().filter_map(|t| t.message.created_at).min()
    }

    /// Non-empty texts of turns with `role`, in order
    pub fn texts<'a>(&'a self, role: &str) -> impl Iterator<Item = &'a str> + 'a {
        let role = role.to_string();
        self.turns
            .iter()
            .filter(move |t| t.message.role == role)
            .map(|t| t.message.content.as_str())
            .filter(|c| !c.is_empty())
    }

    pub fn first_text(&self, role: &str) -> Option<&str> {
        self.texts(role).next()
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.turns.iter().filter_map(|t| t.message.model.as_deref())
    }

    /// Settle pairing and emit messages with their children
    pub fn finish(self) -> ParseResult {
        let source = self.source;
        let mut outputs: HashMap<String, Value> = HashMap::new();
        for turn in &self.turns {
            for result in &turn.content.results {
                if let Some(id) = &result.tool_use_id {
                    outputs.entry(id.clone()).or_insert_with(|| result.output.clone());
                }
            }
        }
        let invoked: std::collections::HashSet<&str> = self
            .turns
            .iter()
            .flat_map(|t| t.content.invocations.iter())
            .filter_map(|i| i.id.as_deref())
            .collect();
        let is_unpaired = |r: &ToolOutput| match &r.tool_use_id {
            Some(id) => !invoked.contains(id.as_str()),
            None => true,
        };

        let mut out = ParseResult::new();
        for turn in &self.turns {
            let message = &turn.message;
            let unpaired: Vec<&ToolOutput> = turn.content.results.iter().filter(|r| is_unpaired(r)).collect();
            let retained = !message.content.is_empty()
                || message.thinking.is_some()
                || !turn.content.invocations.is_empty()
                || !turn.content.attachments.is_empty()
                || !turn.extra_attachments.is_empty()
                || !unpaired.is_empty();
            if !retained {
                continue;
            }

            for invocation in &turn.content.invocations {
                let output = invocation.id.as_ref().and_then(|id| outputs.get(id));
                let call_id = child_id(source, &message.id, format!("tool:{}", invocation.block_index));
                out.tool_calls.push(ToolCall {
                    id: call_id,
                    message_id: message.id.clone(),
                    tool_name: invocation.name.clone(),
                    input: invocation.input.clone(),
                    output: output.cloned().unwrap_or(Value::Null),
                    status: if output.is_some() { ToolStatus::Complete } else { ToolStatus::Pending },
                    duration_ms: None,
                    created_at: message.created_at,
                });

                for (n, (kind, path, content)) in
                    project_edits(&invocation.name, &invocation.input).into_iter().enumerate()
                {
                    out.file_edits.push(FileEdit {
                        id: child_id(source, &message.id, format!("edit:{}:{}", invocation.block_index, n)),
                        message_id: message.id.clone(),
                        file_path: path,
                        edit_kind: kind,
                        content,
                        created_at: message.created_at,
                    });
                }
            }

            for result in unpaired {
                out.tool_calls.push(ToolCall {
                    id: child_id(source, &message.id, format!("result:{}", result.block_index)),
                    message_id: message.id.clone(),
                    tool_name: "tool_result".to_string(),
                    input: json!({ "tool_use_id": result.tool_use_id }),
                    output: result.output.clone(),
                    status: ToolStatus::Complete,
                    duration_ms: None,
                    created_at: message.created_at,
                });
            }

            let attachments = turn.content.attachments.iter().chain(turn.extra_attachments.iter());
            for (n, a) in attachments.enumerate() {
                out.attachments.push(Attachment {
                    id: child_id(source, &message.id, format!("attach:{}", n)),
                    message_id: message.id.clone(),
                    filename: a.filename.clone(),
                    mime_type: a.mime_type.clone(),
                    size: a.size,
                    path: None,
                    url: a.url.clone(),
                    created_at: message.created_at,
                });
            }

            out.messages.push(message.clone());
        }

        out.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}
