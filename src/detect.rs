//! Source classification for arbitrary input paths

use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// Member of a ChatGPT export archive holding the conversations
const EXPORT_MEMBER: &str = "conversations.json";

/// File-backed source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Codex CLI home (`~/.codex`, sessions under `sessions/`)
    Codex,
    /// Claude Code projects directory (`~/.claude/projects`)
    ClaudeCode,
    /// Claude.ai data export
    ClaudeExport,
    /// ChatGPT data export (`conversations.json` or the `.zip` bundle)
    ChatGptExport,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Codex => "codex",
            SourceKind::ClaudeCode => "claude-code",
            SourceKind::ClaudeExport => "claude-export",
            SourceKind::ChatGptExport => "chatgpt-export",
        }
    }

    /// Source tag stored on conversations and used to namespace ids.
    /// Export and API copies of the same web product share a tag.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::Codex => "codex",
            SourceKind::ClaudeCode => "claude-code",
            SourceKind::ClaudeExport => "claude",
            SourceKind::ChatGptExport => "chatgpt",
        }
    }

    pub fn is_session_log(&self) -> bool {
        matches!(self, SourceKind::Codex | SourceKind::ClaudeCode)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(SourceKind::Codex),
            "claude-code" => Ok(SourceKind::ClaudeCode),
            "claude" | "claude-export" => Ok(SourceKind::ClaudeExport),
            "chatgpt" | "chatgpt-export" => Ok(SourceKind::ChatGptExport),
            other => Err(format!(
                "unknown source `{}`; expected codex, claude-code, claude or chatgpt",
                other
            )),
        }
    }
}

/// Classify a path
pub fn detect(path: &Path) -> Result<SourceKind> {
    if path.is_dir() {
        return Ok(if path.join("sessions").is_dir() {
            SourceKind::Codex
        } else {
            SourceKind::ClaudeCode
        });
    }

    if is_zip(path) || file_name_lower(path).contains("chatgpt") {
        return Ok(SourceKind::ChatGptExport);
    }

    let doc = load_document(path)?;
    detect_document(&doc).map_err(|reason| SyncError::detection(path.display(), reason))
}

/// Classify an already-parsed export document by its first record
pub fn detect_document(doc: &Value) -> std::result::Result<SourceKind, String> {
    let first = doc
        .as_array()
        .ok_or_else(|| "document is not a list of conversations".to_string())?
        .first()
        .ok_or_else(|| "document contains no conversations".to_string())?;

    if !first.is_object() {
        return Err("first record is not an object".to_string());
    }
    if first.get("mapping").is_some() {
        Ok(SourceKind::ChatGptExport)
    } else if first.get("chat_messages").is_some() {
        Ok(SourceKind::ClaudeExport)
    } else {
        Ok(SourceKind::ChatGptExport)
    }
}

/// Read an export document, unpacking `conversations.json` from a zip bundle
pub fn load_document(path: &Path) -> Result<Value> {
    let file = File::open(path)
        .map_err(|e| SyncError::detection(path.display(), format!("unreadable: {}", e)))?;

    if is_zip(path) {
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
        let mut member = archive.by_name(EXPORT_MEMBER)?;
        let mut raw = String::new();
        member.read_to_string(&mut raw)?;
        return serde_json::from_str(&raw)
            .map_err(|e| SyncError::detection(path.display(), format!("invalid JSON: {}", e)));
    }

    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| SyncError::detection(path.display(), format!("invalid JSON: {}", e)))
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_directories() {
        let dir = tempdir().unwrap();
        let codex = dir.path().join("codex");
        std::fs::create_dir_all(codex.join("sessions")).unwrap();
        let projects = dir.path().join("projects");
        std::fs::create_dir_all(&projects).unwrap();

        assert_eq!(detect(&codex).unwrap(), SourceKind::Codex);
        assert_eq!(detect(&projects).unwrap(), SourceKind::ClaudeCode);
    }

    #[test]
    fn test_export_by_name() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("export.zip");
        std::fs::write(&zip_path, b"not inspected").unwrap();
        let named = dir.path().join("ChatGPT-history.json");
        std::fs::write(&named, b"[]").unwrap();

        assert_eq!(detect(&zip_path).unwrap(), SourceKind::ChatGptExport);
        assert_eq!(detect(&named).unwrap(), SourceKind::ChatGptExport);
    }

    #[test]
    fn test_export_by_content() {
        let dir = tempdir().unwrap();
        let claude = dir.path().join("conversations.json");
        std::fs::write(&claude, json!([{"uuid": "c1", "chat_messages": []}]).to_string()).unwrap();
        let gpt = dir.path().join("other.json");
        std::fs::write(&gpt, json!([{"id": "c1", "mapping": {}}]).to_string()).unwrap();
        let unknown = dir.path().join("unknown.json");
        std::fs::write(&unknown, json!([{"id": "c1"}]).to_string()).unwrap();

        assert_eq!(detect(&claude).unwrap(), SourceKind::ClaudeExport);
        assert_eq!(detect(&gpt).unwrap(), SourceKind::ChatGptExport);
        assert_eq!(detect(&unknown).unwrap(), SourceKind::ChatGptExport);
    }

    #[test]
    fn test_empty_or_unreadable_documents_fail() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, b"[]").unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, b"{not json").unwrap();

        assert!(matches!(detect(&empty), Err(SyncError::Detection { .. })));
        assert!(matches!(detect(&garbage), Err(SyncError::Detection { .. })));
        assert!(matches!(
            detect(&dir.path().join("missing.json")),
            Err(SyncError::Detection { .. })
        ));
    }

    #[test]
    fn test_load_zip_document() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("export.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(EXPORT_MEMBER, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(br#"[{"id": "z", "mapping": {}}]"#).unwrap();
        writer.finish().unwrap();

        let doc = load_document(&zip_path).unwrap();
        assert_eq!(doc[0]["id"], "z");
    }

    #[test]
    fn test_parse_kind_names() {
        assert_eq!("claude".parse::<SourceKind>().unwrap(), SourceKind::ClaudeExport);
        assert_eq!("chatgpt-export".parse::<SourceKind>().unwrap(), SourceKind::ChatGptExport);
        assert!("gemini".parse::<SourceKind>().is_err());
        assert_eq!(SourceKind::ClaudeExport.tag(), "claude");
    }
}
