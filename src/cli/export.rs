//! JSON export of the archive

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::store::ArchiveStore;

/// Write every conversation (optionally one source) as a JSON array; returns the count
pub fn write(store: &ArchiveStore, output: &Path, source: Option<&str>) -> Result<usize> {
    let conversations = store.export(source)?;
    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &conversations)?;
    writer.flush()?;
    Ok(conversations.len())
}

pub fn run(store: &ArchiveStore, output: &Path, source: Option<String>) -> Result<()> {
    let count = write(store, output, source.as_deref())?;
    println!("Exported {} conversations to {}", count, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{child_id, gen_id};
    use crate::model::{Conversation, Message, ParseResult};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn conversation(source: &str, key: &str) -> ParseResult {
        let id = gen_id(source, key);
        let mut result = ParseResult::new();
        result.messages.push(Message {
            id: child_id(source, &id, 0),
            conversation_id: id.clone(),
            role: "user".into(),
            content: format!("hello from {}", source),
            thinking: None,
            created_at: None,
            model: None,
            metadata: json!({}),
        });
        result.conversations.push(Conversation {
            id,
            source: source.into(),
            title: Some(key.into()),
            created_at: None,
            updated_at: None,
            model: None,
            cwd: None,
            git_branch: None,
            project_id: None,
            metadata: json!({}),
        });
        result
    }

    #[test]
    fn test_export_filters_by_source() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("convos.db");
        {
            let mut store = ArchiveStore::open(&db).unwrap();
            store.merge(conversation("claude", "a")).unwrap();
            store.merge(conversation("chatgpt", "b")).unwrap();
        }

        let store = ArchiveStore::open_read_only(&db).unwrap();
        let out = dir.path().join("claude.json");
        assert_eq!(write(&store, &out, Some("claude")).unwrap(), 1);

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc.as_array().unwrap().len(), 1);
        assert_eq!(doc[0]["title"], "a");
        assert_eq!(doc[0]["messages"][0]["content"], "hello from claude");

        let all = dir.path().join("all.json");
        assert_eq!(write(&store, &all, None).unwrap(), 2);
    }
}
