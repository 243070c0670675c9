//! Incremental read: messages after a timestamp or a known message

use anyhow::{bail, Result};

use crate::probe::parse_iso;
use crate::store::ArchiveStore;

/// Later of `--since` and the time of the `--after` message, in stored form.
/// `Ok(None)` with `after` set means the message was not found.
pub fn window_start(
    store: &ArchiveStore,
    conversation_id: &str,
    since: Option<&str>,
    after: Option<&str>,
) -> Result<Option<Option<String>>> {
    let since = match since {
        Some(s) => match parse_iso(s) {
            Some(t) => Some(t.to_rfc3339()),
            None => bail!("Invalid --since timestamp: {}", s),
        },
        None => None,
    };
    let after = match after {
        Some(prefix) => match store.message_time(conversation_id, prefix)? {
            Some(t) => Some(t),
            None => return Ok(None),
        },
        None => None,
    };
    Ok(Some(since.into_iter().chain(after).max()))
}

pub fn run(
    store: &ArchiveStore,
    id: &str,
    since: Option<String>,
    after: Option<String>,
    limit: usize,
    thinking: bool,
) -> Result<()> {
    let Some(conv) = store.get_conversation(id)? else {
        println!("Conversation '{}' not found.", id);
        return Ok(());
    };
    let Some(start) = window_start(store, &conv.id, since.as_deref(), after.as_deref())? else {
        println!("After message not found or missing timestamp");
        return Ok(());
    };
    let messages = store.messages_after(&conv.id, start.as_deref(), limit)?;

    println!("{}", "=".repeat(60));
    println!("[{}] {}", conv.source, conv.title.as_deref().unwrap_or("Untitled"));
    println!("ID: {}", conv.id);
    println!("{}", "=".repeat(60));

    for msg in &messages {
        let model_info = msg.model.as_deref().map(|m| format!(" [{}]", m)).unwrap_or_default();
        println!(
            "\n--- {}{} @ {} ({}) ---",
            msg.role.to_uppercase(),
            model_info,
            msg.created_at.as_deref().unwrap_or("?"),
            &msg.id[..8.min(msg.id.len())]
        );
        println!("{}", msg.content);
        if thinking {
            if let Some(t) = &msg.thinking {
                println!("\n[THINKING]\n{}", t);
            }
        }
    }

    println!("\n{} messages", messages.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{child_id, gen_id};
    use crate::model::{Conversation, Message, ParseResult};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    fn session(turns: u32) -> ParseResult {
        let id = gen_id("claude-code", "s1");
        let mut result = ParseResult::new();
        for i in 0..turns {
            result.messages.push(Message {
                id: child_id("claude-code", &id, i),
                conversation_id: id.clone(),
                role: "user".into(),
                content: format!("turn {}", i),
                thinking: None,
                created_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, i, 0).unwrap()),
                model: None,
                metadata: json!({}),
            });
        }
        result.conversations.push(Conversation {
            id,
            source: "claude-code".into(),
            title: None,
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
    fn test_window_start_takes_the_later_bound() {
        let dir = tempdir().unwrap();
        let mut store = ArchiveStore::open(&dir.path().join("convos.db")).unwrap();
        store.merge(session(5)).unwrap();
        let conv_id = gen_id("claude-code", "s1");
        let third = child_id("claude-code", &conv_id, 2);

        let start = window_start(&store, &conv_id, None, Some(&third[..10])).unwrap().unwrap();
        let rest = store.messages_after(&conv_id, start.as_deref(), 50).unwrap();
        assert_eq!(rest.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), vec!["turn 3", "turn 4"]);

        let start = window_start(&store, &conv_id, Some("2024-01-15T10:03:30Z"), Some(&third)).unwrap().unwrap();
        assert_eq!(store.messages_after(&conv_id, start.as_deref(), 50).unwrap().len(), 1);

        assert_eq!(window_start(&store, &conv_id, None, Some("zzzz")).unwrap(), None);
        assert!(window_start(&store, &conv_id, Some("yesterday"), None).is_err());
        assert_eq!(window_start(&store, &conv_id, None, None).unwrap(), Some(None));
    }
}
