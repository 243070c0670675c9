//! List command implementation

use anyhow::Result;
use chrono::{Duration, Utc};

use super::{clip, short_time};
use crate::store::{ArchiveStore, ConversationFilter};

pub fn run(
    store: &ArchiveStore,
    source: Option<String>,
    cwd: Option<String>,
    days: Option<i64>,
    limit: usize,
) -> Result<()> {
    let filter = ConversationFilter {
        source,
        cwd,
        since: days.map(|d| Utc::now() - Duration::days(d)),
        limit,
    };
    let conversations = store.list_conversations(&filter)?;

    if conversations.is_empty() {
        println!("No conversations found. Run 'convos sync' first.");
        return Ok(());
    }

    println!(
        "{:<10} {:<12} {:<16} {:>5}  {}",
        "ID", "Source", "Updated", "Msgs", "Title"
    );
    println!("{}", "-".repeat(100));

    for conv in &conversations {
        let title = conv
            .title
            .as_deref()
            .map(|t| clip(t, 40))
            .unwrap_or_else(|| "Untitled".to_string());

        let mut location = String::new();
        if let Some(cwd) = &conv.cwd {
            location.push_str(&format!(" [{}]", cwd));
        }
        if let Some(branch) = &conv.git_branch {
            location.push_str(&format!(" ({})", branch));
        }

        println!(
            "{:<10} {:<12} {:<16} {:>5}  {}{}",
            &conv.id[..8.min(conv.id.len())],
            conv.source,
            short_time(conv.updated_at.as_deref().or(conv.created_at.as_deref())),
            conv.message_count,
            title,
            location,
        );
    }

    println!("\n{} conversations", conversations.len());
    Ok(())
}
