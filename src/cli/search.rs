//! Search command implementation

use anyhow::Result;

use super::short_time;
use crate::store::{ArchiveStore, SearchQuery};

pub fn run(store: &ArchiveStore, query: SearchQuery) -> Result<()> {
    let hits = store.search(&query)?;

    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }

    for hit in &hits {
        let location = hit.cwd.as_deref().map(|c| format!(" @ {}", c)).unwrap_or_default();
        println!("\n{}", "=".repeat(60));
        println!(
            "[{}] {}{} ({})",
            hit.source,
            hit.title.as_deref().unwrap_or("Untitled"),
            location,
            &hit.conversation_id[..8.min(hit.conversation_id.len())]
        );
        println!("{} @ {}", hit.role, short_time(hit.created_at.as_deref()));
        println!("{}", "-".repeat(40));
        println!("{}", hit.snippet);
    }

    println!("\n{} results", hits.len());
    Ok(())
}
