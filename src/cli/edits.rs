//! File edit history

use anyhow::Result;

use super::{clip, short_time};
use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, path: Option<String>, limit: usize) -> Result<()> {
    let edits = store.file_edits(path.as_deref(), limit)?;

    for edit in &edits {
        println!("\n{}", "-".repeat(40));
        println!(
            "{} [{}] @ {} ({})",
            edit.file_path,
            edit.edit_type,
            short_time(edit.created_at.as_deref()),
            &edit.conversation_id[..8.min(edit.conversation_id.len())]
        );
        if let Some(content) = &edit.content {
            println!("{}", clip(content, 200));
        }
    }

    println!("\n{} edits", edits.len());
    Ok(())
}
