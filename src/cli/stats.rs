//! Stats command implementation

use anyhow::Result;

use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore) -> Result<()> {
    let by_source = store.counts_by_source()?;
    let totals = store.counts()?;

    println!("Database: {}", store.path().display());
    if let Ok(meta) = std::fs::metadata(store.path()) {
        println!("Size: {:.1} MB", meta.len() as f64 / (1024.0 * 1024.0));
    }
    println!(
        "Last sync: {}",
        store.meta("last_sync_at")?.as_deref().unwrap_or("never")
    );

    println!("\n{:<14} {:>8} {:>10}", "Source", "Convs", "Messages");
    println!("{}", "-".repeat(34));
    for (source, counts) in &by_source {
        println!("{:<14} {:>8} {:>10}", source, counts.conversations, counts.messages);
    }

    println!("\nTotal: {}", totals);
    Ok(())
}
