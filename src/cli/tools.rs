//! Tool call listing

use anyhow::Result;

use super::{clip, short_time};
use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, query: Option<String>, limit: usize) -> Result<()> {
    let calls = store.find_tool_calls(query.as_deref(), limit)?;

    for call in &calls {
        let duration = call.duration_ms.map(|d| format!(" ({}ms)", d)).unwrap_or_default();
        println!("\n{}", "-".repeat(40));
        println!(
            "{} [{}]{} @ {}",
            call.tool_name,
            call.status,
            duration,
            short_time(call.created_at.as_deref())
        );
        println!("In:  {}", clip(call.input.as_deref().unwrap_or("null"), 100));
        println!("Out: {}", clip(call.output.as_deref().unwrap_or("null"), 100));
    }

    println!("\n{} tool calls", calls.len());
    Ok(())
}
