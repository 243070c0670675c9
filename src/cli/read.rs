//! Read command implementation

use anyhow::Result;

use super::clip;
use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, id: &str, thinking: bool, tools: bool) -> Result<()> {
    let conv = match store.get_conversation(id)? {
        Some(c) => c,
        None => {
            println!("Conversation '{}' not found.", id);
            return Ok(());
        }
    };

    println!("\n{}", "=".repeat(80));
    println!("[{}] {}", conv.source, conv.title.as_deref().unwrap_or("Untitled"));
    println!("ID: {}", conv.id);
    println!("Created: {}", conv.created_at.as_deref().unwrap_or("?"));
    if let Some(model) = &conv.model {
        println!("Model: {}", model);
    }
    if let Some(cwd) = &conv.cwd {
        println!("Directory: {}", cwd);
    }
    if let Some(branch) = &conv.git_branch {
        println!("Branch: {}", branch);
    }
    if let Some(project) = &conv.project_id {
        println!("Project: {}", project);
    }
    println!("{}", "=".repeat(80));

    let messages = store.messages(&conv.id)?;
    if messages.is_empty() {
        println!("\nNo messages found (this may be an empty conversation).");
    }

    for msg in &messages {
        let model_info = msg.model.as_deref().map(|m| format!(" | {}", m)).unwrap_or_default();
        println!(
            "\n[{}{}] ({})",
            msg.role.to_uppercase(),
            model_info,
            msg.created_at.as_deref().unwrap_or("?")
        );
        if thinking {
            if let Some(t) = &msg.thinking {
                println!("  [Thinking]\n{}\n", t);
            }
        }
        println!("{}", msg.content);
        println!("{}", "-".repeat(40));
    }

    if tools {
        let calls = store.tool_calls(&conv.id)?;
        if !calls.is_empty() {
            println!("\n{}\nTOOL CALLS ({})\n{}", "=".repeat(80), calls.len(), "=".repeat(80));
        }
        for call in calls {
            let duration = call.duration_ms.map(|d| format!(" ({}ms)", d)).unwrap_or_default();
            println!("\n{} [{}]{}", call.tool_name, call.status, duration);
            println!("In:  {}", clip(call.input.as_deref().unwrap_or("null"), 200));
            println!("Out: {}", clip(call.output.as_deref().unwrap_or("null"), 200));
        }
    }

    Ok(())
}
