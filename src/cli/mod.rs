//! Command implementations

pub mod doctor;
pub mod edits;
pub mod export;
pub mod get;
pub mod import;
pub mod list;
pub mod read;
pub mod search;
pub mod stats;
pub mod sync;
pub mod tools;

use anyhow::{bail, Result};
use std::path::Path;

use crate::store::ArchiveStore;

/// Open the archive for a query command
pub fn open_archive(path: &Path) -> Result<ArchiveStore> {
    if !path.exists() {
        bail!("Database not found at {}. Run `convos sync` first.", path.display());
    }
    Ok(ArchiveStore::open_read_only(path)?)
}

/// First line of `text`, cut to `max` characters
pub fn clip(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// `2024-01-15T10:00:00+00:00` as `2024-01-15 10:00`
pub fn short_time(ts: Option<&str>) -> String {
    match ts {
        Some(ts) if ts.len() >= 16 => format!("{} {}", &ts[..10], &ts[11..16]),
        Some(ts) => ts.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("first line\nsecond", 40), "first line");
        assert_eq!(clip("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_short_time() {
        assert_eq!(short_time(Some("2024-01-15T10:00:00+00:00")), "2024-01-15 10:00");
        assert_eq!(short_time(None), "-");
    }
}
