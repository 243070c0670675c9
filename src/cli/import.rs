//! One-off import of an export file or session directory

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::detect::{detect, SourceKind};
use crate::probe::normalize_path;
use crate::store::ArchiveStore;

/// Parse `path` and merge it without touching sync watermarks
pub fn run(db_path: &Path, path: &Path, source: Option<SourceKind>) -> Result<()> {
    let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
    let kind = match source {
        Some(kind) => kind,
        None => detect(&path)?,
    };
    println!("Importing {} as {}", path.display(), kind);

    let batch = normalize_path(kind, &path, None).with_context(|| format!("parsing {}", path.display()))?;
    let mut store = ArchiveStore::open(db_path)?;
    let report = store.merge(batch)?;
    if report.wrote_rows() {
        store.rebuild_search_index()?;
    }

    println!(
        "Imported {} new, {} updated convs; {} processed",
        report.new_conversations, report.updated_conversations, report.counts
    );
    Ok(())
}
