//! Persisted watermark document
//!
//! ```json
//! {"local":   {"codex": {"files": {"/path/a.jsonl": 1717000000.5}}},
//!  "web":     {"claude": {"credentialProfile": "safari", "fingerprint": "u1:2024-...",
//!                         "lastUpdatedWatermark": "2024-..."}},
//!  "imports": {"/path/export.zip": {"mtime": 1717000000.0}}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileWatermark {
    /// Per-file modification times (session-log sources)
    Files { files: BTreeMap<String, f64> },
    /// Newest modification time (exports and imports)
    Latest { mtime: f64 },
}

impl FileWatermark {
    /// Stored mtime for one session file; 0 when unknown
    pub fn file(&self, path: &str) -> f64 {
        match self {
            FileWatermark::Files { files } => files.get(path).copied().unwrap_or(0.0),
            FileWatermark::Latest { .. } => 0.0,
        }
    }

    pub fn latest(&self) -> f64 {
        match self {
            FileWatermark::Files { files } => files.values().copied().fold(0.0, f64::max),
            FileWatermark::Latest { mtime } => *mtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWatermark {
    /// Profile that last authenticated successfully
    pub credential_profile: String,
    /// `mostRecentNativeId:mostRecentUpdateTimestamp`; `None` for an empty account
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_watermark: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub local: BTreeMap<String, FileWatermark>,
    #[serde(default)]
    pub web: BTreeMap<String, ApiWatermark>,
    #[serde(default)]
    pub imports: BTreeMap<String, FileWatermark>,
}

/// Watermark change produced by a planned job, applied once it succeeds
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    Local(String, FileWatermark),
    Web(String, ApiWatermark),
    Import(String, FileWatermark),
}

impl SyncState {
    /// Read the document; a missing or unreadable one starts empty
    pub fn load(path: &Path) -> SyncState {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("no sync state at {}: {}", path.display(), e);
                return SyncState::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("ignoring corrupt sync state {}: {}", path.display(), e);
            SyncState::default()
        })
    }

    /// Write via a temporary sibling and rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(path);
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Apply an update; true when the state changed
    pub fn apply(&mut self, update: StateUpdate) -> bool {
        match update {
            StateUpdate::Local(k, v) => replace(&mut self.local, k, v),
            StateUpdate::Web(k, v) => replace(&mut self.web, k, v),
            StateUpdate::Import(k, v) => replace(&mut self.imports, k, v),
        }
    }
}

fn replace<V: PartialEq>(section: &mut BTreeMap<String, V>, key: String, value: V) -> bool {
    if section.get(&key) == Some(&value) {
        return false;
    }
    section.insert(key, value);
    true
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Modification time in fractional seconds since the epoch; 0 when unavailable
pub fn mtime(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
