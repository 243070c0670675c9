//! Incremental sync cycle
//!
//! plan (watermarks and probes) -> execute (bounded jobs) -> merge ->
//! rebuild search index -> persist watermarks.

pub mod executor;
pub mod planner;
pub mod state;

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::detect::SourceKind;
use crate::error::{Result, SyncError};
use crate::remote::{ApiKind, CredentialProvider, FetchOptions, Transport};
use crate::store::ArchiveStore;

pub use executor::{execute, CycleReport, JobRunner, JobSummary, Merger, SourceRunner};
pub use planner::{expand_imports, Job, LocalSource, Plan, Planner, Work};
pub use state::{ApiWatermark, FileWatermark, StateUpdate, SyncState};

/// Per-invocation switches layered over the config
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub claude_code: bool,
    pub codex: bool,
    pub web: bool,
    /// Cap on conversations fetched per web source
    pub limit: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            claude_code: true,
            codex: true,
            web: true,
            limit: None,
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_default()
}

/// Session-log roots to watch, honouring config overrides
pub fn local_sources(config: &Config, options: &SyncOptions) -> Vec<LocalSource> {
    let mut sources = vec![];
    if options.claude_code && config.is_source_enabled(SourceKind::ClaudeCode.as_str()) {
        sources.push(LocalSource {
            kind: SourceKind::ClaudeCode,
            root: config
                .source_path(SourceKind::ClaudeCode.as_str())
                .unwrap_or_else(|| home().join(".claude").join("projects")),
        });
    }
    if options.codex && config.is_source_enabled(SourceKind::Codex.as_str()) {
        let root = config
            .source_path(SourceKind::Codex.as_str())
            .or_else(|| std::env::var_os("CODEX_HOME").map(PathBuf::from))
            .unwrap_or_else(|| home().join(".codex"));
        sources.push(LocalSource {
            kind: SourceKind::Codex,
            root,
        });
    }
    sources
}

pub fn api_sources(config: &Config, options: &SyncOptions) -> Vec<ApiKind> {
    if !options.web {
        return vec![];
    }
    ApiKind::ALL
        .into_iter()
        .filter(|api| config.is_source_enabled(api.name()))
        .collect()
}

/// Run one full sync cycle against the configured database.
///
/// Fails only when the cycle as a whole cannot proceed (another writer holds
/// the database, or the state cannot be saved); per-source failures are
/// reported in [`CycleReport::failures`].
pub async fn run_cycle(
    config: &Config,
    options: &SyncOptions,
    transport: Arc<dyn Transport>,
    credentials: &dyn CredentialProvider,
) -> Result<CycleReport> {
    let store = ArchiveStore::open(&config.database_path())?;
    let state_path = config.state_path();
    let loaded = SyncState::load(&state_path);

    let planner = Planner {
        local: local_sources(config, options),
        imports: expand_imports(&config.import_patterns()),
        apis: api_sources(config, options),
        profiles: config.credentials.profiles.clone(),
        transport: transport.as_ref(),
        credentials,
        fetch: FetchOptions {
            limit: options.limit,
            page_size: config.sync.page_size,
            workers: config.sync.detail_workers,
            since: None,
        },
    };
    let Plan {
        jobs,
        mut state,
        failures,
    } = planner.plan(loaded.clone()).await;

    let merger = Merger::new(store);
    let runner = Arc::new(SourceRunner::new(transport.clone()));
    let mut report = execute(jobs, runner, &merger, &mut state, config.sync.max_jobs).await?;
    report.failures.extend(failures.into_iter().map(|e| {
        let label = match &e {
            SyncError::Credential { source_name, .. } => source_name.clone(),
            _ => "plan".to_string(),
        };
        (label, e)
    }));

    let wrote = report.merged.wrote_rows();
    merger
        .with_store(|store| {
            if wrote {
                info!("rebuilding search index");
                store.rebuild_search_index()?;
            }
            store.set_meta("last_sync_at", &Utc::now().to_rfc3339())
        })
        .await?;

    if state != loaded {
        state.save(&state_path)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    #[test]
    fn test_disabled_sources_are_not_planned() {
        let mut config = Config::default();
        config.sources.insert(
            "codex".to_string(),
            SourceConfig {
                enabled: true,
                status: Some("deprecated".to_string()),
                base_path: None,
            },
        );
        config.sources.insert(
            "claude-code".to_string(),
            SourceConfig {
                enabled: true,
                status: None,
                base_path: Some("/data/claude".to_string()),
            },
        );

        let local = local_sources(&config, &SyncOptions::default());
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].kind, SourceKind::ClaudeCode);
        assert_eq!(local[0].root, PathBuf::from("/data/claude"));

        let options = SyncOptions {
            web: false,
            ..Default::default()
        };
        assert!(api_sources(&config, &options).is_empty());
        assert_eq!(api_sources(&config, &SyncOptions::default()).len(), 2);
    }
}
