//! Change detection
//!
//! Decides per source whether anything changed since the last cycle and
//! emits a [`Job`] for each source that needs work. The planner takes the
//! watermark state by value and hands back the updated copy; it never
//! persists anything.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::state::{mtime, ApiWatermark, FileWatermark, StateUpdate, SyncState};
use crate::detect::SourceKind;
use crate::error::SyncError;
use crate::probe::{parse_iso, session_files};
use crate::remote::{ApiKind, CredentialProvider, FetchOptions, Session, Transport};

/// Local session-log root
#[derive(Debug, Clone)]
pub struct LocalSource {
    pub kind: SourceKind,
    pub root: PathBuf,
}

impl LocalSource {
    fn session_root(&self) -> PathBuf {
        match self.kind {
            SourceKind::Codex => self.root.join("sessions"),
            _ => self.root.clone(),
        }
    }
}

/// What a job does when run
#[derive(Debug, Clone)]
pub enum Work {
    /// Re-parse only these session files
    Sessions {
        kind: SourceKind,
        root: PathBuf,
        files: Vec<PathBuf>,
    },
    /// Detect and parse an ad-hoc path in full
    Import { path: PathBuf },
    /// Fetch from a web API under an authenticated session
    Api {
        api: ApiKind,
        session: Session,
        options: FetchOptions,
    },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub label: String,
    pub work: Work,
    /// Applied to the state only once the job has been merged
    pub update: Option<StateUpdate>,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub jobs: Vec<Job>,
    /// Input state plus updates that need no job (profile preferences)
    pub state: SyncState,
    /// One aggregated credential error per web source that could not authenticate
    pub failures: Vec<SyncError>,
}

pub struct Planner<'a> {
    pub local: Vec<LocalSource>,
    pub imports: Vec<PathBuf>,
    pub apis: Vec<ApiKind>,
    /// Credential profiles in configured order
    pub profiles: Vec<String>,
    pub transport: &'a dyn Transport,
    pub credentials: &'a dyn CredentialProvider,
    /// Template for API jobs; `since` is filled per source
    pub fetch: FetchOptions,
}

impl Planner<'_> {
    pub async fn plan(&self, mut state: SyncState) -> Plan {
        let mut jobs = vec![];
        let mut failures = vec![];

        for path in &self.imports {
            jobs.extend(plan_import(path, &state));
        }
        for source in &self.local {
            jobs.extend(plan_local(source, &state));
        }
        for api in &self.apis {
            match self.plan_api(*api, &mut state).await {
                Ok(job) => jobs.extend(job),
                Err(e) => {
                    warn!("{} sync skipped: {}", api, e);
                    failures.push(e);
                }
            }
        }

        info!("planned {} job(s)", jobs.len());
        Plan { jobs, state, failures }
    }

    async fn plan_api(&self, api: ApiKind, state: &mut SyncState) -> Result<Option<Job>, SyncError> {
        let stored = state.web.get(api.name()).cloned();
        let order = profile_order(stored.as_ref().map(|s| s.credential_profile.as_str()), &self.profiles);
        let mut failures = vec![];

        for profile in order {
            let probed = async {
                let session = api.connect(self.transport, self.credentials, &profile).await?;
                let probe = api.probe(self.transport, &session).await?;
                Ok::<_, SyncError>((session, probe))
            }
            .await;
            let (session, probe) = match probed {
                Ok(p) => p,
                Err(SyncError::Credential { failures: inner, .. }) => {
                    failures.push(format!("{}: {}", profile, inner.join("; ")));
                    continue;
                }
                Err(e) => {
                    failures.push(format!("{}: {}", profile, e));
                    continue;
                }
            };

            let watermark = ApiWatermark {
                credential_profile: profile.clone(),
                fingerprint: probe.fingerprint.clone(),
                last_updated_watermark: probe.last_updated.clone().filter(|_| api.filters_by_update()),
            };

            if let Some(prev) = &stored {
                if prev.fingerprint == probe.fingerprint {
                    debug!("{}: unchanged ({})", api, probe.fingerprint.as_deref().unwrap_or("empty"));
                    state.apply(StateUpdate::Web(api.name().to_string(), watermark));
                    return Ok(None);
                }
            }

            let since = if api.filters_by_update() {
                stored
                    .as_ref()
                    .and_then(|s| s.last_updated_watermark.as_deref())
                    .and_then(parse_iso)
            } else {
                None
            };
            return Ok(Some(Job {
                label: api.name().to_string(),
                work: Work::Api {
                    api,
                    session,
                    options: FetchOptions {
                        since,
                        ..self.fetch.clone()
                    },
                },
                update: Some(StateUpdate::Web(api.name().to_string(), watermark)),
            }));
        }

        Err(SyncError::Credential {
            source_name: api.name().to_string(),
            failures,
        })
    }
}

/// Last successful profile first, then the configured order
fn profile_order(preferred: Option<&str>, configured: &[String]) -> Vec<String> {
    preferred
        .map(String::from)
        .into_iter()
        .chain(configured.iter().filter(|p| Some(p.as_str()) != preferred).cloned())
        .collect()
}

fn plan_local(source: &LocalSource, state: &SyncState) -> Option<Job> {
    if !source.root.exists() {
        debug!("{}: {} not found", source.kind, source.root.display());
        return None;
    }
    let name = source.kind.as_str();
    let files = session_files(&source.session_root());
    let current: BTreeMap<String, f64> = files
        .iter()
        .map(|f| (f.display().to_string(), mtime(f)))
        .collect();

    let changed: Vec<PathBuf> = match state.local.get(name) {
        Some(prev) => files
            .into_iter()
            .filter(|f| current[&f.display().to_string()] > prev.file(&f.display().to_string()))
            .collect(),
        None => files,
    };
    if changed.is_empty() {
        debug!("{}: no changed sessions", name);
        return None;
    }

    info!("{}: {} changed session file(s)", name, changed.len());
    Some(Job {
        label: name.to_string(),
        work: Work::Sessions {
            kind: source.kind,
            root: source.root.clone(),
            files: changed,
        },
        update: Some(StateUpdate::Local(name.to_string(), FileWatermark::Files { files: current })),
    })
}

fn plan_import(path: &Path, state: &SyncState) -> Option<Job> {
    if !path.exists() {
        debug!("import {} not found", path.display());
        return None;
    }
    let newest = if path.is_dir() {
        session_files(path).iter().map(|f| mtime(f)).fold(0.0, f64::max)
    } else {
        mtime(path)
    };
    let key = path.display().to_string();
    let stored = state.imports.get(&key).map(FileWatermark::latest).unwrap_or(0.0);
    if newest <= stored {
        return None;
    }

    Some(Job {
        label: format!("import:{}", key),
        work: Work::Import {
            path: path.to_path_buf(),
        },
        update: Some(StateUpdate::Import(key, FileWatermark::Latest { mtime: newest })),
    })
}

/// Expand `~` and glob patterns into existing paths, keeping pattern order
pub fn expand_imports(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = vec![];
    for pattern in patterns {
        let expanded = shellexpand::tilde(pattern).to_string();
        let matches = match glob::glob(&expanded) {
            Ok(m) => m.filter_map(|p| p.ok()).collect::<Vec<_>>(),
            Err(e) => {
                warn!("invalid import pattern {}: {}", pattern, e);
                continue;
            }
        };
        if matches.is_empty() {
            debug!("import pattern {} matched nothing", pattern);
        }
        for p in matches {
            if !paths.contains(&p) {
                paths.push(p);
            }
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{FakeCredentials, FakeTransport};
    use serde_json::json;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    const CHATGPT: &str = "https://chatgpt.com";

    fn touch(path: &Path, secs_ahead: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs_ahead)).unwrap();
    }

    fn planner<'a>(transport: &'a FakeTransport, creds: &'a FakeCredentials) -> Planner<'a> {
        Planner {
            local: vec![],
            imports: vec![],
            apis: vec![],
            profiles: vec!["safari".to_string(), "chrome".to_string()],
            transport,
            credentials: creds,
            fetch: FetchOptions::default(),
        }
    }

    fn chatgpt_routes(fingerprint_id: &str) -> FakeTransport {
        FakeTransport::default()
            .route(&format!("{}/api/auth/session", CHATGPT), json!({"user": {"id": "u"}}))
            .route(
                &format!("{}/backend-api/conversations?offset=0&limit=1", CHATGPT),
                json!({"items": [{"id": fingerprint_id, "update_time": 1700000000.0}], "total": 1}),
            )
    }

    fn stored_chatgpt(profile: &str, fingerprint: &str) -> SyncState {
        let mut state = SyncState::default();
        state.web.insert(
            "chatgpt".to_string(),
            ApiWatermark {
                credential_profile: profile.to_string(),
                fingerprint: Some(fingerprint.to_string()),
                last_updated_watermark: None,
            },
        );
        state
    }

    #[tokio::test]
    async fn test_local_gating_on_file_mtimes() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("-work-demo");
        std::fs::create_dir_all(&project).unwrap();
        let first = project.join("s1.jsonl");
        std::fs::write(&first, "{}\n").unwrap();

        let transport = FakeTransport::default();
        let creds = FakeCredentials::default();
        let mut planner = planner(&transport, &creds);
        planner.local.push(LocalSource {
            kind: SourceKind::ClaudeCode,
            root: dir.path().to_path_buf(),
        });

        let plan = planner.plan(SyncState::default()).await;
        assert_eq!(plan.jobs.len(), 1);
        let mut state = plan.state;
        state.apply(plan.jobs[0].update.clone().unwrap());

        // nothing changed
        assert!(planner.plan(state.clone()).await.jobs.is_empty());

        // a new file is planned alone
        let second = project.join("s2.jsonl");
        std::fs::write(&second, "{}\n").unwrap();
        touch(&second, 5);
        let plan = planner.plan(state).await;
        match &plan.jobs[0].work {
            Work::Sessions { files, .. } => assert_eq!(files, &vec![second.clone()]),
            other => panic!("unexpected work: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_gating() {
        let dir = tempdir().unwrap();
        let export = dir.path().join("conversations.json");
        std::fs::write(&export, "[]").unwrap();

        let transport = FakeTransport::default();
        let creds = FakeCredentials::default();
        let mut planner = planner(&transport, &creds);
        planner.imports = expand_imports(&[format!("{}/*.json", dir.path().display())]);
        assert_eq!(planner.imports, vec![export.clone()]);

        let plan = planner.plan(SyncState::default()).await;
        assert_eq!(plan.jobs.len(), 1);
        let mut state = plan.state;
        state.apply(plan.jobs[0].update.clone().unwrap());
        assert!(planner.plan(state.clone()).await.jobs.is_empty());

        touch(&export, 5);
        assert_eq!(planner.plan(state).await.jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_probe_persists_profile_only() {
        let transport = chatgpt_routes("c1");
        // safari has no cookies; chrome does
        let creds = FakeCredentials::default().with("chrome", "chatgpt.com");
        let mut planner = planner(&transport, &creds);
        planner.apis.push(ApiKind::ChatGpt);

        let plan = planner.plan(stored_chatgpt("safari", "c1:1700000000.0")).await;
        assert!(plan.jobs.is_empty());
        assert!(plan.failures.is_empty());
        assert_eq!(plan.state.web["chatgpt"].credential_profile, "chrome");
    }

    #[tokio::test]
    async fn test_changed_probe_plans_fetch() {
        let transport = chatgpt_routes("c2");
        let creds = FakeCredentials::default().with("safari", "chatgpt.com");
        let mut planner = planner(&transport, &creds);
        planner.apis.push(ApiKind::ChatGpt);

        let input = stored_chatgpt("safari", "c1:1700000000.0");
        let plan = planner.plan(input.clone()).await;
        assert_eq!(plan.jobs.len(), 1);
        // the new fingerprint waits for the job to succeed
        assert_eq!(plan.state, input);
        match &plan.jobs[0].update {
            Some(StateUpdate::Web(name, w)) => {
                assert_eq!(name, "chatgpt");
                assert_eq!(w.fingerprint.as_deref(), Some("c2:1700000000.0"));
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_claude_fetch_uses_stored_watermark() {
        let base = "https://claude.ai";
        let transport = FakeTransport::default()
            .route(&format!("{}/api/organizations", base), json!([{"uuid": "org"}]))
            .route(
                &format!("{}/api/organizations/org/chat_conversations?limit=1&offset=0", base),
                json!([{"uuid": "u2", "updated_at": "2024-03-02T00:00:00Z"}]),
            );
        let creds = FakeCredentials::default().with("safari", "claude.ai");
        let mut planner = planner(&transport, &creds);
        planner.apis.push(ApiKind::Claude);

        let mut state = SyncState::default();
        state.web.insert(
            "claude".to_string(),
            ApiWatermark {
                credential_profile: "safari".to_string(),
                fingerprint: Some("u1:2024-03-01T00:00:00Z".to_string()),
                last_updated_watermark: Some("2024-03-01T00:00:00Z".to_string()),
            },
        );

        let plan = planner.plan(state).await;
        match &plan.jobs[0].work {
            Work::Api { options, .. } => {
                assert_eq!(options.since, parse_iso("2024-03-01T00:00:00Z"));
            }
            other => panic!("unexpected work: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_profiles_failing_aggregates() {
        let transport = FakeTransport::default();
        let creds = FakeCredentials::default();
        let mut planner = planner(&transport, &creds);
        planner.apis = vec![ApiKind::Claude];

        let plan = planner.plan(SyncState::default()).await;
        assert!(plan.jobs.is_empty());
        assert_eq!(plan.failures.len(), 1);
        match &plan.failures[0] {
            SyncError::Credential { source_name, failures } => {
                assert_eq!(source_name, "claude");
                assert_eq!(failures.len(), 2);
                assert!(failures[0].starts_with("safari"));
                assert!(failures[1].starts_with("chrome"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_profile_order() {
        let configured = vec!["safari".to_string(), "chrome".to_string()];
        assert_eq!(profile_order(Some("chrome"), &configured), vec!["chrome", "safari"]);
        assert_eq!(profile_order(None, &configured), vec!["safari", "chrome"]);
    }
}
