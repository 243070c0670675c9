//! Bounded-concurrency job execution
//!
//! Jobs run on a `JoinSet` gated by a semaphore. Each job's failure is
//! captured against its label; siblings keep running. Results merge through
//! a single [`Merger`], and a job's watermark update is applied only after
//! its merge succeeds.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::planner::{Job, Work};
use super::state::{StateUpdate, SyncState};
use crate::detect::detect;
use crate::error::{Result, SyncError};
use crate::model::ParseResult;
use crate::probe::normalize_path;
use crate::remote::{Fetched, Transport};
use crate::store::{ArchiveStore, MergeReport};

/// Turns a planned unit of work into a batch of entities
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, work: Work) -> Result<Fetched>;
}

/// Parses files on the blocking pool and fetches APIs over `transport`
pub struct SourceRunner {
    transport: Arc<dyn Transport>,
}

impl SourceRunner {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

async fn blocking<F>(f: F) -> Result<Fetched>
where
    F: FnOnce() -> Result<ParseResult> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
        .map(Fetched::complete)
}

#[async_trait]
impl JobRunner for SourceRunner {
    async fn run(&self, work: Work) -> Result<Fetched> {
        match work {
            Work::Sessions { kind, root, files } => {
                blocking(move || normalize_path(kind, &root, Some(files.as_slice()))).await
            }
            Work::Import { path } => {
                blocking(move || {
                    let kind = detect(&path)?;
                    info!("importing {} as {}", path.display(), kind);
                    normalize_path(kind, &path, None)
                })
                .await
            }
            Work::Api { api, session, options } => api.fetch(self.transport.as_ref(), &session, &options).await,
        }
    }
}

/// Serializes every merge through the single writer connection
#[derive(Clone)]
pub struct Merger {
    store: Arc<Mutex<ArchiveStore>>,
}

impl Merger {
    pub fn new(store: ArchiveStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn merge(&self, batch: ParseResult) -> Result<MergeReport> {
        let mut store = self.store.lock().await;
        store.merge(batch)
    }

    /// Run `f` against the store while holding the writer lock
    pub async fn with_store<T>(&self, f: impl FnOnce(&mut ArchiveStore) -> Result<T>) -> Result<T> {
        let mut store = self.store.lock().await;
        f(&mut store)
    }
}

/// One job that ran to completion
#[derive(Debug)]
pub struct JobSummary {
    pub label: String,
    pub merged: MergeReport,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    /// Sum over every completed job
    pub merged: MergeReport,
    pub completed: Vec<JobSummary>,
    /// Failed jobs and unauthenticated web sources, by label
    pub failures: Vec<(String, SyncError)>,
}

type JobOutput = (String, Option<StateUpdate>, Result<(MergeReport, usize)>, Duration);

/// Run `jobs` with at most `max_jobs` in flight, applying each successful
/// job's watermark to `state`. A job that returns a partial batch has the
/// batch merged but its watermark withheld. A fatal error aborts the
/// remaining jobs.
pub async fn execute(
    jobs: Vec<Job>,
    runner: Arc<dyn JobRunner>,
    merger: &Merger,
    state: &mut SyncState,
    max_jobs: usize,
) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    if jobs.is_empty() {
        return Ok(report);
    }

    let permits = Arc::new(Semaphore::new(jobs.len().min(max_jobs.max(1))));
    let mut set: JoinSet<JobOutput> = JoinSet::new();

    for job in jobs {
        let runner = runner.clone();
        let merger = merger.clone();
        let permits = permits.clone();
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let started = Instant::now();
            let Job { label, work, update } = job;
            info!("syncing {}", label);
            let result = match runner.run(work).await {
                Ok(Fetched { result, failed }) => merger.merge(result).await.map(|m| (m, failed)),
                Err(e) => Err(e),
            };
            (label, update, result, started.elapsed())
        });
    }

    while let Some(joined) = set.join_next().await {
        let (label, update, result, elapsed) = match joined {
            Ok(output) => output,
            Err(e) => {
                error!("job panicked: {}", e);
                report.failures.push(("unknown".to_string(), SyncError::Task(e.to_string())));
                continue;
            }
        };

        match result {
            Ok((merged, failed)) if failed > 0 => {
                warn!(
                    "{}: merged {} but {} item(s) failed; watermark held",
                    label, merged.counts, failed
                );
                report.merged.add(&merged);
                report.failures.push((
                    label.clone(),
                    SyncError::Incomplete {
                        source_name: label,
                        failed,
                    },
                ));
            }
            Ok((merged, _)) => {
                info!(
                    "updated {} ({} new, {} updated convs; {} processed) in {:.2}s",
                    label,
                    merged.new_conversations,
                    merged.updated_conversations,
                    merged.counts,
                    elapsed.as_secs_f64()
                );
                if let Some(update) = update {
                    state.apply(update);
                }
                report.merged.add(&merged);
                report.completed.push(JobSummary { label, merged, elapsed });
            }
            Err(e) if e.is_fatal() => {
                error!("{} failed: {}", label, e);
                set.abort_all();
                return Err(e);
            }
            Err(e) => {
                warn!("{} failed: {}", label, e);
                report.failures.push((label, e));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{child_id, gen_id};
    use crate::model::{Conversation, Message};
    use crate::remote::testing::{FakeCredentials, FakeTransport};
    use crate::remote::{ApiKind, FetchOptions};
    use crate::sync::planner::Planner;
    use crate::sync::state::FileWatermark;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Fails for paths named `bad`, otherwise yields a one-message thread keyed by the path
    struct ScriptedRunner;

    #[async_trait]
    impl JobRunner for ScriptedRunner {
        async fn run(&self, work: Work) -> Result<Fetched> {
            let Work::Import { path } = work else {
                return Err(SyncError::Task("unexpected work".into()));
            };
            let key = path.display().to_string();
            if key == "bad" {
                return Err(SyncError::parse(key, "truncated export"));
            }
            let id = gen_id("claude", &key);
            let mut result = ParseResult::new();
            result.messages.push(Message {
                id: child_id("claude", &id, 0),
                conversation_id: id.clone(),
                role: "user".into(),
                content: "hello".into(),
                thinking: None,
                created_at: None,
                model: None,
                metadata: json!({}),
            });
            result.conversations.push(Conversation {
                id,
                source: "claude".into(),
                title: None,
                created_at: None,
                updated_at: None,
                model: None,
                cwd: None,
                git_branch: None,
                project_id: None,
                metadata: json!({}),
            });
            Ok(Fetched::complete(result))
        }
    }

    fn job(name: &str) -> Job {
        Job {
            label: name.to_string(),
            work: Work::Import {
                path: PathBuf::from(name),
            },
            update: Some(StateUpdate::Import(name.to_string(), FileWatermark::Latest { mtime: 1.0 })),
        }
    }

    #[tokio::test]
    async fn test_failing_job_is_isolated() {
        let dir = tempdir().unwrap();
        let merger = Merger::new(ArchiveStore::open(&dir.path().join("convos.db")).unwrap());
        let mut state = SyncState::default();

        let report = execute(
            vec![job("a"), job("bad"), job("b")],
            Arc::new(ScriptedRunner),
            &merger,
            &mut state,
            2,
        )
        .await
        .unwrap();

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "bad");
        assert_eq!(report.merged.new_conversations, 2);

        assert!(state.imports.contains_key("a"));
        assert!(state.imports.contains_key("b"));
        assert!(!state.imports.contains_key("bad"));

        let counts = merger.with_store(|s| s.counts()).await.unwrap();
        assert_eq!(counts.conversations, 2);
    }

    #[tokio::test]
    async fn test_zero_row_merge_still_advances_state() {
        struct Empty;
        #[async_trait]
        impl JobRunner for Empty {
            async fn run(&self, _work: Work) -> Result<Fetched> {
                Ok(Fetched::default())
            }
        }

        let dir = tempdir().unwrap();
        let merger = Merger::new(ArchiveStore::open(&dir.path().join("convos.db")).unwrap());
        let mut state = SyncState::default();
        let report = execute(vec![job("a")], Arc::new(Empty), &merger, &mut state, 4).await.unwrap();
        assert!(!report.merged.wrote_rows());
        assert!(state.imports.contains_key("a"));
    }

    fn claude_routes(with_detail: bool) -> FakeTransport {
        let base = "https://claude.ai";
        let listed = json!([{"uuid": "u1", "updated_at": "2024-03-02T00:00:00Z"}]);
        let transport = FakeTransport::default()
            .route(&format!("{}/api/organizations", base), json!([{"uuid": "org"}]))
            .route(
                &format!("{}/api/organizations/org/chat_conversations?limit=1&offset=0", base),
                listed.clone(),
            )
            .route(
                &format!("{}/api/organizations/org/chat_conversations?limit=100&offset=0", base),
                listed,
            );
        if !with_detail {
            return transport;
        }
        transport.route(
            &format!("{}/api/organizations/org/chat_conversations/u1", base),
            json!({"uuid": "u1", "name": "kept", "chat_messages": [
                {"uuid": "m1", "sender": "human", "text": "hello"}
            ]}),
        )
    }

    async fn claude_cycle(transport: FakeTransport, merger: &Merger, state: SyncState) -> (CycleReport, SyncState) {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let creds = FakeCredentials::default().with("safari", "claude.ai");
        let planner = Planner {
            local: vec![],
            imports: vec![],
            apis: vec![ApiKind::Claude],
            profiles: vec!["safari".to_string()],
            transport: transport.as_ref(),
            credentials: &creds,
            fetch: FetchOptions::default(),
        };
        let plan = planner.plan(state).await;
        let mut state = plan.state;
        let runner = Arc::new(SourceRunner::new(transport.clone()));
        let report = execute(plan.jobs, runner, merger, &mut state, 4).await.unwrap();
        (report, state)
    }

    #[tokio::test]
    async fn test_failed_detail_holds_api_watermark() {
        let dir = tempdir().unwrap();
        let merger = Merger::new(ArchiveStore::open(&dir.path().join("convos.db")).unwrap());

        let (report, state) = claude_cycle(claude_routes(false), &merger, SyncState::default()).await;
        assert!(report.completed.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].1, SyncError::Incomplete { failed: 1, .. }));
        assert!(!state.web.contains_key("claude"));

        // the conversation is fetched once its detail is served
        let (report, state) = claude_cycle(claude_routes(true), &merger, state).await;
        assert!(report.failures.is_empty());
        assert_eq!(report.merged.new_conversations, 1);
        assert_eq!(
            state.web["claude"].last_updated_watermark.as_deref(),
            Some("2024-03-02T00:00:00Z")
        );
        let counts = merger.with_store(|s| s.counts()).await.unwrap();
        assert_eq!(counts.conversations, 1);
    }
}
