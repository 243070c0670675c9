use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

use convos::config::{Config, SourceConfig};
use convos::remote::{CookieFile, HttpClient, Transport};
use convos::store::{ArchiveStore, SearchQuery};
use convos::sync::{run_cycle, SyncOptions, SyncState};

fn event(i: usize) -> String {
    let (kind, content) = if i % 2 == 0 {
        ("user", json!(format!("question {} about the continuation", i)))
    } else {
        ("assistant", json!([{"type": "text", "text": format!("answer {}", i)}]))
    };
    json!({
        "type": kind,
        "sessionId": "sess-1",
        "cwd": "/work/demo",
        "gitBranch": "main",
        "timestamp": format!("2024-01-15T10:00:{:02}Z", i),
        "message": {"role": kind, "model": "claude-sonnet", "content": content}
    })
    .to_string()
}

fn append(path: &Path, range: std::ops::Range<usize>, secs_ahead: u64) {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
    for i in range {
        writeln!(file, "{}", event(i)).unwrap();
    }
    file.set_modified(SystemTime::now() + Duration::from_secs(secs_ahead)).unwrap();
}

fn config(root: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = root.join("convos.db").display().to_string();
    config.credentials.cookie_file = root.join("cookies.yaml").display().to_string();
    config.sources.insert(
        "claude-code".to_string(),
        SourceConfig {
            enabled: true,
            status: None,
            base_path: Some(root.join("projects").display().to_string()),
        },
    );
    config
}

fn options() -> SyncOptions {
    SyncOptions {
        codex: false,
        web: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_session_continuation_merges_without_duplicates() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let session = dir.path().join("projects").join("-work-demo").join("sess-1.jsonl");
    std::fs::create_dir_all(session.parent().unwrap()).unwrap();

    let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(Duration::from_secs(1), 0).unwrap());
    let credentials = CookieFile::new(config.cookie_file());

    append(&session, 0..3, 0);
    let first = run_cycle(&config, &options(), transport.clone(), &credentials).await.unwrap();
    assert!(first.failures.is_empty());
    assert_eq!(first.merged.new_conversations, 1);
    assert_eq!(first.merged.counts.messages, 3);

    append(&session, 3..6, 10);
    let second = run_cycle(&config, &options(), transport.clone(), &credentials).await.unwrap();
    assert_eq!(second.merged.new_conversations, 0);
    assert_eq!(second.merged.updated_conversations, 1);

    // unchanged files plan no work
    let third = run_cycle(&config, &options(), transport.clone(), &credentials).await.unwrap();
    assert!(third.completed.is_empty());

    let store = ArchiveStore::open_read_only(&config.database_path()).unwrap();
    let counts = store.counts().unwrap();
    assert_eq!(counts.conversations, 1);
    assert_eq!(counts.messages, 6);

    let hits = store
        .search(&SearchQuery {
            text: "continuation".to_string(),
            source: Some("claude-code".to_string()),
            role: None,
            limit: 10,
        })
        .unwrap();
    assert_eq!(hits.len(), 3);

    let state = SyncState::load(&config.state_path());
    assert!(state.local.contains_key("claude-code"));
}

#[tokio::test]
async fn test_concurrent_writer_fails_the_cycle() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let _writer = ArchiveStore::open(&config.database_path()).unwrap();

    let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(Duration::from_secs(1), 0).unwrap());
    let credentials = CookieFile::new(config.cookie_file());
    let err = run_cycle(&config, &options(), transport, &credentials).await.unwrap_err();
    assert!(err.is_fatal());
}
