//! Archive storage with SQLite
//!
//! One writer at a time: [`ArchiveStore::open`] takes an exclusive file lock
//! for the lifetime of the connection, and a second writer fails fast with
//! [`SyncError::StorageLock`]. Readers use [`ArchiveStore::open_read_only`].
//!
//! Merges replace rows wholesale keyed by primary id, so re-merging the same
//! batch is a no-op in effect.

mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::model::{EntityCounts, ParseResult};

pub use schema::SCHEMA;

/// Maximum ids per `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

pub struct ArchiveStore {
    conn: Connection,
    path: PathBuf,
}

/// Outcome of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows processed per entity type
    pub counts: EntityCounts,
    pub new_conversations: u64,
    /// Stored conversations that received at least one new message
    pub updated_conversations: u64,
    /// Children dropped because their parent was neither in the batch nor stored
    pub dropped: u64,
}

impl MergeReport {
    pub fn add(&mut self, other: &MergeReport) {
        self.counts.add(&other.counts);
        self.new_conversations += other.new_conversations;
        self.updated_conversations += other.updated_conversations;
        self.dropped += other.dropped;
    }

    pub fn wrote_rows(&self) -> bool {
        self.counts.total() > 0
    }
}

fn ts(t: &Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339())
}

/// Busy and locked map to [`SyncError::StorageLock`]; anything else stays a storage error
fn lock_error(path: &Path, e: rusqlite::Error) -> SyncError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            SyncError::StorageLock {
                path: path.display().to_string(),
            }
        }
        other => SyncError::Storage(other),
    }
}

impl ArchiveStore {
    /// Open the archive for writing, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::ZERO)?;
        // Locks taken in exclusive mode are held until the connection closes
        conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |_| Ok(()))?;
        conn.execute_batch("BEGIN EXCLUSIVE").map_err(|e| lock_error(path, e))?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.init_schema()?;
        store.set_meta("writer_opened_at", &Utc::now().to_rfc3339())?;
        store.conn.execute_batch("COMMIT")?;
        debug!("opened {} for writing", path.display());
        Ok(store)
    }

    /// Open an existing archive for queries. Waits briefly for an active writer.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |_| Ok(()))
            .map_err(|e| lock_error(path, e))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ============================================
    // SYNC BOOKKEEPING
    // ============================================

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM sync_meta WHERE key = ?", params![key], |row| row.get(0))
            .optional()?;
        Ok(value.flatten())
    }

    // ============================================
    // MERGE
    // ============================================

    /// Ids from `ids` already present in `table`
    fn existing_ids<'a>(&self, table: &str, ids: impl IntoIterator<Item = &'a str>) -> Result<HashSet<String>> {
        let ids: Vec<&str> = ids.into_iter().collect();
        let mut found = HashSet::new();
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT id FROM {} WHERE id IN ({})", table, placeholders);
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for id in rows {
                found.insert(id?);
            }
        }
        Ok(found)
    }

    /// Upsert a batch in one transaction and report what was new
    pub fn merge(&mut self, mut batch: ParseResult) -> Result<MergeReport> {
        let (ext_convs, ext_msgs) = batch.external_parents();
        let known_convs = self.existing_ids("conversations", ext_convs.iter().map(String::as_str))?;
        let known_msgs = self.existing_ids("messages", ext_msgs.iter().map(String::as_str))?;
        let dropped = batch.retain_linked(&known_convs, &known_msgs) as u64;
        if dropped > 0 {
            warn!("dropped {} rows whose parent is missing", dropped);
        }

        let stored_convs = self.existing_ids("conversations", batch.conversations.iter().map(|c| c.id.as_str()))?;
        let stored_msgs = self.existing_ids("messages", batch.messages.iter().map(|m| m.id.as_str()))?;

        let new_convs: HashSet<&str> = batch
            .conversations
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| !stored_convs.contains(*id))
            .collect();
        let updated: HashSet<&str> = batch
            .messages
            .iter()
            .filter(|m| !stored_msgs.contains(&m.id))
            .map(|m| m.conversation_id.as_str())
            .filter(|cid| !new_convs.contains(cid))
            .collect();

        let report = MergeReport {
            counts: batch.counts(),
            new_conversations: new_convs.len() as u64,
            updated_conversations: updated.len() as u64,
            dropped,
        };

        let tx = self.conn.transaction()?;
        write_batch(&tx, &batch)?;
        tx.commit()?;

        debug!("merged {} ({} new, {} updated)", report.counts, report.new_conversations, report.updated_conversations);
        Ok(report)
    }

    /// Repopulate the full-text index from `messages`
    pub fn rebuild_search_index(&self) -> Result<()> {
        self.conn
            .execute("INSERT INTO messages_fts(messages_fts) VALUES('rebuild')", [])?;
        Ok(())
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn counts(&self) -> Result<EntityCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(EntityCounts {
            conversations: count("conversations")?,
            messages: count("messages")?,
            tool_calls: count("tool_calls")?,
            attachments: count("attachments")?,
            file_edits: count("file_edits")?,
        })
    }

    /// Conversation and message counts per source tag
    pub fn counts_by_source(&self) -> Result<BTreeMap<String, EntityCounts>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT c.source, COUNT(DISTINCT c.id), COUNT(m.id)
               FROM conversations c
               LEFT JOIN messages m ON m.conversation_id = c.id
               GROUP BY c.source"#,
        )?;
        let rows = stmt.query_map([], |row| {
            let convs: i64 = row.get(1)?;
            let msgs: i64 = row.get(2)?;
            Ok((
                row.get::<_, String>(0)?,
                EntityCounts {
                    conversations: convs as u64,
                    messages: msgs as u64,
                    ..Default::default()
                },
            ))
        })?;
        Ok(rows.collect::<std::result::Result<BTreeMap<_, _>, _>>()?)
    }

    pub fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<ConversationRow>> {
        let mut clauses = vec![];
        let mut args: Vec<String> = vec![];
        if let Some(source) = &filter.source {
            clauses.push("c.source = ?");
            args.push(source.clone());
        }
        if let Some(cwd) = &filter.cwd {
            clauses.push("c.cwd LIKE ?");
            args.push(format!("%{}%", cwd));
        }
        if let Some(since) = &filter.since {
            clauses.push("COALESCE(c.updated_at, c.created_at) > ?");
            args.push(since.to_rfc3339());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let query = format!(
            "{} {} ORDER BY COALESCE(c.updated_at, c.created_at) DESC LIMIT {}",
            CONVERSATION_SELECT,
            where_clause,
            filter.limit.max(1)
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_conversation)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Find a conversation by full id or unique-enough id prefix
    pub fn get_conversation(&self, id_prefix: &str) -> Result<Option<ConversationRow>> {
        let query = format!(
            "{} WHERE c.id = ?1 OR c.id LIKE ?2 ORDER BY CASE WHEN c.id = ?1 THEN 0 ELSE 1 END LIMIT 1",
            CONVERSATION_SELECT
        );
        let row = self.conn.query_row(
            &query,
            params![id_prefix, format!("{}%", id_prefix)],
            map_conversation,
        );

        match row {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, role, content, thinking, created_at, model
               FROM messages
               WHERE conversation_id = ?
               ORDER BY created_at, rowid"#,
        )?;

        let rows = stmt.query_map(params![conversation_id], map_message)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Up to `limit` messages created strictly after `after`, oldest first
    pub fn messages_after(&self, conversation_id: &str, after: Option<&str>, limit: usize) -> Result<Vec<MessageRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, role, content, thinking, created_at, model
               FROM messages
               WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at > ?2)
               ORDER BY created_at, rowid
               LIMIT ?3"#,
        )?;

        let rows = stmt.query_map(params![conversation_id, after, limit.max(1) as i64], map_message)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Timestamp of the earliest message whose id starts with `id_prefix`
    pub fn message_time(&self, conversation_id: &str, id_prefix: &str) -> Result<Option<String>> {
        let created: Option<Option<String>> = self
            .conn
            .query_row(
                r#"SELECT created_at FROM messages
                   WHERE conversation_id = ?1 AND id LIKE ?2
                   ORDER BY created_at LIMIT 1"#,
                params![conversation_id, format!("{}%", id_prefix)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(created.flatten())
    }

    pub fn tool_calls(&self, conversation_id: &str) -> Result<Vec<ToolCallRow>> {
        let query = format!(
            "{} WHERE m.conversation_id = ? ORDER BY m.created_at, t.rowid",
            TOOL_CALL_SELECT
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![conversation_id], map_tool_call)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Most recent tool calls across the archive, optionally those whose
    /// name, input or output contains `text`
    pub fn find_tool_calls(&self, text: Option<&str>, limit: usize) -> Result<Vec<ToolCallRow>> {
        let query = format!(
            "{} {} ORDER BY COALESCE(t.created_at, m.created_at) DESC LIMIT {}",
            TOOL_CALL_SELECT,
            if text.is_some() {
                "WHERE t.tool_name LIKE ?1 OR t.input LIKE ?1 OR t.output LIKE ?1"
            } else {
                ""
            },
            limit.max(1)
        );
        let mut stmt = self.conn.prepare(&query)?;
        let args: Vec<String> = text.map(|t| format!("%{}%", t)).into_iter().collect();
        let rows = stmt.query_map(params_from_iter(args.iter()), map_tool_call)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn conversation_file_edits(&self, conversation_id: &str) -> Result<Vec<FileEditRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT e.file_path, e.edit_type, e.content, e.created_at, m.conversation_id
               FROM file_edits e
               JOIN messages m ON e.message_id = m.id
               WHERE m.conversation_id = ?
               ORDER BY e.created_at, e.rowid"#,
        )?;
        let rows = stmt.query_map(params![conversation_id], map_file_edit)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Every conversation with its messages, tool calls and file edits
    pub fn export(&self, source: Option<&str>) -> Result<Vec<ExportedConversation>> {
        let query = format!(
            "{} WHERE ?1 IS NULL OR c.source = ?1 ORDER BY c.created_at, c.id",
            CONVERSATION_SELECT
        );
        let conversations = {
            let mut stmt = self.conn.prepare(&query)?;
            let rows = stmt.query_map(params![source], map_conversation)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut exported = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let messages = self.messages(&conversation.id)?;
            let tool_calls = self
                .tool_calls(&conversation.id)?
                .into_iter()
                .map(ExportedToolCall::from)
                .collect();
            let file_edits = self.conversation_file_edits(&conversation.id)?;
            exported.push(ExportedConversation {
                conversation,
                messages,
                tool_calls,
                file_edits,
            });
        }
        Ok(exported)
    }

    /// Most recent file edits, optionally restricted to paths containing `path`
    pub fn file_edits(&self, path: Option<&str>, limit: usize) -> Result<Vec<FileEditRow>> {
        let query = format!(
            r#"SELECT e.file_path, e.edit_type, e.content, e.created_at, m.conversation_id
               FROM file_edits e
               JOIN messages m ON e.message_id = m.id
               {}
               ORDER BY e.created_at DESC
               LIMIT {}"#,
            if path.is_some() { "WHERE e.file_path LIKE ?" } else { "" },
            limit.max(1)
        );
        let mut stmt = self.conn.prepare(&query)?;
        let args: Vec<String> = path.map(|p| format!("%{}%", p)).into_iter().collect();

        let rows = stmt.query_map(params_from_iter(args.iter()), map_file_edit)?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Full-text search over message text and reasoning, best matches first
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let Some(expr) = match_expression(&query.text) else {
            return Ok(vec![]);
        };

        let mut clauses = vec!["messages_fts MATCH ?"];
        let mut args = vec![expr];
        if let Some(source) = &query.source {
            clauses.push("c.source = ?");
            args.push(source.clone());
        }
        if let Some(role) = &query.role {
            clauses.push("m.role = ?");
            args.push(role.clone());
        }

        let sql = format!(
            r#"SELECT c.id, c.source, c.title, c.cwd, m.role, m.created_at,
                      snippet(messages_fts, -1, '[', ']', '...', 24)
               FROM messages_fts
               JOIN messages m ON m.rowid = messages_fts.rowid
               JOIN conversations c ON c.id = m.conversation_id
               WHERE {}
               ORDER BY messages_fts.rank
               LIMIT {}"#,
            clauses.join(" AND "),
            query.limit.max(1)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(SearchHit {
                conversation_id: row.get(0)?,
                source: row.get(1)?,
                title: row.get(2)?,
                cwd: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
                snippet: row.get(6)?,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

/// Quote each whitespace-separated term so user input never parses as FTS syntax
fn match_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

fn write_batch(tx: &Transaction, batch: &ParseResult) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        r#"INSERT INTO conversations
               (id, source, title, created_at, updated_at, model, cwd, git_branch, project_id, metadata)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT(id) DO UPDATE SET
               source = excluded.source, title = excluded.title,
               created_at = excluded.created_at, updated_at = excluded.updated_at,
               model = excluded.model, cwd = excluded.cwd, git_branch = excluded.git_branch,
               project_id = excluded.project_id, metadata = excluded.metadata"#,
    )?;
    for c in &batch.conversations {
        stmt.execute(params![
            c.id,
            c.source,
            c.title,
            ts(&c.created_at),
            ts(&c.updated_at),
            c.model,
            c.cwd,
            c.git_branch,
            c.project_id,
            serde_json::to_string(&c.metadata)?,
        ])?;
    }

    let mut stmt = tx.prepare_cached(
        r#"INSERT INTO messages (id, conversation_id, role, content, thinking, created_at, model, metadata)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(id) DO UPDATE SET
               conversation_id = excluded.conversation_id, role = excluded.role,
               content = excluded.content, thinking = excluded.thinking,
               created_at = excluded.created_at, model = excluded.model, metadata = excluded.metadata"#,
    )?;
    for m in &batch.messages {
        stmt.execute(params![
            m.id,
            m.conversation_id,
            m.role,
            m.content,
            m.thinking,
            ts(&m.created_at),
            m.model,
            serde_json::to_string(&m.metadata)?,
        ])?;
    }

    let mut stmt = tx.prepare_cached(
        r#"INSERT INTO tool_calls (id, message_id, tool_name, input, output, status, duration_ms, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(id) DO UPDATE SET
               message_id = excluded.message_id, tool_name = excluded.tool_name,
               input = excluded.input, output = excluded.output, status = excluded.status,
               duration_ms = excluded.duration_ms, created_at = excluded.created_at"#,
    )?;
    for t in &batch.tool_calls {
        stmt.execute(params![
            t.id,
            t.message_id,
            t.tool_name,
            serde_json::to_string(&t.input)?,
            serde_json::to_string(&t.output)?,
            t.status.as_str(),
            t.duration_ms,
            ts(&t.created_at),
        ])?;
    }

    let mut stmt = tx.prepare_cached(
        r#"INSERT INTO attachments (id, message_id, filename, mime_type, size, path, url, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(id) DO UPDATE SET
               message_id = excluded.message_id, filename = excluded.filename,
               mime_type = excluded.mime_type, size = excluded.size, path = excluded.path,
               url = excluded.url, created_at = excluded.created_at"#,
    )?;
    for a in &batch.attachments {
        stmt.execute(params![
            a.id,
            a.message_id,
            a.filename,
            a.mime_type,
            a.size,
            a.path,
            a.url,
            ts(&a.created_at),
        ])?;
    }

    let mut stmt = tx.prepare_cached(
        r#"INSERT INTO artifacts (id, conversation_id, type, title, content, language, version, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(id) DO UPDATE SET
               conversation_id = excluded.conversation_id, type = excluded.type,
               title = excluded.title, content = excluded.content, language = excluded.language,
               version = excluded.version, created_at = excluded.created_at"#,
    )?;
    for a in &batch.artifacts {
        stmt.execute(params![
            a.id,
            a.conversation_id,
            a.artifact_type,
            a.title,
            a.content,
            a.language,
            a.version,
            ts(&a.created_at),
        ])?;
    }

    let mut stmt = tx.prepare_cached(
        r#"INSERT INTO file_edits (id, message_id, file_path, edit_type, content, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(id) DO UPDATE SET
               message_id = excluded.message_id, file_path = excluded.file_path,
               edit_type = excluded.edit_type, content = excluded.content,
               created_at = excluded.created_at"#,
    )?;
    for e in &batch.file_edits {
        stmt.execute(params![
            e.id,
            e.message_id,
            e.file_path,
            e.edit_kind.as_str(),
            e.content,
            ts(&e.created_at),
        ])?;
    }

    Ok(())
}

const CONVERSATION_SELECT: &str = r#"SELECT c.id, c.source, c.title, c.created_at, c.updated_at,
                  c.model, c.cwd, c.git_branch, c.project_id,
                  (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
           FROM conversations c"#;

const TOOL_CALL_SELECT: &str = r#"SELECT t.message_id, t.tool_name, t.input, t.output, t.status, t.duration_ms,
                  COALESCE(t.created_at, m.created_at)
           FROM tool_calls t
           JOIN messages m ON t.message_id = m.id"#;

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        role: row.get(1)?,
        content: row.get(2)?,
        thinking: row.get(3)?,
        created_at: row.get(4)?,
        model: row.get(5)?,
    })
}

fn map_tool_call(row: &rusqlite::Row) -> rusqlite::Result<ToolCallRow> {
    Ok(ToolCallRow {
        message_id: row.get(0)?,
        tool_name: row.get(1)?,
        input: row.get(2)?,
        output: row.get(3)?,
        status: row.get(4)?,
        duration_ms: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_file_edit(row: &rusqlite::Row) -> rusqlite::Result<FileEditRow> {
    Ok(FileEditRow {
        file_path: row.get(0)?,
        edit_type: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        conversation_id: row.get(4)?,
    })
}

fn map_conversation(row: &rusqlite::Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        source: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        model: row.get(5)?,
        cwd: row.get(6)?,
        git_branch: row.get(7)?,
        project_id: row.get(8)?,
        message_count: row.get(9)?,
    })
}

// ============================================
// FILTERS
// ============================================

#[derive(Debug, Clone)]
pub struct ConversationFilter {
    pub source: Option<String>,
    /// Substring of the working directory
    pub cwd: Option<String>,
    /// Only conversations active after this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for ConversationFilter {
    fn default() -> Self {
        Self {
            source: None,
            cwd: None,
            since: None,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub source: Option<String>,
    pub role: Option<String>,
    pub limit: usize,
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug, Serialize)]
pub struct ConversationRow {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub model: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub project_id: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub id: String,
    pub role: String,
    pub content: String,
    pub thinking: Option<String>,
    pub created_at: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug)]
pub struct ToolCallRow {
    pub message_id: String,
    pub tool_name: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub status: String,
    pub duration_ms: Option<i64>,
    /// Falls back to the owning message's time
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileEditRow {
    pub file_path: String,
    pub edit_type: String,
    pub content: Option<String>,
    pub created_at: Option<String>,
    pub conversation_id: String,
}

/// Tool call with its JSON columns decoded
#[derive(Debug, Serialize)]
pub struct ExportedToolCall {
    pub message_id: String,
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub status: String,
    pub duration_ms: Option<i64>,
}

fn decode_json(text: Option<String>) -> Value {
    match text {
        Some(t) => serde_json::from_str(&t).unwrap_or(Value::String(t)),
        None => Value::Null,
    }
}

impl From<ToolCallRow> for ExportedToolCall {
    fn from(row: ToolCallRow) -> Self {
        Self {
            message_id: row.message_id,
            tool_name: row.tool_name,
            input: decode_json(row.input),
            output: decode_json(row.output),
            status: row.status,
            duration_ms: row.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportedConversation {
    #[serde(flatten)]
    pub conversation: ConversationRow,
    pub messages: Vec<MessageRow>,
    pub tool_calls: Vec<ExportedToolCall>,
    pub file_edits: Vec<FileEditRow>,
}

#[derive(Debug)]
pub struct SearchHit {
    pub conversation_id: String,
    pub source: String,
    pub title: Option<String>,
    pub cwd: Option<String>,
    pub role: String,
    pub created_at: Option<String>,
    pub snippet: String,
}
