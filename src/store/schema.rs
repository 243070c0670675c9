//! SQLite schema definition
//!
//! Six canonical tables keyed by deterministic text ids, an external-content
//! FTS5 index over message text, and a one-row writer marker.

pub const SCHEMA: &str = r#"
-- ============================================
-- CONVERSATIONS & MESSAGES
-- ============================================

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,                   -- sha256("{source}:{natural key}")[:16]
    source TEXT NOT NULL,                  -- 'codex', 'claude-code', 'claude', 'chatgpt'
    title TEXT,
    created_at DATETIME,
    updated_at DATETIME,
    model TEXT,
    cwd TEXT,                              -- local sessions only
    git_branch TEXT,
    project_id TEXT,                       -- gizmo, project or organization reference
    metadata TEXT                          -- JSON
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    thinking TEXT,
    created_at DATETIME,
    model TEXT,
    metadata TEXT,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id)
);

-- ============================================
-- CHILD ENTITIES
-- ============================================

CREATE TABLE IF NOT EXISTS tool_calls (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    input TEXT,                            -- JSON
    output TEXT,                           -- JSON
    status TEXT NOT NULL,                  -- 'pending' | 'complete'
    duration_ms INTEGER,
    created_at DATETIME,
    FOREIGN KEY(message_id) REFERENCES messages(id)
);

CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    filename TEXT,
    mime_type TEXT,
    size INTEGER,
    path TEXT,
    url TEXT,
    created_at DATETIME,
    FOREIGN KEY(message_id) REFERENCES messages(id)
);

CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    type TEXT,
    title TEXT,
    content TEXT,
    language TEXT,
    version INTEGER,
    created_at DATETIME,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id)
);

CREATE TABLE IF NOT EXISTS file_edits (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    edit_type TEXT NOT NULL,               -- 'write' | 'edit' | 'multiedit' | 'shell'
    content TEXT,
    created_at DATETIME,
    FOREIGN KEY(message_id) REFERENCES messages(id)
);

-- ============================================
-- SEARCH
-- ============================================

CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content,
    thinking,
    content='messages',
    content_rowid='rowid'
);

-- ============================================
-- SYNC BOOKKEEPING
-- ============================================

CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_conversations_source ON conversations(source);
CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at);
CREATE INDEX IF NOT EXISTS idx_conversations_cwd ON conversations(cwd);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
CREATE INDEX IF NOT EXISTS idx_tool_calls_message ON tool_calls(message_id);
CREATE INDEX IF NOT EXISTS idx_attachments_message ON attachments(message_id);
CREATE INDEX IF NOT EXISTS idx_file_edits_message ON file_edits(message_id);
CREATE INDEX IF NOT EXISTS idx_file_edits_path ON file_edits(file_path);
"#;
