//! SQLite schema: pragmas, base tables, and partition DDL templates.
//!
//! Partition tables are created from the `{t}` templates below with the
//! window-stamped table name substituted in. Span metric columns are flat
//! and denormalized on purpose: the trace-detail read path is one query per
//! partition, no joins.

use std::path::Path;

use rusqlite::Connection;

use crate::provider::ProviderResult;

/// Non-partitioned bookkeeping tables.
///
/// `sync_status` tracks eventual delivery of traces to optional external
/// providers; it is consumed only by the separately-specified
/// reconciliation extension, never by this core's hot path.
const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_status (
    provider TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    state TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    external_id TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (provider, trace_id)
);
CREATE INDEX IF NOT EXISTS idx_sync_status_state ON sync_status(state);
"#;

pub const TRACES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS "{t}" (
    trace_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    operation_type TEXT NOT NULL,
    user_id TEXT,
    session_id TEXT,
    resource_id TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_ms INTEGER,
    status TEXT NOT NULL DEFAULT 'in_progress',
    error_kind TEXT,
    error_message TEXT,
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    cost_usd REAL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS "idx_{t}_started" ON "{t}"(started_at);
CREATE INDEX IF NOT EXISTS "idx_{t}_dims" ON "{t}"(operation_type, status);
"#;

pub const SPANS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS "{t}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT NOT NULL,
    span_id TEXT NOT NULL,
    parent_span_id TEXT,
    name TEXT NOT NULL,
    span_type TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_ms INTEGER,
    status TEXT NOT NULL DEFAULT 'in_progress',
    error_kind TEXT,
    error_message TEXT,
    model TEXT,
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    cost_usd REAL,
    vector_count INTEGER,
    dimensions INTEGER,
    query TEXT,
    result_count INTEGER,
    top_score REAL,
    item_count INTEGER,
    input_preview TEXT,
    output_preview TEXT,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS "idx_{t}_trace" ON "{t}"(trace_id);
CREATE INDEX IF NOT EXISTS "idx_{t}_span" ON "{t}"(span_id);
"#;

pub const LLM_CALLS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS "{t}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT NOT NULL,
    span_id TEXT,
    model TEXT NOT NULL,
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    cost_usd REAL,
    latency_ms INTEGER,
    status TEXT NOT NULL,
    error_message TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS "idx_{t}_trace" ON "{t}"(trace_id);
CREATE INDEX IF NOT EXISTS "idx_{t}_model" ON "{t}"(model, status);
"#;

pub const CHAT_MESSAGES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS "{t}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT NOT NULL,
    span_id TEXT,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    turn_index INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS "idx_{t}_trace" ON "{t}"(trace_id);
"#;

pub const DOCUMENT_EVENTS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS "{t}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT NOT NULL,
    span_id TEXT,
    document_id TEXT,
    event_type TEXT NOT NULL,
    status TEXT NOT NULL,
    pages INTEGER,
    chunk_count INTEGER,
    embed_count INTEGER,
    duration_ms INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS "idx_{t}_trace" ON "{t}"(trace_id);
CREATE INDEX IF NOT EXISTS "idx_{t}_document" ON "{t}"(document_id);
"#;

/// Open a read/write connection with the store's pragmas and base schema.
pub fn open_connection(path: &Path) -> ProviderResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;",
    )?;

    conn.execute_batch(BASE_SCHEMA)?;

    Ok(conn)
}

/// Instantiate a partition DDL template for a concrete table name.
pub fn render_ddl(template: &str, table: &str) -> String {
    template.replace("{t}", table)
}
