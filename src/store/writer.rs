//! Store writer: bounded command queue drained by a dedicated thread.
//!
//! # Responsibilities
//! - Receive write commands from provider facades via a bounded channel
//! - Apply each command in its own short transaction
//! - Ensure the target partition exists before every insert
//!
//! # Design Decisions
//! - One writer thread, one connection: enqueue order is apply order, which
//!   is the only ordering guarantee the service makes (program order within
//!   a trace)
//! - A failed command is logged and counted, never retried inline
//! - `Flush` is an ack'd barrier used at shutdown and by tests

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, SyncSender};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, Transaction};
use tokio::sync::oneshot;

use crate::context::TraceContext;
use crate::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, SpanMetrics, SpanType, Status, SyncState,
    TraceAggregates,
};
use crate::provider::SpanHandle;
use crate::store::partitions::{self, TableSpec, TABLES};
use crate::store::schema;

/// One unit of work for the writer thread.
pub enum StoreCommand {
    StartTrace {
        ctx: TraceContext,
        name: String,
        operation_type: String,
        metadata: String,
        at: DateTime<Utc>,
    },
    EndTrace {
        trace_id: String,
        status: Status,
        error: Option<ErrorInfo>,
        aggregates: TraceAggregates,
        at: DateTime<Utc>,
    },
    StartSpan {
        ctx: TraceContext,
        name: String,
        span_type: SpanType,
        metadata: String,
        at: DateTime<Utc>,
    },
    EndSpan {
        handle: SpanHandle,
        status: Status,
        duration_ms: i64,
        error: Option<ErrorInfo>,
        metrics: SpanMetrics,
        at: DateTime<Utc>,
    },
    LlmCall {
        trace_id: String,
        span_id: Option<String>,
        call: LlmCall,
        at: DateTime<Utc>,
    },
    ChatMessage {
        trace_id: String,
        span_id: Option<String>,
        message: ChatMessage,
        at: DateTime<Utc>,
    },
    DocumentEvent {
        trace_id: String,
        span_id: Option<String>,
        event: DocumentEvent,
        at: DateTime<Utc>,
    },
    SyncStatus {
        provider: String,
        trace_id: String,
        state: SyncState,
        external_id: Option<String>,
        at: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

impl StoreCommand {
    fn op_name(&self) -> &'static str {
        match self {
            StoreCommand::StartTrace { .. } => "start_trace",
            StoreCommand::EndTrace { .. } => "end_trace",
            StoreCommand::StartSpan { .. } => "start_span",
            StoreCommand::EndSpan { .. } => "end_span",
            StoreCommand::LlmCall { .. } => "log_llm_call",
            StoreCommand::ChatMessage { .. } => "log_chat_message",
            StoreCommand::DocumentEvent { .. } => "log_document_event",
            StoreCommand::SyncStatus { .. } => "sync_status",
            StoreCommand::Flush(_) => "flush",
            StoreCommand::Shutdown => "shutdown",
        }
    }
}

/// Cheap cloneable handle external providers use to record per-trace
/// delivery bookkeeping. Drops are tolerated: sync status is advisory.
#[derive(Clone)]
pub struct SyncStatusSink {
    tx: SyncSender<StoreCommand>,
}

impl SyncStatusSink {
    pub(crate) fn new(tx: SyncSender<StoreCommand>) -> Self {
        Self { tx }
    }

    pub fn record(
        &self,
        provider: &str,
        trace_id: &str,
        state: SyncState,
        external_id: Option<String>,
    ) {
        let cmd = StoreCommand::SyncStatus {
            provider: provider.to_string(),
            trace_id: trace_id.to_string(),
            state,
            external_id,
            at: Utc::now(),
        };
        if self.tx.try_send(cmd).is_err() {
            tracing::debug!(provider, trace_id, "sync-status update dropped");
        }
    }
}

/// Timestamp rendering used for every stored column.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Writer thread entry point: drain the queue until every sender is gone.
pub(crate) fn run_writer(path: PathBuf, rx: Receiver<StoreCommand>) {
    let mut conn = match schema::open_connection(&path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "store writer failed to open database; all writes will be dropped"
            );
            for cmd in rx {
                match cmd {
                    StoreCommand::Shutdown => break,
                    StoreCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    _ => {}
                }
            }
            return;
        }
    };

    for cmd in rx {
        match cmd {
            StoreCommand::Shutdown => break,
            StoreCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            cmd => {
                let op = cmd.op_name();
                if let Err(e) = apply(&mut conn, cmd) {
                    metrics::counter!("tracekeeper_store_write_failures_total", "op" => op)
                        .increment(1);
                    tracing::warn!(operation = op, error = %e, "store write failed");
                }
            }
        }
    }

    tracing::debug!("store writer drained, exiting");
}

fn spec(base: &'static str) -> &'static TableSpec {
    // TABLES is a compile-time constant covering every base used below
    TABLES
        .iter()
        .find(|t| t.base == base)
        .unwrap_or(&TABLES[0])
}

fn apply(conn: &mut Connection, cmd: StoreCommand) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    match cmd {
        StoreCommand::StartTrace {
            ctx,
            name,
            operation_type,
            metadata,
            at,
        } => {
            let table = partitions::ensure_partition(&tx, spec("traces"), at)?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO \"{}\" \
                     (trace_id, name, operation_type, user_id, session_id, resource_id, \
                      started_at, status, metadata) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'in_progress', ?8)",
                    table
                ),
                params![
                    ctx.trace_id,
                    name,
                    operation_type,
                    ctx.scope.user_id,
                    ctx.scope.session_id,
                    ctx.scope.resource_id,
                    fmt_ts(at),
                    metadata,
                ],
            )?;
        }

        StoreCommand::EndTrace {
            trace_id,
            status,
            error,
            aggregates,
            at,
        } => {
            end_trace(&tx, &trace_id, status, error.as_ref(), &aggregates, at)?;
        }

        StoreCommand::StartSpan {
            ctx,
            name,
            span_type,
            metadata,
            at,
        } => {
            let table = partitions::ensure_partition(&tx, spec("spans"), at)?;
            tx.execute(
                &format!(
                    "INSERT INTO \"{}\" \
                     (trace_id, span_id, parent_span_id, name, span_type, started_at, \
                      status, metadata) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'in_progress', ?7)",
                    table
                ),
                params![
                    ctx.trace_id,
                    ctx.span_id,
                    ctx.parent_span_id,
                    name,
                    span_type.as_str(),
                    fmt_ts(at),
                    metadata,
                ],
            )?;

            // A span for a trace this store never saw start_trace for gets
            // an implicit stub trace row instead of failing.
            if !trace_exists(&tx, &ctx.trace_id)? {
                let trace_table = partitions::ensure_partition(&tx, spec("traces"), at)?;
                tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO \"{}\" \
                         (trace_id, name, operation_type, user_id, session_id, resource_id, \
                          started_at, status) \
                         VALUES (?1, '(implicit)', 'unknown', ?2, ?3, ?4, ?5, 'in_progress')",
                        trace_table
                    ),
                    params![
                        ctx.trace_id,
                        ctx.scope.user_id,
                        ctx.scope.session_id,
                        ctx.scope.resource_id,
                        fmt_ts(at),
                    ],
                )?;
            }
        }

        StoreCommand::EndSpan {
            handle,
            status,
            duration_ms,
            error,
            metrics,
            at,
        } => {
            end_span(&tx, &handle, status, duration_ms, error.as_ref(), metrics, at)?;
        }

        StoreCommand::LlmCall {
            trace_id,
            span_id,
            call,
            at,
        } => {
            let table = partitions::ensure_partition(&tx, spec("llm_calls"), at)?;
            tx.execute(
                &format!(
                    "INSERT INTO \"{}\" \
                     (trace_id, span_id, model, prompt_tokens, completion_tokens, \
                      total_tokens, cost_usd, latency_ms, status, error_message, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    table
                ),
                params![
                    trace_id,
                    span_id,
                    call.model,
                    call.prompt_tokens.map(|v| v as i64),
                    call.completion_tokens.map(|v| v as i64),
                    call.total_tokens.map(|v| v as i64),
                    call.cost_usd,
                    call.latency_ms,
                    call.status.as_str(),
                    call.error_message,
                    fmt_ts(at),
                ],
            )?;
        }

        StoreCommand::ChatMessage {
            trace_id,
            span_id,
            message,
            at,
        } => {
            let table = partitions::ensure_partition(&tx, spec("chat_messages"), at)?;
            tx.execute(
                &format!(
                    "INSERT INTO \"{}\" \
                     (trace_id, span_id, role, content, turn_index, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    table
                ),
                params![
                    trace_id,
                    span_id,
                    message.role,
                    message.content,
                    message.turn_index,
                    fmt_ts(at),
                ],
            )?;
        }

        StoreCommand::DocumentEvent {
            trace_id,
            span_id,
            event,
            at,
        } => {
            let table = partitions::ensure_partition(&tx, spec("document_events"), at)?;
            tx.execute(
                &format!(
                    "INSERT INTO \"{}\" \
                     (trace_id, span_id, document_id, event_type, status, pages, \
                      chunk_count, embed_count, duration_ms, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    table
                ),
                params![
                    trace_id,
                    span_id,
                    event.document_id,
                    event.event_type,
                    event.status,
                    event.pages,
                    event.chunk_count,
                    event.embed_count,
                    event.duration_ms,
                    fmt_ts(at),
                ],
            )?;
        }

        StoreCommand::SyncStatus {
            provider,
            trace_id,
            state,
            external_id,
            at,
        } => {
            tx.execute(
                "INSERT INTO sync_status (provider, trace_id, state, retry_count, external_id, updated_at) \
                 VALUES (?1, ?2, ?3, CASE WHEN ?3 = 'failed' THEN 1 ELSE 0 END, ?4, ?5) \
                 ON CONFLICT(provider, trace_id) DO UPDATE SET \
                   state = excluded.state, \
                   retry_count = sync_status.retry_count + \
                     CASE WHEN excluded.state = 'failed' THEN 1 ELSE 0 END, \
                   external_id = COALESCE(excluded.external_id, sync_status.external_id), \
                   updated_at = excluded.updated_at",
                params![provider, trace_id, state.as_str(), external_id, fmt_ts(at)],
            )?;
        }

        StoreCommand::Flush(ack) => {
            let _ = ack.send(());
        }

        StoreCommand::Shutdown => {}
    }
    tx.commit()
}

/// Finalize the trace row wherever it lives, newest partition first. A trace
/// that was never started (or already ended) is a safe no-op.
fn end_trace(
    tx: &Transaction<'_>,
    trace_id: &str,
    status: Status,
    error: Option<&ErrorInfo>,
    aggregates: &TraceAggregates,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    let ended_at = fmt_ts(at);
    for partition in partitions::list_partitions(tx, spec("traces"))?.iter().rev() {
        let updated = tx.execute(
            &format!(
                "UPDATE \"{}\" SET \
                   ended_at = ?1, \
                   duration_ms = CAST(ROUND((julianday(?1) - julianday(started_at)) * 86400000) AS INTEGER), \
                   status = ?2, \
                   error_kind = ?3, \
                   error_message = ?4, \
                   prompt_tokens = COALESCE(?5, prompt_tokens), \
                   completion_tokens = COALESCE(?6, completion_tokens), \
                   total_tokens = COALESCE(?7, total_tokens), \
                   cost_usd = COALESCE(?8, cost_usd) \
                 WHERE trace_id = ?9 AND status = 'in_progress'",
                partition.table
            ),
            params![
                ended_at,
                status.as_str(),
                error.map(|e| e.kind.as_str()),
                error.map(|e| e.message.as_str()),
                aggregates.prompt_tokens.map(|v| v as i64),
                aggregates.completion_tokens.map(|v| v as i64),
                aggregates.total_tokens.map(|v| v as i64),
                aggregates.cost_usd,
                trace_id,
            ],
        )?;
        if updated > 0 {
            return Ok(());
        }
    }
    tracing::debug!(trace_id, "end_trace for unknown or already-ended trace, skipping");
    Ok(())
}

/// Close the span row; if start_span was dropped under backpressure, insert
/// the completed row instead so the span is not lost entirely.
fn end_span(
    tx: &Transaction<'_>,
    handle: &SpanHandle,
    status: Status,
    duration_ms: i64,
    error: Option<&ErrorInfo>,
    metrics: SpanMetrics,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    let spans = spec("spans");
    let m = metrics.retain_for(handle.span_type);
    // the partition may not exist yet when the start was dropped and this is
    // the window's first write
    let table = partitions::ensure_partition(tx, spans, handle.started_at)?;
    let ended_at = fmt_ts(at);

    let updated = tx.execute(
        &format!(
            "UPDATE \"{}\" SET \
               ended_at = ?1, duration_ms = ?2, status = ?3, \
               error_kind = ?4, error_message = ?5, \
               model = ?6, prompt_tokens = ?7, completion_tokens = ?8, \
               total_tokens = ?9, cost_usd = ?10, vector_count = ?11, \
               dimensions = ?12, query = ?13, result_count = ?14, \
               top_score = ?15, item_count = ?16, \
               input_preview = ?17, output_preview = ?18 \
             WHERE span_id = ?19 AND trace_id = ?20 AND status = 'in_progress'",
            table
        ),
        params![
            ended_at,
            duration_ms,
            status.as_str(),
            error.map(|e| e.kind.as_str()),
            error.map(|e| e.message.as_str()),
            m.model,
            m.prompt_tokens.map(|v| v as i64),
            m.completion_tokens.map(|v| v as i64),
            m.total_tokens.map(|v| v as i64),
            m.cost_usd,
            m.vector_count.map(|v| v as i64),
            m.dimensions.map(|v| v as i64),
            m.query,
            m.result_count.map(|v| v as i64),
            m.top_score,
            m.item_count.map(|v| v as i64),
            m.input_preview,
            m.output_preview,
            handle.span_id,
            handle.trace_id,
        ],
    )?;

    if updated == 0 {
        let started_at = at - Duration::milliseconds(duration_ms.max(0));
        let table = partitions::ensure_partition(tx, spans, started_at)?;
        tx.execute(
            &format!(
                "INSERT INTO \"{}\" \
                 (trace_id, span_id, name, span_type, started_at, ended_at, \
                  duration_ms, status, error_kind, error_message) \
                 VALUES (?1, ?2, '(recovered)', ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                table
            ),
            params![
                handle.trace_id,
                handle.span_id,
                handle.span_type.as_str(),
                fmt_ts(started_at),
                ended_at,
                duration_ms,
                status.as_str(),
                error.map(|e| e.kind.as_str()),
                error.map(|e| e.message.as_str()),
            ],
        )?;
    }
    Ok(())
}

fn trace_exists(tx: &Transaction<'_>, trace_id: &str) -> rusqlite::Result<bool> {
    for partition in partitions::list_partitions(tx, spec("traces"))?.iter().rev() {
        let found: bool = tx.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE trace_id = ?1)",
                partition.table
            ),
            [trace_id],
            |row| row.get(0),
        )?;
        if found {
            return Ok(true);
        }
    }
    Ok(false)
}
