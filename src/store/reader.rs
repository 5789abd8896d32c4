//! Read-only queries over the partitioned store.
//!
//! # Responsibilities
//! - Locate a trace and its span tree without a time hint (newest first)
//! - Time-range + dimension listings that only touch overlapping partitions
//! - Sync-status bookkeeping lookups
//!
//! # Design Decisions
//! - Readers open their own connection; WAL keeps them concurrent with the
//!   single writer
//! - Every listing carries a time range so partition pruning applies

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};

use crate::model::{
    ChatMessage, DocumentEvent, LlmCall, MetadataMap, ProviderSyncStatus, SpanMetrics, SpanRecord,
    SpanType, Status, SyncState, TraceAggregates, TraceRecord,
};
use crate::provider::ProviderResult;
use crate::store::partitions::{self, PartitionInfo, TableSpec, TABLES};
use crate::store::writer::fmt_ts;

/// A chat message as stored, with its linkage and timestamp.
#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub trace_id: String,
    pub span_id: Option<String>,
    pub message: ChatMessage,
    pub created_at: DateTime<Utc>,
}

/// A document event as stored, with its linkage and timestamp.
#[derive(Debug, Clone)]
pub struct DocumentEventRow {
    pub trace_id: String,
    pub span_id: Option<String>,
    pub event: DocumentEvent,
    pub created_at: DateTime<Utc>,
}

/// An LLM call as stored, with its linkage and timestamp.
#[derive(Debug, Clone)]
pub struct LlmCallRow {
    pub trace_id: String,
    pub span_id: Option<String>,
    pub call: LlmCall,
    pub created_at: DateTime<Utc>,
}

/// Read-only view over the store.
pub struct TraceReader {
    conn: Connection,
}

impl TraceReader {
    pub fn open(path: &Path) -> ProviderResult<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Fetch one trace by id, scanning partitions newest first.
    pub fn get_trace(&self, trace_id: &str) -> ProviderResult<Option<TraceRecord>> {
        for partition in self.partitions("traces")?.iter().rev() {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT trace_id, name, operation_type, user_id, session_id, resource_id, \
                        started_at, ended_at, duration_ms, status, error_kind, error_message, \
                        prompt_tokens, completion_tokens, total_tokens, cost_usd, metadata \
                 FROM \"{}\" WHERE trace_id = ?1",
                partition.table
            ))?;
            let mut rows = stmt.query([trace_id])?;
            if let Some(row) = rows.next()? {
                return Ok(Some(trace_from_row(row)?));
            }
        }
        Ok(None)
    }

    /// All spans of a trace across partitions, ordered by start time.
    pub fn list_spans(&self, trace_id: &str) -> ProviderResult<Vec<SpanRecord>> {
        let mut spans = Vec::new();
        for partition in self.partitions("spans")? {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT trace_id, span_id, parent_span_id, name, span_type, started_at, \
                        ended_at, duration_ms, status, error_kind, error_message, \
                        model, prompt_tokens, completion_tokens, total_tokens, cost_usd, \
                        vector_count, dimensions, query, result_count, top_score, item_count, \
                        input_preview, output_preview, metadata \
                 FROM \"{}\" WHERE trace_id = ?1",
                partition.table
            ))?;
            let mapped = stmt.query_map([trace_id], span_from_row)?;
            for span in mapped {
                spans.push(span?);
            }
        }
        spans.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(spans)
    }

    /// Traces started inside `[from, to)`, optionally filtered by operation
    /// type and status. Only partitions overlapping the range are read.
    pub fn list_traces(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        operation_type: Option<&str>,
        status: Option<Status>,
    ) -> ProviderResult<Vec<TraceRecord>> {
        let mut traces = Vec::new();
        for partition in self.partitions_overlapping("traces", from.date_naive(), to.date_naive())? {
            let mut sql = format!(
                "SELECT trace_id, name, operation_type, user_id, session_id, resource_id, \
                        started_at, ended_at, duration_ms, status, error_kind, error_message, \
                        prompt_tokens, completion_tokens, total_tokens, cost_usd, metadata \
                 FROM \"{}\" WHERE started_at >= ?1 AND started_at < ?2",
                partition.table
            );
            let mut params: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(fmt_ts(from)), Box::new(fmt_ts(to))];
            if let Some(op) = operation_type {
                sql.push_str(&format!(" AND operation_type = ?{}", params.len() + 1));
                params.push(Box::new(op.to_string()));
            }
            if let Some(status) = status {
                sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
                params.push(Box::new(status.as_str().to_string()));
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let mapped = stmt.query_map(
                rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                trace_from_row,
            )?;
            for trace in mapped {
                traces.push(trace?);
            }
        }
        traces.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(traces)
    }

    pub fn list_llm_calls(&self, trace_id: &str) -> ProviderResult<Vec<LlmCallRow>> {
        let mut calls = Vec::new();
        for partition in self.partitions("llm_calls")? {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT trace_id, span_id, model, prompt_tokens, completion_tokens, \
                        total_tokens, cost_usd, latency_ms, status, error_message, created_at \
                 FROM \"{}\" WHERE trace_id = ?1 ORDER BY id",
                partition.table
            ))?;
            let mapped = stmt.query_map([trace_id], |row| {
                Ok(LlmCallRow {
                    trace_id: row.get(0)?,
                    span_id: row.get(1)?,
                    call: LlmCall {
                        model: row.get(2)?,
                        prompt_tokens: opt_u64(row, 3)?,
                        completion_tokens: opt_u64(row, 4)?,
                        total_tokens: opt_u64(row, 5)?,
                        cost_usd: row.get(6)?,
                        latency_ms: row.get(7)?,
                        status: parse_status(row, 8)?,
                        error_message: row.get(9)?,
                    },
                    created_at: parse_ts(row, 10)?,
                })
            })?;
            for call in mapped {
                calls.push(call?);
            }
        }
        Ok(calls)
    }

    pub fn list_chat_messages(&self, trace_id: &str) -> ProviderResult<Vec<ChatMessageRow>> {
        let mut messages = Vec::new();
        for partition in self.partitions("chat_messages")? {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT trace_id, span_id, role, content, turn_index, created_at \
                 FROM \"{}\" WHERE trace_id = ?1 ORDER BY turn_index",
                partition.table
            ))?;
            let mapped = stmt.query_map([trace_id], |row| {
                Ok(ChatMessageRow {
                    trace_id: row.get(0)?,
                    span_id: row.get(1)?,
                    message: ChatMessage {
                        role: row.get(2)?,
                        content: row.get(3)?,
                        turn_index: row.get(4)?,
                    },
                    created_at: parse_ts(row, 5)?,
                })
            })?;
            for message in mapped {
                messages.push(message?);
            }
        }
        Ok(messages)
    }

    pub fn list_document_events(&self, trace_id: &str) -> ProviderResult<Vec<DocumentEventRow>> {
        let mut events = Vec::new();
        for partition in self.partitions("document_events")? {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT trace_id, span_id, document_id, event_type, status, pages, \
                        chunk_count, embed_count, duration_ms, created_at \
                 FROM \"{}\" WHERE trace_id = ?1 ORDER BY id",
                partition.table
            ))?;
            let mapped = stmt.query_map([trace_id], |row| {
                Ok(DocumentEventRow {
                    trace_id: row.get(0)?,
                    span_id: row.get(1)?,
                    event: DocumentEvent {
                        document_id: row.get(2)?,
                        event_type: row.get(3)?,
                        status: row.get(4)?,
                        pages: row.get(5)?,
                        chunk_count: row.get(6)?,
                        embed_count: row.get(7)?,
                        duration_ms: row.get(8)?,
                    },
                    created_at: parse_ts(row, 9)?,
                })
            })?;
            for event in mapped {
                events.push(event?);
            }
        }
        Ok(events)
    }

    pub fn get_sync_status(
        &self,
        provider: &str,
        trace_id: &str,
    ) -> ProviderResult<Option<ProviderSyncStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT provider, trace_id, state, retry_count, external_id, updated_at \
             FROM sync_status WHERE provider = ?1 AND trace_id = ?2",
        )?;
        let mut rows = stmt.query([provider, trace_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(sync_status_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Traces still awaiting delivery to an external provider, oldest first.
    pub fn list_pending_sync(&self, limit: usize) -> ProviderResult<Vec<ProviderSyncStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT provider, trace_id, state, retry_count, external_id, updated_at \
             FROM sync_status WHERE state IN ('pending', 'failed') \
             ORDER BY updated_at LIMIT ?1",
        )?;
        let mapped = stmt.query_map([limit as i64], sync_status_from_row)?;
        let mut pending = Vec::new();
        for status in mapped {
            pending.push(status?);
        }
        Ok(pending)
    }

    fn partitions(&self, base: &str) -> ProviderResult<Vec<PartitionInfo>> {
        match spec(base) {
            Some(spec) => Ok(partitions::list_partitions(&self.conn, spec)?),
            None => Ok(Vec::new()),
        }
    }

    fn partitions_overlapping(
        &self,
        base: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ProviderResult<Vec<PartitionInfo>> {
        Ok(self
            .partitions(base)?
            .into_iter()
            .filter(|p| p.window_start <= to && p.window_end() > from)
            .collect())
    }
}

fn spec(base: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.base == base)
}

fn trace_from_row(row: &Row<'_>) -> rusqlite::Result<TraceRecord> {
    Ok(TraceRecord {
        trace_id: row.get(0)?,
        name: row.get(1)?,
        operation_type: row.get(2)?,
        user_id: row.get(3)?,
        session_id: row.get(4)?,
        resource_id: row.get(5)?,
        started_at: parse_ts(row, 6)?,
        ended_at: parse_opt_ts(row, 7)?,
        duration_ms: row.get(8)?,
        status: parse_status(row, 9)?,
        error_kind: row.get(10)?,
        error_message: row.get(11)?,
        aggregates: TraceAggregates {
            prompt_tokens: opt_u64(row, 12)?,
            completion_tokens: opt_u64(row, 13)?,
            total_tokens: opt_u64(row, 14)?,
            cost_usd: row.get(15)?,
        },
        metadata: parse_metadata(row, 16)?,
    })
}

fn span_from_row(row: &Row<'_>) -> rusqlite::Result<SpanRecord> {
    Ok(SpanRecord {
        trace_id: row.get(0)?,
        span_id: row.get(1)?,
        parent_span_id: row.get(2)?,
        name: row.get(3)?,
        span_type: SpanType::parse(&row.get::<_, String>(4)?),
        started_at: parse_ts(row, 5)?,
        ended_at: parse_opt_ts(row, 6)?,
        duration_ms: row.get(7)?,
        status: parse_status(row, 8)?,
        error_kind: row.get(9)?,
        error_message: row.get(10)?,
        metrics: SpanMetrics {
            model: row.get(11)?,
            prompt_tokens: opt_u64(row, 12)?,
            completion_tokens: opt_u64(row, 13)?,
            total_tokens: opt_u64(row, 14)?,
            cost_usd: row.get(15)?,
            vector_count: opt_u64(row, 16)?,
            dimensions: opt_u64(row, 17)?,
            query: row.get(18)?,
            result_count: opt_u64(row, 19)?,
            top_score: row.get(20)?,
            item_count: opt_u64(row, 21)?,
            input_preview: row.get(22)?,
            output_preview: row.get(23)?,
        },
        metadata: parse_metadata(row, 24)?,
    })
}

fn sync_status_from_row(row: &Row<'_>) -> rusqlite::Result<ProviderSyncStatus> {
    let state_raw: String = row.get(2)?;
    Ok(ProviderSyncStatus {
        provider: row.get(0)?,
        trace_id: row.get(1)?,
        state: SyncState::parse(&state_raw).unwrap_or(SyncState::Pending),
        retry_count: row.get(3)?,
        external_id: row.get(4)?,
        updated_at: parse_ts(row, 5)?,
    })
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn parse_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<Status> {
    let raw: String = row.get(idx)?;
    Ok(Status::parse(&raw).unwrap_or(Status::InProgress))
}

fn parse_metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<MetadataMap> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
        None => Ok(MetadataMap::default()),
    }
}

fn opt_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(|v| v.max(0) as u64))
}
