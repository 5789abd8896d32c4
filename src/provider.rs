//! Provider capability interface.
//!
//! # Responsibilities
//! - Define the contract every observability backend implements
//! - Carry provider-local span handles between start_span and end_span
//! - Classify provider failures so the service can swallow them uniformly
//!
//! # Design Decisions
//! - Closed trait with a compile-time-known set of implementations (the
//!   SQLite store and optional external analytics); this is configured
//!   plumbing, not an open plugin system
//! - Errors never cross the service boundary; they exist so providers can
//!   use `?` internally and the registry can log a structured reason

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::context::TraceContext;
use crate::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, MetadataMap, SpanMetrics, SpanType, Status,
    TraceAggregates,
};

/// Errors a provider write can fail with. All of them are swallowed and
/// logged by the service; none reach the instrumented caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// SQLite-level failure in the persistent store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Network-level failure reaching an external backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Bounded write queue is full; the write was dropped.
    #[error("write queue full, record dropped")]
    QueueFull,

    /// The provider's writer has shut down.
    #[error("writer closed")]
    WriterClosed,

    /// The write did not complete within the provider's own deadline.
    #[error("provider write timed out")]
    Timeout,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Opaque per-provider token returned by `start_span` and handed back to the
/// same provider's `end_span`. Carries enough identity for the provider to
/// locate the open span without any shared mutable state.
#[derive(Debug, Clone)]
pub struct SpanHandle {
    pub trace_id: String,
    pub span_id: String,
    pub span_type: SpanType,
    pub started_at: DateTime<Utc>,
}

/// Contract implemented by every observability backend.
///
/// Implementations must be safe to call from many concurrent operations and
/// must never block on the caller's critical path longer than their own
/// internal deadline.
#[async_trait]
pub trait ObservabilityProvider: Send + Sync {
    /// Stable name used in logs, metrics, and sync-status bookkeeping.
    fn name(&self) -> &str;

    /// Computed once from configuration. The registry never invokes a
    /// provider whose `enabled` is false.
    fn enabled(&self) -> bool;

    /// Create the durable trace record keyed by `ctx.trace_id`.
    async fn start_trace(
        &self,
        ctx: &TraceContext,
        name: &str,
        operation_type: &str,
        metadata: &MetadataMap,
    ) -> ProviderResult<()>;

    /// Finalize the trace record. A missing record is a safe no-op.
    async fn end_trace(
        &self,
        ctx: &TraceContext,
        status: Status,
        error: Option<&ErrorInfo>,
        aggregates: &TraceAggregates,
    ) -> ProviderResult<()>;

    /// Open a span row and return a provider-local handle. Must tolerate a
    /// trace this provider never saw start_trace for (an implicit stub is
    /// created rather than failing).
    async fn start_span(
        &self,
        ctx: &TraceContext,
        name: &str,
        span_type: SpanType,
        metadata: &MetadataMap,
    ) -> ProviderResult<SpanHandle>;

    /// Close the span opened by `start_span`. Metric fields inapplicable to
    /// the handle's span type are dropped silently.
    async fn end_span(
        &self,
        handle: &SpanHandle,
        status: Status,
        duration_ms: i64,
        error: Option<&ErrorInfo>,
        metrics: &SpanMetrics,
    ) -> ProviderResult<()>;

    /// Single-shot durable record of one LLM invocation.
    async fn log_llm_call(&self, ctx: &TraceContext, call: &LlmCall) -> ProviderResult<()>;

    /// Single-shot durable record of one chat turn message.
    async fn log_chat_message(
        &self,
        ctx: &TraceContext,
        message: &ChatMessage,
    ) -> ProviderResult<()>;

    /// Single-shot durable record of one document pipeline event.
    async fn log_document_event(
        &self,
        ctx: &TraceContext,
        event: &DocumentEvent,
    ) -> ProviderResult<()>;
}
