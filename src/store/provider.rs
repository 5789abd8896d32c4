//! Provider facade over the store's write queue.
//!
//! Each trait method translates to one enqueued command; the caller never
//! waits on disk I/O. Backpressure surfaces as `QueueFull`, which the
//! service swallows like any other provider failure.

use std::sync::mpsc::{SyncSender, TrySendError};

use async_trait::async_trait;
use chrono::Utc;

use crate::context::TraceContext;
use crate::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, MetadataMap, SpanMetrics, SpanType, Status,
    TraceAggregates,
};
use crate::provider::{ObservabilityProvider, ProviderError, ProviderResult, SpanHandle};
use crate::store::writer::StoreCommand;

pub const SQLITE_PROVIDER_NAME: &str = "sqlite_store";

/// The always-on persistent provider.
#[derive(Clone)]
pub struct SqliteProvider {
    tx: SyncSender<StoreCommand>,
}

impl SqliteProvider {
    pub(crate) fn new(tx: SyncSender<StoreCommand>) -> Self {
        Self { tx }
    }

    fn enqueue(&self, cmd: StoreCommand) -> ProviderResult<()> {
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => ProviderError::QueueFull,
            TrySendError::Disconnected(_) => ProviderError::WriterClosed,
        })
    }
}

fn encode_metadata(metadata: &MetadataMap) -> ProviderResult<String> {
    Ok(serde_json::to_string(metadata)?)
}

#[async_trait]
impl ObservabilityProvider for SqliteProvider {
    fn name(&self) -> &str {
        SQLITE_PROVIDER_NAME
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn start_trace(
        &self,
        ctx: &TraceContext,
        name: &str,
        operation_type: &str,
        metadata: &MetadataMap,
    ) -> ProviderResult<()> {
        self.enqueue(StoreCommand::StartTrace {
            ctx: ctx.clone(),
            name: name.to_string(),
            operation_type: operation_type.to_string(),
            metadata: encode_metadata(metadata)?,
            at: Utc::now(),
        })
    }

    async fn end_trace(
        &self,
        ctx: &TraceContext,
        status: Status,
        error: Option<&ErrorInfo>,
        aggregates: &TraceAggregates,
    ) -> ProviderResult<()> {
        self.enqueue(StoreCommand::EndTrace {
            trace_id: ctx.trace_id.clone(),
            status,
            error: error.cloned(),
            aggregates: aggregates.clone(),
            at: Utc::now(),
        })
    }

    async fn start_span(
        &self,
        ctx: &TraceContext,
        name: &str,
        span_type: SpanType,
        metadata: &MetadataMap,
    ) -> ProviderResult<SpanHandle> {
        let at = Utc::now();
        self.enqueue(StoreCommand::StartSpan {
            ctx: ctx.clone(),
            name: name.to_string(),
            span_type,
            metadata: encode_metadata(metadata)?,
            at,
        })?;
        Ok(SpanHandle {
            trace_id: ctx.trace_id.clone(),
            span_id: ctx.span_id.clone(),
            span_type,
            started_at: at,
        })
    }

    async fn end_span(
        &self,
        handle: &SpanHandle,
        status: Status,
        duration_ms: i64,
        error: Option<&ErrorInfo>,
        metrics: &SpanMetrics,
    ) -> ProviderResult<()> {
        self.enqueue(StoreCommand::EndSpan {
            handle: handle.clone(),
            status,
            duration_ms,
            error: error.cloned(),
            metrics: metrics.clone(),
            at: Utc::now(),
        })
    }

    async fn log_llm_call(&self, ctx: &TraceContext, call: &LlmCall) -> ProviderResult<()> {
        self.enqueue(StoreCommand::LlmCall {
            trace_id: ctx.trace_id.clone(),
            span_id: Some(ctx.span_id.clone()),
            call: call.clone(),
            at: Utc::now(),
        })
    }

    async fn log_chat_message(
        &self,
        ctx: &TraceContext,
        message: &ChatMessage,
    ) -> ProviderResult<()> {
        self.enqueue(StoreCommand::ChatMessage {
            trace_id: ctx.trace_id.clone(),
            span_id: Some(ctx.span_id.clone()),
            message: message.clone(),
            at: Utc::now(),
        })
    }

    async fn log_document_event(
        &self,
        ctx: &TraceContext,
        event: &DocumentEvent,
    ) -> ProviderResult<()> {
        self.enqueue(StoreCommand::DocumentEvent {
            trace_id: ctx.trace_id.clone(),
            span_id: Some(ctx.span_id.clone()),
            event: event.clone(),
            at: Utc::now(),
        })
    }
}
