//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracekeeper::context::TraceContext;
use tracekeeper::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, MetadataMap, SpanMetrics, SpanType, Status,
    TraceAggregates,
};
use tracekeeper::provider::{ObservabilityProvider, ProviderError, ProviderResult, SpanHandle};
use tracekeeper::store::SqliteStore;

/// Open a store on a fresh temp database. The TempDir must outlive the store.
pub fn temp_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let store = SqliteStore::open(dir.path().join("obs.db"), 1024).expect("open store");
    (dir, store)
}

/// One provider call as seen by [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    StartTrace {
        trace_id: String,
        name: String,
        operation_type: String,
    },
    EndTrace {
        trace_id: String,
        status: Status,
        error_kind: Option<String>,
    },
    StartSpan {
        span_id: String,
        parent_span_id: Option<String>,
        name: String,
        span_type: SpanType,
    },
    EndSpan {
        span_id: String,
        status: Status,
        duration_ms: i64,
        error_kind: Option<String>,
        metrics: SpanMetrics,
    },
    LlmCall {
        model: String,
    },
    ChatMessage {
        role: String,
        turn_index: i64,
    },
    DocumentEvent {
        event_type: String,
    },
}

/// In-memory provider that records every call it receives.
pub struct RecordingProvider {
    name: &'static str,
    enabled: bool,
    calls: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingProvider {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            enabled: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn disabled(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            enabled: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Recorded) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObservabilityProvider for RecordingProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn start_trace(
        &self,
        ctx: &TraceContext,
        name: &str,
        operation_type: &str,
        _metadata: &MetadataMap,
    ) -> ProviderResult<()> {
        self.push(Recorded::StartTrace {
            trace_id: ctx.trace_id.clone(),
            name: name.to_string(),
            operation_type: operation_type.to_string(),
        });
        Ok(())
    }

    async fn end_trace(
        &self,
        ctx: &TraceContext,
        status: Status,
        error: Option<&ErrorInfo>,
        _aggregates: &TraceAggregates,
    ) -> ProviderResult<()> {
        self.push(Recorded::EndTrace {
            trace_id: ctx.trace_id.clone(),
            status,
            error_kind: error.map(|e| e.kind.clone()),
        });
        Ok(())
    }

    async fn start_span(
        &self,
        ctx: &TraceContext,
        name: &str,
        span_type: SpanType,
        _metadata: &MetadataMap,
    ) -> ProviderResult<SpanHandle> {
        self.push(Recorded::StartSpan {
            span_id: ctx.span_id.clone(),
            parent_span_id: ctx.parent_span_id.clone(),
            name: name.to_string(),
            span_type,
        });
        Ok(SpanHandle {
            trace_id: ctx.trace_id.clone(),
            span_id: ctx.span_id.clone(),
            span_type,
            started_at: chrono::Utc::now(),
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
        self.push(Recorded::EndSpan {
            span_id: handle.span_id.clone(),
            status,
            duration_ms,
            error_kind: error.map(|e| e.kind.clone()),
            metrics: metrics.clone(),
        });
        Ok(())
    }

    async fn log_llm_call(&self, _ctx: &TraceContext, call: &LlmCall) -> ProviderResult<()> {
        self.push(Recorded::LlmCall {
            model: call.model.clone(),
        });
        Ok(())
    }

    async fn log_chat_message(
        &self,
        _ctx: &TraceContext,
        message: &ChatMessage,
    ) -> ProviderResult<()> {
        self.push(Recorded::ChatMessage {
            role: message.role.clone(),
            turn_index: message.turn_index,
        });
        Ok(())
    }

    async fn log_document_event(
        &self,
        _ctx: &TraceContext,
        event: &DocumentEvent,
    ) -> ProviderResult<()> {
        self.push(Recorded::DocumentEvent {
            event_type: event.event_type.clone(),
        });
        Ok(())
    }
}

/// Provider that fails every call.
pub struct FailingProvider;

impl FailingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    fn fail<T>(&self) -> ProviderResult<T> {
        Err(ProviderError::Transport("injected failure".to_string()))
    }
}

#[async_trait]
impl ObservabilityProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn start_trace(
        &self,
        _ctx: &TraceContext,
        _name: &str,
        _operation_type: &str,
        _metadata: &MetadataMap,
    ) -> ProviderResult<()> {
        self.fail()
    }

    async fn end_trace(
        &self,
        _ctx: &TraceContext,
        _status: Status,
        _error: Option<&ErrorInfo>,
        _aggregates: &TraceAggregates,
    ) -> ProviderResult<()> {
        self.fail()
    }

    async fn start_span(
        &self,
        _ctx: &TraceContext,
        _name: &str,
        _span_type: SpanType,
        _metadata: &MetadataMap,
    ) -> ProviderResult<SpanHandle> {
        self.fail()
    }

    async fn end_span(
        &self,
        _handle: &SpanHandle,
        _status: Status,
        _duration_ms: i64,
        _error: Option<&ErrorInfo>,
        _metrics: &SpanMetrics,
    ) -> ProviderResult<()> {
        self.fail()
    }

    async fn log_llm_call(&self, _ctx: &TraceContext, _call: &LlmCall) -> ProviderResult<()> {
        self.fail()
    }

    async fn log_chat_message(
        &self,
        _ctx: &TraceContext,
        _message: &ChatMessage,
    ) -> ProviderResult<()> {
        self.fail()
    }

    async fn log_document_event(
        &self,
        _ctx: &TraceContext,
        _event: &DocumentEvent,
    ) -> ProviderResult<()> {
        self.fail()
    }
}

/// Provider that sleeps past any reasonable deadline before answering.
pub struct StallingProvider {
    delay: std::time::Duration,
}

impl StallingProvider {
    pub fn new(delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }

    async fn stall(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl ObservabilityProvider for StallingProvider {
    fn name(&self) -> &str {
        "stalling"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn start_trace(
        &self,
        _ctx: &TraceContext,
        _name: &str,
        _operation_type: &str,
        _metadata: &MetadataMap,
    ) -> ProviderResult<()> {
        self.stall().await;
        Ok(())
    }

    async fn end_trace(
        &self,
        _ctx: &TraceContext,
        _status: Status,
        _error: Option<&ErrorInfo>,
        _aggregates: &TraceAggregates,
    ) -> ProviderResult<()> {
        self.stall().await;
        Ok(())
    }

    async fn start_span(
        &self,
        ctx: &TraceContext,
        _name: &str,
        span_type: SpanType,
        _metadata: &MetadataMap,
    ) -> ProviderResult<SpanHandle> {
        self.stall().await;
        Ok(SpanHandle {
            trace_id: ctx.trace_id.clone(),
            span_id: ctx.span_id.clone(),
            span_type,
            started_at: chrono::Utc::now(),
        })
    }

    async fn end_span(
        &self,
        _handle: &SpanHandle,
        _status: Status,
        _duration_ms: i64,
        _error: Option<&ErrorInfo>,
        _metrics: &SpanMetrics,
    ) -> ProviderResult<()> {
        self.stall().await;
        Ok(())
    }

    async fn log_llm_call(&self, _ctx: &TraceContext, _call: &LlmCall) -> ProviderResult<()> {
        self.stall().await;
        Ok(())
    }

    async fn log_chat_message(
        &self,
        _ctx: &TraceContext,
        _message: &ChatMessage,
    ) -> ProviderResult<()> {
        self.stall().await;
        Ok(())
    }

    async fn log_document_event(
        &self,
        _ctx: &TraceContext,
        _event: &DocumentEvent,
    ) -> ProviderResult<()> {
        self.stall().await;
        Ok(())
    }
}
