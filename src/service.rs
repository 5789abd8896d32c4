//! Registry and fan-out facade.
//!
//! # Responsibilities
//! - Hold the filtered list of enabled providers, fixed at construction
//! - Fan every call out to all providers with per-call deadlines
//! - Isolate provider failures: log, count, continue; never propagate
//! - Scoped span acquisition with end_span guaranteed on every exit path
//!
//! # Design Decisions
//! - Construct once and inject; no global singleton, no hot reload
//! - A provider timeout is an ordinary swallowed failure, identical to an
//!   error return
//! - Only the caller's own error (from inside a `span` closure) ever leaves
//!   this module, and it leaves unmodified

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::schema::ServiceConfig;
use crate::context::{TraceContext, TraceScope};
use crate::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, MetadataMap, SpanMetrics, SpanType, Status,
    TraceAggregates,
};
use crate::provider::{ObservabilityProvider, ProviderResult, SpanHandle};

/// Mutable metric sink handed to `span` closures so business code can
/// attach type-specific measurements to the surrounding span.
#[derive(Clone, Default)]
pub struct SpanRecorder {
    inner: Arc<Mutex<SpanMetrics>>,
}

impl SpanRecorder {
    pub fn record(&self, f: impl FnOnce(&mut SpanMetrics)) {
        let mut metrics = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut metrics);
    }

    fn take(&self) -> SpanMetrics {
        let mut metrics = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *metrics)
    }
}

/// The one facade instrumented business code talks to.
pub struct ObservabilityService {
    providers: Vec<Arc<dyn ObservabilityProvider>>,
    call_timeout: Duration,
    preview_max_bytes: usize,
    error_max_bytes: usize,
}

impl ObservabilityService {
    /// Build the registry from an ordered provider list, keeping only
    /// enabled providers. Disabled providers receive zero calls for the
    /// service's whole lifetime.
    pub fn new(providers: Vec<Arc<dyn ObservabilityProvider>>, config: &ServiceConfig) -> Self {
        let providers: Vec<_> = providers
            .into_iter()
            .filter(|p| {
                if p.enabled() {
                    tracing::info!(provider = p.name(), "observability provider registered");
                    true
                } else {
                    tracing::info!(provider = p.name(), "observability provider disabled, skipping");
                    false
                }
            })
            .collect();

        Self {
            providers,
            call_timeout: Duration::from_millis(config.provider_timeout_ms.max(1)),
            preview_max_bytes: config.preview_max_bytes,
            error_max_bytes: config.error_max_bytes,
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Mint a trace context and record the trace start on every provider.
    /// The context is returned regardless of provider outcomes.
    pub async fn start_trace(
        &self,
        name: &str,
        operation_type: &str,
        scope: TraceScope,
        metadata: MetadataMap,
    ) -> TraceContext {
        let ctx = TraceContext::create(scope);
        for provider in &self.providers {
            self.dispatch(
                provider,
                "start_trace",
                provider.start_trace(&ctx, name, operation_type, &metadata),
            )
            .await;
        }
        ctx
    }

    /// Finalize the trace on every provider.
    pub async fn end_trace(
        &self,
        ctx: &TraceContext,
        status: Status,
        error: Option<ErrorInfo>,
        aggregates: TraceAggregates,
    ) {
        let error = error.map(|e| e.truncated(self.error_max_bytes));
        for provider in &self.providers {
            self.dispatch(
                provider,
                "end_trace",
                provider.end_trace(ctx, status, error.as_ref(), &aggregates),
            )
            .await;
        }
    }

    /// Run `f` inside a child span.
    ///
    /// Derives a child context, opens the span on every provider, times the
    /// closure, then closes the span exactly once per provider that returned
    /// a handle, on every exit path. The closure's result is returned
    /// unchanged; in particular an `Err` is recorded (status `error`,
    /// truncated Display) and then handed back untouched.
    pub async fn span<F, Fut, T, E>(
        &self,
        ctx: &TraceContext,
        name: &str,
        span_type: SpanType,
        metadata: MetadataMap,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TraceContext, SpanRecorder) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let child = ctx.child_context();

        let mut handles: Vec<(usize, SpanHandle)> = Vec::with_capacity(self.providers.len());
        for (idx, provider) in self.providers.iter().enumerate() {
            match tokio::time::timeout(
                self.call_timeout,
                provider.start_span(&child, name, span_type, &metadata),
            )
            .await
            {
                Ok(Ok(handle)) => handles.push((idx, handle)),
                Ok(Err(e)) => self.note_failure(provider.name(), "start_span", &e),
                Err(_) => self.note_timeout(provider.name(), "start_span"),
            }
        }

        let recorder = SpanRecorder::default();
        let timer = Instant::now();
        let result = f(child, recorder.clone()).await;
        let duration_ms = timer.elapsed().as_millis() as i64;

        let (status, error) = match &result {
            Ok(_) => (Status::Success, None),
            Err(e) => (
                Status::Error,
                Some(
                    ErrorInfo::new(std::any::type_name::<E>(), e.to_string())
                        .truncated(self.error_max_bytes),
                ),
            ),
        };
        let metrics = recorder.take().truncate_previews(self.preview_max_bytes);

        for (idx, handle) in &handles {
            let provider = &self.providers[*idx];
            self.dispatch(
                provider,
                "end_span",
                provider.end_span(handle, status, duration_ms, error.as_ref(), &metrics),
            )
            .await;
        }

        result
    }

    /// Record one LLM invocation on every provider.
    pub async fn log_llm_call(&self, ctx: &TraceContext, call: LlmCall) {
        for provider in &self.providers {
            self.dispatch(provider, "log_llm_call", provider.log_llm_call(ctx, &call))
                .await;
        }
    }

    /// Record one chat turn message on every provider.
    pub async fn log_chat_message(&self, ctx: &TraceContext, message: ChatMessage) {
        for provider in &self.providers {
            self.dispatch(
                provider,
                "log_chat_message",
                provider.log_chat_message(ctx, &message),
            )
            .await;
        }
    }

    /// Record one document pipeline event on every provider.
    pub async fn log_document_event(&self, ctx: &TraceContext, event: DocumentEvent) {
        for provider in &self.providers {
            self.dispatch(
                provider,
                "log_document_event",
                provider.log_document_event(ctx, &event),
            )
            .await;
        }
    }

    /// Run one provider call under the per-call deadline, swallowing any
    /// failure. Fan-out always continues to the remaining providers.
    async fn dispatch<F>(&self, provider: &Arc<dyn ObservabilityProvider>, op: &'static str, fut: F)
    where
        F: Future<Output = ProviderResult<()>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.note_failure(provider.name(), op, &e),
            Err(_) => self.note_timeout(provider.name(), op),
        }
    }

    fn note_failure(&self, provider: &str, op: &'static str, error: &dyn Display) {
        metrics::counter!(
            "tracekeeper_provider_failures_total",
            "provider" => provider.to_string(),
            "op" => op
        )
        .increment(1);
        tracing::warn!(provider, operation = op, error = %error, "provider call failed");
    }

    fn note_timeout(&self, provider: &str, op: &'static str) {
        metrics::counter!(
            "tracekeeper_provider_timeouts_total",
            "provider" => provider.to_string(),
            "op" => op
        )
        .increment(1);
        tracing::warn!(provider, operation = op, "provider call timed out");
    }
}
