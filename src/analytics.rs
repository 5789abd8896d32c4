//! External analytics provider.
//!
//! # Responsibilities
//! - Post trace/span/event envelopes to a vendor ingest endpoint
//! - Report `enabled() == false` when not fully configured
//! - Record per-trace delivery bookkeeping through the store's sync sink
//!
//! # Design Decisions
//! - Missing endpoint or api key disables the provider; it is never a
//!   construction error
//! - No inline retry: a failed post marks the trace `failed` in sync_status
//!   and moves on; reconciliation is a separate extension
//! - Request timeout is the provider's own deadline, inside the service's
//!   per-call deadline

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::schema::AnalyticsConfig;
use crate::context::TraceContext;
use crate::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, MetadataMap, SpanMetrics, SpanType, Status,
    SyncState, TraceAggregates,
};
use crate::provider::{ObservabilityProvider, ProviderError, ProviderResult, SpanHandle};
use crate::store::SyncStatusSink;

pub const ANALYTICS_PROVIDER_NAME: &str = "analytics";

/// Vendor-backed analytics provider.
pub struct AnalyticsProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    request_timeout: Duration,
    enabled: bool,
    sync: Option<SyncStatusSink>,
}

impl AnalyticsProvider {
    /// Build from configuration. `sync` is the store's bookkeeping sink;
    /// pass None to skip delivery tracking.
    pub fn new(config: &AnalyticsConfig, sync: Option<SyncStatusSink>) -> Self {
        let configured =
            config.enabled && !config.endpoint.trim().is_empty() && !config.api_key.trim().is_empty();
        if config.enabled && !configured {
            tracing::warn!(
                "analytics provider requested but endpoint or api_key missing; provider disabled"
            );
        }

        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
            enabled: configured,
            sync,
        }
    }

    /// Post one envelope; returns the backend's correlation id if it sent one.
    async fn post(&self, kind: &'static str, body: serde_json::Value) -> ProviderResult<Option<String>> {
        let envelope = json!({ "kind": kind, "data": body });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "ingest returned {}",
                status
            )));
        }

        let external_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str().map(String::from)));
        Ok(external_id)
    }

    fn record_sync(&self, trace_id: &str, state: SyncState, external_id: Option<String>) {
        if let Some(sync) = &self.sync {
            sync.record(ANALYTICS_PROVIDER_NAME, trace_id, state, external_id);
        }
    }
}

#[async_trait]
impl ObservabilityProvider for AnalyticsProvider {
    fn name(&self) -> &str {
        ANALYTICS_PROVIDER_NAME
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn start_trace(
        &self,
        ctx: &TraceContext,
        name: &str,
        operation_type: &str,
        metadata: &MetadataMap,
    ) -> ProviderResult<()> {
        let body = json!({
            "trace_id": ctx.trace_id,
            "name": name,
            "operation_type": operation_type,
            "user_id": ctx.scope.user_id,
            "session_id": ctx.scope.session_id,
            "resource_id": ctx.scope.resource_id,
            "metadata": metadata,
        });
        match self.post("trace_start", body).await {
            Ok(_) => {
                self.record_sync(&ctx.trace_id, SyncState::Pending, None);
                Ok(())
            }
            Err(e) => {
                self.record_sync(&ctx.trace_id, SyncState::Failed, None);
                Err(e)
            }
        }
    }

    async fn end_trace(
        &self,
        ctx: &TraceContext,
        status: Status,
        error: Option<&ErrorInfo>,
        aggregates: &TraceAggregates,
    ) -> ProviderResult<()> {
        let body = json!({
            "trace_id": ctx.trace_id,
            "status": status.as_str(),
            "error": error,
            "aggregates": aggregates,
        });
        match self.post("trace_end", body).await {
            Ok(external_id) => {
                self.record_sync(&ctx.trace_id, SyncState::Synced, external_id);
                Ok(())
            }
            Err(e) => {
                self.record_sync(&ctx.trace_id, SyncState::Failed, None);
                Err(e)
            }
        }
    }

    async fn start_span(
        &self,
        ctx: &TraceContext,
        name: &str,
        span_type: SpanType,
        metadata: &MetadataMap,
    ) -> ProviderResult<SpanHandle> {
        let body = json!({
            "trace_id": ctx.trace_id,
            "span_id": ctx.span_id,
            "parent_span_id": ctx.parent_span_id,
            "name": name,
            "span_type": span_type.as_str(),
            "metadata": metadata,
        });
        self.post("span_start", body).await?;
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
        let kept = metrics.clone().retain_for(handle.span_type);
        let body = json!({
            "trace_id": handle.trace_id,
            "span_id": handle.span_id,
            "status": status.as_str(),
            "duration_ms": duration_ms,
            "error": error,
            "metrics": kept,
        });
        self.post("span_end", body).await?;
        Ok(())
    }

    async fn log_llm_call(&self, ctx: &TraceContext, call: &LlmCall) -> ProviderResult<()> {
        let body = json!({
            "trace_id": ctx.trace_id,
            "span_id": ctx.span_id,
            "call": call,
        });
        self.post("llm_call", body).await?;
        Ok(())
    }

    async fn log_chat_message(
        &self,
        ctx: &TraceContext,
        message: &ChatMessage,
    ) -> ProviderResult<()> {
        let body = json!({
            "trace_id": ctx.trace_id,
            "span_id": ctx.span_id,
            "message": message,
        });
        self.post("chat_message", body).await?;
        Ok(())
    }

    async fn log_document_event(
        &self,
        ctx: &TraceContext,
        event: &DocumentEvent,
    ) -> ProviderResult<()> {
        let body = json!({
            "trace_id": ctx.trace_id,
            "span_id": ctx.span_id,
            "event": event,
        });
        self.post("document_event", body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_provider_is_disabled_not_an_error() {
        let provider = AnalyticsProvider::new(&AnalyticsConfig::default(), None);
        assert!(!provider.enabled());

        let half_configured = AnalyticsConfig {
            enabled: true,
            endpoint: "https://ingest.example.com/v1".into(),
            api_key: String::new(),
            ..Default::default()
        };
        let provider = AnalyticsProvider::new(&half_configured, None);
        assert!(!provider.enabled());
    }

    #[test]
    fn test_fully_configured_provider_is_enabled() {
        let config = AnalyticsConfig {
            enabled: true,
            endpoint: "https://ingest.example.com/v1".into(),
            api_key: "k".into(),
            ..Default::default()
        };
        let provider = AnalyticsProvider::new(&config, None);
        assert!(provider.enabled());
    }
}
