//! End-to-end write/flush/read cycles through the partitioned store.

mod common;

use chrono::{Duration, Utc};
use common::temp_store;
use tracekeeper::context::{TraceContext, TraceScope};
use tracekeeper::model::{
    ChatMessage, DocumentEvent, ErrorInfo, LlmCall, MetadataMap, SpanMetrics, SpanType, Status,
    SyncState, TraceAggregates,
};
use tracekeeper::provider::ObservabilityProvider;

#[tokio::test]
async fn test_trace_round_trip() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let ctx = TraceContext::create(TraceScope::user("u-1"));
    let mut metadata = MetadataMap::new();
    metadata.insert("source".into(), serde_json::json!("api"));

    provider
        .start_trace(&ctx, "chat_turn", "chat", &metadata)
        .await
        .unwrap();
    provider
        .end_trace(
            &ctx,
            Status::Success,
            None,
            &TraceAggregates {
                total_tokens: Some(512),
                cost_usd: Some(0.004),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();
    let trace = reader.get_trace(&ctx.trace_id).unwrap().expect("trace stored");
    assert_eq!(trace.name, "chat_turn");
    assert_eq!(trace.operation_type, "chat");
    assert_eq!(trace.user_id.as_deref(), Some("u-1"));
    assert_eq!(trace.status, Status::Success);
    assert!(trace.ended_at.is_some());
    assert!(trace.duration_ms.unwrap() >= 0);
    assert_eq!(trace.aggregates.total_tokens, Some(512));
    assert_eq!(trace.metadata.get("source"), Some(&serde_json::json!("api")));
}

#[tokio::test]
async fn test_span_round_trip_filters_inapplicable_metrics() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let ctx = TraceContext::create(TraceScope::default());
    provider
        .start_trace(&ctx, "chat_turn", "chat", &MetadataMap::new())
        .await
        .unwrap();

    let child = ctx.child_context();
    let handle = provider
        .start_span(&child, "generate", SpanType::Llm, &MetadataMap::new())
        .await
        .unwrap();
    let metrics = SpanMetrics {
        model: Some("gpt-x".into()),
        total_tokens: Some(128),
        input_preview: Some("hello".into()),
        // not an llm field, must be dropped on write
        vector_count: Some(99),
        ..Default::default()
    };
    provider
        .end_span(&handle, Status::Success, 37, None, &metrics)
        .await
        .unwrap();
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();
    let spans = reader.list_spans(&ctx.trace_id).unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.span_id, child.span_id);
    assert_eq!(span.parent_span_id.as_deref(), Some(ctx.span_id.as_str()));
    assert_eq!(span.span_type, SpanType::Llm);
    assert_eq!(span.status, Status::Success);
    assert_eq!(span.duration_ms, Some(37));
    assert_eq!(span.metrics.model.as_deref(), Some("gpt-x"));
    assert_eq!(span.metrics.total_tokens, Some(128));
    assert_eq!(span.metrics.input_preview.as_deref(), Some("hello"));
    assert!(span.metrics.vector_count.is_none());
}

#[tokio::test]
async fn test_span_error_fields_persist() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let ctx = TraceContext::create(TraceScope::default());
    provider
        .start_trace(&ctx, "ingest", "document", &MetadataMap::new())
        .await
        .unwrap();

    let child = ctx.child_context();
    let handle = provider
        .start_span(&child, "parse", SpanType::Parse, &MetadataMap::new())
        .await
        .unwrap();
    let error = ErrorInfo::new("ParseError", "corrupt pdf header");
    provider
        .end_span(&handle, Status::Error, 12, Some(&error), &SpanMetrics::default())
        .await
        .unwrap();
    store.flush().await.unwrap();

    provider
        .end_trace(&ctx, Status::Error, Some(&error), &TraceAggregates::default())
        .await
        .unwrap();
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();
    let spans = reader.list_spans(&ctx.trace_id).unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::Error);
    assert_eq!(spans[0].duration_ms, Some(12));
    assert_eq!(spans[0].error_kind.as_deref(), Some("ParseError"));
    assert_eq!(spans[0].error_message.as_deref(), Some("corrupt pdf header"));

    let trace = reader.get_trace(&ctx.trace_id).unwrap().unwrap();
    assert_eq!(trace.status, Status::Error);
    assert_eq!(trace.error_kind.as_deref(), Some("ParseError"));
}

#[tokio::test]
async fn test_span_for_unseen_trace_creates_stub_trace() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    // no start_trace for this context
    let ctx = TraceContext::create(TraceScope::default()).child_context();
    let handle = provider
        .start_span(&ctx, "orphan", SpanType::Tool, &MetadataMap::new())
        .await
        .unwrap();
    provider
        .end_span(&handle, Status::Success, 1, None, &SpanMetrics::default())
        .await
        .unwrap();
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();
    let trace = reader.get_trace(&ctx.trace_id).unwrap().expect("stub created");
    assert_eq!(trace.name, "(implicit)");
    assert_eq!(trace.operation_type, "unknown");
    assert_eq!(reader.list_spans(&ctx.trace_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_end_trace_for_unknown_trace_is_a_noop() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let ctx = TraceContext::create(TraceScope::default());
    provider
        .end_trace(&ctx, Status::Success, None, &TraceAggregates::default())
        .await
        .unwrap();
    store.flush().await.unwrap();

    assert!(store.reader().unwrap().get_trace(&ctx.trace_id).unwrap().is_none());
}

#[tokio::test]
async fn test_list_traces_filters_by_operation_and_status() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let chat = TraceContext::create(TraceScope::default());
    provider
        .start_trace(&chat, "turn", "chat", &MetadataMap::new())
        .await
        .unwrap();
    provider
        .end_trace(&chat, Status::Success, None, &TraceAggregates::default())
        .await
        .unwrap();

    let ingest = TraceContext::create(TraceScope::default());
    provider
        .start_trace(&ingest, "upload", "document", &MetadataMap::new())
        .await
        .unwrap();
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();
    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);

    let all = reader.list_traces(from, to, None, None).unwrap();
    assert_eq!(all.len(), 2);

    let chats = reader.list_traces(from, to, Some("chat"), None).unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].trace_id, chat.trace_id);

    let open = reader
        .list_traces(from, to, None, Some(Status::InProgress))
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].trace_id, ingest.trace_id);

    let outside = reader
        .list_traces(from - Duration::days(7), from, None, None)
        .unwrap();
    assert!(outside.is_empty());
}

#[tokio::test]
async fn test_single_shot_records_round_trip() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let ctx = TraceContext::create(TraceScope::default());
    provider
        .start_trace(&ctx, "turn", "chat", &MetadataMap::new())
        .await
        .unwrap();
    provider
        .log_llm_call(
            &ctx,
            &LlmCall {
                model: "gpt-x".into(),
                total_tokens: Some(64),
                latency_ms: Some(420),
                status: Status::Success,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    provider
        .log_chat_message(
            &ctx,
            &ChatMessage {
                role: "user".into(),
                content: "hello".into(),
                turn_index: 0,
            },
        )
        .await
        .unwrap();
    provider
        .log_document_event(
            &ctx,
            &DocumentEvent {
                document_id: Some("doc-7".into()),
                event_type: "chunked".into(),
                status: "success".into(),
                chunk_count: Some(18),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();

    let calls = reader.list_llm_calls(&ctx.trace_id).unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].call.model, "gpt-x");
    assert_eq!(calls[0].call.total_tokens, Some(64));
    assert_eq!(calls[0].span_id.as_deref(), Some(ctx.span_id.as_str()));

    let messages = reader.list_chat_messages(&ctx.trace_id).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message.role, "user");

    let events = reader.list_document_events(&ctx.trace_id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.document_id.as_deref(), Some("doc-7"));
    assert_eq!(events[0].event.chunk_count, Some(18));
}

#[tokio::test]
async fn test_writes_after_close_report_writer_closed() {
    let (_dir, store) = temp_store();
    let provider = store.provider();

    let ctx = TraceContext::create(TraceScope::default());
    provider
        .start_trace(&ctx, "turn", "chat", &MetadataMap::new())
        .await
        .unwrap();
    store.close();

    // close drains the queue before the writer exits
    let reader = tracekeeper::store::TraceReader::open(_dir.path().join("obs.db").as_path()).unwrap();
    assert!(reader.get_trace(&ctx.trace_id).unwrap().is_some());

    let err = provider
        .start_trace(&ctx, "turn", "chat", &MetadataMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        tracekeeper::provider::ProviderError::WriterClosed
    ));
}

#[tokio::test]
async fn test_sync_status_upsert_counts_failures() {
    let (_dir, store) = temp_store();
    let sink = store.sync_sink();

    sink.record("analytics", "t-1", SyncState::Pending, None);
    sink.record("analytics", "t-1", SyncState::Failed, None);
    sink.record("analytics", "t-1", SyncState::Failed, None);
    sink.record("analytics", "t-2", SyncState::Synced, Some("ext-9".into()));
    store.flush().await.unwrap();

    let reader = store.reader().unwrap();

    let failed = reader.get_sync_status("analytics", "t-1").unwrap().unwrap();
    assert_eq!(failed.state, SyncState::Failed);
    assert_eq!(failed.retry_count, 2);

    let synced = reader.get_sync_status("analytics", "t-2").unwrap().unwrap();
    assert_eq!(synced.state, SyncState::Synced);
    assert_eq!(synced.external_id.as_deref(), Some("ext-9"));

    let pending = reader.list_pending_sync(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].trace_id, "t-1");
}
