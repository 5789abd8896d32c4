//! Data model for traces, spans, and domain events.
//!
//! Span metric columns are deliberately denormalized: every type-specific
//! field lives directly on the span row so the trace-detail read path is a
//! single query per partition. `SpanMetrics::retain_for` enforces which
//! fields apply to which span type; inapplicable fields are dropped
//! silently, never treated as errors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to traces, spans, and events.
pub type MetadataMap = BTreeMap<String, serde_json::Value>;

/// Lifecycle status shared by traces and spans.
///
/// Transitions in_progress -> {success, error} exactly once; nothing besides
/// the owning end call mutates a record after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InProgress,
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::InProgress => "in_progress",
            Status::Success => "success",
            Status::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Status::InProgress),
            "success" => Some(Status::Success),
            "error" => Some(Status::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::InProgress
    }
}

/// Kind of sub-operation a span measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    Llm,
    Embedding,
    Retrieval,
    Parse,
    Chunk,
    Index,
    Rerank,
    Tool,
    Other,
}

impl SpanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanType::Llm => "llm",
            SpanType::Embedding => "embedding",
            SpanType::Retrieval => "retrieval",
            SpanType::Parse => "parse",
            SpanType::Chunk => "chunk",
            SpanType::Index => "index",
            SpanType::Rerank => "rerank",
            SpanType::Tool => "tool",
            SpanType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "llm" => SpanType::Llm,
            "embedding" => SpanType::Embedding,
            "retrieval" => SpanType::Retrieval,
            "parse" => SpanType::Parse,
            "chunk" => SpanType::Chunk,
            "index" => SpanType::Index,
            "rerank" => SpanType::Rerank,
            "tool" => SpanType::Tool,
            _ => SpanType::Other,
        }
    }
}

/// Error captured on a failed trace or span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type name, truncated.
    pub kind: String,
    /// Display rendering of the error, truncated.
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Cap both fields at `max` bytes, on a char boundary.
    pub fn truncated(mut self, max: usize) -> Self {
        truncate_in_place(&mut self.kind, max);
        truncate_in_place(&mut self.message, max);
        self
    }
}

/// Token and cost counters aggregated onto the trace at end_trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceAggregates {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

/// Flat, denormalized per-span-type metric fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanMetrics {
    // llm / embedding
    pub model: Option<String>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost_usd: Option<f64>,

    // embedding
    pub vector_count: Option<u64>,
    pub dimensions: Option<u64>,

    // retrieval / rerank
    pub query: Option<String>,
    pub result_count: Option<u64>,
    pub top_score: Option<f64>,

    // parse / chunk / index
    pub item_count: Option<u64>,

    // llm / tool
    pub input_preview: Option<String>,
    pub output_preview: Option<String>,
}

impl SpanMetrics {
    /// Keep only the fields that apply to `span_type`; everything else is
    /// dropped silently.
    pub fn retain_for(mut self, span_type: SpanType) -> Self {
        let keep_model = matches!(span_type, SpanType::Llm | SpanType::Embedding | SpanType::Rerank);
        let keep_tokens = matches!(span_type, SpanType::Llm | SpanType::Embedding);
        let keep_cost = matches!(span_type, SpanType::Llm | SpanType::Embedding);
        let keep_vectors = matches!(span_type, SpanType::Embedding | SpanType::Index);
        let keep_query = matches!(span_type, SpanType::Retrieval | SpanType::Rerank);
        let keep_counts = matches!(
            span_type,
            SpanType::Parse | SpanType::Chunk | SpanType::Index | SpanType::Retrieval
        );
        let keep_previews = matches!(span_type, SpanType::Llm | SpanType::Tool);

        if !keep_model {
            self.model = None;
        }
        if !keep_tokens {
            self.prompt_tokens = None;
            self.completion_tokens = None;
            self.total_tokens = None;
        }
        if !keep_cost {
            self.cost_usd = None;
        }
        if !keep_vectors {
            self.vector_count = None;
            self.dimensions = None;
        }
        if !keep_query {
            self.query = None;
            self.result_count = None;
            self.top_score = None;
        }
        if !keep_counts {
            self.item_count = None;
        }
        if !keep_previews {
            self.input_preview = None;
            self.output_preview = None;
        }
        if span_type == SpanType::Retrieval {
            // result_count lives in the query group for retrieval
            self.result_count = self.result_count.or(self.item_count.take());
        }
        self
    }

    /// Cap input/output previews at `max` bytes.
    pub fn truncate_previews(mut self, max: usize) -> Self {
        if let Some(s) = self.input_preview.as_mut() {
            truncate_in_place(s, max);
        }
        if let Some(s) = self.output_preview.as_mut() {
            truncate_in_place(s, max);
        }
        self
    }
}

/// Root record of one end-to-end operation, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub name: String,
    pub operation_type: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub resource_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: Status,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub aggregates: TraceAggregates,
    pub metadata: MetadataMap,
}

/// Timed sub-operation within a trace, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub span_type: SpanType,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: Status,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub metrics: SpanMetrics,
    pub metadata: MetadataMap,
}

/// Single-shot record of one LLM invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCall {
    pub model: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub latency_ms: Option<i64>,
    pub status: Status,
    pub error_message: Option<String>,
}

impl LlmCall {
    pub fn success(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            status: Status::Success,
            ..Default::default()
        }
    }
}

/// One chat turn message (user, assistant, or system).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub turn_index: i64,
}

/// One document-processing pipeline event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub document_id: Option<String>,
    pub event_type: String,
    pub status: String,
    pub pages: Option<i64>,
    pub chunk_count: Option<i64>,
    pub embed_count: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// Delivery state of a trace toward an optional external provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncState::Pending),
            "synced" => Some(SyncState::Synced),
            "failed" => Some(SyncState::Failed),
            _ => None,
        }
    }
}

/// Per-(provider, trace) eventual-consistency bookkeeping row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSyncStatus {
    pub provider: String,
    pub trace_id: String,
    pub state: SyncState,
    pub retry_count: i64,
    pub external_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Truncate a string in place to at most `max` bytes on a char boundary.
pub(crate) fn truncate_in_place(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
