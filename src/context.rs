//! Trace identity and propagation.
//!
//! # Responsibilities
//! - Generate trace and span identifiers
//! - Carry caller-scope fields (user, session, resource) through an operation
//! - Derive child contexts for nested spans
//!
//! # Design Decisions
//! - Pure value type: no I/O, no clocks, no global state
//! - 128-bit trace ids (uuid v4, rendered as 32 hex chars)
//! - 64-bit span ids; collisions are advisory only since storage
//!   keys are surrogate

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Optional caller-scope identifiers attached to every record of a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceScope {
    /// User the operation runs on behalf of.
    pub user_id: Option<String>,

    /// Chat session or conversation the operation belongs to.
    pub session_id: Option<String>,

    /// Resource being processed (e.g. a document id).
    pub resource_id: Option<String>,
}

impl TraceScope {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

/// Immutable identity for one traced operation.
///
/// A fresh context is minted by `ObservabilityService::start_trace`; each
/// `span` block derives a child with the same trace id and a new span id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// 32-char lowercase hex, shared by every record of the trace.
    pub trace_id: String,

    /// 16-char lowercase hex identifying the current span.
    pub span_id: String,

    /// Span this context was derived under, if any.
    pub parent_span_id: Option<String>,

    /// Caller-scope fields, copied unchanged into child contexts.
    pub scope: TraceScope,
}

impl TraceContext {
    /// Mint a root context with fresh trace and span ids.
    pub fn create(scope: TraceScope) -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            parent_span_id: None,
            scope,
        }
    }

    /// Derive a child context: same trace id and scope, fresh span id,
    /// parent set to the current span.
    pub fn child_context(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            scope: self.scope.clone(),
        }
    }
}

fn new_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ids_are_fresh_and_well_formed() {
        let a = TraceContext::create(TraceScope::default());
        let b = TraceContext::create(TraceScope::default());

        assert_eq!(a.trace_id.len(), 32);
        assert_eq!(a.span_id.len(), 16);
        assert!(a.trace_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(a.parent_span_id.is_none());
        assert_ne!(a.trace_id, b.trace_id);
        assert_ne!(a.span_id, b.span_id);
    }

    #[test]
    fn test_child_preserves_trace_and_links_parent() {
        let root = TraceContext::create(TraceScope::user("u-1"));
        let child = root.child_context();

        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.scope, root.scope);

        let grandchild = child.child_context();
        assert_eq!(grandchild.trace_id, root.trace_id);
        assert_eq!(
            grandchild.parent_span_id.as_deref(),
            Some(child.span_id.as_str())
        );
    }
}
