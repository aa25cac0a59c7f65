//! Request Context
//!
//! Explicit request-scoped metadata threaded through the dispatch and
//! consumer call chains. Components never read these values from ambient
//! state.

use std::time::{Duration, Instant};

use crate::shared_kernel::CorrelationId;

/// Metadata of one inbound request or message
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    org_id: Option<String>,
    correlation_id: Option<CorrelationId>,
    principal: Option<String>,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            org_id: None,
            correlation_id: None,
            principal: None,
            deadline: None,
        }
    }

    /// Context with a freshly generated request id
    pub fn generated() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Span carrying the request fields for every log line emitted inside it
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            org_id = self.org_id.as_deref().unwrap_or(""),
            correlation_id = self
                .correlation_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        )
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RequestContext(request_id={}, org_id={:?})",
            self.request_id, self.org_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let correlation_id = CorrelationId::generate();
        let ctx = RequestContext::new("req-1")
            .with_org_id("5318290")
            .with_correlation_id(correlation_id)
            .with_principal("jharting");

        assert_eq!(ctx.request_id(), "req-1");
        assert_eq!(ctx.org_id(), Some("5318290"));
        assert_eq!(ctx.correlation_id(), Some(correlation_id));
        assert_eq!(ctx.principal(), Some("jharting"));
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_remaining_never_negative() {
        let ctx = RequestContext::generated().with_deadline(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_display() {
        let ctx = RequestContext::new("display-id").with_org_id("org");
        let display = ctx.to_string();
        assert!(display.contains("display-id"));
        assert!(display.contains("org"));
    }
}
