//! Call-scoped context passed by value through every capability call.
//!
//! A [`CallContext`] bundles what a call needs to know about its caller:
//!
//! | Field | Purpose |
//! |-------|---------|
//! | cancellation token | explicit cancel signal, observed by the transport |
//! | deadline | optional absolute time after which the call must give up |
//! | correlation id | shared by the spans on both sides of the boundary |
//! | scope + span | logging scope attached by the serving adapter |
//!
//! Contexts are cheap to clone and are never stored past the call they belong to.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::CorrelationId;

/// Why a context stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The cancellation token fired.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

/// Cancellation, deadline, and correlation metadata for one call.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    correlation_id: CorrelationId,
    scope: Option<&'static str>,
    span: Span,
}

impl CallContext {
    /// Creates a root context with a fresh token, no deadline, and a random
    /// correlation id.
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Creates a root context that is cancelled when `token` is.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
            correlation_id: CorrelationId::new_random(),
            scope: None,
            span: Span::none(),
        }
    }

    /// Returns a context whose deadline is at most `timeout` from now.
    ///
    /// An existing earlier deadline is kept. A timeout too large to
    /// represent as an instant (e.g. `Duration::MAX`) leaves the deadline
    /// unchanged.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Returns a context whose deadline is the earlier of `deadline` and the current one.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Replaces the correlation id (used when restoring a context from request metadata).
    #[must_use]
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    /// Returns a context cancelled whenever this one is, but which can also be
    /// cancelled on its own without affecting the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            correlation_id: self.correlation_id,
            scope: self.scope,
            span: self.span.clone(),
        }
    }

    /// Returns a copy of this context with a named logging scope attached.
    ///
    /// Opens a `plugin_call` span carrying the scope and correlation id. The
    /// span nests under the context's current span if it has one, otherwise
    /// under whatever span is active at the call site.
    #[must_use]
    pub fn with_scope(&self, scope: &'static str) -> Self {
        let span = if self.span.is_none() {
            tracing::info_span!(
                "plugin_call",
                scope,
                correlation_id = %self.correlation_id,
            )
        } else {
            tracing::info_span!(
                parent: &self.span,
                "plugin_call",
                scope,
                correlation_id = %self.correlation_id,
            )
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: self.deadline,
            correlation_id: self.correlation_id,
            scope: Some(scope),
            span,
        }
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the underlying cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the correlation id shared with the peer.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the logging scope attached by [`CallContext::with_scope`].
    pub fn scope(&self) -> Option<&'static str> {
        self.scope
    }

    /// Returns the span opened by [`CallContext::with_scope`], or a disabled span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Waits until the context is cancelled or its deadline passes.
    ///
    /// Cancellation wins when both are already true.
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => DoneReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline.into()) => DoneReason::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_deadline_wins() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(first));
    }

    #[test]
    fn unrepresentable_timeout_adds_no_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);

        let bounded = CallContext::new().with_timeout(Duration::from_secs(5));
        let first = bounded.deadline();
        assert_eq!(bounded.with_timeout(Duration::MAX).deadline(), first);
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn scope_keeps_correlation_and_cancellation() {
        let ctx = CallContext::new();
        let scoped = ctx.with_scope("embedding");
        assert_eq!(scoped.scope(), Some("embedding"));
        assert_eq!(scoped.correlation_id(), ctx.correlation_id());
        assert_eq!(ctx.scope(), None);

        ctx.cancel();
        assert!(scoped.is_cancelled());
    }

    #[tokio::test]
    async fn done_reports_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn done_reports_cancellation_first() {
        let ctx = CallContext::new().with_timeout(Duration::ZERO);
        ctx.cancel();
        assert_eq!(ctx.done().await, DoneReason::Cancelled);
    }
}
