//! Rate limiter contract consulted before any credential checks.
//!
//! The pipeline keys the limiter by the best-effort identity, so requests without a parseable
//! credential share the empty-string bucket rather than escaping the limit. Any algorithm that
//! implements [`RateLimiter`] can replace the bundled [`FixedWindowLimiter`].

pub mod fixed_window;

pub use fixed_window::*;

// self
use crate::_prelude::*;

/// Boxed future returned by [`RateLimiter`] operations.
pub type RateLimitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Strategy that decides whether the next request for a key fits the budget.
pub trait RateLimiter
where
	Self: Send + Sync,
{
	/// Counts one request against `key` and reports whether it may proceed.
	fn check<'a>(&'a self, key: &'a str) -> RateLimitFuture<'a, RateLimitDecision>;

	/// Gives back a slot taken by an accepted [`check`](Self::check) for `key`.
	///
	/// `reset_at` is the value the check returned in [`RateLimitDecision::Allow`]; a slot must
	/// only go back to the window it was taken from. Called only when the pipeline is configured
	/// to skip counting successful or failed requests. The default implementation does nothing.
	fn release<'a>(&'a self, key: &'a str, reset_at: OffsetDateTime) -> RateLimitFuture<'a, ()> {
		let _ = (key, reset_at);

		Box::pin(async { Ok(()) })
	}
}

/// Result emitted by a [`RateLimiter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed.
	Allow {
		/// Requests still available in the current window.
		remaining: u32,
		/// Instant the current window closes.
		reset_at: OffsetDateTime,
	},
	/// The request exceeded the budget.
	Reject(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow { .. })
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Reject`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}
