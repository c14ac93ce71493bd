//! Time sources used by rate windows and store expiry.

// self
use crate::_prelude::*;

/// Source of "now" for window and TTL arithmetic.
pub trait Clock
where
	Self: Debug + Send + Sync,
{
	/// Current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for deterministic window tests.
///
/// Clones share the same instant, so advancing one clone moves every holder.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(start)))
	}

	/// Moves the clock forward by `by`.
	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}

	/// Jumps the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}
