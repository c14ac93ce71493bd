//! Fixed-window counter stored in a [`KvStore`].
//!
//! Each key owns one [`RateWindow`]. A request that arrives after the window closes opens a new
//! one with a count of 1; otherwise the count is incremented and the request is rejected once it
//! would exceed `max`. Every transition goes through [`update_with_cas`], so two callers racing on
//! the same key cannot both act on the same pre-increment count.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	error::ConfigError,
	limiter::{RateLimitDecision, RateLimitFuture, RateLimiter, RetryDirective},
	store::{self, KvStore, StoreKey, Update},
};

const NAMESPACE: &str = "rate";

/// Per-key window state persisted by [`FixedWindowLimiter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
	/// Requests counted in this window.
	pub count: u32,
	/// Instant the window opened.
	pub started_at: OffsetDateTime,
}
impl RateWindow {
	/// Instant the window closes for the provided length.
	pub fn reset_at(&self, expiration: Duration) -> OffsetDateTime {
		self.started_at + expiration
	}

	/// Returns `true` while `now` falls inside the window.
	pub fn is_active_at(&self, now: OffsetDateTime, expiration: Duration) -> bool {
		now < self.reset_at(expiration)
	}
}

/// Fixed-window [`RateLimiter`] with `max` requests per `expiration`.
#[derive(Clone)]
pub struct FixedWindowLimiter {
	store: Arc<dyn KvStore>,
	clock: Arc<dyn Clock>,
	max: u32,
	expiration: Duration,
}
impl FixedWindowLimiter {
	/// Default number of requests per window.
	pub const DEFAULT_MAX: u32 = 5;
	/// Default window length.
	pub const DEFAULT_EXPIRATION: Duration = Duration::minutes(1);

	/// Creates a limiter over `store`; both limits must be positive.
	pub fn new(
		store: Arc<dyn KvStore>,
		max: u32,
		expiration: Duration,
	) -> Result<Self, ConfigError> {
		if max == 0 {
			return Err(ConfigError::InvalidMax);
		}
		if !expiration.is_positive() {
			return Err(ConfigError::InvalidExpiration { expiration });
		}

		Ok(Self { store, clock: Arc::new(SystemClock), max, expiration })
	}

	/// Replaces the clock used to open and close windows.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Requests allowed per window.
	pub fn max(&self) -> u32 {
		self.max
	}

	/// Window length.
	pub fn expiration(&self) -> Duration {
		self.expiration
	}

	/// Reads the live window for `key`, if one is open.
	pub async fn window(&self, key: &str) -> Result<Option<RateWindow>> {
		let storage_key = StoreKey::new(NAMESPACE, key).to_string();
		let now = self.clock.now();
		let window = match self.store.get(&storage_key).await? {
			Some(bytes) => Some(store::decode_json::<RateWindow>(&storage_key, &bytes)?),
			None => None,
		};

		Ok(window.filter(|window| window.is_active_at(now, self.expiration)))
	}

	fn decode_active(
		&self,
		storage_key: &str,
		bytes: Option<&[u8]>,
		now: OffsetDateTime,
	) -> Result<Option<RateWindow>, store::StoreError> {
		let window =
			bytes.map(|bytes| store::decode_json::<RateWindow>(storage_key, bytes)).transpose()?;

		Ok(window.filter(|window| window.is_active_at(now, self.expiration)))
	}

	async fn check_now(&self, key: &str) -> Result<RateLimitDecision> {
		let storage_key = StoreKey::new(NAMESPACE, key).to_string();
		let decision = store::update_with_cas(self.store.as_ref(), &storage_key, |current| {
			let now = self.clock.now();
			let next = match self.decode_active(&storage_key, current, now)? {
				Some(window) => RateWindow { count: window.count.saturating_add(1), ..window },
				None => RateWindow { count: 1, started_at: now },
			};
			let reset_at = next.reset_at(self.expiration);

			if next.count > self.max {
				let directive = RetryDirective::new(reset_at, reset_at - now)
					.with_reason(format!("{} requests per {} exceeded", self.max, self.expiration));

				return Ok(Update::Keep(RateLimitDecision::Reject(directive)));
			}

			Ok(Update::Write {
				value: store::encode_json(&storage_key, &next)?,
				ttl: Some(reset_at - now),
				output: RateLimitDecision::Allow { remaining: self.max - next.count, reset_at },
			})
		})
		.await?;

		Ok(decision)
	}

	async fn release_now(&self, key: &str, taken_from: OffsetDateTime) -> Result<()> {
		let storage_key = StoreKey::new(NAMESPACE, key).to_string();

		store::update_with_cas(self.store.as_ref(), &storage_key, |current| {
			let now = self.clock.now();

			match self.decode_active(&storage_key, current, now)? {
				// Slots taken in an earlier window are not owed to the current one.
				Some(window)
					if window.count > 0 && window.reset_at(self.expiration) == taken_from =>
				{
					let reset_at = taken_from;
					let next = RateWindow { count: window.count - 1, ..window };

					Ok(Update::Write {
						value: store::encode_json(&storage_key, &next)?,
						ttl: Some(reset_at - now),
						output: (),
					})
				},
				_ => Ok(Update::Keep(())),
			}
		})
		.await?;

		Ok(())
	}
}
impl RateLimiter for FixedWindowLimiter {
	fn check<'a>(&'a self, key: &'a str) -> RateLimitFuture<'a, RateLimitDecision> {
		Box::pin(self.check_now(key))
	}

	fn release<'a>(&'a self, key: &'a str, reset_at: OffsetDateTime) -> RateLimitFuture<'a, ()> {
		Box::pin(self.release_now(key, reset_at))
	}
}
impl Debug for FixedWindowLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FixedWindowLimiter")
			.field("max", &self.max)
			.field("expiration", &self.expiration)
			.finish()
	}
}
