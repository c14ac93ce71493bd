//! Thread-safe in-memory [`KvStore`] implementation, the default backend.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	store::{CompareAndSwapOutcome, KvStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, Entry>>>;

#[derive(Clone, Debug)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<OffsetDateTime>,
}
impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
		Self { value, expires_at: ttl.map(|ttl| now + ttl) }
	}

	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| now < expires_at)
	}
}

/// Process-local store; every clone shares the same map.
///
/// Compare-and-swap runs under a single write guard, which is what makes rate windows and
/// ledger updates atomic for this backend. Expired entries are treated as absent and purged
/// lazily on writes.
#[derive(Clone, Debug)]
pub struct MemoryStore {
	map: StoreMap,
	clock: Arc<dyn Clock>,
}
impl MemoryStore {
	/// Creates an empty store that measures expiry with `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { map: Default::default(), clock }
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		let now = self.clock.now();

		self.map.read().values().filter(|entry| entry.is_live_at(now)).count()
	}

	/// Returns `true` when no live entries remain.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops every expired entry.
	pub fn purge_expired(&self) {
		let now = self.clock.now();

		self.map.write().retain(|_, entry| entry.is_live_at(now));
	}

	fn get_now(&self, key: &str) -> Option<Vec<u8>> {
		let now = self.clock.now();

		self.map.read().get(key).filter(|entry| entry.is_live_at(now)).map(|e| e.value.clone())
	}

	fn set_now(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
		let now = self.clock.now();

		self.map.write().insert(key.to_owned(), Entry::new(value, ttl, now));
	}

	fn cas_now(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		replacement: Vec<u8>,
		ttl: Option<Duration>,
	) -> CompareAndSwapOutcome {
		let now = self.clock.now();
		let mut guard = self.map.write();
		let current = guard.get(key).filter(|entry| entry.is_live_at(now));
		let outcome = match (current, expected) {
			(None, None) => CompareAndSwapOutcome::Updated,
			(Some(entry), Some(expected)) if entry.value == expected =>
				CompareAndSwapOutcome::Updated,
			(Some(_), _) => CompareAndSwapOutcome::Mismatch,
			(None, Some(_)) => CompareAndSwapOutcome::Missing,
		};

		if outcome == CompareAndSwapOutcome::Updated {
			guard.insert(key.to_owned(), Entry::new(replacement, ttl, now));
		}

		outcome
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl KvStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		Box::pin(async move { Ok(self.get_now(key)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if ttl.is_some_and(|ttl| !ttl.is_positive()) {
				return Err(StoreError::Backend {
					message: format!("TTL for `{key}` must be positive"),
				});
			}

			self.set_now(key, value, ttl);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.map.write().remove(key);

			Ok(())
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: Option<&'a [u8]>,
		replacement: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(self.cas_now(key, expected, replacement, ttl)) })
	}
}
