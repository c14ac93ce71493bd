//! Byte-oriented key-value storage contract and built-in backends.
//!
//! Everything the pipeline keeps between requests (rate windows, credit balances, scope grants)
//! lives behind [`KvStore`]. Atomicity is the backend's job: [`KvStore::compare_and_swap`] must
//! apply its check and write as one step, and [`update_with_cas`] builds read-modify-write loops
//! on top of it.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Boxed future returned by [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

const MAX_CAS_ATTEMPTS: usize = 32;

/// Storage backend contract shared by the limiter, the credit ledger, and scope grants.
pub trait KvStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`; expired entries read as absent.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

	/// Writes `value` under `key`, expiring after `ttl` when provided.
	fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Option<Duration>)
	-> StoreFuture<'a, ()>;

	/// Removes `key`; deleting a missing key succeeds.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Atomically replaces the value under `key` when the current value equals `expected`.
	///
	/// `expected = None` means the key must be absent (or expired).
	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: Option<&'a [u8]>,
		replacement: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;
}

/// Result of a [`KvStore::compare_and_swap`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The current value matched and was replaced.
	Updated,
	/// A value exists but differs from the expected bytes.
	Mismatch,
	/// A value was expected but the key is absent.
	Missing,
}

/// Error type produced by [`KvStore`] implementations and codecs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored bytes could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A read-modify-write loop kept losing compare-and-swap races.
	#[error("Gave up on `{key}` after {attempts} conflicting writes.")]
	Contention {
		/// Storage key under contention.
		key: String,
		/// Number of attempts made.
		attempts: usize,
	},
}

/// Namespaced storage key derived from a credential fingerprint.
///
/// Raw credentials never reach the backend; the key embeds a base64 (no padding) SHA-256 digest
/// of the identity instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
	/// Record family (`rate`, `credits`, `scopes`, ...).
	pub namespace: &'static str,
	/// Fingerprint of the identity the record belongs to.
	pub fingerprint: String,
}
impl StoreKey {
	/// Builds a key for `identity` inside `namespace`.
	pub fn new(namespace: &'static str, identity: &str) -> Self {
		Self { namespace, fingerprint: fingerprint(identity) }
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "authmeter:{}:{}", self.namespace, self.fingerprint)
	}
}

/// Outcome of one [`update_with_cas`] step.
#[derive(Debug)]
pub enum Update<T> {
	/// Persist the new bytes (with optional TTL) and return `T`.
	Write {
		/// Replacement bytes.
		value: Vec<u8>,
		/// Expiry applied to the replacement.
		ttl: Option<Duration>,
		/// Value returned once the write lands.
		output: T,
	},
	/// Leave storage untouched and return `T`.
	Keep(T),
}

/// Runs a read-modify-write loop against `store`, re-reading whenever a concurrent writer wins
/// the compare-and-swap.
///
/// `apply` receives the current bytes (if any) and decides what to write. It may run more than
/// once, so it must not have side effects outside of its return value.
pub async fn update_with_cas<T, F>(
	store: &dyn KvStore,
	key: &str,
	mut apply: F,
) -> Result<T, StoreError>
where
	F: Send + FnMut(Option<&[u8]>) -> Result<Update<T>, StoreError>,
	T: Send,
{
	for _ in 0..MAX_CAS_ATTEMPTS {
		let current = store.get(key).await?;

		match apply(current.as_deref())? {
			Update::Keep(output) => return Ok(output),
			Update::Write { value, ttl, output } => {
				let outcome = store.compare_and_swap(key, current.as_deref(), value, ttl).await?;

				if outcome == CompareAndSwapOutcome::Updated {
					return Ok(output);
				}
			},
		}
	}

	Err(StoreError::Contention { key: key.to_owned(), attempts: MAX_CAS_ATTEMPTS })
}

/// Decodes a JSON record, reporting the failing path on error.
pub fn decode_json<T>(key: &str, bytes: &[u8]) -> Result<T, StoreError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|e| StoreError::Serialization {
		message: format!("Failed to decode `{key}` at `{}`: {}", e.path(), e.inner()),
	})
}

/// Encodes a JSON record.
pub fn encode_json<T>(key: &str, value: &T) -> Result<Vec<u8>, StoreError>
where
	T: Serialize,
{
	serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
		message: format!("Failed to encode `{key}`: {e}"),
	})
}

fn fingerprint(identity: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(identity.as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}
