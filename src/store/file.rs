//! Simple file-backed [`KvStore`] for single-node deployments that want balances to survive
//! restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	store::{CompareAndSwapOutcome, KvStore, StoreError, StoreFuture},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FileEntry {
	/// Base64-encoded value bytes.
	value: String,
	expires_at: Option<OffsetDateTime>,
}
impl FileEntry {
	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| now < expires_at)
	}
}

/// Persists every entry to a JSON snapshot after each mutation.
///
/// All operations hold one lock for the in-memory view, so compare-and-swap is atomic within a
/// process. Sharing a snapshot file between processes is not supported.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, FileEntry>>>,
	clock: Arc<dyn Clock>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = if path.exists() { Self::load_snapshot(&path)? } else { HashMap::new() };

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)), clock: Arc::new(SystemClock) })
	}

	/// Replaces the clock used for expiry checks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, FileEntry>, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: Vec<(String, FileEntry)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(entries.into_iter().collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, FileEntry>) -> Result<(), StoreError> {
		let now = self.clock.now();
		let snapshot: Vec<_> = contents.iter().filter(|(_, entry)| entry.is_live_at(now)).collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	/// Applies one change to `contents` and persists it, restoring the previous entry if the
	/// snapshot cannot be written.
	fn commit_locked(
		&self,
		contents: &mut HashMap<String, FileEntry>,
		key: &str,
		entry: Option<FileEntry>,
	) -> Result<(), StoreError> {
		let previous = match entry {
			Some(entry) => contents.insert(key.to_owned(), entry),
			None => contents.remove(key),
		};

		if let Err(e) = self.persist_locked(contents) {
			match previous {
				Some(previous) => contents.insert(key.to_owned(), previous),
				None => contents.remove(key),
			};

			return Err(e);
		}

		Ok(())
	}

	fn entry(&self, value: &[u8], ttl: Option<Duration>) -> FileEntry {
		let expires_at = ttl.map(|ttl| self.clock.now() + ttl);

		FileEntry { value: STANDARD.encode(value), expires_at }
	}

	fn decode(key: &str, entry: &FileEntry) -> Result<Vec<u8>, StoreError> {
		STANDARD.decode(&entry.value).map_err(|e| StoreError::Serialization {
			message: format!("Entry `{key}` is not valid base64: {e}"),
		})
	}
}
impl KvStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		Box::pin(async move {
			let now = self.clock.now();
			let guard = self.inner.read();

			guard
				.get(key)
				.filter(|entry| entry.is_live_at(now))
				.map(|entry| Self::decode(key, entry))
				.transpose()
		})
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

			let entry = self.entry(&value, ttl);
			let mut guard = self.inner.write();

			self.commit_locked(&mut guard, key, Some(entry))
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.contains_key(key) {
				self.commit_locked(&mut guard, key, None)?;
			}

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
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();
			let current = match guard.get(key).filter(|entry| entry.is_live_at(now)) {
				Some(entry) => Some(Self::decode(key, entry)?),
				None => None,
			};
			let outcome = match (current.as_deref(), expected) {
				(None, None) => CompareAndSwapOutcome::Updated,
				(Some(current), Some(expected)) if current == expected =>
					CompareAndSwapOutcome::Updated,
				(Some(_), _) => CompareAndSwapOutcome::Mismatch,
				(None, Some(_)) => CompareAndSwapOutcome::Missing,
			};

			if outcome == CompareAndSwapOutcome::Updated {
				self.commit_locked(&mut guard, key, Some(self.entry(&replacement, ttl)))?;
			}

			Ok(outcome)
		})
	}
}
