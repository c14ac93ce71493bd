mod common;

// std
use std::{env, fs, path::PathBuf, process, sync::Arc};
// crates.io
use time::{Duration, OffsetDateTime};
// self
use authmeter::{
	AuthMeter,
	credit::CreditLedger,
	limiter::{FixedWindowLimiter, RateLimitDecision, RateLimiter},
	request::RequestSnapshot,
	store::{
		self, CompareAndSwapOutcome, FileStore, KvStore, MemoryStore, StoreError, StoreFuture,
		Update,
	},
};
use common::Scripted;

/// Backend whose compare-and-swap never lands.
struct AlwaysRaced;
impl KvStore for AlwaysRaced {
	fn get<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		Box::pin(async { Ok(None) })
	}

	fn set<'a>(&'a self, _: &'a str, _: Vec<u8>, _: Option<Duration>) -> StoreFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}

	fn delete<'a>(&'a self, _: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		_: &'a str,
		_: Option<&'a [u8]>,
		_: Vec<u8>,
		_: Option<Duration>,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async { Ok(CompareAndSwapOutcome::Mismatch) })
	}
}

fn temp_path(label: &str) -> PathBuf {
	env::temp_dir().join(format!(
		"authmeter_{label}_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	))
}

async fn exercise_contract(store: &dyn KvStore) {
	assert_eq!(store.get("missing").await.expect("Read should succeed."), None);

	store.set("k", b"one".to_vec(), None).await.expect("Set should succeed.");

	assert_eq!(
		store.compare_and_swap("k", Some(b"one"), b"two".to_vec(), None).await,
		Ok(CompareAndSwapOutcome::Updated)
	);
	assert_eq!(
		store.compare_and_swap("k", Some(b"one"), b"three".to_vec(), None).await,
		Ok(CompareAndSwapOutcome::Mismatch)
	);
	assert_eq!(
		store.compare_and_swap("gone", Some(b"one"), b"three".to_vec(), None).await,
		Ok(CompareAndSwapOutcome::Missing)
	);
	assert_eq!(store.get("k").await.expect("Read should succeed."), Some(b"two".to_vec()));

	store.delete("k").await.expect("Delete should succeed.");
	store.delete("k").await.expect("Deleting a missing key should succeed.");

	assert_eq!(store.get("k").await.expect("Read should succeed."), None);

	for ttl in [Duration::ZERO, Duration::seconds(-1)] {
		assert!(matches!(
			store.set("k", b"late".to_vec(), Some(ttl)).await,
			Err(StoreError::Backend { .. })
		));
	}

	assert_eq!(store.get("k").await.expect("Read should succeed."), None);
}

#[tokio::test]
async fn memory_store_honors_the_contract() {
	exercise_contract(&MemoryStore::default()).await;
}

#[tokio::test]
async fn file_store_honors_the_contract() {
	let path = temp_path("contract");
	let store = FileStore::open(&path).expect("File store should open.");

	exercise_contract(&store).await;

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
	});
}

#[tokio::test]
async fn lost_races_surface_as_contention() {
	let err = store::update_with_cas(&AlwaysRaced, "hot", |_| {
		Ok(Update::Write { value: b"x".to_vec(), ttl: None, output: () })
	})
	.await
	.expect_err("A store that never accepts a swap must give up.");

	assert!(matches!(err, StoreError::Contention { ref key, .. } if key == "hot"));
}

#[tokio::test]
async fn limiter_windows_expire_with_the_store_clock() {
	let (clock, store) = common::frozen_store();
	let limiter = FixedWindowLimiter::new(store.clone(), 1, Duration::seconds(10))
		.expect("Limiter configuration should be valid.")
		.with_clock(Arc::new(clock.clone()));

	assert!(limiter.check("k").await.expect("Check should run.").is_allowed());
	assert!(matches!(
		limiter.check("k").await.expect("Check should run."),
		RateLimitDecision::Reject(_)
	));
	assert_eq!(store.len(), 1);

	clock.advance(Duration::seconds(10));

	assert!(store.is_empty());
	assert!(limiter.check("k").await.expect("Check should run.").is_allowed());
}

#[tokio::test]
async fn balances_survive_a_file_store_reopen() {
	let path = temp_path("ledger");
	let store = Arc::new(FileStore::open(&path).expect("File store should open."));

	common::seed_balance(store.as_ref(), "acct", 10).await;

	let meter = AuthMeter::builder()
		.capabilities(Arc::new(Scripted::accepting(&["acct"]).cost(4)))
		.credit_storage(store.clone())
		.key_lookup("header:X-Api-Key")
		.build()
		.expect("File-backed pipeline should build.");
	let request = RequestSnapshot::new("GET", "/").with_header("X-Api-Key", "acct");

	meter.admit(&request).await.expect("Funded key should be admitted.");
	drop(meter);
	drop(store);

	let reopened = FileStore::open(&path).expect("File store should reopen.");

	assert_eq!(CreditLedger::new(&reopened).balance("acct").await, Ok(6));

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
	});
}
