//! Demonstrates an admission pipeline with the default bearer lookup, per-key scope grants, and a
//! store-backed credit ledger, printing the verdict for a few representative requests.

// std
use std::{collections::BTreeSet, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use authmeter::{
	AuthMeter,
	capability::{CapabilityFuture, MeterCapabilities},
	credit::{CreditLedger, DebitOutcome},
	error::BoxError,
	identity::Identity,
	request::{RequestSnapshot, RequestView},
	scope::{ScopeGrants, ScopeSet},
	store::{KvStore, MemoryStore},
};

/// Known keys; writes need `jobs:write` and cost more than reads.
struct KeyTable {
	keys: BTreeSet<String>,
}
impl KeyTable {
	fn required_scope(request: &dyn RequestView) -> Result<ScopeSet, BoxError> {
		let scope = if request.method() == "GET" { "jobs:read" } else { "jobs:write" };

		Ok(ScopeSet::new([scope])?)
	}
}
impl MeterCapabilities for KeyTable {
	fn validate<'a>(
		&'a self,
		_: &'a dyn RequestView,
		key: &'a Identity,
	) -> CapabilityFuture<'a, bool> {
		Box::pin(async move { Ok(self.keys.contains(key.expose())) })
	}

	fn authorize<'a>(
		&'a self,
		request: &'a dyn RequestView,
		store: &'a dyn KvStore,
		key: &'a Identity,
	) -> CapabilityFuture<'a, bool> {
		Box::pin(async move {
			let required = Self::required_scope(request)?;

			Ok::<_, BoxError>(ScopeGrants::new(store).permits(key.expose(), &required).await?)
		})
	}

	fn cost<'a>(
		&'a self,
		request: &'a dyn RequestView,
		_: &'a dyn KvStore,
	) -> CapabilityFuture<'a, i64> {
		Box::pin(async move { Ok(if request.method() == "GET" { 1 } else { 5 }) })
	}

	fn balance<'a>(
		&'a self,
		store: &'a dyn KvStore,
		key: &'a Identity,
	) -> CapabilityFuture<'a, i64> {
		Box::pin(async move {
			Ok::<_, BoxError>(CreditLedger::new(store).balance(key.expose()).await?)
		})
	}

	fn debit<'a>(
		&'a self,
		store: &'a dyn KvStore,
		key: &'a Identity,
		cost: i64,
	) -> CapabilityFuture<'a, ()> {
		Box::pin(async move {
			// Re-check the floor inside the debit so concurrent requests cannot overdraw.
			match CreditLedger::new(store).debit_within(key.expose(), cost, 0).await? {
				DebitOutcome::Applied(_) => Ok::<_, BoxError>(()),
				DebitOutcome::Declined { balance } =>
					Err(format!("balance {balance} no longer covers {cost}").into()),
			}
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let store = Arc::new(MemoryStore::default());
	let ledger = CreditLedger::new(store.as_ref());
	let grants = ScopeGrants::new(store.as_ref());

	ledger.set_balance("reader-key", 2).await?;
	ledger.set_balance("writer-key", 20).await?;
	grants.grant("reader-key", &ScopeSet::new(["jobs:read"])?).await?;
	grants.grant("writer-key", &ScopeSet::new(["jobs:read", "jobs:write"])?).await?;

	let capabilities = KeyTable { keys: ["reader-key", "writer-key"].map(String::from).into() };
	let meter = AuthMeter::builder()
		.capabilities(Arc::new(capabilities))
		.storage(store.clone())
		.max(10)
		.skip_when(|request| request.path() == "/healthz")
		.build()?;
	let requests = [
		("healthz", RequestSnapshot::new("GET", "/healthz")),
		("no key", RequestSnapshot::new("GET", "/jobs")),
		("reader lists", get("/jobs", "reader-key")),
		("reader submits", post("/jobs", "reader-key")),
		("writer submits", post("/jobs", "writer-key")),
		("reader lists again", get("/jobs", "reader-key")),
		("reader is out of credits", get("/jobs", "reader-key")),
	];

	for (label, request) in requests {
		let verdict = meter.handle(&request).await;

		println!("{label}: {} {:?}.", verdict.status, verdict.body);
	}

	println!("Writer balance after one submit: {}.", ledger.balance("writer-key").await?);

	Ok(())
}

fn get(path: &str, key: &str) -> RequestSnapshot {
	RequestSnapshot::new("GET", path).with_header("Authorization", format!("Bearer {key}"))
}

fn post(path: &str, key: &str) -> RequestSnapshot {
	RequestSnapshot::new("POST", path).with_header("Authorization", format!("Bearer {key}"))
}
