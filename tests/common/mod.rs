//! Shared fixtures for the integration suites.

#![allow(dead_code)]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::{OffsetDateTime, macros};
// self
use authmeter::{
	capability::{CapabilityFuture, MeterCapabilities},
	clock::ManualClock,
	credit::{CreditLedger, DebitOutcome},
	error::BoxError,
	identity::Identity,
	obs::Stage,
	request::RequestView,
	scope::{ScopeGrants, ScopeSet},
	store::{KvStore, MemoryStore},
};

/// Fixed starting instant for manual clocks.
pub const EPOCH: OffsetDateTime = macros::datetime!(2026-03-01 09:00 UTC);

/// Per-capability call counters.
#[derive(Debug, Default)]
pub struct Calls {
	pub validate: AtomicUsize,
	pub authorize: AtomicUsize,
	pub cost: AtomicUsize,
	pub balance: AtomicUsize,
	pub debit: AtomicUsize,
}
impl Calls {
	pub fn get(&self, stage: Stage) -> usize {
		let counter = match stage {
			Stage::Validate => &self.validate,
			Stage::Authorize => &self.authorize,
			Stage::Cost => &self.cost,
			Stage::Balance => &self.balance,
			Stage::Debit => &self.debit,
			_ => return 0,
		};

		counter.load(Ordering::SeqCst)
	}
}

/// Capabilities backed by the pipeline's own stores.
///
/// Validation accepts every key listed in `valid_keys`. Authorization consults
/// [`ScopeGrants`] when `required_scope` is set. Balances and debits go through
/// [`CreditLedger`]; with `debit_floor` set the debit refuses to cross that floor.
/// `fail_at` turns one capability into an error.
#[derive(Debug, Default)]
pub struct Scripted {
	pub valid_keys: Vec<String>,
	pub required_scope: Option<ScopeSet>,
	pub cost: i64,
	pub debit_floor: Option<i64>,
	pub fail_at: Option<Stage>,
	pub calls: Calls,
}
impl Scripted {
	pub fn accepting(keys: &[&str]) -> Self {
		Self { valid_keys: keys.iter().map(|key| key.to_string()).collect(), ..Default::default() }
	}

	pub fn cost(mut self, cost: i64) -> Self {
		self.cost = cost;

		self
	}

	pub fn debit_floor(mut self, floor: i64) -> Self {
		self.debit_floor = Some(floor);

		self
	}

	pub fn require_scope(mut self, scope: &str) -> Self {
		self.required_scope = Some(scope.parse().expect("Scope fixture should parse."));

		self
	}

	pub fn fail_at(mut self, stage: Stage) -> Self {
		self.fail_at = Some(stage);

		self
	}

	fn enter(&self, stage: Stage, counter: &AtomicUsize) -> Result<(), BoxError> {
		counter.fetch_add(1, Ordering::SeqCst);

		if self.fail_at == Some(stage) {
			return Err(format!("{stage} backend offline").into());
		}

		Ok(())
	}
}
impl MeterCapabilities for Scripted {
	fn validate<'a>(
		&'a self,
		_: &'a dyn RequestView,
		key: &'a Identity,
	) -> CapabilityFuture<'a, bool> {
		Box::pin(async move {
			self.enter(Stage::Validate, &self.calls.validate)?;

			Ok::<_, BoxError>(self.valid_keys.iter().any(|valid| valid == key.expose()))
		})
	}

	fn authorize<'a>(
		&'a self,
		_: &'a dyn RequestView,
		store: &'a dyn KvStore,
		key: &'a Identity,
	) -> CapabilityFuture<'a, bool> {
		Box::pin(async move {
			self.enter(Stage::Authorize, &self.calls.authorize)?;

			let Some(required) = &self.required_scope else {
				return Ok(true);
			};

			Ok::<_, BoxError>(ScopeGrants::new(store).permits(key.expose(), required).await?)
		})
	}

	fn cost<'a>(
		&'a self,
		_: &'a dyn RequestView,
		_: &'a dyn KvStore,
	) -> CapabilityFuture<'a, i64> {
		Box::pin(async move {
			self.enter(Stage::Cost, &self.calls.cost)?;

			Ok::<_, BoxError>(self.cost)
		})
	}

	fn balance<'a>(
		&'a self,
		store: &'a dyn KvStore,
		key: &'a Identity,
	) -> CapabilityFuture<'a, i64> {
		Box::pin(async move {
			self.enter(Stage::Balance, &self.calls.balance)?;

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
			self.enter(Stage::Debit, &self.calls.debit)?;

			let ledger = CreditLedger::new(store);
			let Some(floor) = self.debit_floor else {
				ledger.debit(key.expose(), cost).await?;

				return Ok(());
			};

			match ledger.debit_within(key.expose(), cost, floor).await? {
				DebitOutcome::Applied(_) => Ok::<_, BoxError>(()),
				DebitOutcome::Declined { balance } =>
					Err(format!("balance {balance} cannot cover {cost}").into()),
			}
		})
	}
}

/// Manual clock plus one store that follows it.
pub fn frozen_store() -> (ManualClock, Arc<MemoryStore>) {
	let clock = ManualClock::new(EPOCH);
	let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));

	(clock, store)
}

/// Seeds `identity` with `balance` credits.
pub async fn seed_balance(store: &dyn KvStore, identity: &str, balance: i64) {
	CreditLedger::new(store)
		.set_balance(identity, balance)
		.await
		.expect("Seeding a balance should succeed.");
}
