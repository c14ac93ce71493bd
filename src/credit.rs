//! Credit metering: cost, balance, debt policy, and debit, in that order.

pub mod ledger;

pub use ledger::*;

// self
use crate::{
	_prelude::*,
	capability::MeterCapabilities,
	identity::Identity,
	obs::{self, Stage},
	request::RequestView,
	store::KvStore,
};

/// Debt policy applied between the balance lookup and the debit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPolicy {
	/// Lets balances go (or stay) negative.
	pub allow_debt: bool,
}
impl CreditPolicy {
	/// Creates a policy.
	pub const fn new(allow_debt: bool) -> Self {
		Self { allow_debt }
	}

	/// Returns `true` when `balance` may pay for `cost` under this policy.
	pub fn covers(&self, balance: i64, cost: i64) -> bool {
		self.allow_debt || (balance >= 0 && balance >= cost)
	}
}

/// What an admitted request was charged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
	/// Cost passed to the debit.
	pub cost: i64,
	/// Balance observed before the debit.
	pub balance_before: i64,
}
impl Charge {
	/// Balance implied by the debit, assuming no concurrent writers.
	pub fn balance_after(&self) -> i64 {
		self.balance_before.saturating_sub(self.cost)
	}
}

/// Runs the credit stages for `key`.
///
/// `debit` is called at most once, and only after both `cost` and `balance` succeeded and the
/// policy accepted them. A failed debit is returned as-is; nothing earlier is undone.
pub async fn meter(
	capabilities: &dyn MeterCapabilities,
	request: &dyn RequestView,
	store: &dyn KvStore,
	key: &Identity,
	policy: CreditPolicy,
) -> Result<Charge> {
	let cost = capabilities
		.cost(request, store)
		.await
		.map_err(|e| Error::capability(Stage::Cost, e))
		.and_then(|cost| if cost < 0 { Err(Error::NegativeCost { cost }) } else { Ok(cost) });
	let cost = obs::observe(Stage::Cost, cost)?;
	let balance = capabilities
		.balance(store, key)
		.await
		.map_err(|e| Error::capability(Stage::Balance, e))
		.and_then(|balance| {
			if policy.covers(balance, cost) {
				Ok(balance)
			} else {
				Err(Error::CreditsExceeded { balance, cost })
			}
		});
	let balance = obs::observe(Stage::Balance, balance)?;
	let debit =
		capabilities.debit(store, key, cost).await.map_err(|e| Error::capability(Stage::Debit, e));

	obs::observe(Stage::Debit, debit)?;

	Ok(Charge { cost, balance_before: balance })
}
