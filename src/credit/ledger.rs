//! Store-backed credit balances for hosts that keep accounts in the pipeline's [`KvStore`].

// self
use crate::{
	_prelude::*,
	store::{self, KvStore, StoreError, StoreKey, Update},
};

const NAMESPACE: &str = "credits";

/// Result of [`CreditLedger::debit_within`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebitOutcome {
	/// The debit landed; holds the new balance.
	Applied(i64),
	/// The debit would have taken the balance below the floor, so nothing was written.
	Declined {
		/// Balance seen when the debit was refused.
		balance: i64,
	},
}

/// Integer balances keyed by identity, encoded as decimal text.
///
/// Absent accounts read as zero. Every mutation is a compare-and-swap loop, so concurrent
/// debits never lose updates. [`debit`](Self::debit) enforces no debt policy;
/// [`debit_within`](Self::debit_within) checks a floor in the same step as the write.
#[derive(Clone, Copy)]
pub struct CreditLedger<'a> {
	store: &'a dyn KvStore,
}
impl<'a> CreditLedger<'a> {
	/// Wraps `store`.
	pub fn new(store: &'a dyn KvStore) -> Self {
		Self { store }
	}

	/// Current balance for `identity`.
	pub async fn balance(&self, identity: &str) -> Result<i64, StoreError> {
		let key = StoreKey::new(NAMESPACE, identity).to_string();

		match self.store.get(&key).await? {
			Some(bytes) => decode_balance(&key, &bytes),
			None => Ok(0),
		}
	}

	/// Overwrites the balance for `identity`.
	pub async fn set_balance(&self, identity: &str, amount: i64) -> Result<(), StoreError> {
		let key = StoreKey::new(NAMESPACE, identity).to_string();

		self.store.set(&key, amount.to_string().into_bytes(), None).await
	}

	/// Adds `amount` and returns the new balance.
	pub async fn deposit(&self, identity: &str, amount: i64) -> Result<i64, StoreError> {
		self.adjust(identity, amount).await
	}

	/// Subtracts `cost` and returns the new balance, which may be negative.
	pub async fn debit(&self, identity: &str, cost: i64) -> Result<i64, StoreError> {
		let delta = cost.checked_neg().ok_or_else(overflow)?;

		self.adjust(identity, delta).await
	}

	/// Subtracts `cost` only if the new balance stays at or above `floor`.
	///
	/// The floor check runs inside the compare-and-swap loop, so concurrent callers cannot
	/// overdraw the account between a balance read and the write.
	pub async fn debit_within(
		&self,
		identity: &str,
		cost: i64,
		floor: i64,
	) -> Result<DebitOutcome, StoreError> {
		let key = StoreKey::new(NAMESPACE, identity).to_string();

		store::update_with_cas(self.store, &key, |current| {
			let balance = stored_balance(&key, current)?;
			let next = balance.checked_sub(cost).ok_or_else(overflow)?;

			if next < floor {
				return Ok(Update::Keep(DebitOutcome::Declined { balance }));
			}

			Ok(Update::Write {
				value: next.to_string().into_bytes(),
				ttl: None,
				output: DebitOutcome::Applied(next),
			})
		})
		.await
	}

	async fn adjust(&self, identity: &str, delta: i64) -> Result<i64, StoreError> {
		let key = StoreKey::new(NAMESPACE, identity).to_string();

		store::update_with_cas(self.store, &key, |current| {
			let balance = stored_balance(&key, current)?;
			let next = balance.checked_add(delta).ok_or_else(overflow)?;

			Ok(Update::Write { value: next.to_string().into_bytes(), ttl: None, output: next })
		})
		.await
	}
}
impl Debug for CreditLedger<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CreditLedger(..)")
	}
}

fn decode_balance(key: &str, bytes: &[u8]) -> Result<i64, StoreError> {
	std::str::from_utf8(bytes).ok().and_then(|text| text.parse().ok()).ok_or_else(|| {
		StoreError::Serialization { message: format!("Balance under `{key}` is not an integer") }
	})
}

fn stored_balance(key: &str, current: Option<&[u8]>) -> Result<i64, StoreError> {
	current.map_or(Ok(0), |bytes| decode_balance(key, bytes))
}

fn overflow() -> StoreError {
	StoreError::Backend { message: "Balance adjustment overflows i64".into() }
}
