//! Scope sets and a store-backed grant table for the authorization stage.
//!
//! The pipeline only asks [`MeterCapabilities::authorize`](crate::capability::MeterCapabilities)
//! for a yes/no answer. Hosts that keep per-key grants in the pipeline's storage can answer it
//! with [`ScopeGrants::permits`].

// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::{
	_prelude::*,
	store::{self, KvStore, StoreError, StoreKey, Update},
};

const NAMESPACE: &str = "scopes";

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Sorted, deduplicated set of scopes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let scope: String = scope.into();

			if scope.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if scope.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope });
			}

			set.insert(scope);
		}

		Ok(Self::from_sorted(set))
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains `scope`.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Returns true when every scope in `self` is also in `other`.
	pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
		self.0.iter().all(|scope| other.contains(scope))
	}

	/// Returns the union of both sets.
	pub fn union(&self, other: &ScopeSet) -> ScopeSet {
		Self::from_sorted(self.0.iter().chain(other.0.iter()).cloned().collect())
	}

	fn from_sorted(set: BTreeSet<String>) -> Self {
		Self(set.into_iter().collect())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_seq(self.0.iter())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

/// Per-identity scope grants kept in a [`KvStore`].
#[derive(Clone, Copy)]
pub struct ScopeGrants<'a> {
	store: &'a dyn KvStore,
}
impl<'a> ScopeGrants<'a> {
	/// Wraps `store`.
	pub fn new(store: &'a dyn KvStore) -> Self {
		Self { store }
	}

	/// Scopes currently granted to `identity`; unknown identities have none.
	pub async fn granted(&self, identity: &str) -> Result<ScopeSet, StoreError> {
		let key = StoreKey::new(NAMESPACE, identity).to_string();

		match self.store.get(&key).await? {
			Some(bytes) => store::decode_json(&key, &bytes),
			None => Ok(ScopeSet::default()),
		}
	}

	/// Adds `scopes` to whatever `identity` already holds and returns the merged set.
	pub async fn grant(&self, identity: &str, scopes: &ScopeSet) -> Result<ScopeSet, StoreError> {
		let key = StoreKey::new(NAMESPACE, identity).to_string();

		store::update_with_cas(self.store, &key, |current| {
			let existing = match current {
				Some(bytes) => store::decode_json::<ScopeSet>(&key, bytes)?,
				None => ScopeSet::default(),
			};
			let merged = existing.union(scopes);

			let value = store::encode_json(&key, &merged)?;

			Ok(Update::Write { value, ttl: None, output: merged })
		})
		.await
	}

	/// Drops every grant for `identity`.
	pub async fn revoke(&self, identity: &str) -> Result<(), StoreError> {
		self.store.delete(&StoreKey::new(NAMESPACE, identity).to_string()).await
	}

	/// Returns `true` when `identity` holds every scope in `required`.
	pub async fn permits(&self, identity: &str, required: &ScopeSet) -> Result<bool, StoreError> {
		Ok(required.is_subset_of(&self.granted(identity).await?))
	}
}
impl Debug for ScopeGrants<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ScopeGrants(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn scopes(raw: &str) -> ScopeSet {
		ScopeSet::from_str(raw).expect("Scope fixture should parse.")
	}

	#[test]
	fn scopes_normalize_and_serialize_sorted() {
		let lhs = ScopeSet::new(["usage:read", "billing:read", "billing:read"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::new(["billing:read", "usage:read"])
			.expect("Right-hand scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(
			serde_json::to_string(&lhs).expect("Scope set should serialize."),
			r#"["billing:read","usage:read"]"#
		);
		assert!(serde_json::from_str::<ScopeSet>(r#"["ok", "not ok"]"#).is_err());
	}

	#[test]
	fn invalid_scopes_error() {
		assert!(matches!(
			ScopeSet::new([" usage "]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn subset_and_union() {
		let read = scopes("usage:read");
		let all = scopes("usage:read usage:write");

		assert!(read.is_subset_of(&all));
		assert!(!all.is_subset_of(&read));
		assert!(ScopeSet::default().is_subset_of(&read));
		assert_eq!(read.union(&scopes("usage:write")), all);
		assert!(all.contains("usage:write"));
	}

	#[tokio::test]
	async fn grants_merge_and_revoke() {
		let store = MemoryStore::default();
		let grants = ScopeGrants::new(&store);

		assert!(grants.granted("key").await.expect("Read should succeed.").is_empty());

		grants.grant("key", &scopes("usage:read")).await.expect("Grant should land.");

		let merged = grants.grant("key", &scopes("usage:write")).await.expect("Grant should land.");

		assert_eq!(merged, scopes("usage:read usage:write"));
		assert_eq!(grants.permits("key", &scopes("usage:write")).await, Ok(true));
		assert_eq!(grants.permits("key", &scopes("admin")).await, Ok(false));
		assert_eq!(grants.permits("other", &scopes("usage:read")).await, Ok(false));

		grants.revoke("key").await.expect("Revoke should succeed.");

		assert_eq!(grants.permits("key", &scopes("usage:read")).await, Ok(false));
	}
}
