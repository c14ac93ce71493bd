//! Host-supplied capabilities the pipeline calls into.
//!
//! One trait covers every external decision (credential validation, scope authorization, cost,
//! balance, and debit) so an [`AuthMeter`](crate::AuthMeter) is wired to a single
//! implementation instead of five loose callbacks. Methods receive the storage handle the
//! pipeline was configured with; implementations are free to ignore it.

// self
use crate::{_prelude::*, identity::Identity, request::RequestView, store::KvStore};

/// Boxed future returned by [`MeterCapabilities`] methods.
pub type CapabilityFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, BoxError>> + 'a + Send>>;

/// External decisions consumed by the pipeline.
///
/// Errors are surfaced to the responder as
/// [`Error::Capability`](crate::error::Error::Capability) with the failing
/// [`Stage`](crate::obs::Stage) attached.
pub trait MeterCapabilities
where
	Self: Send + Sync,
{
	/// Confirms the credential is authentic.
	///
	/// Returning `Ok(false)` does not stop the pipeline; the request continues to scope and
	/// credit checks without a bound identity.
	fn validate<'a>(
		&'a self,
		request: &'a dyn RequestView,
		key: &'a Identity,
	) -> CapabilityFuture<'a, bool>;

	/// Decides whether `key` may access the requested resource.
	fn authorize<'a>(
		&'a self,
		request: &'a dyn RequestView,
		store: &'a dyn KvStore,
		key: &'a Identity,
	) -> CapabilityFuture<'a, bool>;

	/// Computes the non-negative credit cost of the request.
	fn cost<'a>(
		&'a self,
		request: &'a dyn RequestView,
		store: &'a dyn KvStore,
	) -> CapabilityFuture<'a, i64>;

	/// Reads the current balance for `key`.
	fn balance<'a>(&'a self, store: &'a dyn KvStore, key: &'a Identity)
	-> CapabilityFuture<'a, i64>;

	/// Deducts `cost` from `key`'s balance. Called at most once per request.
	fn debit<'a>(
		&'a self,
		store: &'a dyn KvStore,
		key: &'a Identity,
		cost: i64,
	) -> CapabilityFuture<'a, ()>;
}
