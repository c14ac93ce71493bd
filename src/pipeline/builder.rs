// self
use crate::{
	_prelude::*,
	capability::MeterCapabilities,
	clock::{Clock, SystemClock},
	credit::CreditPolicy,
	error::ConfigError,
	identity::{KeyExtractor, KeyLookup},
	limiter::{FixedWindowLimiter, RateLimiter},
	pipeline::{AuthMeter, Responder, SkipPredicate, StatusResponder},
	request::RequestView,
	store::{KvStore, MemoryStore},
};

/// Scheme applied when neither the lookup nor the scheme is configured.
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// Builder for [`AuthMeter`] values.
///
/// Every setter is infallible; [`build`](Self::build) validates the whole configuration at once
/// and reports the first problem as a [`ConfigError`].
pub struct AuthMeterBuilder<H = StatusResponder>
where
	H: Responder,
{
	key_lookup: Option<String>,
	auth_scheme: Option<String>,
	max: u32,
	expiration: Duration,
	skip_failed_requests: bool,
	skip_successful_requests: bool,
	rate_limiter: Option<Arc<dyn RateLimiter>>,
	allow_debt: bool,
	capabilities: Option<Arc<dyn MeterCapabilities>>,
	storage: Option<Arc<dyn KvStore>>,
	limiter_storage: Option<Arc<dyn KvStore>>,
	scope_storage: Option<Arc<dyn KvStore>>,
	credit_storage: Option<Arc<dyn KvStore>>,
	skip: Option<SkipPredicate>,
	clock: Option<Arc<dyn Clock>>,
	responder: H,
}
impl AuthMeterBuilder {
	/// Creates a builder with every option at its default.
	pub fn new() -> Self {
		Self {
			key_lookup: None,
			auth_scheme: None,
			max: FixedWindowLimiter::DEFAULT_MAX,
			expiration: FixedWindowLimiter::DEFAULT_EXPIRATION,
			skip_failed_requests: false,
			skip_successful_requests: false,
			rate_limiter: None,
			allow_debt: false,
			capabilities: None,
			storage: None,
			limiter_storage: None,
			scope_storage: None,
			credit_storage: None,
			skip: None,
			clock: None,
			responder: StatusResponder,
		}
	}
}
impl Default for AuthMeterBuilder {
	fn default() -> Self {
		Self::new()
	}
}
impl<H> AuthMeterBuilder<H>
where
	H: Responder,
{
	/// Sets where the credential lives, as `<source>:<name>`.
	///
	/// Sources are `header`, `query`, `form`, `param`, and `cookie`.
	pub fn key_lookup(mut self, lookup: impl Into<String>) -> Self {
		self.key_lookup = Some(lookup.into());

		self
	}

	/// Sets the scheme stripped from header values, e.g. `Bearer`.
	///
	/// An empty string disables scheme stripping even for the default lookup.
	pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.auth_scheme = Some(scheme.into());

		self
	}

	/// Sets the number of requests allowed per window.
	pub fn max(mut self, max: u32) -> Self {
		self.max = max;

		self
	}

	/// Sets the window length.
	pub fn expiration(mut self, expiration: Duration) -> Self {
		self.expiration = expiration;

		self
	}

	/// Gives the rate-limit slot back when the pipeline rejects the request.
	pub fn skip_failed_requests(mut self, skip: bool) -> Self {
		self.skip_failed_requests = skip;

		self
	}

	/// Gives the rate-limit slot back when the pipeline admits the request.
	pub fn skip_successful_requests(mut self, skip: bool) -> Self {
		self.skip_successful_requests = skip;

		self
	}

	/// Replaces the bundled fixed-window limiter.
	pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
		self.rate_limiter = Some(limiter);

		self
	}

	/// Lets balances go negative.
	pub fn allow_debt(mut self, allow: bool) -> Self {
		self.allow_debt = allow;

		self
	}

	/// Sets the host capabilities. Required.
	pub fn capabilities(mut self, capabilities: Arc<dyn MeterCapabilities>) -> Self {
		self.capabilities = Some(capabilities);

		self
	}

	/// Uses `store` for every concern that has no dedicated store.
	pub fn storage(mut self, store: Arc<dyn KvStore>) -> Self {
		self.storage = Some(store);

		self
	}

	/// Store for the bundled limiter's windows.
	pub fn limiter_storage(mut self, store: Arc<dyn KvStore>) -> Self {
		self.limiter_storage = Some(store);

		self
	}

	/// Store handed to the authorize capability.
	pub fn scope_storage(mut self, store: Arc<dyn KvStore>) -> Self {
		self.scope_storage = Some(store);

		self
	}

	/// Store handed to the cost, balance, and debit capabilities.
	pub fn credit_storage(mut self, store: Arc<dyn KvStore>) -> Self {
		self.credit_storage = Some(store);

		self
	}

	/// Bypasses the pipeline for requests matching `predicate`.
	pub fn skip_when<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&dyn RequestView) -> bool,
	{
		self.skip = Some(Arc::new(predicate));

		self
	}

	/// Overrides the clock used by the bundled limiter and default stores.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Swaps the responder used by [`AuthMeter::handle`].
	pub fn with_responder<R>(self, responder: R) -> AuthMeterBuilder<R>
	where
		R: Responder,
	{
		AuthMeterBuilder {
			key_lookup: self.key_lookup,
			auth_scheme: self.auth_scheme,
			max: self.max,
			expiration: self.expiration,
			skip_failed_requests: self.skip_failed_requests,
			skip_successful_requests: self.skip_successful_requests,
			rate_limiter: self.rate_limiter,
			allow_debt: self.allow_debt,
			capabilities: self.capabilities,
			storage: self.storage,
			limiter_storage: self.limiter_storage,
			scope_storage: self.scope_storage,
			credit_storage: self.credit_storage,
			skip: self.skip,
			clock: self.clock,
			responder,
		}
	}

	/// Validates the configuration and builds the pipeline.
	pub fn build(self) -> Result<AuthMeter<H>, ConfigError> {
		let capabilities = self.capabilities.ok_or(ConfigError::MissingCapabilities)?;
		let (lookup, scheme) = match self.key_lookup {
			Some(raw) => (raw.parse::<KeyLookup>()?, self.auth_scheme),
			None => (
				KeyLookup::default(),
				Some(self.auth_scheme.unwrap_or_else(|| DEFAULT_AUTH_SCHEME.into())),
			),
		};
		let extractor = KeyExtractor::new(lookup, scheme)?;
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let fresh_store = || -> Arc<dyn KvStore> {
			Arc::new(MemoryStore::with_clock(clock.clone()))
		};
		let pick = |dedicated: Option<Arc<dyn KvStore>>| {
			dedicated.or_else(|| self.storage.clone()).unwrap_or_else(fresh_store)
		};
		// Validated even with a custom limiter so a bad window never hides behind one.
		let fixed_window =
			FixedWindowLimiter::new(pick(self.limiter_storage), self.max, self.expiration)?
				.with_clock(clock.clone());
		let limiter: Arc<dyn RateLimiter> = match self.rate_limiter {
			Some(custom) => custom,
			None => Arc::new(fixed_window),
		};

		Ok(AuthMeter {
			extractor,
			limiter,
			capabilities,
			scope_store: pick(self.scope_storage),
			credit_store: pick(self.credit_storage),
			policy: CreditPolicy::new(self.allow_debt),
			skip: self.skip,
			skip_failed_requests: self.skip_failed_requests,
			skip_successful_requests: self.skip_successful_requests,
			responder: self.responder,
		})
	}
}
impl<H> Debug for AuthMeterBuilder<H>
where
	H: Responder + Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthMeterBuilder")
			.field("key_lookup", &self.key_lookup)
			.field("auth_scheme", &self.auth_scheme)
			.field("max", &self.max)
			.field("expiration", &self.expiration)
			.field("skip_failed_requests", &self.skip_failed_requests)
			.field("skip_successful_requests", &self.skip_successful_requests)
			.field("custom_rate_limiter", &self.rate_limiter.is_some())
			.field("allow_debt", &self.allow_debt)
			.field("capabilities_set", &self.capabilities.is_some())
			.field("skip_set", &self.skip.is_some())
			.field("responder", &self.responder)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		capability::CapabilityFuture,
		identity::{Identity, KeySource},
		request::RequestSnapshot,
	};

	struct Open;
	impl MeterCapabilities for Open {
		fn validate<'a>(
			&'a self,
			_: &'a dyn RequestView,
			_: &'a Identity,
		) -> CapabilityFuture<'a, bool> {
			Box::pin(async { Ok(true) })
		}

		fn authorize<'a>(
			&'a self,
			_: &'a dyn RequestView,
			_: &'a dyn KvStore,
			_: &'a Identity,
		) -> CapabilityFuture<'a, bool> {
			Box::pin(async { Ok(true) })
		}

		fn cost<'a>(
			&'a self,
			_: &'a dyn RequestView,
			_: &'a dyn KvStore,
		) -> CapabilityFuture<'a, i64> {
			Box::pin(async { Ok(0) })
		}

		fn balance<'a>(&'a self, _: &'a dyn KvStore, _: &'a Identity) -> CapabilityFuture<'a, i64> {
			Box::pin(async { Ok(0) })
		}

		fn debit<'a>(
			&'a self,
			_: &'a dyn KvStore,
			_: &'a Identity,
			_: i64,
		) -> CapabilityFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}
	}

	fn open() -> AuthMeterBuilder {
		AuthMeter::builder().capabilities(Arc::new(Open))
	}

	#[test]
	fn defaults_read_bearer_tokens_from_authorization() {
		let meter = open().build().expect("Default configuration should build.");

		assert_eq!(meter.extractor().lookup(), &KeyLookup::default());
		assert_eq!(meter.extractor().scheme(), Some(DEFAULT_AUTH_SCHEME));
		assert!(!meter.policy().allow_debt);
	}

	#[test]
	fn explicit_lookup_drops_the_default_scheme() {
		let meter =
			open().key_lookup("header:X-Api-Key").build().expect("Header lookup should build.");

		assert_eq!(meter.extractor().scheme(), None);

		let request = RequestSnapshot::new("GET", "/").with_header("x-api-key", "k1");

		assert_eq!(meter.extractor().extract(&request).ok(), Some(Identity::new("k1")));
	}

	#[test]
	fn empty_scheme_disables_stripping() {
		let meter = open().auth_scheme("").build().expect("Empty scheme should build.");

		assert_eq!(meter.extractor().scheme(), None);
	}

	#[test]
	fn invalid_configurations_are_reported() {
		assert_eq!(
			AuthMeter::builder().build().map(drop),
			Err(ConfigError::MissingCapabilities)
		);
		assert_eq!(open().max(0).build().map(drop), Err(ConfigError::InvalidMax));
		assert_eq!(
			open().expiration(Duration::ZERO).build().map(drop),
			Err(ConfigError::InvalidExpiration { expiration: Duration::ZERO })
		);
		assert!(matches!(
			open().key_lookup("body:key").build().map(drop),
			Err(ConfigError::InvalidKeyLookup { .. })
		));
		assert_eq!(
			open().key_lookup("query:api_key").auth_scheme("Bearer").build().map(drop),
			Err(ConfigError::SchemeWithoutHeader { source_kind: KeySource::Query })
		);
	}
}
