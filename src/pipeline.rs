//! The admission pipeline: one ordered, short-circuiting decision per request.
//!
//! [`AuthMeter::admit`] runs the stages in this order and stops at the first failure:
//!
//! 1. skip predicate (admits immediately when it matches)
//! 2. rate limit, keyed by the best-effort identity
//! 3. strict credential extraction
//! 4. credential validation (binds the identity when valid; an invalid key keeps going)
//! 5. scope authorization
//! 6. credit cost, balance, debt policy, and debit
//!
//! [`AuthMeter::handle`] wraps `admit` and hands the result to the configured [`Responder`].

mod builder;
mod responder;

pub use builder::*;
pub use responder::*;

// self
use crate::{
	_prelude::*,
	capability::MeterCapabilities,
	credit::{self, Charge, CreditPolicy},
	identity::{Identity, KeyExtractor},
	limiter::{RateLimitDecision, RateLimiter},
	obs::{self, PipelineSpan, Stage},
	request::RequestView,
	store::KvStore,
};

/// Predicate that bypasses the pipeline entirely when it returns `true`.
pub type SkipPredicate = Arc<dyn Fn(&dyn RequestView) -> bool + Send + Sync>;

/// Successful pipeline outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Admission {
	/// Credential confirmed by the validator; `None` when validation said "invalid" without an
	/// error, or when the pipeline was skipped.
	pub identity: Option<Identity>,
	/// Credits charged for the request.
	pub charge: Option<Charge>,
	/// Requests left in the caller's rate window.
	pub rate_remaining: Option<u32>,
	/// `true` when the skip predicate bypassed every stage.
	pub skipped: bool,
}
impl Admission {
	/// Admission produced by the skip predicate.
	pub fn skipped() -> Self {
		Self { skipped: true, ..Default::default() }
	}

	/// Returns the bound identity, if validation confirmed one.
	pub fn identity(&self) -> Option<&Identity> {
		self.identity.as_ref()
	}
}

/// Immutable, shareable admission pipeline.
///
/// Built once through [`AuthMeter::builder`] and shared across concurrent requests; nothing in it
/// changes after construction. State that outlives a request (rate windows, balances) lives in
/// the configured stores.
pub struct AuthMeter<H = StatusResponder>
where
	H: Responder,
{
	extractor: KeyExtractor,
	limiter: Arc<dyn RateLimiter>,
	capabilities: Arc<dyn MeterCapabilities>,
	scope_store: Arc<dyn KvStore>,
	credit_store: Arc<dyn KvStore>,
	policy: CreditPolicy,
	skip: Option<SkipPredicate>,
	skip_failed_requests: bool,
	skip_successful_requests: bool,
	responder: H,
}
impl AuthMeter {
	/// Starts a builder with the default lookup, limits, and [`StatusResponder`].
	pub fn builder() -> AuthMeterBuilder {
		AuthMeterBuilder::new()
	}
}
impl<H> AuthMeter<H>
where
	H: Responder,
{
	/// Extractor built from the configured lookup and scheme.
	pub fn extractor(&self) -> &KeyExtractor {
		&self.extractor
	}

	/// Debt policy applied by the credit stage.
	pub fn policy(&self) -> CreditPolicy {
		self.policy
	}

	/// Responder used by [`handle`](Self::handle).
	pub fn responder(&self) -> &H {
		&self.responder
	}

	/// Runs every stage for `request` and returns the admission or the first error.
	pub async fn admit(&self, request: &dyn RequestView) -> Result<Admission> {
		if self.skip.as_ref().is_some_and(|skip| skip(request)) {
			obs::record_stage_outcome(Stage::Skip, obs::StageOutcome::Pass);

			return Ok(Admission::skipped());
		}

		let span = PipelineSpan::new(request.method(), request.path());

		span.instrument(self.admit_counted(request)).await
	}

	/// Runs [`admit`](Self::admit) and dispatches to the success or error handler.
	pub async fn handle(&self, request: &dyn RequestView) -> H::Response {
		match self.admit(request).await {
			Ok(admission) => self.responder.on_success(request, &admission),
			Err(error) => self.responder.on_error(request, error),
		}
	}

	async fn admit_counted(&self, request: &dyn RequestView) -> Result<Admission> {
		let limiter_key = self.extractor.extract_best_effort(request);
		let (remaining, reset_at) =
			obs::observe(Stage::RateLimit, self.check_rate(&limiter_key).await)?;
		let result = self.authorize_and_meter(request, remaining).await;
		let release = match &result {
			Ok(_) => self.skip_successful_requests,
			Err(_) => self.skip_failed_requests,
		};

		if release && let Err(e) = self.limiter.release(limiter_key.expose(), reset_at).await {
			obs::log_release_error(&e);
		}

		result
	}

	async fn check_rate(&self, key: &Identity) -> Result<(u32, OffsetDateTime)> {
		match self.limiter.check(key.expose()).await? {
			RateLimitDecision::Allow { remaining, reset_at } => Ok((remaining, reset_at)),
			RateLimitDecision::Reject(directive) =>
				Err(Error::RateLimitExceeded { retry_after: directive.recommended_backoff }),
		}
	}

	async fn authorize_and_meter(
		&self,
		request: &dyn RequestView,
		remaining: u32,
	) -> Result<Admission> {
		let key = obs::observe(Stage::Extract, self.extractor.extract(request))?;
		let valid = self
			.capabilities
			.validate(request, &key)
			.await
			.map_err(|e| Error::capability(Stage::Validate, e));
		// An invalid key without an error is not terminal; it just stays unbound.
		let identity = obs::observe(Stage::Validate, valid)?.then(|| key.clone());
		let allowed = self
			.capabilities
			.authorize(request, self.scope_store.as_ref(), &key)
			.await
			.map_err(|e| Error::capability(Stage::Authorize, e))
			.and_then(|allowed| if allowed { Ok(()) } else { Err(Error::KeyNotAllowed) });

		obs::observe(Stage::Authorize, allowed)?;

		let charge = credit::meter(
			self.capabilities.as_ref(),
			request,
			self.credit_store.as_ref(),
			&key,
			self.policy,
		)
		.await?;

		Ok(Admission {
			identity,
			charge: Some(charge),
			rate_remaining: Some(remaining),
			skipped: false,
		})
	}
}
impl<H> Debug for AuthMeter<H>
where
	H: Responder + Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthMeter")
			.field("extractor", &self.extractor)
			.field("policy", &self.policy)
			.field("skip_set", &self.skip.is_some())
			.field("skip_failed_requests", &self.skip_failed_requests)
			.field("skip_successful_requests", &self.skip_successful_requests)
			.field("responder", &self.responder)
			.finish()
	}
}
