//! Pipeline-level error types shared across stages, stores, and configuration.

// self
use crate::{_prelude::*, identity::KeySource, obs::Stage, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error produced by host-supplied capabilities.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical pipeline error handed to the responder.
///
/// The first four variants are the named denials; everything else is a stage failure raised by
/// storage or by one of the host capabilities.
#[derive(Debug, ThisError)]
pub enum Error {
	/// No credential was found at the configured lookup location, or it could not be parsed.
	#[error("Missing or malformed API key.")]
	MissingOrMalformedKey,
	/// The scope authorizer refused the credential for this resource.
	#[error("API key is not allowed to access this resource.")]
	KeyNotAllowed,
	/// The account cannot cover the request cost and debt is disabled.
	#[error("Credits exceeded: balance {balance} cannot cover cost {cost}.")]
	CreditsExceeded {
		/// Balance observed before the (skipped) debit.
		balance: i64,
		/// Cost computed for the request.
		cost: i64,
	},
	/// The caller exhausted the current rate-limit window.
	#[error("Rate limit exceeded; retry in {retry_after}.")]
	RateLimitExceeded {
		/// Time left until the active window closes.
		retry_after: Duration,
	},

	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// A host capability returned an error.
	#[error("The {stage} stage failed.")]
	Capability {
		/// Stage whose capability failed.
		stage: Stage,
		/// Error returned by the capability, untouched.
		#[source]
		source: BoxError,
	},
	/// The cost capability produced a negative value.
	#[error("Request cost must not be negative, got {cost}.")]
	NegativeCost {
		/// Offending cost value.
		cost: i64,
	},
}
impl Error {
	/// Wraps a capability failure for the provided stage.
	pub fn capability(stage: Stage, source: impl Into<BoxError>) -> Self {
		Self::Capability { stage, source: source.into() }
	}

	/// Returns `true` for unclassified stage failures (storage or capability errors).
	pub fn is_stage_failure(&self) -> bool {
		matches!(self, Self::Storage(_) | Self::Capability { .. } | Self::NegativeCost { .. })
	}
}

/// Configuration problems detected while building an [`AuthMeter`](crate::AuthMeter).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// No [`MeterCapabilities`](crate::capability::MeterCapabilities) implementation was supplied.
	#[error("Capabilities are required: validate, authorize, cost, balance, and debit.")]
	MissingCapabilities,
	/// The key lookup string is not of the form `<source>:<name>`.
	#[error("Key lookup `{lookup}` is invalid: {reason}.")]
	InvalidKeyLookup {
		/// Raw lookup string.
		lookup: String,
		/// What was wrong with it.
		reason: &'static str,
	},
	/// The per-window request limit must be positive.
	#[error("Rate limit max must be positive.")]
	InvalidMax,
	/// The window length must be positive.
	#[error("Rate limit expiration must be positive, got {expiration}.")]
	InvalidExpiration {
		/// Rejected window length.
		expiration: Duration,
	},
	/// An auth scheme only applies to header lookups.
	#[error("An auth scheme requires a header key lookup, got `{source_kind}`.")]
	SchemeWithoutHeader {
		/// Source configured by the lookup string.
		source_kind: KeySource,
	},
}
