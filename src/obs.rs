//! Optional observability helpers for pipeline stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to wrap every admission in a span named
//!   `authmeter.pipeline` and emit `debug`/`warn` events when a stage rejects or fails.
//! - Enable `metrics` to increment the `authmeter_stage_total` counter for every stage outcome,
//!   labeled by `stage` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Skip predicate short-circuit.
	Skip,
	/// Rate-limit check.
	RateLimit,
	/// Strict credential extraction.
	Extract,
	/// Credential validation.
	Validate,
	/// Scope authorization.
	Authorize,
	/// Request cost computation.
	Cost,
	/// Balance lookup and debt policy.
	Balance,
	/// Credit debit.
	Debit,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Skip => "skip",
			Stage::RateLimit => "rate_limit",
			Stage::Extract => "extract",
			Stage::Validate => "validate",
			Stage::Authorize => "authorize",
			Stage::Cost => "cost",
			Stage::Balance => "balance",
			Stage::Debit => "debit",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// The stage let the request through.
	Pass,
	/// The stage denied the request with a named error.
	Reject,
	/// The stage hit a storage or capability error.
	Failure,
}
impl StageOutcome {
	/// Classifies a stage result.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => StageOutcome::Pass,
			Err(e) if e.is_stage_failure() => StageOutcome::Failure,
			Err(_) => StageOutcome::Reject,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Pass => "pass",
			StageOutcome::Reject => "reject",
			StageOutcome::Failure => "failure",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the outcome of `stage` through every enabled backend and hands the result back.
pub fn observe<T>(stage: Stage, result: Result<T>) -> Result<T> {
	let outcome = StageOutcome::of(&result);

	record_stage_outcome(stage, outcome);

	if let Err(e) = &result {
		log_stage_error(stage, outcome, e);
	}

	result
}
