// self
use crate::{
	_prelude::*,
	obs::{Stage, StageOutcome},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedAdmission<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedAdmission<F> = F;

/// Span wrapped around one pipeline invocation.
#[derive(Clone, Debug)]
pub struct PipelineSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl PipelineSpan {
	/// Creates a new span tagged with the request method + path.
	pub fn new(method: &str, path: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("authmeter.pipeline", method, path);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, path);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedAdmission<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a log event for a stage that rejected or failed.
///
/// Named denials log at `debug`; storage and capability failures log at `warn` with the source
/// chain. Credentials never appear in these events.
pub fn log_stage_error(stage: Stage, outcome: StageOutcome, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		match outcome {
			StageOutcome::Failure => {
				let source = StdError::source(error).map(ToString::to_string);

				tracing::warn!(stage = stage.as_str(), %error, ?source, "stage failed");
			},
			_ => tracing::debug!(stage = stage.as_str(), %error, "request rejected"),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, outcome, error);
	}
}

/// Emits a log event for a failed rate-limit release; the admission result stands.
pub fn log_release_error(error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(%error, "failed to release rate-limit slot");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}
