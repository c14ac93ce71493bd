// self
use crate::{_prelude::*, pipeline::Admission, request::RequestView};

/// Body sent for every stage failure that is not a named denial.
pub const GENERIC_DENIAL: &str = "Invalid or expired API key.";
/// Body sent when the rate limit rejects a request.
pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";

/// Turns pipeline outcomes into whatever the host framework sends back.
pub trait Responder
where
	Self: Send + Sync,
{
	/// Value produced for both outcomes.
	type Response;

	/// Called once the request was admitted.
	fn on_success(&self, request: &dyn RequestView, admission: &Admission) -> Self::Response;

	/// Called with the first error the pipeline hit.
	fn on_error(&self, request: &dyn RequestView, error: Error) -> Self::Response;
}

/// Framework-neutral response description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
	/// HTTP status code.
	pub status: u16,
	/// Response body; empty for admitted requests.
	pub body: String,
	/// Value for a `Retry-After` header, set on rate-limit rejections.
	pub retry_after: Option<Duration>,
	/// Admission details, set when the request may proceed.
	pub admission: Option<Admission>,
}
impl Verdict {
	/// Returns `true` when the request may continue to the host handler.
	pub fn is_admitted(&self) -> bool {
		self.admission.is_some()
	}

	/// Whole seconds for a `Retry-After` header, rounded up.
	pub fn retry_after_secs(&self) -> Option<i64> {
		self.retry_after.map(|wait| {
			let secs = wait.whole_seconds();

			if wait.subsec_nanoseconds() > 0 { secs + 1 } else { secs }
		})
	}
}

/// Default responder mapping errors to status codes.
///
/// Named key denials keep their message so callers can fix the request; every other failure
/// collapses into one generic 401 so storage or validator details never leak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusResponder;
impl Responder for StatusResponder {
	type Response = Verdict;

	fn on_success(&self, _: &dyn RequestView, admission: &Admission) -> Verdict {
		Verdict {
			status: 200,
			body: String::new(),
			retry_after: None,
			admission: Some(admission.clone()),
		}
	}

	fn on_error(&self, _: &dyn RequestView, error: Error) -> Verdict {
		let (status, body, retry_after) = match &error {
			Error::MissingOrMalformedKey | Error::KeyNotAllowed => (401, error.to_string(), None),
			Error::RateLimitExceeded { retry_after } =>
				(429, TOO_MANY_REQUESTS.to_owned(), Some(*retry_after)),
			_ => (401, GENERIC_DENIAL.to_owned(), None),
		};

		Verdict { status, body, retry_after, admission: None }
	}
}
