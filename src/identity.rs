//! Caller credentials and the extractors that pull them out of requests.

pub mod lookup;

pub use lookup::*;

// self
use crate::{_prelude::*, error::ConfigError, request::RequestView};

/// Credential string presented by the caller.
///
/// Formatting redacts the value so identities can flow through logs and spans; use
/// [`expose`](Self::expose) when the raw token is actually needed.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Identity(String);
impl Identity {
	/// Wraps a credential string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw credential. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` for the empty identity produced by failed best-effort extraction.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for Identity {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Identity").field(&"<redacted>").finish()
	}
}
impl Display for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Reads credentials from the configured [`KeyLookup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyExtractor {
	lookup: KeyLookup,
	scheme: Option<String>,
}
impl KeyExtractor {
	/// Creates an extractor; `scheme` only applies to header lookups.
	pub fn new(lookup: KeyLookup, scheme: Option<String>) -> Result<Self, ConfigError> {
		let scheme = scheme.filter(|scheme| !scheme.is_empty());

		if scheme.is_some() && lookup.source != KeySource::Header {
			return Err(ConfigError::SchemeWithoutHeader { source_kind: lookup.source });
		}

		Ok(Self { lookup, scheme })
	}

	/// Configured lookup.
	pub fn lookup(&self) -> &KeyLookup {
		&self.lookup
	}

	/// Configured auth scheme, if any.
	pub fn scheme(&self) -> Option<&str> {
		self.scheme.as_deref()
	}

	/// Strictly extracts the credential, failing with [`Error::MissingOrMalformedKey`].
	pub fn extract(&self, request: &dyn RequestView) -> Result<Identity> {
		let name = self.lookup.name.as_str();
		let key = match self.lookup.source {
			KeySource::Header => request.header(name).and_then(|value| self.strip_scheme(value)),
			KeySource::Query => request.query(name),
			KeySource::Form => request.form(name),
			KeySource::Cookie => request.cookie(name),
			KeySource::Param =>
				return request
					.param(name)
					.filter(|raw| !raw.is_empty())
					.and_then(path_unescape)
					.filter(|key| !key.is_empty())
					.map(Identity::new)
					.ok_or(Error::MissingOrMalformedKey),
		};

		key.filter(|key| !key.is_empty()).map(Identity::new).ok_or(Error::MissingOrMalformedKey)
	}

	/// Extracts the credential or returns the empty identity on any failure.
	///
	/// Only the rate limiter uses this, so requests without a parseable key still share one
	/// bucket instead of bypassing the limit.
	pub fn extract_best_effort(&self, request: &dyn RequestView) -> Identity {
		self.extract(request).unwrap_or_default()
	}

	fn strip_scheme<'a>(&self, value: &'a str) -> Option<&'a str> {
		match self.scheme.as_deref() {
			None => Some(value),
			Some(scheme) => value.strip_prefix(scheme)?.strip_prefix(' '),
		}
	}
}

fn path_unescape(raw: &str) -> Option<String> {
	// `%` must introduce exactly two hex digits.
	let well_formed = raw.split('%').skip(1).all(|escape| {
		escape.get(..2).is_some_and(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
	});

	if !well_formed {
		return None;
	}

	urlencoding::decode(raw).ok().map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::request::RequestSnapshot;

	fn bearer() -> KeyExtractor {
		KeyExtractor::new(KeyLookup::default(), Some("Bearer".into()))
			.expect("Bearer extractor should build.")
	}

	fn extractor(lookup: &str) -> KeyExtractor {
		KeyExtractor::new(lookup.parse().expect("Lookup fixture should parse."), None)
			.expect("Extractor fixture should build.")
	}

	#[test]
	fn bearer_header_strips_scheme() {
		let request = RequestSnapshot::new("GET", "/").with_header("Authorization", "Bearer abc123");
		let key = bearer().extract(&request).expect("Bearer credential should extract.");

		assert_eq!(key.expose(), "abc123");
	}

	#[test]
	fn bearer_header_rejects_missing_or_mismatched_scheme() {
		let extractor = bearer();

		for value in ["abc123", "Bearer", "Bearer ", "Bearerabc123", "Basic abc123", ""] {
			let request = RequestSnapshot::new("GET", "/").with_header("Authorization", value);

			assert!(
				matches!(extractor.extract(&request), Err(Error::MissingOrMalformedKey)),
				"`{value}` must not yield a credential"
			);
		}

		let missing = RequestSnapshot::new("GET", "/");

		assert!(matches!(extractor.extract(&missing), Err(Error::MissingOrMalformedKey)));
	}

	#[test]
	fn header_without_scheme_returns_raw_value() {
		let extractor = extractor("header:X-Api-Key");
		let request = RequestSnapshot::new("GET", "/").with_header("x-api-key", "Bearer raw");

		assert_eq!(
			extractor.extract(&request).expect("Raw header should extract.").expose(),
			"Bearer raw"
		);
	}

	#[test]
	fn query_form_and_cookie_reject_empty_values() {
		let cases = [
			(extractor("query:api_key"), RequestSnapshot::new("GET", "/").with_query("api_key", "")),
			(extractor("form:api_key"), RequestSnapshot::new("POST", "/").with_form("api_key", "")),
			(extractor("cookie:key"), RequestSnapshot::new("GET", "/").with_cookie("key", "")),
		];

		for (extractor, request) in cases {
			assert!(matches!(extractor.extract(&request), Err(Error::MissingOrMalformedKey)));
			assert!(extractor.extract_best_effort(&request).is_empty());
		}

		let request = RequestSnapshot::new("POST", "/")
			.with_query("api_key", "q")
			.with_form("api_key", "f")
			.with_cookie("key", "c");

		assert_eq!(extractor("query:api_key").extract(&request).map(|k| k.0).ok(), Some("q".into()));
		assert_eq!(extractor("form:api_key").extract(&request).map(|k| k.0).ok(), Some("f".into()));
		assert_eq!(extractor("cookie:key").extract(&request).map(|k| k.0).ok(), Some("c".into()));
	}

	#[test]
	fn path_params_are_percent_decoded() {
		let extractor = extractor("param:key");
		let request = RequestSnapshot::new("GET", "/keys/a%2Fb%20c").with_param("key", "a%2Fb%20c");

		assert_eq!(extractor.extract(&request).expect("Param should decode.").expose(), "a/b c");
	}

	#[test]
	fn malformed_path_escapes_fail() {
		let extractor = extractor("param:key");

		for raw in ["abc%", "abc%2", "%zz", "%2G", "%%41", "%C3%28", ""] {
			let request = RequestSnapshot::new("GET", "/").with_param("key", raw);

			assert!(
				matches!(extractor.extract(&request), Err(Error::MissingOrMalformedKey)),
				"`{raw}` must be rejected"
			);
		}
	}

	#[test]
	fn scheme_requires_header_lookup() {
		let err = KeyExtractor::new(KeyLookup::new(KeySource::Query, "k"), Some("Bearer".into()))
			.expect_err("Scheme on a query lookup must be rejected.");

		assert_eq!(err, ConfigError::SchemeWithoutHeader { source_kind: KeySource::Query });

		let extractor = KeyExtractor::new(KeyLookup::new(KeySource::Query, "k"), Some(String::new()))
			.expect("An empty scheme counts as no scheme.");

		assert_eq!(extractor.scheme(), None);
	}

	#[test]
	fn identities_redact_when_formatted() {
		let key = Identity::new("sk-live-123");

		assert_eq!(format!("{key:?}"), "Identity(\"<redacted>\")");
		assert_eq!(format!("{key}"), "<redacted>");
	}
}
