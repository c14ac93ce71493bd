//! Parsed `<source>:<name>` key lookup descriptors.

// self
use crate::{_prelude::*, error::ConfigError};

/// Request location a credential is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
	/// A request header, optionally prefixed by an auth scheme.
	Header,
	/// A query-string parameter.
	Query,
	/// A form body field.
	Form,
	/// A percent-encoded path parameter.
	Param,
	/// A cookie.
	Cookie,
}
impl KeySource {
	/// Returns the lookup prefix for the source.
	pub const fn as_str(self) -> &'static str {
		match self {
			KeySource::Header => "header",
			KeySource::Query => "query",
			KeySource::Form => "form",
			KeySource::Param => "param",
			KeySource::Cookie => "cookie",
		}
	}
}
impl Display for KeySource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Where to find the credential: a source plus the field name inside it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyLookup {
	/// Request location.
	pub source: KeySource,
	/// Header, parameter, field, or cookie name.
	pub name: String,
}
impl KeyLookup {
	/// Lookup used when none is configured.
	pub const DEFAULT: &'static str = "header:Authorization";

	/// Creates a lookup for `name` inside `source`.
	pub fn new(source: KeySource, name: impl Into<String>) -> Self {
		Self { source, name: name.into() }
	}
}
impl Default for KeyLookup {
	fn default() -> Self {
		Self::new(KeySource::Header, "Authorization")
	}
}
impl Display for KeyLookup {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}", self.source, self.name)
	}
}
impl FromStr for KeyLookup {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = |reason| ConfigError::InvalidKeyLookup { lookup: s.to_owned(), reason };
		let (source, name) = s.split_once(':').ok_or_else(|| invalid("expected `<source>:<name>`"))?;
		let source = match source {
			"header" => KeySource::Header,
			"query" => KeySource::Query,
			"form" => KeySource::Form,
			"param" => KeySource::Param,
			"cookie" => KeySource::Cookie,
			_ => return Err(invalid("source must be header, query, form, param, or cookie")),
		};

		if name.is_empty() {
			return Err(invalid("name cannot be empty"));
		}

		Ok(Self::new(source, name))
	}
}
