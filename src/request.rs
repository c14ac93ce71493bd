//! Transport-agnostic view of an inbound request.
//!
//! The pipeline never touches a concrete HTTP type. Hosts implement [`RequestView`] for their
//! framework's request (or copy the relevant parts into a [`RequestSnapshot`]) and hand it to
//! [`AuthMeter::admit`](crate::AuthMeter::admit).

// self
use crate::_prelude::*;

/// Read-only accessors the pipeline and capabilities need from a request.
///
/// Every accessor returns `None` when the value is absent. Path parameters are returned raw
/// (still percent-encoded); the extractor decodes them.
pub trait RequestView
where
	Self: Send + Sync,
{
	/// HTTP method, e.g. `GET`.
	fn method(&self) -> &str;

	/// Request path without the query string.
	fn path(&self) -> &str;

	/// Header value; names are matched case-insensitively.
	fn header(&self, name: &str) -> Option<&str>;

	/// First query-string value for `name`.
	fn query(&self, name: &str) -> Option<&str>;

	/// Form body field.
	fn form(&self, name: &str) -> Option<&str>;

	/// Route parameter captured by the host router.
	fn param(&self, name: &str) -> Option<&str>;

	/// Cookie value.
	fn cookie(&self, name: &str) -> Option<&str>;
}

/// Owned request snapshot, handy for tests and for hosts that prefer copying over borrowing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestSnapshot {
	method: String,
	path: String,
	headers: BTreeMap<String, String>,
	query: BTreeMap<String, String>,
	form: BTreeMap<String, String>,
	params: BTreeMap<String, String>,
	cookies: BTreeMap<String, String>,
}
impl RequestSnapshot {
	/// Creates an empty snapshot for `method` + `path`.
	pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
		Self { method: method.into(), path: path.into(), ..Default::default() }
	}

	/// Builds a snapshot from a full URL, copying its path and query pairs.
	pub fn from_url(method: impl Into<String>, url: &Url) -> Self {
		let mut snapshot = Self::new(method, url.path());

		for (name, value) in url.query_pairs() {
			snapshot.query.entry(name.into_owned()).or_insert_with(|| value.into_owned());
		}

		snapshot
	}

	/// Adds a header.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.insert(name.to_ascii_lowercase(), value.into());

		self
	}

	/// Adds a query parameter; the first value for a name wins.
	pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.entry(name.into()).or_insert_with(|| value.into());

		self
	}

	/// Adds a form field.
	pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.form.insert(name.into(), value.into());

		self
	}

	/// Adds a raw (percent-encoded) path parameter.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.insert(name.into(), value.into());

		self
	}

	/// Adds a cookie.
	pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.cookies.insert(name.into(), value.into());

		self
	}
}
impl RequestView for RequestSnapshot {
	fn method(&self) -> &str {
		&self.method
	}

	fn path(&self) -> &str {
		&self.path
	}

	fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	fn query(&self, name: &str) -> Option<&str> {
		self.query.get(name).map(String::as_str)
	}

	fn form(&self, name: &str) -> Option<&str> {
		self.form.get(name).map(String::as_str)
	}

	fn param(&self, name: &str) -> Option<&str> {
		self.params.get(name).map(String::as_str)
	}

	fn cookie(&self, name: &str) -> Option<&str> {
		self.cookies.get(name).map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn headers_are_case_insensitive() {
		let request = RequestSnapshot::new("GET", "/").with_header("X-Api-Key", "k");

		assert_eq!(request.header("x-api-key"), Some("k"));
		assert_eq!(request.header("X-API-KEY"), Some("k"));
		assert_eq!(request.header("Authorization"), None);
	}

	#[test]
	fn from_url_keeps_the_first_query_value() {
		let url = Url::parse("https://api.example.com/v1/search?api_key=a%20b&api_key=second&q=x")
			.expect("URL fixture should parse.");
		let request = RequestSnapshot::from_url("POST", &url);

		assert_eq!(request.method(), "POST");
		assert_eq!(request.path(), "/v1/search");
		assert_eq!(request.query("api_key"), Some("a b"));
		assert_eq!(request.query("q"), Some("x"));
	}
}
