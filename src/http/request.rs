//! Crate-owned request model shared by the pipeline, coordinator, and transports.

// crates.io
use http::header::AsHeaderName;
// self
use crate::{_prelude::*, error::ConfigError};

/// One field of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartPart {
	/// Form field name.
	pub name: String,
	/// File name advertised for file parts.
	pub file_name: Option<String>,
	/// Part content type.
	pub content_type: Option<String>,
	/// Raw part payload.
	pub data: Vec<u8>,
}
impl MultipartPart {
	/// Creates a part from a field name and payload.
	pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
		Self { name: name.into(), file_name: None, content_type: None, data: data.into() }
	}

	/// Advertises a file name for the part.
	pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
		self.file_name = Some(file_name.into());

		self
	}

	/// Sets the part content type.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}
}

/// Request payload. Bodies are owned so a request can be replayed verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestBody {
	/// No body.
	#[default]
	Empty,
	/// Serialized JSON document.
	Json(Vec<u8>),
	/// Raw binary payload; the content type is left to the caller or the transport.
	Bytes {
		/// Payload bytes.
		data: Vec<u8>,
		/// Explicit content type, if the caller knows it.
		content_type: Option<HeaderValue>,
	},
	/// `multipart/form-data` payload; the transport owns the boundary and content type.
	Multipart(Vec<MultipartPart>),
}
impl RequestBody {
	/// Returns `true` for payloads whose content type must not be forced to JSON.
	pub fn is_opaque(&self) -> bool {
		matches!(self, Self::Bytes { .. } | Self::Multipart(_))
	}
}

/// Outbound request descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Request payload.
	pub body: RequestBody,
	pub(crate) replayed: bool,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: RequestBody::Empty, replayed: false }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Adds or replaces a header, rejecting names and values that are not valid HTTP.
	pub fn header<K, V>(mut self, name: K, value: V) -> Result<Self, ConfigError>
	where
		HeaderName: TryFrom<K>,
		<HeaderName as TryFrom<K>>::Error: Into<http::Error>,
		HeaderValue: TryFrom<V>,
		<HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
	{
		let name = HeaderName::try_from(name)
			.map_err(|e| ConfigError::InvalidHeader { source: e.into() })?;
		let value = HeaderValue::try_from(value)
			.map_err(|e| ConfigError::InvalidHeader { source: e.into() })?;

		self.headers.insert(name, value);

		Ok(self)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = RequestBody::Json(serde_json::to_vec(body)?);

		Ok(self)
	}

	/// Attaches a raw binary payload.
	pub fn bytes(mut self, data: impl Into<Vec<u8>>, content_type: Option<HeaderValue>) -> Self {
		self.body = RequestBody::Bytes { data: data.into(), content_type };

		self
	}

	/// Attaches a multipart payload.
	pub fn multipart(mut self, parts: impl IntoIterator<Item = MultipartPart>) -> Self {
		self.body = RequestBody::Multipart(parts.into_iter().collect());

		self
	}

	/// Adds or replaces an already validated header in place.
	pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
		self.headers.insert(name, value);
	}

	/// Removes a header, returning its previous value.
	pub fn remove_header(&mut self, name: impl AsHeaderName) -> Option<HeaderValue> {
		self.headers.remove(name)
	}

	/// Looks up a visible-ASCII header value by case-insensitive name.
	pub fn header_value(&self, name: impl AsHeaderName) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Returns `true` if the header is present.
	pub fn has_header(&self, name: impl AsHeaderName) -> bool {
		self.headers.contains_key(name)
	}

	/// Returns `true` once the request has been replayed after a credential refresh.
	pub fn is_replay(&self) -> bool {
		self.replayed
	}

	pub(crate) fn mark_replayed(&mut self) {
		self.replayed = true;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url() -> Url {
		Url::parse("https://api.example.com/v1/items").expect("Fixture URL should parse.")
	}

	#[test]
	fn headers_are_case_insensitive() {
		let request = ApiRequest::get(url())
			.header("X-CSRF-Token", "abc")
			.expect("Fixture header should be valid.");

		assert_eq!(request.header_value("x-csrf-token"), Some("abc"));
		assert!(request.has_header("X-Csrf-Token"));
		assert_eq!(request.headers.keys().next().map(HeaderName::as_str), Some("x-csrf-token"));
	}

	#[test]
	fn header_injection_is_rejected_before_dispatch() {
		let err = ApiRequest::get(url())
			.header("x-trace", "v\r\nx-admin: 1")
			.expect_err("Values with CR/LF should be rejected.");

		assert!(matches!(err, ConfigError::InvalidHeader { .. }));
		assert!(matches!(
			ApiRequest::get(url()).header("bad name", "v"),
			Err(ConfigError::InvalidHeader { .. })
		));
	}

	#[test]
	fn json_body_serializes_and_opaque_bodies_are_flagged() {
		let request = ApiRequest::post(url())
			.json(&serde_json::json!({ "query": "acme" }))
			.expect("JSON fixture should serialize.");

		assert_eq!(request.body, RequestBody::Json(br#"{"query":"acme"}"#.to_vec()));
		assert!(!request.body.is_opaque());
		assert!(ApiRequest::post(url()).bytes(vec![1, 2, 3], None).body.is_opaque());
		assert!(
			ApiRequest::post(url()).multipart([MultipartPart::new("file", "data")]).body.is_opaque()
		);
	}

	#[test]
	fn fresh_requests_are_not_replays() {
		let mut request = ApiRequest::get(url());

		assert!(!request.is_replay());

		request.mark_replayed();

		assert!(request.is_replay());
	}
}
