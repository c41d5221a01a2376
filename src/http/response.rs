//! Crate-owned response model plus body helpers shared by every consumer.

// crates.io
use http::header::{AsHeaderName, RETRY_AFTER};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransientError};

/// Raw response captured by an [`ApiTransport`](crate::http::ApiTransport).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	const DETAIL_KEYS: [&'static str; 4] = ["detail", "message", "error_description", "error"];

	/// Creates a response with the provided status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks up a visible-ASCII header value by case-insensitive name.
	pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Returns the body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing field path on error.
	pub fn json<T>(&self) -> Result<T, TransientError>
	where
		T: DeserializeOwned,
	{
		self.json_for("response")
	}

	pub(crate) fn json_for<T>(&self, endpoint: &'static str) -> Result<T, TransientError>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| TransientError::ResponseParse { endpoint, source })
	}

	/// Extracts a human-readable rejection detail from the body.
	///
	/// Servers answer with several shapes (`{"detail": ...}`, `{"message": ...}`,
	/// `{"error": {"message": ...}}`, plain text); every shape collapses into one string here.
	pub fn detail(&self) -> Option<String> {
		let value = serde_json::from_slice::<serde_json::Value>(&self.body).ok();

		match value {
			Some(serde_json::Value::Object(map)) => Self::DETAIL_KEYS
				.iter()
				.filter_map(|key| map.get(*key))
				.find_map(detail_text),
			Some(serde_json::Value::String(text)) => Some(text).filter(|t| !t.trim().is_empty()),
			Some(_) => None,
			None => {
				let text = self.text();
				let trimmed = text.trim();

				(!trimmed.is_empty()).then(|| trimmed.to_owned())
			},
		}
	}

	/// Parses the `Retry-After` header as delay seconds or an RFC 2822 instant.
	///
	/// Negative delays and instants in the past yield `None`.
	pub fn retry_after(&self) -> Option<Duration> {
		let raw = self.header(RETRY_AFTER)?.trim();

		if let Ok(secs) = raw.parse::<i64>() {
			return (secs >= 0).then(|| Duration::seconds(secs));
		}
		if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
			let delta = moment - OffsetDateTime::now_utc();

			if delta.is_positive() {
				return Some(delta);
			}
		}

		None
	}
}

fn detail_text(value: &serde_json::Value) -> Option<String> {
	match value {
		serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
		serde_json::Value::Object(map) =>
			map.get("message").or_else(|| map.get("detail")).and_then(detail_text),
		serde_json::Value::Array(items) => items.iter().find_map(detail_text),
		_ => None,
	}
}
