//! Client-level error types shared across the pipeline, coordinator, and stores.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error handed to callers of [`SessionClient::send`](crate::client::SessionClient::send).
///
/// Raw 401 responses never reach callers: they are either resolved by a refresh + replay or
/// turned into [`Error::Unauthorized`] / [`Error::SessionEnded`].
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Network failure, timeout, or malformed upstream payload; the session is preserved.
	#[error(transparent)]
	Unavailable(#[from] TransientError),

	/// Request still failed authorization after being replayed with a refreshed credential.
	#[error("Request was rejected after replaying it with a refreshed credential.")]
	Unauthorized,
	/// Refresh endpoint rejected the session; the stored credential has been cleared.
	#[error("Session has ended and must be re-established.")]
	SessionEnded,
	/// Server denied the request for reasons unrelated to credential freshness.
	#[error("Request was forbidden: {reason}.")]
	Forbidden {
		/// Server-supplied reason string.
		reason: String,
	},
	/// Anti-forgery token was rejected even after fetching a fresh one.
	#[error("Anti-forgery token was rejected after a fresh token was fetched.")]
	StaleAntiForgery,
	/// Non-success status that this client does not interpret.
	#[error("Request failed with HTTP status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Server-supplied detail, when the body carried one.
		detail: Option<String>,
		/// Retry-After hint, if supplied.
		retry_after: Option<Duration>,
	},
	/// Client was shut down while the request waited on a refresh.
	#[error("Client was shut down before the refresh completed.")]
	Cancelled,
}
impl Error {
	/// Returns `true` when the failure preserved the session and the caller may retry later.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Unavailable(_))
	}

	/// Returns the HTTP status associated with the failure, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Unauthorized | Self::SessionEnded => Some(401),
			Self::Forbidden { .. } | Self::StaleAntiForgery => Some(403),
			Self::Status { status, .. } => Some(*status),
			Self::Unavailable(TransientError::Upstream { status, .. }) => *status,
			_ => None,
		}
	}
}
impl From<TransportError> for Error {
	fn from(e: TransportError) -> Self {
		Self::Unavailable(e.into())
	}
}

/// Configuration and validation failures raised while building a client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL must use `http` or `https`.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// An endpoint path could not be joined onto the base URL.
	#[error("The {endpoint} path cannot be joined onto the base URL.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A duration setting must be strictly positive.
	#[error("The {setting} setting must be positive.")]
	NonPositiveDuration {
		/// Setting name.
		setting: &'static str,
	},
	/// Configured header name is not a valid HTTP field name.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Offending header name.
		name: String,
		/// Underlying parsing failure.
		#[source]
		source: http::header::InvalidHeaderName,
	},
	/// Caller-supplied request header is not valid HTTP.
	#[error("Request header is invalid.")]
	InvalidHeader {
		/// Underlying name or value failure.
		#[source]
		source: http::Error,
	},
	/// An environment variable held an unparsable value.
	#[error("Environment variable {key} holds an invalid value: {value}.")]
	InvalidVariable {
		/// Variable name.
		key: &'static str,
		/// Raw value.
		value: String,
	},
	/// A required environment variable is absent.
	#[error("Environment variable {key} is required.")]
	MissingVariable {
		/// Variable name.
		key: &'static str,
	},
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	InvalidCredential(#[from] crate::auth::CredentialError),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[from] serde_json::Error),
	/// Request path could not be resolved against the base URL.
	#[error("Request path `{path}` cannot be resolved against the base URL.")]
	InvalidRequestPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry, session untouched).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Transport could not deliver the request or receive a response.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upstream answered with an unexpected but non-fatal response.
	#[error("{endpoint} endpoint returned an unexpected response: {message}.")]
	Upstream {
		/// Endpoint label (`refresh`, `anti_forgery`).
		endpoint: &'static str,
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Upstream responded with malformed JSON.
	#[error("{endpoint} endpoint returned malformed JSON.")]
	ResponseParse {
		/// Endpoint label (`refresh`, `anti_forgery`, `response`).
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Shared refresh episode failed transiently; every waiter receives the same summary.
	#[error("Credential refresh failed: {message}")]
	Refresh {
		/// Summary of the episode failure.
		message: String,
	},
}

/// Transport-level failures (network, IO, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Target URL.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
	/// Request did not complete within its deadline.
	#[error("Request timed out after {after}.")]
	Timeout {
		/// Deadline that elapsed.
		after: Duration,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Into<String>, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.into(), source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn transport_errors_surface_as_unavailable() {
		let err: Error = TransportError::Timeout { after: Duration::seconds(10) }.into();

		assert!(err.is_retryable());
		assert!(matches!(err, Error::Unavailable(TransientError::Transport(_))));
		assert!(err.to_string().contains("timed out"));
	}

	#[test]
	fn invalid_headers_are_local_errors() {
		let source = http::HeaderValue::from_str("v\r\n")
			.expect_err("Control characters should be rejected.")
			.into();
		let err: Error = ConfigError::InvalidHeader { source }.into();

		assert!(!err.is_retryable());
		assert!(matches!(err, Error::Config(ConfigError::InvalidHeader { .. })));
	}

	#[test]
	fn status_reflects_taxonomy() {
		assert_eq!(Error::Unauthorized.status(), Some(401));
		assert_eq!(Error::SessionEnded.status(), Some(401));
		assert_eq!(Error::Forbidden { reason: "nope".into() }.status(), Some(403));
		assert_eq!(Error::Status { status: 418, detail: None, retry_after: None }.status(), Some(418));
		assert_eq!(Error::Cancelled.status(), None);
		assert!(!Error::SessionEnded.is_retryable());
	}
}
