//! Client configuration: API base URL, endpoint paths, anti-forgery TTL, and refresh timeout.
//!
//! Values come either from [`ClientConfig::builder`] or from `SESSION_BROKER_*` environment
//! variables via [`ClientConfig::from_env`]. Endpoint paths are joined onto the base URL with
//! [`Url::join`] semantics, so a leading `/` replaces the base path.

// std
use std::str::FromStr;
// self
use crate::{_prelude::*, error::ConfigError};

/// Validated client configuration consumed by [`SessionClient`](crate::client::SessionClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	/// API base URL that request paths resolve against.
	pub base_url: Url,
	/// Absolute refresh endpoint.
	pub refresh_endpoint: Url,
	/// Absolute anti-forgery token endpoint.
	pub anti_forgery_endpoint: Url,
	/// Header carrying the anti-forgery token.
	pub anti_forgery_header: HeaderName,
	/// Lifetime of a cached anti-forgery token.
	pub anti_forgery_ttl: Duration,
	/// Deadline applied to each refresh call.
	pub refresh_timeout: Duration,
}
impl ClientConfig {
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "/auth/refresh";
	/// Default anti-forgery endpoint path.
	pub const DEFAULT_ANTI_FORGERY_PATH: &'static str = "/auth/csrf-token";
	/// Default anti-forgery header name.
	pub const DEFAULT_ANTI_FORGERY_HEADER: &'static str = "X-CSRF-Token";
	/// Default anti-forgery token lifetime.
	pub const DEFAULT_ANTI_FORGERY_TTL: Duration = Duration::minutes(5);
	/// Default refresh deadline.
	pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(10);

	const ENV_BASE_URL: &'static str = "SESSION_BROKER_BASE_URL";
	const ENV_REFRESH_PATH: &'static str = "SESSION_BROKER_REFRESH_PATH";
	const ENV_ANTI_FORGERY_PATH: &'static str = "SESSION_BROKER_ANTI_FORGERY_PATH";
	const ENV_ANTI_FORGERY_HEADER: &'static str = "SESSION_BROKER_ANTI_FORGERY_HEADER";
	const ENV_ANTI_FORGERY_TTL: &'static str = "SESSION_BROKER_ANTI_FORGERY_TTL_SECS";
	const ENV_REFRESH_TIMEOUT: &'static str = "SESSION_BROKER_REFRESH_TIMEOUT_SECS";

	/// Creates a builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_vars(std::env::vars())
	}

	/// Reads the configuration from an arbitrary set of `SESSION_BROKER_*` variables.
	pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let vars: BTreeMap<String, String> =
			vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		let base_url = vars
			.get(Self::ENV_BASE_URL)
			.ok_or(ConfigError::MissingVariable { key: Self::ENV_BASE_URL })?;
		let base_url = Url::parse(base_url).map_err(|_| ConfigError::InvalidVariable {
			key: Self::ENV_BASE_URL,
			value: base_url.clone(),
		})?;
		let mut builder = Self::builder(base_url);

		if let Some(path) = vars.get(Self::ENV_REFRESH_PATH) {
			builder = builder.refresh_path(path);
		}
		if let Some(path) = vars.get(Self::ENV_ANTI_FORGERY_PATH) {
			builder = builder.anti_forgery_path(path);
		}
		if let Some(header) = vars.get(Self::ENV_ANTI_FORGERY_HEADER) {
			builder = builder.anti_forgery_header(header);
		}
		if let Some(secs) = vars.get(Self::ENV_ANTI_FORGERY_TTL) {
			builder = builder.anti_forgery_ttl(parse_seconds(Self::ENV_ANTI_FORGERY_TTL, secs)?);
		}
		if let Some(secs) = vars.get(Self::ENV_REFRESH_TIMEOUT) {
			builder = builder.refresh_timeout(parse_seconds(Self::ENV_REFRESH_TIMEOUT, secs)?);
		}

		builder.build()
	}

	/// Resolves a request path (or absolute URL) against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(path)
			.map_err(|source| ConfigError::InvalidRequestPath { path: path.to_owned(), source })
	}

	pub(crate) fn refresh_deadline(&self) -> std::time::Duration {
		std::time::Duration::try_from(self.refresh_timeout)
			.unwrap_or(std::time::Duration::from_secs(10))
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
	/// API base URL.
	pub base_url: Url,
	/// Refresh endpoint path.
	pub refresh_path: String,
	/// Anti-forgery endpoint path.
	pub anti_forgery_path: String,
	/// Anti-forgery header name.
	pub anti_forgery_header: String,
	/// Anti-forgery token lifetime.
	pub anti_forgery_ttl: Duration,
	/// Refresh deadline.
	pub refresh_timeout: Duration,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with the default paths and durations.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: ClientConfig::DEFAULT_REFRESH_PATH.into(),
			anti_forgery_path: ClientConfig::DEFAULT_ANTI_FORGERY_PATH.into(),
			anti_forgery_header: ClientConfig::DEFAULT_ANTI_FORGERY_HEADER.into(),
			anti_forgery_ttl: ClientConfig::DEFAULT_ANTI_FORGERY_TTL,
			refresh_timeout: ClientConfig::DEFAULT_REFRESH_TIMEOUT,
		}
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the anti-forgery endpoint path.
	pub fn anti_forgery_path(mut self, path: impl Into<String>) -> Self {
		self.anti_forgery_path = path.into();

		self
	}

	/// Overrides the anti-forgery header name.
	pub fn anti_forgery_header(mut self, name: impl Into<String>) -> Self {
		self.anti_forgery_header = name.into();

		self
	}

	/// Overrides the anti-forgery token lifetime.
	pub fn anti_forgery_ttl(mut self, ttl: Duration) -> Self {
		self.anti_forgery_ttl = ttl;

		self
	}

	/// Overrides the refresh deadline.
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Validates the builder and produces a [`ClientConfig`].
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if !self.anti_forgery_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "anti_forgery_ttl" });
		}
		if !self.refresh_timeout.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "refresh_timeout" });
		}

		let anti_forgery_header = HeaderName::from_str(&self.anti_forgery_header).map_err(
			|source| ConfigError::InvalidHeaderName { name: self.anti_forgery_header.clone(), source },
		)?;
		let refresh_endpoint = self
			.base_url
			.join(&self.refresh_path)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "refresh", source })?;
		let anti_forgery_endpoint = self
			.base_url
			.join(&self.anti_forgery_path)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "anti_forgery", source })?;

		Ok(ClientConfig {
			base_url: self.base_url,
			refresh_endpoint,
			anti_forgery_endpoint,
			anti_forgery_header,
			anti_forgery_ttl: self.anti_forgery_ttl,
			refresh_timeout: self.refresh_timeout,
		})
	}
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
	raw.trim()
		.parse::<i64>()
		.map(Duration::seconds)
		.map_err(|_| ConfigError::InvalidVariable { key, value: raw.to_owned() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn base() -> Url {
		Url::parse("https://api.example.com/v1/").expect("Fixture base URL should parse.")
	}

	#[test]
	fn defaults_resolve_against_base() {
		let config = ClientConfig::builder(base()).build().expect("Defaults should validate.");

		assert_eq!(config.refresh_endpoint.as_str(), "https://api.example.com/auth/refresh");
		assert_eq!(config.anti_forgery_endpoint.as_str(), "https://api.example.com/auth/csrf-token");
		assert_eq!(config.anti_forgery_header.as_str(), "x-csrf-token");
		assert_eq!(config.anti_forgery_ttl, Duration::minutes(5));
		assert_eq!(config.refresh_deadline(), std::time::Duration::from_secs(10));
		assert_eq!(
			config.resolve("items?page=2").expect("Relative path should resolve.").as_str(),
			"https://api.example.com/v1/items?page=2",
		);
	}

	#[test]
	fn builder_rejects_invalid_settings() {
		let err = ClientConfig::builder(Url::parse("ftp://example.com").expect("URL should parse."))
			.build()
			.expect_err("Non-HTTP schemes should be rejected.");

		assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));

		let err = ClientConfig::builder(base())
			.refresh_timeout(Duration::ZERO)
			.build()
			.expect_err("Zero timeout should be rejected.");

		assert!(matches!(err, ConfigError::NonPositiveDuration { setting: "refresh_timeout" }));

		let err = ClientConfig::builder(base())
			.anti_forgery_header("X CSRF")
			.build()
			.expect_err("Header names with spaces should be rejected.");

		assert!(matches!(err, ConfigError::InvalidHeaderName { .. }));

		let err = ClientConfig::builder(base())
			.anti_forgery_header("")
			.build()
			.expect_err("Empty header names should be rejected.");

		assert!(matches!(err, ConfigError::InvalidHeaderName { .. }));
	}

	#[test]
	fn vars_override_defaults() {
		let config = ClientConfig::from_vars([
			("SESSION_BROKER_BASE_URL", "http://localhost:8000"),
			("SESSION_BROKER_REFRESH_PATH", "/api/auth/refresh"),
			("SESSION_BROKER_ANTI_FORGERY_TTL_SECS", "60"),
			("SESSION_BROKER_REFRESH_TIMEOUT_SECS", "3"),
			("UNRELATED", "ignored"),
		])
		.expect("Variables should produce a valid configuration.");

		assert_eq!(config.refresh_endpoint.as_str(), "http://localhost:8000/api/auth/refresh");
		assert_eq!(config.anti_forgery_ttl, Duration::seconds(60));
		assert_eq!(config.refresh_timeout, Duration::seconds(3));
	}

	#[test]
	fn vars_report_missing_and_invalid_values() {
		let err = ClientConfig::from_vars(Vec::<(String, String)>::new())
			.expect_err("Base URL is mandatory.");

		assert!(matches!(err, ConfigError::MissingVariable { key: "SESSION_BROKER_BASE_URL" }));

		let err = ClientConfig::from_vars([
			("SESSION_BROKER_BASE_URL", "http://localhost:8000"),
			("SESSION_BROKER_ANTI_FORGERY_TTL_SECS", "soon"),
		])
		.expect_err("Non-numeric TTL should be rejected.");

		assert!(matches!(err, ConfigError::InvalidVariable { .. }));
	}
}
