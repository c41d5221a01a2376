//! Optional observability for session traffic.
//!
//! # Feature Flags
//!
//! Enable `tracing` to emit these spans:
//! - `session_broker.send` around each caller request, with `method`, `path`, and the final
//!   `outcome` recorded once the request settles;
//! - `session_broker.refresh` around each refresh episode, with `episode` and `generation`;
//! - `session_broker.anti_forgery` around each token fetch.
//!
//! Classifier verdicts and refresh transitions are emitted as debug events.
//!
//! Enable `metrics` to feed these counters:
//! - `session_broker_requests_total{outcome}`
//! - `session_broker_replays_total`
//! - `session_broker_refresh_episodes_total{outcome}`
//! - `session_broker_anti_forgery_fetches_total{outcome}`

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, http::ApiResponse};

/// How a caller request settled, as labeled in spans and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
	/// Response handed back to the caller.
	Delivered,
	/// Non-success status passed through as [`Error::Status`].
	Status,
	/// Replay was rejected again.
	Unauthorized,
	/// Session is gone.
	SessionEnded,
	/// Genuine authorization denial.
	Forbidden,
	/// Anti-forgery token rejected after a refetch.
	StaleAntiForgery,
	/// Transient failure with the session preserved.
	Unavailable,
	/// Client shut down while the request waited on a refresh.
	Cancelled,
	/// Invalid input or a store failure on this side of the wire.
	Local,
}
impl RequestOutcome {
	/// Maps the result returned to the caller onto its label.
	pub fn of(result: &Result<ApiResponse>) -> Self {
		match result {
			Ok(_) => Self::Delivered,
			Err(Error::Status { .. }) => Self::Status,
			Err(Error::Unauthorized) => Self::Unauthorized,
			Err(Error::SessionEnded) => Self::SessionEnded,
			Err(Error::Forbidden { .. }) => Self::Forbidden,
			Err(Error::StaleAntiForgery) => Self::StaleAntiForgery,
			Err(Error::Unavailable(_)) => Self::Unavailable,
			Err(Error::Cancelled) => Self::Cancelled,
			Err(Error::Config(_) | Error::Storage(_)) => Self::Local,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Delivered => "delivered",
			Self::Status => "status",
			Self::Unauthorized => "unauthorized",
			Self::SessionEnded => "session_ended",
			Self::Forbidden => "forbidden",
			Self::StaleAntiForgery => "stale_anti_forgery",
			Self::Unavailable => "unavailable",
			Self::Cancelled => "cancelled",
			Self::Local => "local",
		}
	}
}
impl Display for RequestOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{ConfigError, TransportError};

	#[test]
	fn request_outcomes_follow_the_error_taxonomy() {
		let timeout: Error = TransportError::Timeout { after: Duration::seconds(1) }.into();
		let header: Error = ConfigError::InvalidHeader {
			source: HeaderValue::from_str("\n").expect_err("Newlines are invalid.").into(),
		}
		.into();

		assert_eq!(RequestOutcome::of(&Ok(ApiResponse::new(204, ""))), RequestOutcome::Delivered);
		assert_eq!(RequestOutcome::of(&Err(timeout)), RequestOutcome::Unavailable);
		assert_eq!(RequestOutcome::of(&Err(header)), RequestOutcome::Local);
		assert_eq!(RequestOutcome::of(&Err(Error::SessionEnded)).as_str(), "session_ended");
		assert_eq!(
			RequestOutcome::of(&Err(Error::Status { status: 409, detail: None, retry_after: None })),
			RequestOutcome::Status,
		);
	}
}
