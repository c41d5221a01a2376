//! Response classification for the refresh coordinator.
//!
//! Every transport outcome is reduced to a [`RejectionContext`] holding primitive data
//! (status, detail, body preview, network flag) and then mapped to a [`Classification`] by a
//! [`ClassifyStrategy`]. The classifier is the only place that interprets raw statuses; the
//! pipeline and coordinator consume its verdict.

// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::ApiResponse,
};

/// Which endpoint produced the outcome being classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
	/// Any business endpoint issued through the client.
	Resource,
	/// The credential refresh endpoint itself.
	Refresh,
}
impl EndpointKind {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Resource => "resource",
			Self::Refresh => "refresh",
		}
	}
}

/// Subtype of a 403 rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForbiddenKind {
	/// Anti-forgery token was stale or invalid; retry once with a fresh token.
	StaleAntiForgery,
	/// Genuine authorization denial; surface to the caller.
	Denied,
}

/// Verdict returned by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
	/// Access credential expired; eligible for a single-flight refresh.
	Retry,
	/// Request rejected with 403.
	Forbidden(ForbiddenKind),
	/// Refresh credential is unrecoverable; the session must be cleared.
	Terminal,
	/// Anything else, including network failures; handed to the caller untouched.
	Passthrough,
}
impl Classification {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Retry => "retry",
			Self::Forbidden(ForbiddenKind::StaleAntiForgery) => "stale_anti_forgery",
			Self::Forbidden(ForbiddenKind::Denied) => "denied",
			Self::Terminal => "terminal",
			Self::Passthrough => "passthrough",
		}
	}
}

/// Context handed to a [`ClassifyStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectionContext {
	/// Endpoint that produced the outcome.
	pub endpoint: EndpointKind,
	/// HTTP status, when a response arrived.
	pub http_status: Option<u16>,
	/// Detail extracted from the body (`detail`, `message`, ...).
	pub detail: Option<String>,
	/// Preview of the raw body.
	pub body_preview: Option<String>,
	/// Indicates that no response was received.
	pub network_error: bool,
}
impl RejectionContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context for `endpoint`.
	pub fn new(endpoint: EndpointKind) -> Self {
		Self { endpoint, http_status: None, detail: None, body_preview: None, network_error: false }
	}

	/// Convenience constructor for transport-level failures.
	pub fn network_failure(endpoint: EndpointKind) -> Self {
		let mut ctx = Self::new(endpoint);

		ctx.network_error = true;

		ctx
	}

	/// Builds a context from a transport outcome.
	pub fn from_outcome(
		endpoint: EndpointKind,
		outcome: &Result<ApiResponse, TransportError>,
	) -> Self {
		match outcome {
			Ok(response) => Self::from_response(endpoint, response),
			Err(_) => Self::network_failure(endpoint),
		}
	}

	/// Builds a context from a received response.
	pub fn from_response(endpoint: EndpointKind, response: &ApiResponse) -> Self {
		let mut ctx = Self::new(endpoint).with_http_status(response.status);

		if !response.is_success() {
			if let Some(detail) = response.detail() {
				ctx = ctx.with_detail(detail);
			}
			if !response.body.is_empty() {
				ctx = ctx.with_body_preview(response.text());
			}
		}

		ctx
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the server-supplied detail string.
	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());

		self
	}

	/// Adds a body preview, truncated to a bounded length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Strategy hook that maps a [`RejectionContext`] to a [`Classification`].
///
/// Override only what you need: [`classify`](Self::classify) applies the standard status
/// rules and defers to [`is_stale_anti_forgery`](Self::is_stale_anti_forgery) for 403s.
pub trait ClassifyStrategy: Send + Sync {
	/// Classifies a transport outcome.
	fn classify(&self, ctx: &RejectionContext) -> Classification {
		if ctx.network_error {
			return Classification::Passthrough;
		}

		match (ctx.http_status, ctx.endpoint) {
			(Some(401), EndpointKind::Refresh) => Classification::Terminal,
			(Some(401), EndpointKind::Resource) => Classification::Retry,
			(Some(403), _) if self.is_stale_anti_forgery(ctx) =>
				Classification::Forbidden(ForbiddenKind::StaleAntiForgery),
			(Some(403), _) => Classification::Forbidden(ForbiddenKind::Denied),
			_ => Classification::Passthrough,
		}
	}

	/// Decides whether a 403 blames the anti-forgery token.
	///
	/// The default looks for `csrf`, `xsrf`, or `anti-forgery` markers in the detail and body.
	fn is_stale_anti_forgery(&self, ctx: &RejectionContext) -> bool {
		[ctx.detail.as_deref(), ctx.body_preview.as_deref()]
			.into_iter()
			.flatten()
			.any(mentions_anti_forgery)
	}
}

/// Default strategy applying the standard status rules.
#[derive(Debug, Default)]
pub struct DefaultClassifier;
impl Display for DefaultClassifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-classifier")
	}
}
impl ClassifyStrategy for DefaultClassifier {}

/// Classifies `outcome` from `endpoint` with `strategy`.
pub fn classify(
	strategy: &dyn ClassifyStrategy,
	endpoint: EndpointKind,
	outcome: &Result<ApiResponse, TransportError>,
) -> Classification {
	strategy.classify(&RejectionContext::from_outcome(endpoint, outcome))
}

fn mentions_anti_forgery(text: &str) -> bool {
	let lowered = text.to_ascii_lowercase();

	["csrf", "xsrf", "anti-forgery", "antiforgery"].iter().any(|marker| lowered.contains(marker))
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= RejectionContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(RejectionContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn classify_status(endpoint: EndpointKind, status: u16, body: &str) -> Classification {
		classify(&DefaultClassifier, endpoint, &Ok(ApiResponse::new(status, body)))
	}

	#[test]
	fn unauthorized_depends_on_endpoint() {
		assert_eq!(classify_status(EndpointKind::Resource, 401, ""), Classification::Retry);
		assert_eq!(classify_status(EndpointKind::Refresh, 401, ""), Classification::Terminal);
	}

	#[test]
	fn forbidden_distinguishes_anti_forgery() {
		assert_eq!(
			classify_status(EndpointKind::Resource, 403, r#"{"detail":"CSRF token has expired"}"#),
			Classification::Forbidden(ForbiddenKind::StaleAntiForgery),
		);
		assert_eq!(
			classify_status(EndpointKind::Refresh, 403, "invalid XSRF header"),
			Classification::Forbidden(ForbiddenKind::StaleAntiForgery),
		);
		assert_eq!(
			classify_status(EndpointKind::Resource, 403, r#"{"detail":"Admins only"}"#),
			Classification::Forbidden(ForbiddenKind::Denied),
		);
	}

	#[test]
	fn network_failures_and_other_statuses_pass_through() {
		let outcome = Err(TransportError::Io(std::io::Error::other("reset")));

		assert_eq!(
			classify(&DefaultClassifier, EndpointKind::Resource, &outcome),
			Classification::Passthrough,
		);
		assert_eq!(
			classify(&DefaultClassifier, EndpointKind::Refresh, &outcome),
			Classification::Passthrough,
		);
		assert_eq!(classify_status(EndpointKind::Resource, 500, ""), Classification::Passthrough);
		assert_eq!(classify_status(EndpointKind::Resource, 200, "{}"), Classification::Passthrough);
	}

	#[test]
	fn custom_strategy_can_override_anti_forgery_detection() {
		struct HeaderlessStrategy;
		impl ClassifyStrategy for HeaderlessStrategy {
			fn is_stale_anti_forgery(&self, ctx: &RejectionContext) -> bool {
				ctx.detail.as_deref() == Some("token mismatch")
			}
		}

		let outcome = Ok(ApiResponse::new(403, r#"{"message":"token mismatch"}"#));

		assert_eq!(
			classify(&HeaderlessStrategy, EndpointKind::Resource, &outcome),
			Classification::Forbidden(ForbiddenKind::StaleAntiForgery),
		);
	}

	#[test]
	fn previews_are_truncated() {
		let ctx = RejectionContext::new(EndpointKind::Resource).with_body_preview("x".repeat(300));

		assert_eq!(ctx.body_preview.map(|p| p.chars().count()), Some(257));
	}
}
