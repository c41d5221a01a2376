// self
use crate::{
	_prelude::*,
	classify::{Classification, EndpointKind},
	obs::RequestOutcome,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type Instrumented<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type Instrumented<F> = F;

/// Span around one unit of session traffic.
#[derive(Clone, Debug)]
pub struct SessionSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl SessionSpan {
	/// Span for a caller request; the outcome is filled in by [`record_outcome`](Self::record_outcome).
	pub fn send(method: &Method, url: &Url) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"session_broker.send",
				method = %method,
				path = url.path(),
				outcome = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, url);

			Self {}
		}
	}

	/// Span for one refresh episode started at `generation`.
	pub fn refresh(episode: u64, generation: u64) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.refresh", episode, generation);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (episode, generation);

			Self {}
		}
	}

	/// Span for an anti-forgery token fetch.
	pub fn anti_forgery(endpoint: &Url) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.anti_forgery", path = endpoint.path());

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = endpoint;

			Self {}
		}
	}

	/// Records how the request settled.
	pub fn record_outcome(&self, outcome: RequestOutcome) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("outcome", outcome.as_str());
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = outcome;
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event for a classifier verdict.
pub fn record_verdict(endpoint: EndpointKind, status: Option<u16>, verdict: Classification) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			endpoint = endpoint.as_str(),
			status,
			verdict = verdict.as_str(),
			"session_broker.verdict"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (endpoint, status, verdict);
	}
}

/// Emits a debug event describing a refresh-episode transition.
pub fn record_transition(episode: u64, transition: &'static str, detail: Option<&str>) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(episode, transition, detail, "session_broker.transition");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (episode, transition, detail);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn send_span_wraps_future_and_takes_outcome() {
		let url = Url::parse("https://api.example.com/items").expect("Fixture URL should parse.");
		let span = SessionSpan::send(&Method::GET, &url);
		let value = span.instrument(async { 42 }).await;

		span.record_outcome(RequestOutcome::Delivered);

		assert_eq!(value, 42);
	}

	#[test]
	fn events_are_noops_without_subscriber() {
		record_verdict(EndpointKind::Refresh, Some(401), Classification::Terminal);
		record_transition(1, "started", None);
	}
}
