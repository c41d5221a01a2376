// self
use crate::obs::RequestOutcome;

/// Counts a caller request by how it settled.
pub fn record_request(outcome: RequestOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_broker_requests_total", "outcome" => outcome.as_str())
			.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Counts a request replayed after a credential refresh.
pub fn record_replay() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_broker_replays_total").increment(1);
	}
}

/// Counts a finished refresh episode by its outcome label (`refreshed`, `ended`, ...).
pub fn record_episode(outcome: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_broker_refresh_episodes_total", "outcome" => outcome)
			.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Counts an anti-forgery token fetch.
pub fn record_anti_forgery_fetch(succeeded: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_broker_anti_forgery_fetches_total",
			"outcome" => if succeeded { "success" } else { "failure" }
		)
		.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = succeeded;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn counters_are_noops_without_recorder() {
		record_request(RequestOutcome::StaleAntiForgery);
		record_replay();
		record_episode("ended");
		record_anti_forgery_fetch(false);
	}
}
