// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh episodes.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	episodes: AtomicU64,
	joins: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	sessions_ended: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh episodes started.
	pub fn episodes(&self) -> u64 {
		self.episodes.load(Ordering::Relaxed)
	}

	/// Returns the number of waiters that joined an episode someone else started.
	pub fn joins(&self) -> u64 {
		self.joins.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that installed a new credential.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that failed transiently or were cancelled.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that ended the session.
	pub fn sessions_ended(&self) -> u64 {
		self.sessions_ended.load(Ordering::Relaxed)
	}

	pub(crate) fn record_episode(&self) {
		self.episodes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_session_ended(&self) {
		self.sessions_ended.fetch_add(1, Ordering::Relaxed);
	}
}
