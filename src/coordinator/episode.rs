//! Episode bookkeeping: coordinator phase, broadcast outcome, and the completion guard.

// crates.io
use tokio::sync::watch;
// self
use crate::{_prelude::*, error::TransientError};

/// Outcome broadcast to every waiter of one episode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
	/// A newer credential is installed; replay.
	Refreshed,
	/// The session is gone.
	Ended,
	/// Transient failure; the session is untouched.
	Failed { message: String },
	/// The coordinator shut down before the episode resolved.
	Cancelled,
}
impl RefreshOutcome {
	pub(crate) fn label(&self) -> &'static str {
		match self {
			Self::Refreshed => "refreshed",
			Self::Ended => "ended",
			Self::Failed { .. } => "failed",
			Self::Cancelled => "cancelled",
		}
	}

	pub(crate) fn into_result(self) -> Result<()> {
		match self {
			Self::Refreshed => Ok(()),
			Self::Ended => Err(Error::SessionEnded),
			Self::Failed { message } => Err(TransientError::Refresh { message }.into()),
			Self::Cancelled => Err(Error::Cancelled),
		}
	}
}

pub(crate) type OutcomeSender = watch::Sender<Option<RefreshOutcome>>;
pub(crate) type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

/// The in-flight refresh; at most one exists per coordinator.
#[derive(Debug)]
pub(crate) struct Episode {
	pub(crate) id: u64,
	outcome: OutcomeReceiver,
}
impl Episode {
	pub(crate) fn open(id: u64) -> (Arc<Self>, OutcomeSender) {
		let (sender, outcome) = watch::channel(None);

		(Arc::new(Self { id, outcome }), sender)
	}

	pub(crate) fn subscribe(&self) -> OutcomeReceiver {
		self.outcome.clone()
	}
}

#[derive(Debug)]
pub(crate) enum Phase {
	Idle,
	Refreshing(Arc<Episode>),
}

/// Mutable coordinator state; every transition happens under one lock.
#[derive(Debug)]
pub(crate) struct CoordinatorState {
	pub(crate) phase: Phase,
	/// Bumped on every credential install or clear.
	pub(crate) generation: u64,
	/// Set once a rejection or logout ended the session; cleared by the next install.
	pub(crate) session_ended: bool,
}
impl CoordinatorState {
	pub(crate) fn new() -> Self {
		Self { phase: Phase::Idle, generation: 0, session_ended: false }
	}

	/// Records a credential install.
	pub(crate) fn installed(&mut self) {
		self.generation += 1;
		self.session_ended = false;
	}

	/// Records a credential clear that ends the session.
	pub(crate) fn ended(&mut self) {
		self.generation += 1;
		self.session_ended = true;
	}

	/// Returns to `Idle` if `id` is still the current episode.
	pub(crate) fn release(&mut self, id: u64) {
		if matches!(&self.phase, Phase::Refreshing(episode) if episode.id == id) {
			self.phase = Phase::Idle;
		}
	}
}

/// Owned by the episode task. Publishing consumes it; dropping it unpublished (panic, abort,
/// runtime teardown) releases the phase and hands waiters [`RefreshOutcome::Cancelled`].
pub(crate) struct EpisodeGuard {
	state: Arc<Mutex<CoordinatorState>>,
	id: u64,
	generation: u64,
	sender: Option<OutcomeSender>,
}
impl EpisodeGuard {
	pub(crate) fn new(
		state: Arc<Mutex<CoordinatorState>>,
		id: u64,
		generation: u64,
		sender: OutcomeSender,
	) -> Self {
		Self { state, id, generation, sender: Some(sender) }
	}

	pub(crate) fn id(&self) -> u64 {
		self.id
	}

	/// Generation observed when the episode started.
	pub(crate) fn generation(&self) -> u64 {
		self.generation
	}

	/// Wakes every waiter. The caller must already have released the phase.
	pub(crate) fn publish(mut self, outcome: RefreshOutcome) {
		if let Some(sender) = self.sender.take() {
			sender.send_replace(Some(outcome));
		}
	}
}
impl Drop for EpisodeGuard {
	fn drop(&mut self) {
		if let Some(sender) = self.sender.take() {
			self.state.lock().release(self.id);
			sender.send_replace(Some(RefreshOutcome::Cancelled));
		}
	}
}

/// Suspends until the episode publishes; a vanished sender reads as cancellation.
pub(crate) async fn wait_for_outcome(mut receiver: OutcomeReceiver) -> RefreshOutcome {
	let outcome = match receiver.wait_for(Option::is_some).await {
		Ok(outcome) => Option::clone(&outcome),
		Err(_) => None,
	};

	outcome.unwrap_or(RefreshOutcome::Cancelled)
}
