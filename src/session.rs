//! Session lifecycle signals: established, refreshed, ended.

// self
use crate::{_prelude::*, auth::IdentityClaims};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndReason {
	/// The refresh endpoint rejected the refresh session.
	Rejected,
	/// The caller logged out.
	LoggedOut,
}
impl EndReason {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			EndReason::Rejected => "rejected",
			EndReason::LoggedOut => "logged_out",
		}
	}
}
impl Display for EndReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Lifecycle event delivered to every registered [`SessionSink`].
///
/// Events carry identity claims only; bearer secrets never leave the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// A sign-in result was installed.
	Established {
		/// Claims of the installed credential.
		claims: IdentityClaims,
	},
	/// A refresh episode replaced the credential.
	Refreshed {
		/// Claims of the refreshed credential.
		claims: IdentityClaims,
	},
	/// The credential was cleared.
	Ended {
		/// Cause of the termination.
		reason: EndReason,
	},
}

/// Observer of session lifecycle events.
///
/// Sinks run synchronously on the task that produced the event and must not block.
pub trait SessionSink
where
	Self: Send + Sync,
{
	/// Handles one event.
	fn on_event(&self, event: &SessionEvent);
}
impl<F> SessionSink for F
where
	F: Send + Sync + Fn(&SessionEvent),
{
	fn on_event(&self, event: &SessionEvent) {
		self(event)
	}
}

/// Registry of sinks shared by the client and its coordinator.
#[derive(Default)]
pub struct SessionEvents {
	sinks: RwLock<Vec<Arc<dyn SessionSink>>>,
}
impl SessionEvents {
	/// Registers a sink for every event.
	pub fn subscribe(&self, sink: Arc<dyn SessionSink>) {
		self.sinks.write().push(sink);
	}

	/// Registers a callback invoked once per ended session.
	pub fn on_session_ended<F>(&self, callback: F)
	where
		F: 'static + Send + Sync + Fn(EndReason),
	{
		self.subscribe(Arc::new(move |event: &SessionEvent| {
			if let SessionEvent::Ended { reason } = event {
				callback(*reason);
			}
		}));
	}

	/// Registers a callback invoked whenever a sign-in result is installed.
	pub fn on_session_established<F>(&self, callback: F)
	where
		F: 'static + Send + Sync + Fn(&IdentityClaims),
	{
		self.subscribe(Arc::new(move |event: &SessionEvent| {
			if let SessionEvent::Established { claims } = event {
				callback(claims);
			}
		}));
	}

	/// Delivers `event` to every sink in registration order.
	///
	/// The sink list is copied first so a sink may register further sinks.
	pub fn notify(&self, event: &SessionEvent) {
		let sinks = self.sinks.read().clone();

		for sink in sinks {
			sink.on_event(event);
		}
	}

	/// Number of registered sinks.
	pub fn len(&self) -> usize {
		self.sinks.read().len()
	}

	/// Returns `true` when no sink is registered.
	pub fn is_empty(&self) -> bool {
		self.sinks.read().is_empty()
	}
}
impl Debug for SessionEvents {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionEvents").field("sinks", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn filtered_callbacks_only_see_their_event() {
		let events = SessionEvents::default();
		let ended = Arc::new(Mutex::new(Vec::new()));
		let established = Arc::new(AtomicU64::new(0));

		{
			let ended = ended.clone();

			events.on_session_ended(move |reason| ended.lock().push(reason));
		}
		{
			let established = established.clone();

			events.on_session_established(move |_| {
				established.fetch_add(1, Ordering::SeqCst);
			});
		}

		events.notify(&SessionEvent::Established { claims: IdentityClaims::default() });
		events.notify(&SessionEvent::Refreshed { claims: IdentityClaims::default() });
		events.notify(&SessionEvent::Ended { reason: EndReason::LoggedOut });

		assert_eq!(*ended.lock(), vec![EndReason::LoggedOut]);
		assert_eq!(established.load(Ordering::SeqCst), 1);
		assert_eq!(events.len(), 2);
	}

	#[test]
	fn sinks_may_subscribe_during_notification() {
		let events = Arc::new(SessionEvents::default());
		let inner = events.clone();

		events.subscribe(Arc::new(move |_: &SessionEvent| {
			inner.subscribe(Arc::new(|_: &SessionEvent| {}));
		}));
		events.notify(&SessionEvent::Ended { reason: EndReason::Rejected });

		assert_eq!(events.len(), 2);
	}
}
