//! Single-flight credential refresh with waiter fan-out.
//!
//! The coordinator is an explicit state machine: `Idle -> Refreshing -> Idle`. The first
//! request that needs a refresh while `Idle` starts an episode on a spawned task; every later
//! request joins it and observes the same outcome. The check-state, start-episode, and
//! register-waiter steps all run under one lock, so two episodes can never overlap.
//!
//! Every credential install or clear bumps a generation counter. A request records the
//! generation it used; when it fails after the credential already moved on, it replays with
//! the newer credential instead of starting another episode.
//!
//! The refresh session travels in a cookie, so a 401 on a client that holds no credential
//! still attempts a refresh: a restarted process can recover its session that way. Once a
//! rejection or logout has ended the session, later 401s fail with [`Error::SessionEnded`]
//! without another episode, so the session sinks hear about the end exactly once.
//!
//! The [`CredentialStore`] is called while the state lock is held, on executor threads. Stores
//! must answer `load` from memory and keep `replace`/`clear` short; see the trait docs.

mod episode;
mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	anti_forgery::AntiForgeryCache,
	auth::{Credential, SessionGrant},
	classify::{Classification, ClassifyStrategy, EndpointKind, RejectionContext},
	config::ClientConfig,
	error::{TransientError, TransportError},
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, SessionSpan},
	session::{EndReason, SessionEvent, SessionEvents},
	store::CredentialStore,
};
use episode::{CoordinatorState, Episode, EpisodeGuard, Phase, RefreshOutcome};

const ENDPOINT: &str = "refresh";

/// Credential a request is about to use, tagged with the generation it was read at.
#[derive(Clone, Debug)]
pub struct CredentialSnapshot {
	/// Store generation at read time.
	pub generation: u64,
	/// Current credential, if a session is established.
	pub credential: Option<Credential>,
}

/// Owns the refresh state machine for one session.
///
/// Dropping the coordinator cancels any in-flight episode, exactly like
/// [`shutdown`](Self::shutdown).
pub struct RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	shared: Arc<Shared<T>>,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Wires a coordinator onto the shared transport, store, anti-forgery cache, classifier,
	/// and event registry.
	pub fn new(
		config: &ClientConfig,
		transport: Arc<T>,
		store: Arc<dyn CredentialStore>,
		anti_forgery: Arc<AntiForgeryCache<T>>,
		classifier: Arc<dyn ClassifyStrategy>,
		events: Arc<SessionEvents>,
	) -> Self {
		Self {
			shared: Arc::new(Shared {
				transport,
				store,
				anti_forgery,
				classifier,
				events,
				endpoint: config.refresh_endpoint.clone(),
				anti_forgery_header: config.anti_forgery_header.clone(),
				timeout: config.refresh_timeout,
				deadline: config.refresh_deadline(),
				state: Arc::new(Mutex::new(CoordinatorState::new())),
				shutdown: CancellationToken::new(),
				metrics: Default::default(),
				next_episode: AtomicU64::new(0),
			}),
		}
	}

	/// Reads the generation and the credential as one step.
	pub fn snapshot(&self) -> Result<CredentialSnapshot> {
		let state = self.shared.state.lock();

		Ok(CredentialSnapshot { generation: state.generation, credential: self.shared.store.load()? })
	}

	/// Current store generation.
	pub fn generation(&self) -> u64 {
		self.shared.state.lock().generation
	}

	/// Returns `true` while an episode is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(self.shared.state.lock().phase, Phase::Refreshing(_))
	}

	/// Waits until the credential used at `observed_generation` has been superseded.
	///
	/// Returns immediately when the generation already moved on, or when the session was
	/// ended by a rejection or logout. Otherwise joins the in-flight episode or starts one,
	/// even when no credential is stored. `Ok(())` means a newer credential is installed and
	/// the caller should replay once.
	pub async fn await_refresh(&self, observed_generation: u64) -> Result<()> {
		let receiver = {
			let mut state = self.shared.state.lock();

			if self.shared.shutdown.is_cancelled() {
				return Err(Error::Cancelled);
			}
			let current = self.shared.store.load()?;

			if state.generation != observed_generation {
				return match current {
					Some(_) => Ok(()),
					None => Err(Error::SessionEnded),
				};
			}
			if current.is_none() && state.session_ended {
				return Err(Error::SessionEnded);
			}

			let joined = match &state.phase {
				Phase::Refreshing(episode) => Some(episode.subscribe()),
				Phase::Idle => None,
			};

			match joined {
				Some(receiver) => {
					self.shared.metrics.record_join();

					receiver
				},
				None => self.start_locked(&mut state),
			}
		};

		episode::wait_for_outcome(receiver).await.into_result()
	}

	/// Installs a sign-in result and emits [`SessionEvent::Established`].
	pub fn establish(&self, credential: Credential) -> Result<()> {
		let claims = credential.claims.clone();

		{
			let mut state = self.shared.state.lock();

			self.shared.store.replace(credential)?;
			state.installed();
		}

		self.shared.events.notify(&SessionEvent::Established { claims });

		Ok(())
	}

	/// Clears the credential, drops the anti-forgery token, and emits [`SessionEvent::Ended`].
	pub fn end_session(&self, reason: EndReason) -> Result<()> {
		{
			let mut state = self.shared.state.lock();

			self.shared.store.clear()?;
			state.ended();
		}

		self.shared.anti_forgery.invalidate();
		self.shared.events.notify(&SessionEvent::Ended { reason });

		Ok(())
	}

	/// Cancels any in-flight episode and refuses new ones. Waiters receive
	/// [`Error::Cancelled`] and the cancelled episode never touches the store.
	pub fn shutdown(&self) {
		self.shared.shutdown.cancel();
	}

	/// Returns `true` once [`shutdown`](Self::shutdown) ran.
	pub fn is_shut_down(&self) -> bool {
		self.shared.shutdown.is_cancelled()
	}

	/// Episode counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.shared.metrics
	}

	fn start_locked(&self, state: &mut CoordinatorState) -> episode::OutcomeReceiver {
		let id = self.shared.next_episode.fetch_add(1, Ordering::Relaxed) + 1;
		let (episode, sender) = Episode::open(id);
		let receiver = episode.subscribe();
		let guard = EpisodeGuard::new(self.shared.state.clone(), id, state.generation, sender);
		let cancel = self.shared.shutdown.child_token();

		state.phase = Phase::Refreshing(episode);

		self.shared.metrics.record_episode();
		obs::record_transition(id, "started", None);
		tokio::spawn(self.shared.clone().run_episode(guard, cancel));

		receiver
	}
}
impl<T> Drop for RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	fn drop(&mut self) {
		self.shared.shutdown.cancel();
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.shared.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("endpoint", &self.shared.endpoint.as_str())
			.field("generation", &state.generation)
			.field("refreshing", &matches!(state.phase, Phase::Refreshing(_)))
			.field("shut_down", &self.shared.shutdown.is_cancelled())
			.finish()
	}
}

enum Resolution {
	Installed(Credential),
	Rejected,
	Transient(String),
	Cancelled,
}

struct Shared<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	anti_forgery: Arc<AntiForgeryCache<T>>,
	classifier: Arc<dyn ClassifyStrategy>,
	events: Arc<SessionEvents>,
	endpoint: Url,
	anti_forgery_header: HeaderName,
	timeout: Duration,
	deadline: std::time::Duration,
	state: Arc<Mutex<CoordinatorState>>,
	shutdown: CancellationToken,
	metrics: RefreshMetrics,
	next_episode: AtomicU64,
}
impl<T> Shared<T>
where
	T: ?Sized + ApiTransport,
{
	async fn run_episode(self: Arc<Self>, guard: EpisodeGuard, cancel: CancellationToken) {
		let resolution = SessionSpan::refresh(guard.id(), guard.generation())
			.instrument(async {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => Resolution::Cancelled,
					exchanged = self.exchange() => match exchanged {
						Ok(Some(credential)) => Resolution::Installed(credential),
						Ok(None) => Resolution::Rejected,
						Err(e) => Resolution::Transient(e.to_string()),
					},
				}
			})
			.await;

		self.finalize(guard, &cancel, resolution);
	}

	/// Runs the refresh procedure. `Ok(None)` means the refresh session was rejected.
	async fn exchange(&self) -> Result<Option<Credential>> {
		let mut anti_forgery_retried = false;

		loop {
			let token = self.anti_forgery.get().await?;
			let mut request = ApiRequest::get(self.endpoint.clone());

			request.insert_header(self.anti_forgery_header.clone(), token.value().clone());

			let outcome =
				match tokio::time::timeout(self.deadline, self.transport.execute(request)).await {
					Ok(outcome) => outcome,
					Err(_) => Err(TransportError::Timeout { after: self.timeout }),
				};
			let ctx = RejectionContext::from_outcome(EndpointKind::Refresh, &outcome);
			let verdict = self.classifier.classify(&ctx);

			obs::record_verdict(ctx.endpoint, ctx.http_status, verdict);

			match verdict {
				Classification::Terminal => return Ok(None),
				Classification::Forbidden(_) if !anti_forgery_retried => {
					anti_forgery_retried = true;

					self.anti_forgery.invalidate_if(token.value());
				},
				Classification::Forbidden(_) =>
					return Err(TransientError::Upstream {
						endpoint: ENDPOINT,
						message: "anti-forgery token was rejected after a refetch".into(),
						status: Some(403),
					}
					.into()),
				Classification::Retry | Classification::Passthrough =>
					return decode_grant(outcome?).map(Some),
			}
		}
	}

	fn finalize(&self, guard: EpisodeGuard, cancel: &CancellationToken, resolution: Resolution) {
		let id = guard.id();
		let (outcome, event) = {
			let mut state = self.state.lock();
			let settled = if cancel.is_cancelled() {
				(RefreshOutcome::Cancelled, None)
			} else if state.generation != guard.generation() {
				// Established or logged out while the episode ran; the newer state wins.
				(self.superseded_outcome(), None)
			} else {
				self.apply_locked(&mut state, id, resolution)
			};

			state.release(id);

			settled
		};

		match &outcome {
			RefreshOutcome::Refreshed => self.metrics.record_success(),
			RefreshOutcome::Ended => self.metrics.record_session_ended(),
			RefreshOutcome::Failed { .. } | RefreshOutcome::Cancelled =>
				self.metrics.record_failure(),
		}

		obs::record_episode(outcome.label());

		let detail = match &outcome {
			RefreshOutcome::Failed { message } => Some(message.as_str()),
			_ => None,
		};

		obs::record_transition(id, outcome.label(), detail);
		guard.publish(outcome);

		if let Some(event) = event {
			self.events.notify(&event);
		}
	}

	fn apply_locked(
		&self,
		state: &mut CoordinatorState,
		id: u64,
		resolution: Resolution,
	) -> (RefreshOutcome, Option<SessionEvent>) {
		match resolution {
			Resolution::Installed(mut credential) => {
				let previous = match self.store.load() {
					Ok(previous) => previous,
					Err(e) => {
						let message = e.to_string();

						obs::record_transition(id, "load_failed", Some(&message));

						return (RefreshOutcome::Failed { message }, None);
					},
				};
				// No previous credential: the refresh cookie recovered the session.
				let recovered = previous.is_none();

				if credential.refresh_token.is_none() {
					credential.refresh_token = previous.and_then(|current| current.refresh_token);
				}

				let claims = credential.claims.clone();

				match self.store.replace(credential) {
					Ok(()) => {
						state.installed();

						let event = if recovered {
							SessionEvent::Established { claims }
						} else {
							SessionEvent::Refreshed { claims }
						};

						(RefreshOutcome::Refreshed, Some(event))
					},
					Err(e) => (RefreshOutcome::Failed { message: e.to_string() }, None),
				}
			},
			Resolution::Rejected => {
				if let Err(e) = self.store.clear() {
					obs::record_transition(id, "clear_failed", Some(&e.to_string()));
				}

				state.ended();
				self.anti_forgery.invalidate();

				(RefreshOutcome::Ended, Some(SessionEvent::Ended { reason: EndReason::Rejected }))
			},
			Resolution::Transient(message) => (RefreshOutcome::Failed { message }, None),
			Resolution::Cancelled => (RefreshOutcome::Cancelled, None),
		}
	}

	fn superseded_outcome(&self) -> RefreshOutcome {
		match self.store.load() {
			Ok(Some(_)) => RefreshOutcome::Refreshed,
			Ok(None) => RefreshOutcome::Ended,
			Err(e) => RefreshOutcome::Failed { message: e.to_string() },
		}
	}
}

fn decode_grant(response: ApiResponse) -> Result<Credential> {
	if !response.is_success() {
		return Err(TransientError::Upstream {
			endpoint: ENDPOINT,
			message: response
				.detail()
				.unwrap_or_else(|| format!("unexpected status {}", response.status)),
			status: Some(response.status),
		}
		.into());
	}

	let grant: SessionGrant = response.json_for(ENDPOINT)?;

	Credential::from_grant(grant, OffsetDateTime::now_utc()).map_err(|e| {
		TransientError::Upstream {
			endpoint: ENDPOINT,
			message: e.to_string(),
			status: Some(response.status),
		}
		.into()
	})
}
