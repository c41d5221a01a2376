//! Caller-facing session client.
//!
//! [`SessionClient::send`] decorates a request, dispatches it, and classifies the outcome.
//! A `Retry` verdict hands the request to the [`RefreshCoordinator`]; once the episode
//! succeeds the request is replayed exactly once with the new credential. A stale
//! anti-forgery rejection is retried once with a fresh token. Everything else surfaces to the
//! caller as a typed [`Error`].

// self
use crate::{
	_prelude::*,
	anti_forgery::AntiForgeryCache,
	auth::{Credential, IdentityClaims},
	classify::{
		Classification, ClassifyStrategy, DefaultClassifier, EndpointKind, ForbiddenKind,
		RejectionContext,
	},
	config::ClientConfig,
	coordinator::{RefreshCoordinator, RefreshMetrics},
	error::TransportError,
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, RequestOutcome, SessionSpan},
	pipeline::RequestPipeline,
	session::{EndReason, SessionEvents, SessionSink},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Session client specialized for the crate's bundled reqwest transport.
pub type ReqwestSessionClient = SessionClient<ReqwestTransport>;

/// Authenticated API client for one session.
///
/// Clones share the transport, store, anti-forgery cache, and refresh coordinator, so every
/// handle participates in the same single-flight refresh. Dropping the last handle cancels an
/// in-flight refresh episode.
pub struct SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	config: Arc<ClientConfig>,
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	anti_forgery: Arc<AntiForgeryCache<T>>,
	pipeline: Arc<RequestPipeline<T>>,
	classifier: Arc<dyn ClassifyStrategy>,
	coordinator: Arc<RefreshCoordinator<T>>,
	events: Arc<SessionEvents>,
}
impl<T> SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client over a caller-provided transport with the default classifier.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self::with_classifier(config, store, transport, Arc::new(DefaultClassifier))
	}

	/// Creates a client with a custom [`ClassifyStrategy`].
	pub fn with_classifier(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
		classifier: Arc<dyn ClassifyStrategy>,
	) -> Self {
		let transport = transport.into();
		let anti_forgery = Arc::new(AntiForgeryCache::new(
			transport.clone(),
			config.anti_forgery_endpoint.clone(),
			config.anti_forgery_ttl,
		));
		let pipeline =
			Arc::new(RequestPipeline::new(anti_forgery.clone(), config.anti_forgery_header.clone()));
		let events = Arc::new(SessionEvents::default());
		let coordinator = Arc::new(RefreshCoordinator::new(
			&config,
			transport.clone(),
			store.clone(),
			anti_forgery.clone(),
			classifier.clone(),
			events.clone(),
		));

		Self {
			config: Arc::new(config),
			transport,
			store,
			anti_forgery,
			pipeline,
			classifier,
			coordinator,
			events,
		}
	}

	/// Validated configuration backing this client.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Builds a request for `path` resolved against the base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		Ok(ApiRequest::new(method, self.config.resolve(path)?))
	}

	/// Sends `request`, refreshing the credential and replaying once when it has expired.
	///
	/// Raw 401 responses never reach the caller. Non-success statuses the client does not
	/// interpret come back as [`Error::Status`]; transport failures as
	/// [`Error::Unavailable`] with the session preserved.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		let span = SessionSpan::send(&request.method, &request.url);
		let result = span.instrument(self.dispatch(request)).await;
		let outcome = RequestOutcome::of(&result);

		span.record_outcome(outcome);
		obs::record_request(outcome);

		result
	}

	/// Installs a sign-in result obtained from the identity provider.
	pub fn establish_session(&self, credential: Credential) -> Result<()> {
		self.coordinator.establish(credential)
	}

	/// Clears the session locally and drops the cached anti-forgery token.
	pub fn logout(&self) -> Result<()> {
		self.coordinator.end_session(EndReason::LoggedOut)
	}

	/// Returns the current credential, if a session is established.
	pub fn credential(&self) -> Result<Option<Credential>> {
		Ok(self.store.load()?)
	}

	/// Registers a callback invoked once each time the session ends.
	pub fn on_session_ended<F>(&self, callback: F)
	where
		F: 'static + Send + Sync + Fn(EndReason),
	{
		self.events.on_session_ended(callback);
	}

	/// Registers a callback invoked whenever a sign-in result is installed.
	pub fn on_session_established<F>(&self, callback: F)
	where
		F: 'static + Send + Sync + Fn(&IdentityClaims),
	{
		self.events.on_session_established(callback);
	}

	/// Registers a sink for every session event.
	pub fn subscribe(&self, sink: Arc<dyn SessionSink>) {
		self.events.subscribe(sink);
	}

	/// Cancels any in-flight refresh; requests waiting on it fail with [`Error::Cancelled`].
	pub fn shutdown(&self) {
		self.coordinator.shutdown();
	}

	/// Refresh episode counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let caller_anti_forgery = self.pipeline.carries_anti_forgery(&request);
		let mut anti_forgery_retried = false;

		loop {
			let snapshot = self.coordinator.snapshot()?;
			let decorated =
				self.pipeline.decorate(request.clone(), snapshot.credential.as_ref()).await?;
			let sent_token = self.pipeline.anti_forgery_token(&decorated).cloned();
			let outcome = self.transport.execute(decorated).await;
			let ctx = RejectionContext::from_outcome(EndpointKind::Resource, &outcome);
			let verdict = self.classifier.classify(&ctx);

			obs::record_verdict(ctx.endpoint, ctx.http_status, verdict);

			match verdict {
				Classification::Passthrough => return passthrough(outcome),
				Classification::Forbidden(ForbiddenKind::StaleAntiForgery) => {
					if caller_anti_forgery || anti_forgery_retried {
						return Err(Error::StaleAntiForgery);
					}

					anti_forgery_retried = true;

					if let Some(token) = &sent_token {
						self.anti_forgery.invalidate_if(token);
					}
				},
				Classification::Forbidden(ForbiddenKind::Denied) =>
					return Err(Error::Forbidden {
						reason: ctx.detail.unwrap_or_else(|| "access denied".into()),
					}),
				Classification::Terminal => {
					self.coordinator.end_session(EndReason::Rejected)?;

					return Err(Error::SessionEnded);
				},
				Classification::Retry => {
					if request.is_replay() {
						return Err(Error::Unauthorized);
					}

					self.coordinator.await_refresh(snapshot.generation).await?;
					request.mark_replayed();
					obs::record_replay();
				},
			}
		}
	}
}
#[cfg(feature = "reqwest")]
impl SessionClient<ReqwestTransport> {
	/// Creates a client backed by a reqwest transport with an in-memory cookie jar.
	pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
		Ok(Self::with_transport(config, store, ReqwestTransport::new()?))
	}
}
impl<T> Clone for SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			transport: self.transport.clone(),
			store: self.store.clone(),
			anti_forgery: self.anti_forgery.clone(),
			pipeline: self.pipeline.clone(),
			classifier: self.classifier.clone(),
			coordinator: self.coordinator.clone(),
			events: self.events.clone(),
		}
	}
}
impl<T> Debug for SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.field("events", &self.events)
			.finish()
	}
}

fn passthrough(outcome: Result<ApiResponse, TransportError>) -> Result<ApiResponse> {
	let response = outcome?;

	if response.is_success() {
		return Ok(response);
	}

	Err(Error::Status {
		status: response.status,
		detail: response.detail(),
		retry_after: response.retry_after(),
	})
}
