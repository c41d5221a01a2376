//! Anti-forgery (CSRF) token cache with a fixed TTL and single-flight fetches.
//!
//! [`AntiForgeryCache::get`] serves a cached token while `now <= expires_at`. Past that point
//! (or after [`AntiForgeryCache::invalidate`]) the first caller fetches a fresh token while
//! every concurrent caller waits on the same fetch and shares its outcome, success or failure.
//!
//! Requests that were rejected with a stale token call [`AntiForgeryCache::invalidate_if`]
//! with the value they carried, so a late rejection never discards a token that a sibling
//! request already refetched.

// self
use crate::{
	_prelude::*,
	error::TransientError,
	http::{ApiRequest, ApiTransport},
	obs::{self, SessionSpan},
};

const ENDPOINT: &str = "anti_forgery";

/// Cached anti-forgery token.
#[derive(Clone, PartialEq, Eq)]
pub struct AntiForgeryToken {
	value: HeaderValue,
	/// Instant the token was fetched.
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must not be used.
	pub expires_at: OffsetDateTime,
}
impl AntiForgeryToken {
	/// Creates a token valid for `ttl` from `issued_at`.
	pub fn new(mut value: HeaderValue, issued_at: OffsetDateTime, ttl: Duration) -> Self {
		value.set_sensitive(true);

		Self { value, issued_at, expires_at: issued_at + ttl }
	}

	/// Token value placed in the anti-forgery header.
	pub fn value(&self) -> &HeaderValue {
		&self.value
	}

	/// Returns `true` while the token may still be used at `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime) -> bool {
		instant <= self.expires_at
	}
}
impl Debug for AntiForgeryToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AntiForgeryToken")
			.field("value", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AntiForgeryPayload {
	#[serde(alias = "csrf_token", alias = "token")]
	csrf_token: String,
}

#[derive(Clone, Debug)]
struct FetchFailure {
	attempt: u64,
	message: String,
	status: Option<u16>,
}

/// Single-flight cache for the anti-forgery token.
pub struct AntiForgeryCache<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	endpoint: Url,
	ttl: Duration,
	slot: Mutex<Option<AntiForgeryToken>>,
	flight: AsyncMutex<()>,
	completed: AtomicU64,
	last_failure: Mutex<Option<FetchFailure>>,
}
impl<T> AntiForgeryCache<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates an empty cache that fetches from `endpoint` and keeps tokens for `ttl`.
	pub fn new(transport: Arc<T>, endpoint: Url, ttl: Duration) -> Self {
		Self {
			transport,
			endpoint,
			ttl,
			slot: Mutex::new(None),
			flight: AsyncMutex::new(()),
			completed: AtomicU64::new(0),
			last_failure: Mutex::new(None),
		}
	}

	/// Returns a fresh token, fetching one when the cache is empty or expired.
	pub async fn get(&self) -> Result<AntiForgeryToken> {
		if let Some(token) = self.fresh_at(OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		let ticket = self.completed.load(Ordering::Acquire);
		let _flight = self.flight.lock().await;

		if let Some(token) = self.fresh_at(OffsetDateTime::now_utc()) {
			return Ok(token);
		}
		if let Some(failure) = self.failure_since(ticket) {
			return Err(TransientError::Upstream {
				endpoint: ENDPOINT,
				message: failure.message,
				status: failure.status,
			}
			.into());
		}

		let result = SessionSpan::anti_forgery(&self.endpoint).instrument(self.fetch()).await;
		let attempt = self.completed.load(Ordering::Acquire) + 1;

		match &result {
			Ok(token) => {
				*self.slot.lock() = Some(token.clone());
				self.last_failure.lock().take();
			},
			Err(err) => {
				self.slot.lock().take();
				*self.last_failure.lock() =
					Some(FetchFailure { attempt, message: err.to_string(), status: err.status() });
			},
		}

		obs::record_anti_forgery_fetch(result.is_ok());

		self.completed.store(attempt, Ordering::Release);

		result
	}

	/// Drops the cached token; the next [`get`](Self::get) fetches a new one.
	pub fn invalidate(&self) {
		self.slot.lock().take();
	}

	/// Drops the cached token only while it still equals `rejected`.
	///
	/// Returns `true` when the token was dropped. A `false` return means the cache already
	/// moved past `rejected` and the next [`get`](Self::get) serves the newer token.
	pub fn invalidate_if(&self, rejected: &HeaderValue) -> bool {
		let mut slot = self.slot.lock();

		if slot.as_ref().is_some_and(|token| token.value() == rejected) {
			slot.take();

			return true;
		}

		false
	}

	/// Returns the cached token without checking freshness or fetching.
	pub fn peek(&self) -> Option<AntiForgeryToken> {
		self.slot.lock().clone()
	}

	fn fresh_at(&self, instant: OffsetDateTime) -> Option<AntiForgeryToken> {
		self.slot.lock().as_ref().filter(|token| token.is_fresh_at(instant)).cloned()
	}

	fn failure_since(&self, ticket: u64) -> Option<FetchFailure> {
		self.last_failure.lock().as_ref().filter(|failure| failure.attempt > ticket).cloned()
	}

	async fn fetch(&self) -> Result<AntiForgeryToken> {
		let response = self.transport.execute(ApiRequest::get(self.endpoint.clone())).await?;

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

		let payload: AntiForgeryPayload = response.json_for(ENDPOINT)?;
		let token = payload.csrf_token.trim();
		let invalid = |message: &str| TransientError::Upstream {
			endpoint: ENDPOINT,
			message: message.into(),
			status: Some(response.status),
		};

		if token.is_empty() {
			return Err(invalid("token is blank").into());
		}

		let value =
			HeaderValue::from_str(token).map_err(|_| invalid("token is not a valid header value"))?;

		Ok(AntiForgeryToken::new(value, OffsetDateTime::now_utc(), self.ttl))
	}
}
impl<T> Debug for AntiForgeryCache<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AntiForgeryCache")
			.field("endpoint", &self.endpoint.as_str())
			.field("ttl", &self.ttl)
			.field("cached", &self.slot.lock().is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		error::TransportError,
		http::{ApiResponse, TransportFuture},
	};

	struct CountingTransport {
		calls: AtomicU64,
		fail: bool,
	}
	impl ApiTransport for CountingTransport {
		fn execute(&self, _request: ApiRequest) -> TransportFuture<'_> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			let fail = self.fail;

			Box::pin(async move {
				tokio::time::sleep(std::time::Duration::from_millis(20)).await;

				if fail {
					return Err(TransportError::Io(std::io::Error::other("connection reset")));
				}

				Ok(ApiResponse::new(200, format!(r#"{{"csrfToken":"csrf-{call}"}}"#)))
			})
		}
	}

	fn cache(fail: bool, ttl: Duration) -> (Arc<CountingTransport>, AntiForgeryCache<CountingTransport>) {
		let transport = Arc::new(CountingTransport { calls: AtomicU64::new(0), fail });
		let endpoint =
			Url::parse("https://api.example.com/auth/csrf-token").expect("Fixture URL should parse.");

		(transport.clone(), AntiForgeryCache::new(transport, endpoint, ttl))
	}

	#[test]
	fn freshness_is_inclusive_of_expiry() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token =
			AntiForgeryToken::new(HeaderValue::from_static("csrf"), issued, Duration::minutes(5));

		assert!(token.is_fresh_at(macros::datetime!(2025-01-01 00:05 UTC)));
		assert!(!token.is_fresh_at(macros::datetime!(2025-01-01 00:05:01 UTC)));
		assert!(!format!("{token:?}").contains("csrf\""));
		assert!(token.value().is_sensitive());
	}

	#[tokio::test]
	async fn concurrent_misses_share_one_fetch() {
		let (transport, cache) = cache(false, Duration::minutes(5));
		let (a, b, c) = tokio::join!(cache.get(), cache.get(), cache.get());

		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

		for token in [a, b, c] {
			assert_eq!(token.expect("Shared fetch should succeed.").value(), "csrf-1");
		}
	}

	#[tokio::test]
	async fn invalidate_forces_refetch() {
		let (transport, cache) = cache(false, Duration::minutes(5));

		cache.get().await.expect("First fetch should succeed.");
		cache.get().await.expect("Cached read should succeed.");

		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

		cache.invalidate();

		assert!(cache.peek().is_none());
		assert_eq!(cache.get().await.expect("Refetch should succeed.").value(), "csrf-2");
		assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn invalidate_if_keeps_a_newer_token() {
		let (transport, cache) = cache(false, Duration::minutes(5));
		let stale = cache.get().await.expect("First fetch should succeed.").value().clone();

		assert!(cache.invalidate_if(&stale));
		assert_eq!(cache.get().await.expect("Refetch should succeed.").value(), "csrf-2");

		// A second request rejected with the same stale token arrives late.
		assert!(!cache.invalidate_if(&stale));
		assert_eq!(cache.get().await.expect("Cached read should succeed.").value(), "csrf-2");
		assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_waiters_share_a_failure() {
		let (transport, cache) = cache(true, Duration::minutes(5));
		let (a, b) = tokio::join!(cache.get(), cache.get());

		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
		assert!(matches!(a, Err(Error::Unavailable(TransientError::Transport(_)))));
		assert!(matches!(b, Err(Error::Unavailable(TransientError::Upstream { .. }))));
		assert!(cache.peek().is_none());

		let _ = cache.get().await;

		assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
	}
}
