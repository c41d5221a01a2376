//! Transport primitives for session-aware API calls.
//!
//! The module exposes [`ApiTransport`] alongside the crate-owned [`ApiRequest`] and
//! [`ApiResponse`] types so downstream crates can plug in any HTTP stack without the
//! coordinator depending on it. Requests own their bodies, which lets the client clone and
//! replay them after a credential refresh.

pub mod request;
pub mod response;

pub use http::{HeaderMap, HeaderName, HeaderValue, Method, header};
pub use request::*;
pub use response::*;

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports that dispatch already-decorated requests.
///
/// The trait is the client's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so a single transport can back the request path, the
/// anti-forgery cache, and the refresh episode task at once, and the futures they return must
/// be `Send` because refresh episodes run on spawned tasks.
///
/// Any HTTP status, including 401/403/5xx, is a successful transport outcome: return it as an
/// [`ApiResponse`] and let the classifier interpret it. Only failures where no response was
/// received belong in [`TransportError`].
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and resolves with the raw response.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The refresh session travels in cookies, so any custom client passed to
/// [`ReqwestTransport::with_client`] should enable `cookie_store(true)`.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with an in-memory cookie jar.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().cookie_store(true).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		let url = request.url.to_string();
		let mut builder = self.0.request(request.method, request.url).headers(request.headers);

		builder = match request.body {
			RequestBody::Empty => builder,
			RequestBody::Json(bytes) => builder.body(bytes),
			RequestBody::Bytes { data, .. } => builder.body(data),
			RequestBody::Multipart(parts) =>
				builder.multipart(build_form(parts).map_err(|e| TransportError::network(&url, e))?),
		};

		let response = builder.send().await.map_err(|e| TransportError::network(&url, e))?;
		let status = response.status().as_u16();
		let headers = response.headers().clone();
		let body =
			response.bytes().await.map_err(|e| TransportError::network(&url, e))?.to_vec();

		Ok(ApiResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(self.dispatch(request))
	}
}
#[cfg(feature = "reqwest")]
fn build_form(parts: Vec<MultipartPart>) -> Result<reqwest::multipart::Form, ReqwestError> {
	let mut form = reqwest::multipart::Form::new();

	for part in parts {
		let mut body = reqwest::multipart::Part::bytes(part.data);

		if let Some(file_name) = part.file_name {
			body = body.file_name(file_name);
		}
		if let Some(content_type) = part.content_type {
			body = body.mime_str(&content_type)?;
		}

		form = form.part(part.name, body);
	}

	Ok(form)
}
