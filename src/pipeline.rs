//! Outbound request decoration: bearer credential, anti-forgery token, content type.

// crates.io
use http::header::{AUTHORIZATION, CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	anti_forgery::AntiForgeryCache,
	auth::{Credential, CredentialError},
	error::ConfigError,
	http::{ApiRequest, ApiTransport, RequestBody},
};

const JSON: &str = "application/json";

/// Decorates caller requests before they reach the transport.
///
/// The only suspension point is the anti-forgery fetch; everything else is header mutation.
pub struct RequestPipeline<T>
where
	T: ?Sized + ApiTransport,
{
	anti_forgery: Arc<AntiForgeryCache<T>>,
	anti_forgery_header: HeaderName,
}
impl<T> RequestPipeline<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a pipeline that reads tokens from `anti_forgery` and writes them to `header`.
	pub fn new(anti_forgery: Arc<AntiForgeryCache<T>>, header: HeaderName) -> Self {
		Self { anti_forgery, anti_forgery_header: header }
	}

	/// Name of the anti-forgery header.
	pub fn anti_forgery_header(&self) -> &HeaderName {
		&self.anti_forgery_header
	}

	/// Anti-forgery token a decorated request carries.
	pub fn anti_forgery_token<'a>(&self, request: &'a ApiRequest) -> Option<&'a HeaderValue> {
		request.headers.get(&self.anti_forgery_header)
	}

	/// Returns `true` when the caller supplied its own anti-forgery header.
	pub fn carries_anti_forgery(&self, request: &ApiRequest) -> bool {
		request.has_header(&self.anti_forgery_header)
	}

	/// Attaches the bearer credential, the anti-forgery token, and a content type.
	///
	/// Requests issued without a credential go out unauthenticated; whether that is valid is
	/// the caller's decision.
	pub async fn decorate(
		&self,
		mut request: ApiRequest,
		credential: Option<&Credential>,
	) -> Result<ApiRequest> {
		attach_credential(&mut request, credential)?;

		if !self.carries_anti_forgery(&request) {
			let token = self.anti_forgery.get().await?;

			request.insert_header(self.anti_forgery_header.clone(), token.value().clone());
		}

		negotiate_content_type(&mut request);

		Ok(request)
	}
}
impl<T> Debug for RequestPipeline<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("anti_forgery_header", &self.anti_forgery_header)
			.finish()
	}
}

/// Sets `Authorization: Bearer <token>` when a credential is present.
///
/// The header value is marked sensitive. Fails when a stored token cannot form a header value,
/// which only happens for credentials that bypassed [`Credential::builder`].
pub fn attach_credential(
	request: &mut ApiRequest,
	credential: Option<&Credential>,
) -> Result<(), ConfigError> {
	if let Some(credential) = credential {
		let value = credential
			.access_token
			.bearer_header()
			.map_err(|_| ConfigError::InvalidCredential(CredentialError::InvalidAccessToken))?;

		request.insert_header(AUTHORIZATION, value);
	}

	Ok(())
}

/// Applies the content-type rules.
///
/// JSON is the default for structured and empty bodies. Raw bytes keep whatever type the
/// caller declared (or none). Multipart bodies never carry a caller-set type, because the
/// transport must write its own boundary.
pub fn negotiate_content_type(request: &mut ApiRequest) {
	let default = match &request.body {
		RequestBody::Multipart(_) => {
			request.remove_header(CONTENT_TYPE);

			return;
		},
		RequestBody::Bytes { content_type, .. } => content_type.clone(),
		RequestBody::Empty | RequestBody::Json(_) => Some(HeaderValue::from_static(JSON)),
	};

	if let Some(content_type) = default.filter(|_| !request.has_header(CONTENT_TYPE)) {
		request.insert_header(CONTENT_TYPE, content_type);
	}
}
