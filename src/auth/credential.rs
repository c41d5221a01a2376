//! Immutable session credential, identity claims, and the grant payload they are built from.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Errors produced while assembling a [`Credential`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialError {
	/// Issued when the access token is missing or blank.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the access token cannot be carried in an `Authorization` header.
	#[error("Access token contains characters that are not valid in an HTTP header.")]
	InvalidAccessToken,
}

/// Role claim attached to a session (`admin`, `analyst`, ...).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);
impl Role {
	/// Wraps a role label.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the role label.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Role({})", self.0)
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Informational identity claims. Never consulted for authorization decisions here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
	/// Role granted to the session.
	pub role: Option<Role>,
	/// Subject identifier.
	pub subject: Option<String>,
	/// Human-readable display name.
	pub display_name: Option<String>,
}

/// Access credential installed in the [`CredentialStore`](crate::store::CredentialStore).
///
/// Credentials are immutable: a refresh builds a new value and the store swaps it in whole,
/// so the token and its claims are always observed together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token attached to outgoing requests.
	pub access_token: TokenSecret,
	/// Refresh token echoed by the server, when it exposes one in the body.
	pub refresh_token: Option<TokenSecret>,
	/// Identity claims issued alongside the token.
	pub claims: IdentityClaims,
	/// Instant the credential was installed.
	pub issued_at: OffsetDateTime,
}
impl Credential {
	/// Returns a builder seeded with the provided access token.
	pub fn builder(access_token: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new(access_token)
	}

	/// Converts a sign-in or refresh grant into a credential issued at `issued_at`.
	pub fn from_grant(grant: SessionGrant, issued_at: OffsetDateTime) -> Result<Self, CredentialError> {
		let mut builder = Self::builder(grant.access_token).issued_at(issued_at);

		if let Some(role) = grant.role {
			builder = builder.role(role);
		}
		if let Some(subject) = grant.subject {
			builder = builder.subject(subject);
		}
		if let Some(name) = grant.display_name {
			builder = builder.display_name(name);
		}
		if let Some(refresh) = grant.refresh_token {
			builder = builder.refresh_token(refresh);
		}

		builder.build()
	}

	/// Role claim, if any.
	pub fn role(&self) -> Option<&Role> {
		self.claims.role.as_ref()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("claims", &self.claims)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	access_token: TokenSecret,
	refresh_token: Option<TokenSecret>,
	claims: IdentityClaims,
	issued_at: Option<OffsetDateTime>,
}
impl CredentialBuilder {
	fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			claims: IdentityClaims::default(),
			issued_at: None,
		}
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the role claim.
	pub fn role(mut self, role: impl Into<String>) -> Self {
		self.claims.role = Some(Role::new(role));

		self
	}

	/// Sets the subject claim.
	pub fn subject(mut self, subject: impl Into<String>) -> Self {
		self.claims.subject = Some(subject.into());

		self
	}

	/// Sets the display-name claim.
	pub fn display_name(mut self, name: impl Into<String>) -> Self {
		self.claims.display_name = Some(name.into());

		self
	}

	/// Sets the issued-at instant; defaults to the current clock.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialError> {
		if self.access_token.is_blank() {
			return Err(CredentialError::MissingAccessToken);
		}
		if self.access_token.bearer_header().is_err() {
			return Err(CredentialError::InvalidAccessToken);
		}

		Ok(Credential {
			access_token: self.access_token,
			refresh_token: self.refresh_token,
			claims: self.claims,
			issued_at: self.issued_at.unwrap_or_else(OffsetDateTime::now_utc),
		})
	}
}

/// Grant payload returned by the sign-in and refresh endpoints.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
	/// Bearer token.
	pub access_token: String,
	/// Role claim.
	#[serde(default)]
	pub role: Option<String>,
	/// Rotated refresh token, when the server exposes it.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Subject identifier.
	#[serde(default, alias = "userId", alias = "sub")]
	pub subject: Option<String>,
	/// Display name.
	#[serde(default, alias = "name")]
	pub display_name: Option<String>,
}
impl Debug for SessionGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionGrant")
			.field("access_token", &"<redacted>")
			.field("role", &self.role)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("subject", &self.subject)
			.field("display_name", &self.display_name)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn grant_decodes_camel_case_and_aliases() {
		let grant: SessionGrant = serde_json::from_str(
			r#"{"accessToken":"T2","role":"admin","refreshToken":"R2","userId":"u-7","name":"Ada"}"#,
		)
		.expect("Grant fixture should decode.");
		let credential = Credential::from_grant(grant, macros::datetime!(2025-01-01 00:00 UTC))
			.expect("Grant should convert into a credential.");

		assert_eq!(credential.access_token.expose(), "T2");
		assert_eq!(credential.role().map(Role::as_str), Some("admin"));
		assert_eq!(credential.claims.subject.as_deref(), Some("u-7"));
		assert_eq!(credential.claims.display_name.as_deref(), Some("Ada"));
		assert_eq!(credential.refresh_token.as_ref().map(TokenSecret::expose), Some("R2"));
	}

	#[test]
	fn builder_rejects_blank_tokens() {
		assert_eq!(Credential::builder(" ").build(), Err(CredentialError::MissingAccessToken));
		assert_eq!(
			Credential::builder("T1\r\nX-Admin: 1").build(),
			Err(CredentialError::InvalidAccessToken),
		);
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let credential = Credential::builder("very-secret")
			.refresh_token("also-secret")
			.role("viewer")
			.build()
			.expect("Credential fixture should build.");
		let rendered = format!("{credential:?}");

		assert!(!rendered.contains("very-secret"));
		assert!(!rendered.contains("also-secret"));
		assert!(rendered.contains("viewer"));
	}
}
