//! Delegated credential records, lifecycle helpers, and the write models stores accept.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, ScopeSet, token::secret::TokenSecret},
};

/// Current lifecycle status for a delegated credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Access token is within its known lifetime.
	Active,
	/// Access token passed its expiry instant.
	Expired,
	/// Provider never reported an expiry; the token is used until something rejects it.
	Unbounded,
}

/// Errors produced by [`CredentialGrantBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no (or an empty) access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when a relative expiry is zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Issued when a relative expiry lands outside the representable range.
	#[error("The expires_in value is too large.")]
	ExpiresInOutOfRange,
}

/// The single live OAuth credential a principal delegated to the application.
#[derive(Serialize, Deserialize, Clone)]
pub struct DelegatedCredential {
	/// Owning principal; at most one credential exists per principal.
	pub principal: PrincipalId,
	/// Verified email of the principal when the credential was linked.
	pub email: Option<String>,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider ever issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Access token expiry, when known.
	pub expires_at: Option<OffsetDateTime>,
	/// Normalized scopes granted to the credential.
	pub scope: ScopeSet,
	/// Last time the row was written.
	pub updated_at: OffsetDateTime,
}
impl DelegatedCredential {
	/// Builds a fresh credential from a grant.
	pub fn from_grant(principal: PrincipalId, grant: CredentialGrant, now: OffsetDateTime) -> Self {
		Self {
			principal,
			email: grant.email,
			access_token: grant.access_token,
			refresh_token: grant.refresh_token,
			expires_at: grant.expires_at,
			scope: grant.scope,
			updated_at: now,
		}
	}

	/// Replaces the credential with a new grant, keeping the stored refresh token and email
	/// when the grant carries none.
	pub fn replace_with(&mut self, grant: CredentialGrant, now: OffsetDateTime) {
		self.access_token = grant.access_token;
		self.expires_at = grant.expires_at;
		self.scope = grant.scope;
		self.updated_at = now;

		if let Some(refresh) = grant.refresh_token.filter(|secret| !secret.is_empty()) {
			self.refresh_token = Some(refresh);
		}
		if let Some(email) = grant.email {
			self.email = Some(email);
		}
	}

	/// Applies a provider-issued partial update.
	///
	/// A new access token replaces `expires_at` as well, even when the update carries no expiry.
	/// Empty refresh tokens never replace a stored one.
	pub fn apply_update(&mut self, update: TokenUpdate, now: OffsetDateTime) {
		if let Some(access) = update.access_token.filter(|secret| !secret.is_empty()) {
			self.access_token = access;
			self.expires_at = update.expires_at;
		}
		if let Some(refresh) = update.refresh_token.filter(|secret| !secret.is_empty()) {
			self.refresh_token = Some(refresh);
		}
		if let Some(scope) = update.scope.filter(|scope| !scope.is_empty()) {
			self.scope = scope;
		}

		self.updated_at = now;
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		match self.expires_at {
			None => CredentialStatus::Unbounded,
			Some(expires_at) if instant >= expires_at => CredentialStatus::Expired,
			Some(_) => CredentialStatus::Active,
		}
	}

	/// Returns `true` if the access token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Returns `true` when the token expires within `skew` of `instant`.
	///
	/// Credentials without a known expiry never need a proactive refresh.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		self.is_expired_at(instant.saturating_add(skew))
	}
}
impl Debug for DelegatedCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DelegatedCredential")
			.field("principal", &self.principal)
			.field("email", &self.email)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.field("updated_at", &self.updated_at)
			.finish()
	}
}

/// Tokens handed over when a user links (or relinks) their account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialGrant {
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one this time.
	pub refresh_token: Option<TokenSecret>,
	/// Absolute access token expiry, when known.
	pub expires_at: Option<OffsetDateTime>,
	/// Scopes granted with the tokens.
	pub scope: ScopeSet,
	/// Verified email of the linking principal, if the identity token carried one.
	pub email: Option<String>,
}
impl CredentialGrant {
	/// Returns a builder for assembling a grant from raw provider values.
	pub fn builder() -> CredentialGrantBuilder {
		CredentialGrantBuilder::default()
	}
}

/// Builder for [`CredentialGrant`].
#[derive(Clone, Debug, Default)]
pub struct CredentialGrantBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scope: ScopeSet,
	email: Option<String>,
}
impl CredentialGrantBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = TokenSecret::non_empty(token);

		self
	}

	/// Provides the refresh token value; empty strings count as "not issued".
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = TokenSecret::non_empty(token);

		self
	}

	/// Sets the instant relative expiries are measured from (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Records the principal's verified email; empty values are dropped.
	pub fn email(mut self, email: Option<String>) -> Self {
		self.email = email.filter(|value| !value.is_empty());

		self
	}

	/// Consumes the builder and produces a [`CredentialGrant`].
	pub fn build(self) -> Result<CredentialGrant, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) if !delta.is_positive() =>
				return Err(CredentialBuilderError::NonPositiveExpiresIn),
			(None, Some(delta)) => Some(
				self.issued_at
					.unwrap_or_else(OffsetDateTime::now_utc)
					.checked_add(delta)
					.ok_or(CredentialBuilderError::ExpiresInOutOfRange)?,
			),
			(None, None) => None,
		};

		Ok(CredentialGrant {
			access_token,
			refresh_token: self.refresh_token,
			expires_at,
			scope: self.scope,
			email: self.email,
		})
	}
}

/// Partial update written back after a provider refresh.
#[derive(Clone, Debug, Default)]
pub struct TokenUpdate {
	/// Replacement access token.
	pub access_token: Option<TokenSecret>,
	/// Replacement refresh token, when the provider rotated it.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry of the replacement access token.
	pub expires_at: Option<OffsetDateTime>,
	/// Scopes the provider reported with the refresh, if any.
	pub scope: Option<ScopeSet>,
}
impl TokenUpdate {
	/// Creates an update carrying a new access token and its expiry.
	pub fn access(token: TokenSecret, expires_at: Option<OffsetDateTime>) -> Self {
		Self { access_token: Some(token), expires_at, ..Default::default() }
	}

	/// Attaches a rotated refresh token; empty values are dropped.
	pub fn with_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token.filter(|secret| !secret.is_empty());

		self
	}

	/// Attaches the scopes reported by the provider.
	pub fn with_scope(mut self, scope: Option<ScopeSet>) -> Self {
		self.scope = scope;

		self
	}
}
