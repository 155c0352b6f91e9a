//! Refresh coordination with per-principal single-flight leases.
//!
//! [`DriveDelegate::ensure_valid`] returns a usable access token for a principal. Unexpired
//! credentials are served without locking. Stale ones are renewed by exactly one lease holder
//! per principal: waiters re-read the store once they get the lease and reuse whatever the
//! previous holder wrote. [`DriveDelegate::force_refresh`] is the reactive path taken when the
//! provider rejects a token that still looked valid locally.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{DelegatedCredential, PrincipalId, TokenSecret, TokenUpdate},
	error::ConfigError,
	flows::DriveDelegate,
	oauth::RefreshFacade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::UpdateOutcome,
};

impl DriveDelegate {
	/// Returns an access token that is valid as far as the stored expiry tells.
	///
	/// Fails with [`Error::DriveDisconnected`] when no credential is on file and with
	/// [`Error::ReauthRequired`] when the credential can no longer be renewed.
	pub async fn ensure_valid(&self, principal: &PrincipalId) -> Result<TokenSecret> {
		self.ensure_fresh(principal, None, "ensure_valid").await
	}

	/// Refreshes the credential because the provider rejected `rejected`.
	///
	/// Runs under the same lease as [`ensure_valid`](Self::ensure_valid). When another caller
	/// already replaced the rejected token, its replacement is returned without a second call
	/// to the token endpoint.
	pub async fn force_refresh(
		&self,
		principal: &PrincipalId,
		rejected: &TokenSecret,
	) -> Result<TokenSecret> {
		self.ensure_fresh(principal, Some(rejected), "force_refresh").await
	}

	async fn ensure_fresh(
		&self,
		principal: &PrincipalId,
		rejected: Option<&TokenSecret>,
		stage: &'static str,
	) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let current = self.load_credential(principal).await?;

				if rejected.is_none()
					&& !current.needs_refresh_at(OffsetDateTime::now_utc(), self.refresh_skew)
				{
					return Ok(current.access_token);
				}

				let _lease = self.leases().acquire(principal).await;
				// The previous holder may have refreshed while this caller waited.
				let current = self.load_credential(principal).await?;
				let expiring = current.needs_refresh_at(OffsetDateTime::now_utc(), self.refresh_skew);
				let stale = match rejected {
					// A replacement written by another holder is reused only while it is fresh.
					Some(rejected) => &current.access_token == rejected || expiring,
					None => expiring,
				};

				if !stale {
					return Ok(current.access_token);
				}

				self.refresh_metrics.record_attempt();

				let refreshed = self.refresh_under_lease(principal, current).await;

				match &refreshed {
					Ok(_) => self.refresh_metrics.record_success(),
					Err(_) => self.refresh_metrics.record_failure(),
				}

				refreshed
			})
			.await;

		obs::record_result(KIND, result)
	}

	async fn load_credential(&self, principal: &PrincipalId) -> Result<DelegatedCredential> {
		self.credentials.fetch(principal).await?.ok_or(Error::DriveDisconnected)
	}

	async fn refresh_under_lease(
		&self,
		principal: &PrincipalId,
		current: DelegatedCredential,
	) -> Result<TokenSecret> {
		let refresh_token = current
			.refresh_token
			.ok_or_else(|| Error::reauth_required("no refresh token is on file"))?;
		let facade = RefreshFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
		)?;

		self.refresh_metrics.record_provider_call();

		let issued = facade.refresh_token(self.strategy.as_ref(), &refresh_token).await?;
		let expires_at = match issued.expires_in {
			Some(lifetime) => Some(
				OffsetDateTime::now_utc()
					.checked_add(lifetime)
					.ok_or(ConfigError::ExpiresInOutOfRange)?,
			),
			None => None,
		};
		let update = TokenUpdate::access(issued.access_token, expires_at)
			.with_refresh_token(issued.refresh_token)
			.with_scope(issued.scope);

		match self.credentials.update_tokens(principal, update).await? {
			UpdateOutcome::Updated(credential) => Ok(credential.access_token),
			// The credential was removed while the refresh was in flight.
			UpdateOutcome::Missing => Err(Error::DriveDisconnected),
		}
	}
}
