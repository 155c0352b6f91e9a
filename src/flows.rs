//! Delegated-credential flows: linking, refresh coordination, and document creation.

pub mod common;
pub mod document;
pub mod refresh;

pub use common::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::{CredentialGrant, DelegatedCredential, PrincipalId},
	http::ReqwestHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderDescriptor, ProviderStrategy},
	record::ResourceRecord,
	store::{CredentialStore, RecordStore},
};

/// Manages delegated Drive credentials for verified principals.
///
/// The delegate owns the HTTP client, credential and record stores, provider descriptor, and
/// strategy so individual flows can focus on their own logic. Cloning is cheap and clones
/// share the refresh lease table, so concurrent requests for one principal single-flight
/// their refreshes no matter which clone handles them.
#[derive(Clone)]
pub struct DriveDelegate {
	/// HTTP client used for every token and Drive request.
	pub http_client: ReqwestHttpClient,
	/// Store holding one credential per principal.
	pub credentials: Arc<dyn CredentialStore>,
	/// Store receiving a record for every created document.
	pub records: Arc<dyn RecordStore>,
	/// Provider descriptor that defines the token and upload endpoints.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for classifying provider failures.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier used for refreshes.
	pub client_id: String,
	/// Client secret for the token endpoint.
	pub client_secret: Option<String>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	/// How long before `expires_at` a credential already counts as stale.
	pub refresh_skew: Duration,
	leases: LeaseTable,
}
impl DriveDelegate {
	/// Creates a delegate with its own reqwest transport using the default timeout.
	pub fn new(
		credentials: Arc<dyn CredentialStore>,
		records: Arc<dyn RecordStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			credentials,
			records,
			descriptor,
			strategy,
			client_id,
			ReqwestHttpClient::new()?,
		))
	}

	/// Creates a delegate that reuses the caller-provided transport.
	pub fn with_http_client(
		credentials: Arc<dyn CredentialStore>,
		records: Arc<dyn RecordStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self {
			http_client,
			credentials,
			records,
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			refresh_metrics: Default::default(),
			refresh_skew: Duration::ZERO,
			leases: Default::default(),
		}
	}

	/// Sets or replaces the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Refreshes credentials this long before they expire (negative values count as zero).
	pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
		self.refresh_skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	/// Lease table guarding refreshes, exposed for diagnostics.
	pub fn leases(&self) -> &LeaseTable {
		&self.leases
	}

	/// Stores (or replaces) the principal's delegated credential.
	///
	/// A grant without a refresh token keeps the one already on file.
	pub async fn store_credential(
		&self,
		principal: &PrincipalId,
		grant: CredentialGrant,
	) -> Result<DelegatedCredential> {
		const KIND: FlowKind = FlowKind::Link;

		let span = FlowSpan::new(KIND, "store_credential");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.credentials.upsert(principal, grant).await.map_err(Error::from)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Lists the principal's document records, oldest first.
	pub async fn records_for(&self, principal: &PrincipalId) -> Result<Vec<ResourceRecord>> {
		Ok(self.records.records_for(principal).await?)
	}
}
impl Debug for DriveDelegate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DriveDelegate")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("refresh_skew", &self.refresh_skew)
			.finish()
	}
}
