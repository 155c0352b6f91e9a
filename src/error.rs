//! Delegate-level error types shared across identity checks, flows, providers, and stores.

// self
use crate::{_prelude::*, auth::RemoteId};

/// Delegate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical delegate error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Identity token is missing, malformed, expired, or not signed by the identity provider.
	#[error("Caller is not authenticated: {reason}.")]
	Unauthenticated {
		/// Verifier-supplied reason string.
		reason: String,
	},
	/// No delegated credential is on file for the principal.
	#[error("No Drive account is linked for this user.")]
	DriveDisconnected,
	/// The delegated credential can no longer be renewed; the user must reconnect.
	#[error("Drive access must be reconnected: {reason}.")]
	ReauthRequired {
		/// Provider- or delegate-supplied reason string.
		reason: String,
	},
	/// The remote create call failed, or the local record could not be written after it.
	#[error("Remote write failed: {reason}.")]
	RemoteWrite {
		/// Human-readable summary of the failure.
		reason: String,
		/// Identifier of a remote object that exists without a local record.
		remote_id: Option<RemoteId>,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Underlying failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
	/// Caller-supplied input was rejected before any work was done.
	#[error("Request is invalid: {reason}.")]
	InvalidInput {
		/// Validation failure summary.
		reason: String,
	},
	/// Client authentication against the token endpoint failed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Classifies the error into the outcome a boundary layer should surface.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
			Self::DriveDisconnected => ErrorKind::DriveDisconnected,
			Self::ReauthRequired { .. } => ErrorKind::ReauthRequired,
			Self::RemoteWrite { .. } => ErrorKind::RemoteWrite,
			Self::InvalidInput { .. } => ErrorKind::InvalidInput,
			Self::Transient(_) | Self::Transport(_) => ErrorKind::Retryable,
			Self::Storage(_) | Self::Config(_) | Self::InvalidClient { .. } => ErrorKind::Internal,
		}
	}

	/// Remote object left without a local record, if this error carries one.
	pub fn orphaned_remote_id(&self) -> Option<&RemoteId> {
		match self {
			Self::RemoteWrite { remote_id, .. } => remote_id.as_ref(),
			_ => None,
		}
	}

	pub(crate) fn unauthenticated(reason: impl Into<String>) -> Self {
		Self::Unauthenticated { reason: reason.into() }
	}

	pub(crate) fn reauth_required(reason: impl Into<String>) -> Self {
		Self::ReauthRequired { reason: reason.into() }
	}
}

/// User-facing outcome categories derived from [`Error::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Sign in again with the identity provider.
	Unauthenticated,
	/// Link a Drive account.
	DriveDisconnected,
	/// Reconnect the Drive account.
	ReauthRequired,
	/// Remote create or post-create persistence failed; retry or reconcile.
	RemoteWrite,
	/// Fix the request payload.
	InvalidInput,
	/// Temporary failure; retry later.
	Retryable,
	/// Server-side misconfiguration or storage failure.
	Internal,
}
impl ErrorKind {
	/// Returns a stable label suitable for responses and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::Unauthenticated => "unauthenticated",
			ErrorKind::DriveDisconnected => "drive_disconnected",
			ErrorKind::ReauthRequired => "reauth_required",
			ErrorKind::RemoteWrite => "remote_write",
			ErrorKind::InvalidInput => "invalid_input",
			ErrorKind::Retryable => "retryable",
			ErrorKind::Internal => "internal",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised by the delegate.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Identity verification settings are unusable.
	#[error("Identity configuration is invalid: {reason}.")]
	InvalidIdentityConfig {
		/// Validation failure summary.
		reason: String,
	},
	/// Credential builder validation failed.
	#[error("Unable to build delegated credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Scope returned by the provider cannot be normalized.
	#[error("Provider returned invalid scopes.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or delegate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Identity key endpoint could not serve a usable key set.
	#[error("Identity key endpoint is unavailable: {message}.")]
	KeyEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Identity key endpoint responded with malformed JSON.
	#[error("Identity key endpoint returned malformed JSON.")]
	KeySetParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Which upstream endpoint was being called.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling an upstream endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}
