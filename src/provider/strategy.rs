//! Provider strategy hooks that classify token and API failures.
//!
//! Flows populate a [`ProviderErrorContext`] from whatever the HTTP layer observed and let the
//! strategy decide which delegate error it becomes, without tying flows to any particular
//! provider's error dialect.

// self
use crate::_prelude::*;

/// Strategy hook that allows providers to classify errors.
///
/// Implementors are required to be `Send + Sync`, and the hooks use crate-owned data types so
/// downstream crates never depend on reqwest-specific structures. Override only what you
/// need; `classify_api_error` has a default implementation that treats HTTP 401 and auth-error
/// bodies as a rejected access token.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed refresh into the delegate taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Decides whether a failed API call rejected the access token.
	fn classify_api_error(&self, ctx: &ProviderErrorContext) -> ApiErrorKind {
		if ctx.network_error {
			return ApiErrorKind::Failed;
		}
		if ctx.http_status == Some(401) {
			return ApiErrorKind::AuthRejected;
		}

		let hinted = [ctx.oauth_error.as_deref(), ctx.body_preview.as_deref()]
			.into_iter()
			.flatten()
			.any(is_auth_error_hint);

		if hinted { ApiErrorKind::AuthRejected } else { ApiErrorKind::Failed }
	}
}

/// Upstream call a failure originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderCall {
	/// `grant_type=refresh_token` exchange at the token endpoint.
	TokenRefresh,
	/// Multipart upload at the Drive files endpoint.
	DocumentCreate,
}
impl ProviderCall {
	/// Stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderCall::TokenRefresh => "token_refresh",
			ProviderCall::DocumentCreate => "document_create",
		}
	}
}

/// Canonical token-endpoint error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the refresh token (revoked, expired, or unknown).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the grant covers.
	InsufficientScope,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Outcome categories for non-token API failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
	/// The access token was rejected; a forced refresh may help.
	AuthRejected,
	/// Any other failure; refreshing will not help.
	Failed,
}

/// Context passed to provider strategies when classifying errors.
///
/// The struct keeps only primitive data (status codes, OAuth fields, body preview) so
/// strategies stay decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Upstream call associated with the failing request.
	pub operation: ProviderCall,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field (or API error status).
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided call.
	pub fn new(operation: ProviderCall) -> Self {
		Self {
			operation,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure(operation: ProviderCall) -> Self {
		let mut ctx = Self::new(operation);

		ctx.network_error = true;

		ctx
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a (truncated) body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy that applies RFC-guided heuristics plus Google's API error dialect.
///
/// It prioritizes structured OAuth fields (`error`, `error_description`), then falls back to
/// body text hints, and finally the HTTP status code. Network failures are always treated as
/// transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

// Google reports rejected bearer tokens as `{"error": {"status": "UNAUTHENTICATED", "errors":
// [{"reason": "authError"}]}}`; OAuth-style APIs use `invalid_token`.
fn is_auth_error_hint(text: &str) -> bool {
	let lowered = text.to_ascii_lowercase();

	["unauthenticated", "autherror", "invalid_token", "invalid credentials"]
		.iter()
		.any(|hint| lowered.contains(hint))
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ProviderErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let body = body?;
	let lowered = body.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn refresh_ctx() -> ProviderErrorContext {
		ProviderErrorContext::new(ProviderCall::TokenRefresh)
	}

	fn create_ctx() -> ProviderErrorContext {
		ProviderErrorContext::new(ProviderCall::DocumentCreate)
	}

	#[test]
	fn oauth_fields_win_over_status() {
		let strategy = DefaultProviderStrategy;

		assert_eq!(
			strategy.classify_token_error(
				&refresh_ctx().with_oauth_error("invalid_grant").with_http_status(503)
			),
			ProviderErrorKind::InvalidGrant
		);
		assert_eq!(
			strategy.classify_token_error(&refresh_ctx().with_oauth_error("server_error")),
			ProviderErrorKind::Transient
		);
		assert_eq!(
			strategy.classify_token_error(&refresh_ctx().with_http_status(401)),
			ProviderErrorKind::InvalidClient
		);
		assert_eq!(
			strategy.classify_token_error(&ProviderErrorContext::network_failure(
				ProviderCall::TokenRefresh
			)),
			ProviderErrorKind::Transient
		);
	}

	#[test]
	fn api_errors_detect_rejected_tokens() {
		let strategy = DefaultProviderStrategy;

		assert_eq!(
			strategy.classify_api_error(&create_ctx().with_http_status(401)),
			ApiErrorKind::AuthRejected
		);
		assert_eq!(
			strategy.classify_api_error(
				&create_ctx()
					.with_http_status(403)
					.with_body_preview(r#"{"error":{"status":"UNAUTHENTICATED"}}"#)
			),
			ApiErrorKind::AuthRejected
		);
		assert_eq!(
			strategy.classify_api_error(
				&create_ctx()
					.with_http_status(403)
					.with_body_preview(r#"{"error":{"errors":[{"reason":"storageQuotaExceeded"}]}}"#)
			),
			ApiErrorKind::Failed
		);
		assert_eq!(
			strategy.classify_api_error(&create_ctx().with_http_status(500)),
			ApiErrorKind::Failed
		);
	}

	#[test]
	fn previews_are_truncated() {
		let ctx = create_ctx().with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be recorded.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
