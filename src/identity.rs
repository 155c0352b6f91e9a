//! Identity-token verification for incoming requests.
//!
//! Callers present an `Authorization: Bearer <jwt>` header issued by the identity provider.
//! [`IdentityVerifier`] checks the RS256 signature against the provider's published JWKS
//! (cached by [`JwksCache`]) and validates `exp`, `iss`, `aud`, and `sub` before producing a
//! [`Principal`]. Nothing from the request body ever contributes to the principal.

pub mod claims;
pub mod jwks;

pub use claims::IdentityClaims;
pub use jwks::{JwksCache, MAX_KEY_TTL};

// crates.io
use jsonwebtoken::{Algorithm, Validation, errors::ErrorKind as JwtErrorKind};
// self
use crate::{
	_prelude::*,
	auth::Principal,
	error::ConfigError,
	http::ReqwestHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::descriptor::builder::validate_endpoint,
};

const BEARER_SCHEME: &str = "bearer";
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const FIREBASE_JWKS_URL: &str =
	"https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Settings for verifying identity tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
	/// JWKS document URL published by the identity provider.
	pub jwks_url: Url,
	/// Required `iss` claim.
	pub issuer: String,
	/// Required `aud` claim.
	pub audience: String,
	/// Key-set lifetime used when the key endpoint sends no `Cache-Control: max-age`.
	#[serde(default = "IdentityConfig::default_key_ttl")]
	pub default_key_ttl: Duration,
	/// Minimum spacing between refetches triggered by an unknown `kid`.
	#[serde(default = "IdentityConfig::default_min_refetch_interval")]
	pub min_refetch_interval: Duration,
	/// Clock skew tolerated on `exp`, in seconds.
	#[serde(default)]
	pub leeway_secs: u64,
}
impl IdentityConfig {
	const DEFAULT_KEY_TTL: Duration = Duration::hours(1);
	const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::seconds(60);

	/// Creates a configuration with default cache timings and no leeway.
	pub fn new(jwks_url: Url, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
		Self {
			jwks_url,
			issuer: issuer.into(),
			audience: audience.into(),
			default_key_ttl: Self::DEFAULT_KEY_TTL,
			min_refetch_interval: Self::DEFAULT_MIN_REFETCH_INTERVAL,
			leeway_secs: 0,
		}
	}

	/// Firebase Authentication ID tokens for `project_id`.
	pub fn firebase(project_id: &str) -> Result<Self> {
		let project_id = project_id.trim();

		if project_id.is_empty() {
			return Err(invalid_config("Firebase project id cannot be empty"));
		}

		let jwks_url = Url::parse(FIREBASE_JWKS_URL)
			.map_err(|e| invalid_config(format!("bad preset key URL: {e}")))?;

		Ok(Self::new(jwks_url, format!("{FIREBASE_ISSUER_PREFIX}{project_id}"), project_id))
	}

	/// Overrides the fallback key-set lifetime.
	pub fn with_default_key_ttl(mut self, ttl: Duration) -> Self {
		self.default_key_ttl = ttl;

		self
	}

	/// Overrides the unknown-`kid` refetch spacing.
	pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
		self.min_refetch_interval = interval;

		self
	}

	/// Overrides the tolerated clock skew.
	pub fn with_leeway_secs(mut self, leeway_secs: u64) -> Self {
		self.leeway_secs = leeway_secs;

		self
	}

	/// Checks that the configuration can be used for verification.
	pub fn validate(&self) -> Result<()> {
		if self.issuer.trim().is_empty() {
			return Err(invalid_config("issuer cannot be empty"));
		}
		if self.audience.trim().is_empty() {
			return Err(invalid_config("audience cannot be empty"));
		}
		if !self.default_key_ttl.is_positive() {
			return Err(invalid_config("default key TTL must be positive"));
		}
		if self.default_key_ttl > MAX_KEY_TTL {
			return Err(invalid_config(format!("default key TTL cannot exceed {MAX_KEY_TTL}")));
		}
		if self.min_refetch_interval.is_negative() {
			return Err(invalid_config("refetch interval cannot be negative"));
		}
		if self.min_refetch_interval > MAX_KEY_TTL {
			return Err(invalid_config(format!("refetch interval cannot exceed {MAX_KEY_TTL}")));
		}

		validate_endpoint("jwks", &self.jwks_url).map_err(|e| invalid_config(e.to_string()))
	}

	fn default_key_ttl() -> Duration {
		Self::DEFAULT_KEY_TTL
	}

	fn default_min_refetch_interval() -> Duration {
		Self::DEFAULT_MIN_REFETCH_INTERVAL
	}

	fn validation(&self) -> Validation {
		let mut validation = Validation::new(Algorithm::RS256);

		validation.set_audience(&[self.audience.as_str()]);
		validation.set_issuer(&[self.issuer.as_str()]);
		validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
		validation.leeway = self.leeway_secs;

		validation
	}
}

/// Verifies identity tokens and maps them to [`Principal`]s.
///
/// Cloning is cheap; clones share the key cache.
#[derive(Clone)]
pub struct IdentityVerifier {
	keys: Arc<JwksCache>,
	validation: Arc<Validation>,
}
impl IdentityVerifier {
	/// Builds a verifier that fetches keys with `http_client`.
	pub fn new(config: IdentityConfig, http_client: ReqwestHttpClient) -> Result<Self> {
		config.validate()?;

		let validation = Arc::new(config.validation());
		let keys = Arc::new(JwksCache::new(
			config.jwks_url,
			http_client,
			config.default_key_ttl,
			config.min_refetch_interval,
		));

		Ok(Self { keys, validation })
	}

	/// Shared key cache, mostly useful for diagnostics.
	pub fn keys(&self) -> &JwksCache {
		&self.keys
	}

	/// Verifies the token in an `Authorization` header value.
	pub async fn verify_header(&self, header: Option<&str>) -> Result<Principal> {
		self.verify(bearer_token(header)?).await
	}

	/// Verifies a raw identity token.
	///
	/// Signature, expiry, issuer, and audience failures all become
	/// [`Error::Unauthenticated`]; an unreachable key endpoint is reported as a retryable error
	/// instead.
	pub async fn verify(&self, token: &str) -> Result<Principal> {
		const KIND: FlowKind = FlowKind::Verify;

		let span = FlowSpan::new(KIND, "verify");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.verify_inner(token)).await;

		obs::record_result(KIND, result)
	}

	async fn verify_inner(&self, token: &str) -> Result<Principal> {
		let header = jsonwebtoken::decode_header(token)
			.map_err(|e| Error::unauthenticated(format!("malformed identity token: {e}")))?;

		if header.alg != Algorithm::RS256 {
			return Err(Error::unauthenticated(format!(
				"identity token uses unsupported algorithm {:?}",
				header.alg
			)));
		}

		let kid = header
			.kid
			.ok_or_else(|| Error::unauthenticated("identity token header has no key id"))?;
		let key = self.keys.key(&kid).await?;
		let data = jsonwebtoken::decode::<IdentityClaims>(token, &key, &self.validation)
			.map_err(|e| Error::unauthenticated(describe_rejection(e.kind())))?;

		data.claims.into_principal()
	}
}
impl Debug for IdentityVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityVerifier")
			.field("keys", &self.keys)
			.field("issuer", &self.validation.iss)
			.field("audience", &self.validation.aud)
			.finish()
	}
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively; anything else is [`Error::Unauthenticated`].
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
	let header = header.ok_or_else(|| Error::unauthenticated("missing authorization header"))?;
	let (scheme, token) = header
		.trim()
		.split_once(' ')
		.ok_or_else(|| Error::unauthenticated("malformed authorization header"))?;

	if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
		return Err(Error::unauthenticated("authorization scheme must be Bearer"));
	}

	let token = token.trim();

	if token.is_empty() {
		return Err(Error::unauthenticated("bearer token is empty"));
	}

	Ok(token)
}

fn describe_rejection(kind: &JwtErrorKind) -> String {
	match kind {
		JwtErrorKind::ExpiredSignature => "identity token has expired".into(),
		JwtErrorKind::InvalidAudience => "identity token has the wrong audience".into(),
		JwtErrorKind::InvalidIssuer => "identity token has the wrong issuer".into(),
		JwtErrorKind::InvalidSignature => "identity token signature is invalid".into(),
		JwtErrorKind::MissingRequiredClaim(claim) =>
			format!("identity token is missing the `{claim}` claim"),
		other => format!("identity token was rejected: {other:?}"),
	}
}

fn invalid_config(reason: impl Into<String>) -> Error {
	ConfigError::InvalidIdentityConfig { reason: reason.into() }.into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn bearer_headers_are_parsed_strictly() {
		assert_eq!(bearer_token(Some("Bearer abc.def.ghi")).expect("Valid header."), "abc.def.ghi");
		assert_eq!(bearer_token(Some("bearer  token ")).expect("Scheme is case-insensitive."), "token");

		for header in [None, Some(""), Some("Bearer"), Some("Bearer   "), Some("Basic dXNlcg==")] {
			let err = bearer_token(header).expect_err("Malformed headers must be rejected.");

			assert!(matches!(err, Error::Unauthenticated { .. }), "Unexpected error for {header:?}.");
		}
	}

	#[test]
	fn firebase_preset_pins_issuer_and_audience() {
		let config = IdentityConfig::firebase("letters-app").expect("Preset should build.");

		assert_eq!(config.issuer, "https://securetoken.google.com/letters-app");
		assert_eq!(config.audience, "letters-app");
		assert_eq!(config.jwks_url.as_str(), FIREBASE_JWKS_URL);
		config.validate().expect("Preset should validate.");
		assert!(IdentityConfig::firebase("  ").is_err());
	}

	#[test]
	fn config_rejects_insecure_key_endpoints() {
		let config = IdentityConfig::new(
			Url::parse("http://keys.example.com/jwks").expect("URL fixture should parse."),
			"issuer",
			"audience",
		);

		assert!(matches!(
			config.validate(),
			Err(Error::Config(ConfigError::InvalidIdentityConfig { .. }))
		));
	}

	#[test]
	fn config_bounds_cache_timings() {
		let base = IdentityConfig::firebase("letters-app").expect("Preset should build.");

		for config in [
			base.clone().with_default_key_ttl(Duration::MAX),
			base.clone().with_default_key_ttl(Duration::ZERO),
			base.clone().with_min_refetch_interval(Duration::MAX),
			base.clone().with_min_refetch_interval(Duration::seconds(-1)),
		] {
			assert!(matches!(
				config.validate(),
				Err(Error::Config(ConfigError::InvalidIdentityConfig { .. }))
			));
		}

		base.with_default_key_ttl(MAX_KEY_TTL)
			.with_min_refetch_interval(MAX_KEY_TTL)
			.validate()
			.expect("Bounds are inclusive.");
	}

	#[test]
	fn config_deserializes_with_default_timings() {
		let config: IdentityConfig = serde_json::from_str(
			r#"{"jwks_url":"https://keys.example.com/jwks","issuer":"iss","audience":"aud"}"#,
		)
		.expect("Minimal config should deserialize.");

		assert_eq!(config.default_key_ttl, IdentityConfig::DEFAULT_KEY_TTL);
		assert_eq!(config.min_refetch_interval, IdentityConfig::DEFAULT_MIN_REFETCH_INTERVAL);
		assert_eq!(config.leeway_secs, 0);
	}
}
