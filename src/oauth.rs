//! Internal OAuth client facade for `grant_type=refresh_token` exchanges.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		ClientAuthMethod, ProviderCall, ProviderDescriptor, ProviderErrorContext,
		ProviderErrorKind, ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

const TOKEN_ENDPOINT: &str = "token endpoint";

/// Tokens returned by a successful refresh exchange.
#[derive(Clone, Debug)]
pub(crate) struct IssuedTokens {
	pub(crate) access_token: TokenSecret,
	/// Present only when the provider rotated the refresh token.
	pub(crate) refresh_token: Option<TokenSecret>,
	pub(crate) expires_in: Option<Duration>,
	pub(crate) scope: Option<ScopeSet>,
}

/// `oauth2` client bound to the descriptor's token endpoint and client credentials.
pub(crate) struct RefreshFacade {
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
}
impl RefreshFacade {
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client =
			BasicClient::new(ClientId::new(client_id.to_owned())).set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client })
	}

	pub(crate) async fn refresh_token(
		&self,
		strategy: &dyn ProviderStrategy,
		refresh_token: &TokenSecret,
	) -> Result<IssuedTokens> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(strategy, meta.take(), err))?;

		map_refresh_token_response(response)
	}
}

fn map_refresh_token_response(response: FacadeTokenResponse) -> Result<IssuedTokens> {
	let access_token = TokenSecret::non_empty(response.access_token().secret().to_owned())
		.ok_or(ConfigError::CredentialBuild(
			crate::auth::CredentialBuilderError::MissingAccessToken,
		))?;
	let expires_in = match response.expires_in() {
		Some(lifetime) => {
			let secs = i64::try_from(lifetime.as_secs())
				.map_err(|_| ConfigError::ExpiresInOutOfRange)?;

			Some(Duration::seconds(secs))
		},
		None => None,
	};
	let scope = match response.scopes() {
		Some(scopes) => Some(
			ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).map_err(ConfigError::from)?,
		),
		None => None,
	};

	Ok(IssuedTokens {
		access_token,
		refresh_token: response
			.refresh_token()
			.and_then(|token| TokenSecret::non_empty(token.secret().to_owned())),
		expires_in,
		scope,
	})
}

fn map_request_error(
	strategy: &dyn ProviderStrategy,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, response, meta_ref),
		RequestTokenError::Request(error) => map_transport_error(meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message: format!("Token endpoint returned an unexpected response: {message}."),
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx = ProviderErrorContext::new(ProviderCall::TokenRefresh)
		.with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = if let Some(description) = response.error_description() {
		format!("token endpoint returned an OAuth error: {description}")
	} else {
		format!("token endpoint returned an OAuth error: {}", response.error().as_ref())
	};

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::InvalidGrant | ProviderErrorKind::InsufficientScope =>
			Error::reauth_required(message),
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_transport_error(
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<ReqwestError>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransientError::TokenEndpoint {
			message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		_ => TransientError::TokenEndpoint {
			message: "HTTP client error occurred while calling the token endpoint".into(),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::network(TOKEN_ENDPOINT, err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::ProviderId;

	fn descriptor(method: ClientAuthMethod) -> ProviderDescriptor {
		let provider_id =
			ProviderId::new("test-provider").expect("Failed to construct provider identifier.");

		ProviderDescriptor::builder(provider_id)
			.token_endpoint(
				Url::parse("https://example.com/oauth2/token")
					.expect("Failed to parse token endpoint URL."),
			)
			.upload_endpoint(
				Url::parse("https://example.com/upload").expect("Failed to parse upload URL."),
			)
			.preferred_client_auth_method(method)
			.build()
			.expect("Failed to build provider descriptor.")
	}

	#[test]
	fn builds_clients_for_each_auth_method() {
		for method in [ClientAuthMethod::ClientSecretBasic, ClientAuthMethod::ClientSecretPost] {
			let http_client =
				ReqwestHttpClient::new().expect("Default HTTP client should build.");

			RefreshFacade::from_descriptor(&descriptor(method), "client-id", Some("secret"), http_client)
				.expect("Facade should build for every client auth method.");
		}
	}

	#[test]
	fn revoked_refresh_tokens_require_reauth() {
		let response: BasicErrorResponse = serde_json::from_str(
			r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
		)
		.expect("Error fixture should parse.");
		let meta = ResponseMetadata { status: Some(400), retry_after: None };
		let err = map_server_response_error(
			&crate::provider::DefaultProviderStrategy,
			response,
			Some(&meta),
		);

		assert!(matches!(err, Error::ReauthRequired { .. }));
		assert!(err.to_string().contains("revoked"));
	}

	#[test]
	fn server_errors_stay_retryable() {
		let response: BasicErrorResponse =
			serde_json::from_str(r#"{"error":"temporarily_unavailable"}"#)
				.expect("Error fixture should parse.");
		let meta = ResponseMetadata { status: Some(503), retry_after: Some(Duration::seconds(5)) };
		let err = map_server_response_error(
			&crate::provider::DefaultProviderStrategy,
			response,
			Some(&meta),
		);

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenEndpoint { status: Some(503), .. })
		));
		assert_eq!(err.kind(), crate::error::ErrorKind::Retryable);
	}
}
