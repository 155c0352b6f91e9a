// crates.io
use httpmock::prelude::*;
// self
use drive_delegate::{
	_preludet::*,
	auth::{PrincipalId, TokenSecret},
	store::{CredentialStore, MemoryStore},
};

const TOKEN_BODY: &str = "{\"access_token\":\"access-new\",\"token_type\":\"Bearer\",\"expires_in\":3600}";

async fn stored_credential(store: &MemoryStore, principal: &PrincipalId) -> (String, Option<String>) {
	let credential = store
		.fetch(principal)
		.await
		.expect("Credential fetch should succeed.")
		.expect("Credential should remain on file.");

	(
		credential.access_token.expose().to_owned(),
		credential.refresh_token.as_ref().map(|secret| secret.expose().to_owned()),
	)
}

#[tokio::test]
async fn valid_credentials_skip_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal =
		seed_credential(&*store, "user-valid", "access-old", Some("refresh-1"), Duration::hours(1))
			.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let token = delegate.ensure_valid(&principal).await.expect("Valid credential should be served.");

	assert_eq!(token.expose(), "access-old");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_credentials_refresh_once_and_keep_the_refresh_token() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-expired",
		"access-old",
		Some("refresh-1"),
		-Duration::minutes(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-1")
				.form_urlencoded_tuple("client_id", TEST_CLIENT_ID);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let token = delegate.ensure_valid(&principal).await.expect("Expired credential should refresh.");

	assert_eq!(token.expose(), "access-new");

	mock.assert_calls_async(1).await;

	let (access, refresh) = stored_credential(&store, &principal).await;

	assert_eq!(access, "access-new");
	assert_eq!(refresh.as_deref(), Some("refresh-1"));
	assert_eq!(delegate.refresh_metrics.provider_calls(), 1);

	// The refreshed token is now valid, so a second call stays local.
	let again = delegate.ensure_valid(&principal).await.expect("Fresh credential should be served.");

	assert_eq!(again.expose(), "access-new");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rotated_refresh_tokens_replace_the_stored_one() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-rotated",
		"access-old",
		Some("refresh-1"),
		-Duration::minutes(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-2\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;

	delegate.ensure_valid(&principal).await.expect("Expired credential should refresh.");

	mock.assert_calls_async(1).await;

	let (_, refresh) = stored_credential(&store, &principal).await;

	assert_eq!(refresh.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-concurrent",
		"access-old",
		Some("refresh-1"),
		-Duration::minutes(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(TOKEN_BODY)
				.delay(std::time::Duration::from_millis(200));
		})
		.await;
	let handles = (0..8)
		.map(|_| {
			let delegate = delegate.clone();
			let principal = principal.clone();

			tokio::spawn(async move { delegate.ensure_valid(&principal).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let token = handle
			.await
			.expect("Refresh task should not panic.")
			.expect("Every caller should receive the refreshed token.");

		assert_eq!(token.expose(), "access-new");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(delegate.refresh_metrics.provider_calls(), 1);
	assert!(delegate.leases().is_empty(), "Lease entries should be released after the refresh.");
}

#[tokio::test]
async fn different_principals_refresh_independently() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let first =
		seed_credential(&*store, "user-a", "access-a", Some("refresh-a"), -Duration::minutes(1))
			.await;
	let second =
		seed_credential(&*store, "user-b", "access-b", Some("refresh-b"), -Duration::minutes(1))
			.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let (a, b) = tokio::join!(delegate.ensure_valid(&first), delegate.ensure_valid(&second));

	a.expect("First principal should refresh.");
	b.expect("Second principal should refresh.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn concurrent_forced_refreshes_reuse_the_replacement() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-forced",
		"access-rejected",
		Some("refresh-1"),
		Duration::hours(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(TOKEN_BODY)
				.delay(std::time::Duration::from_millis(100));
		})
		.await;
	let rejected = delegate.ensure_valid(&principal).await.expect("Seeded token should be served.");
	let (first, second) = tokio::join!(
		delegate.force_refresh(&principal, &rejected),
		delegate.force_refresh(&principal, &rejected),
	);

	assert_eq!(first.expect("First forced refresh should succeed.").expose(), "access-new");
	assert_eq!(second.expect("Second forced refresh should succeed.").expose(), "access-new");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn forced_refresh_renews_an_expired_replacement() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-stale-replacement",
		"access-replacement",
		Some("refresh-1"),
		-Duration::minutes(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let token = delegate
		.force_refresh(&principal, &TokenSecret::new("access-rejected"))
		.await
		.expect("Expired replacement should be refreshed.");

	assert_eq!(token.expose(), "access-new");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn forced_refresh_reuses_a_fresh_replacement() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-fresh-replacement",
		"access-replacement",
		Some("refresh-1"),
		Duration::hours(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let token = delegate
		.force_refresh(&principal, &TokenSecret::new("access-rejected"))
		.await
		.expect("Fresh replacement should be reused.");

	assert_eq!(token.expose(), "access-replacement");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn invalid_grant_requires_reauth_and_keeps_the_credential() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-revoked",
		"access-old",
		Some("refresh-revoked"),
		-Duration::minutes(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Token has been expired or revoked.\"}");
		})
		.await;
	let err = delegate
		.ensure_valid(&principal)
		.await
		.expect_err("Revoked refresh tokens should not produce an access token.");

	assert!(matches!(err, Error::ReauthRequired { .. }), "Unexpected error: {err:?}.");
	assert_eq!(err.kind().as_str(), "reauth_required");

	mock.assert_calls_async(1).await;

	let (access, refresh) = stored_credential(&store, &principal).await;

	assert_eq!(access, "access-old");
	assert_eq!(refresh.as_deref(), Some("refresh-revoked"));
	assert_eq!(delegate.refresh_metrics.failures(), 1);
}

#[tokio::test]
async fn expired_credentials_without_refresh_token_require_reauth() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal =
		seed_credential(&*store, "user-no-refresh", "access-old", None, -Duration::minutes(1))
			.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let err = delegate.ensure_valid(&principal).await.expect_err("Refresh should be impossible.");

	assert!(matches!(err, Error::ReauthRequired { .. }), "Unexpected error: {err:?}.");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn missing_credentials_report_a_disconnected_drive() {
	let server = MockServer::start_async().await;
	let (delegate, _store) = build_test_delegate(&server.base_url());
	let principal = PrincipalId::new("user-unlinked").expect("Principal fixture should be valid.");
	let err = delegate.ensure_valid(&principal).await.expect_err("Nothing is linked.");

	assert!(matches!(err, Error::DriveDisconnected));
	assert_eq!(err.kind().as_str(), "drive_disconnected");
}

#[tokio::test]
async fn token_endpoint_outages_are_retryable() {
	let server = MockServer::start_async().await;
	let (delegate, store) = build_test_delegate(&server.base_url());
	let principal = seed_credential(
		&*store,
		"user-outage",
		"access-old",
		Some("refresh-1"),
		-Duration::minutes(1),
	)
	.await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(503).header("content-type", "text/plain").body("unavailable");
		})
		.await;
	let err = delegate.ensure_valid(&principal).await.expect_err("Outage should surface.");

	assert_eq!(err.kind().as_str(), "retryable", "Unexpected error: {err:?}.");

	mock.assert_calls_async(1).await;
	assert!(delegate.leases().is_empty());
}
