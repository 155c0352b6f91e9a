//! Delegated Google Drive access for verified users: identity-token checks, per-user OAuth
//! credential storage, single-flight token refresh, and document writes on the user's behalf.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod drive;
pub mod error;
pub mod flows;
pub mod http;
pub mod identity;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod record;
pub mod service;
pub mod store;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::time::Duration as StdDuration;
	// self
	use crate::{
		auth::{CredentialGrant, PrincipalId, ProviderId},
		flows::DriveDelegate,
		http::ReqwestHttpClient,
		provider::{ClientAuthMethod, DefaultProviderStrategy, ProviderDescriptor},
		store::{CredentialStore, MemoryStore},
	};

	/// Client identifier configured on test delegates.
	pub const TEST_CLIENT_ID: &str = "client-drive";
	/// Client secret configured on test delegates.
	pub const TEST_CLIENT_SECRET: &str = "secret-drive";
	/// Token endpoint path under the mock server.
	pub const TOKEN_PATH: &str = "/token";
	/// Upload endpoint path under the mock server.
	pub const UPLOAD_PATH: &str = "/upload/drive/v3/files";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(StdDuration::from_secs(5))
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Descriptor pointing the token and upload endpoints at `base_url`.
	pub fn test_descriptor(base_url: &str) -> ProviderDescriptor {
		let url = |path: &str| {
			Url::parse(&format!("{base_url}{path}")).expect("Mock endpoint URL should parse.")
		};

		ProviderDescriptor::builder(
			ProviderId::new("mock-drive").expect("Provider identifier fixture should be valid."),
		)
		.token_endpoint(url(TOKEN_PATH))
		.upload_endpoint(url(UPLOAD_PATH))
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Mock descriptor should build.")
	}

	/// Constructs a [`DriveDelegate`] against a mock server, backed by one in-memory store for
	/// both credentials and records.
	pub fn build_test_delegate(base_url: &str) -> (DriveDelegate, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let delegate = DriveDelegate::with_http_client(
			store.clone(),
			store.clone(),
			test_descriptor(base_url),
			Arc::new(DefaultProviderStrategy),
			TEST_CLIENT_ID,
			test_reqwest_http_client(),
		)
		.with_client_secret(TEST_CLIENT_SECRET);

		(delegate, store)
	}

	/// Seeds a credential whose access token expires `expires_in` from now (negative values
	/// seed an already expired token).
	pub async fn seed_credential(
		store: &dyn CredentialStore,
		principal: &str,
		access: &str,
		refresh: Option<&str>,
		expires_in: Duration,
	) -> PrincipalId {
		let principal = PrincipalId::new(principal).expect("Principal fixture should be valid.");
		let mut builder = CredentialGrant::builder()
			.access_token(access)
			.expires_at(OffsetDateTime::now_utc() + expires_in);

		if let Some(refresh) = refresh {
			builder = builder.refresh_token(refresh);
		}

		store
			.upsert(&principal, builder.build().expect("Grant fixture should build."))
			.await
			.expect("Failed to seed credential.");

		principal
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
