// crates.io
use time::macros;
// self
use drive_delegate::{
	_preludet::*,
	auth::{CredentialGrant, PrincipalId, RemoteId, ScopeSet, TokenSecret, TokenUpdate},
	record::{DocumentDraft, ResourceRecord},
	store::{CredentialStore, MemoryStore, RecordStore, StoreError, UpdateOutcome},
};

fn principal(value: &str) -> PrincipalId {
	PrincipalId::new(value).expect("Failed to build principal identifier for store tests.")
}

fn grant(access: &str, refresh: Option<&str>) -> CredentialGrant {
	let mut builder = CredentialGrant::builder()
		.access_token(access)
		.expires_at(macros::datetime!(2030-01-01 12:00 UTC))
		.scope(
			ScopeSet::new(["openid", "https://www.googleapis.com/auth/drive.file"])
				.expect("Scope fixture should be valid."),
		);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Grant fixture should build.")
}

fn record(owner: &PrincipalId, remote: &str, title: &str) -> ResourceRecord {
	ResourceRecord::new(
		owner.clone(),
		RemoteId::new(remote).expect("Remote id fixture should be valid."),
		None,
		DocumentDraft::new(title, "body").expect("Draft fixture should build."),
		OffsetDateTime::now_utc(),
	)
}

async fn relinking_without_refresh_token_keeps_the_stored_one(store: &dyn CredentialStore) {
	let owner = principal("user-relink");

	store.upsert(&owner, grant("access-1", Some("refresh-1"))).await.expect("First link.");

	let relinked =
		store.upsert(&owner, grant("access-2", None)).await.expect("Relink without refresh.");

	assert_eq!(relinked.access_token.expose(), "access-2");
	assert_eq!(relinked.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-1"));

	let relinked = store
		.upsert(&owner, grant("access-3", Some("refresh-2")))
		.await
		.expect("Relink with a new refresh token.");

	assert_eq!(relinked.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-2"));
}

async fn partial_updates_keep_unspecified_fields(store: &dyn CredentialStore) {
	let owner = principal("user-update");

	store.upsert(&owner, grant("access-1", Some("refresh-1"))).await.expect("Link.");

	let outcome = store
		.update_tokens(&owner, TokenUpdate::access(TokenSecret::new("access-2"), None))
		.await
		.expect("Update should succeed.");
	let UpdateOutcome::Updated(updated) = outcome else {
		panic!("Linked principal should be updated.");
	};

	assert_eq!(updated.access_token.expose(), "access-2");
	assert_eq!(updated.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-1"));
	assert_eq!(updated.scope.len(), 2);

	let fetched = store
		.fetch(&owner)
		.await
		.expect("Fetch should succeed.")
		.expect("Credential should remain present.");

	assert_eq!(fetched.access_token.expose(), "access-2");

	let missing = store
		.update_tokens(
			&principal("user-missing"),
			TokenUpdate::access(TokenSecret::new("access-x"), None),
		)
		.await
		.expect("Updating an unknown principal is not a backend failure.");

	assert!(matches!(missing, UpdateOutcome::Missing));
}

async fn records_require_a_linked_principal(
	credentials: &dyn CredentialStore,
	records: &dyn RecordStore,
) {
	let owner = principal("user-records");
	let stranger = principal("user-stranger");
	let err = records
		.insert_record(record(&stranger, "file-x", "Nope"))
		.await
		.expect_err("Records for unknown principals must be rejected.");

	assert!(matches!(err, StoreError::UnknownPrincipal { .. }));

	credentials.upsert(&owner, grant("access-1", Some("refresh-1"))).await.expect("Link.");

	let first = record(&owner, "file-1", "First");
	let second = record(&owner, "file-2", "Second");

	records.insert_record(first.clone()).await.expect("First insert.");
	records.insert_record(second.clone()).await.expect("Second insert.");

	let listed = records.records_for(&owner).await.expect("Listing should succeed.");

	assert_eq!(listed.iter().map(|r| r.remote_id.as_ref()).collect::<Vec<_>>(), ["file-1", "file-2"]);
	assert!(records.records_for(&stranger).await.expect("Listing should succeed.").is_empty());
}

#[tokio::test]
async fn memory_store_retains_refresh_tokens() {
	relinking_without_refresh_token_keeps_the_stored_one(&MemoryStore::default()).await;
}

#[tokio::test]
async fn memory_store_applies_partial_updates() {
	partial_updates_keep_unspecified_fields(&MemoryStore::default()).await;
}

#[tokio::test]
async fn memory_store_links_records_to_principals() {
	let store = MemoryStore::default();

	records_require_a_linked_principal(&store, &store).await;

	assert_eq!(store.record_count(), 2);
}

#[cfg(feature = "sqlite")]
mod sqlite {
	// self
	use super::*;
	use drive_delegate::store::SqliteStore;

	fn open() -> SqliteStore {
		SqliteStore::open_in_memory().expect("In-memory database should open.")
	}

	#[tokio::test]
	async fn sqlite_store_retains_refresh_tokens() {
		relinking_without_refresh_token_keeps_the_stored_one(&open()).await;
	}

	#[tokio::test]
	async fn sqlite_store_applies_partial_updates() {
		partial_updates_keep_unspecified_fields(&open()).await;
	}

	#[tokio::test]
	async fn sqlite_store_links_records_to_principals() {
		let store = open();

		records_require_a_linked_principal(&store, &store).await;
	}
}
