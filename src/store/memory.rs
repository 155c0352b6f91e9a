//! Thread-safe in-memory store for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{CredentialGrant, DelegatedCredential, PrincipalId, TokenUpdate},
	record::ResourceRecord,
	store::{CredentialStore, RecordStore, StoreError, StoreFuture, UpdateOutcome},
};

type CredentialMap = Arc<RwLock<HashMap<PrincipalId, DelegatedCredential>>>;
type RecordLog = Arc<RwLock<Vec<ResourceRecord>>>;

/// Storage backend that keeps credentials and records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	credentials: CredentialMap,
	records: RecordLog,
}
impl MemoryStore {
	/// Number of stored records across all principals.
	pub fn record_count(&self) -> usize {
		self.records.read().len()
	}

	fn upsert_now(
		map: CredentialMap,
		principal: PrincipalId,
		grant: CredentialGrant,
	) -> DelegatedCredential {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get_mut(&principal) {
			Some(existing) => {
				existing.replace_with(grant, now);

				existing.clone()
			},
			None => {
				let credential = DelegatedCredential::from_grant(principal.clone(), grant, now);

				guard.insert(principal, credential.clone());

				credential
			},
		}
	}

	fn update_now(map: CredentialMap, principal: PrincipalId, update: TokenUpdate) -> UpdateOutcome {
		let mut guard = map.write();

		match guard.get_mut(&principal) {
			Some(existing) => {
				existing.apply_update(update, OffsetDateTime::now_utc());

				UpdateOutcome::Updated(existing.clone())
			},
			None => UpdateOutcome::Missing,
		}
	}

	fn insert_record_now(
		map: CredentialMap,
		log: RecordLog,
		record: ResourceRecord,
	) -> Result<(), StoreError> {
		if !map.read().contains_key(&record.principal) {
			return Err(StoreError::UnknownPrincipal { principal: record.principal.to_string() });
		}

		log.write().push(record);

		Ok(())
	}
}
impl CredentialStore for MemoryStore {
	fn upsert<'a>(
		&'a self,
		principal: &'a PrincipalId,
		grant: CredentialGrant,
	) -> StoreFuture<'a, DelegatedCredential> {
		let map = self.credentials.clone();
		let principal = principal.to_owned();

		Box::pin(async move { Ok(Self::upsert_now(map, principal, grant)) })
	}

	fn fetch<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> StoreFuture<'a, Option<DelegatedCredential>> {
		let map = self.credentials.clone();

		Box::pin(async move { Ok(map.read().get(principal).cloned()) })
	}

	fn update_tokens<'a>(
		&'a self,
		principal: &'a PrincipalId,
		update: TokenUpdate,
	) -> StoreFuture<'a, UpdateOutcome> {
		let map = self.credentials.clone();
		let principal = principal.to_owned();

		Box::pin(async move { Ok(Self::update_now(map, principal, update)) })
	}
}
impl RecordStore for MemoryStore {
	fn insert_record(&self, record: ResourceRecord) -> StoreFuture<'_, ()> {
		let map = self.credentials.clone();
		let log = self.records.clone();

		Box::pin(async move { Self::insert_record_now(map, log, record) })
	}

	fn records_for<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> StoreFuture<'a, Vec<ResourceRecord>> {
		let log = self.records.clone();

		Box::pin(async move {
			Ok(log.read().iter().filter(|record| &record.principal == principal).cloned().collect())
		})
	}
}
