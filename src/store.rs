//! Storage contracts and built-in store implementations for delegated credentials and
//! resource records.

pub mod memory;
#[cfg(feature = "sqlite")] pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")] pub use sqlite::SqliteStore;

// self
use crate::{
	_prelude::*,
	auth::{CredentialGrant, DelegatedCredential, PrincipalId, TokenUpdate},
	record::ResourceRecord,
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable mapping from principal to its single delegated credential.
///
/// Every write is atomic for one principal: concurrent readers observe either the previous or
/// the new row, never a mix.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Inserts or replaces the principal's credential.
	///
	/// When the grant carries no refresh token the stored one is retained.
	fn upsert<'a>(
		&'a self,
		principal: &'a PrincipalId,
		grant: CredentialGrant,
	) -> StoreFuture<'a, DelegatedCredential>;

	/// Fetches the principal's credential, if present.
	fn fetch<'a>(&'a self, principal: &'a PrincipalId)
	-> StoreFuture<'a, Option<DelegatedCredential>>;

	/// Applies a provider-issued partial update with the same retention rule as
	/// [`upsert`](Self::upsert).
	fn update_tokens<'a>(
		&'a self,
		principal: &'a PrincipalId,
		update: TokenUpdate,
	) -> StoreFuture<'a, UpdateOutcome>;
}

/// Append-only storage for [`ResourceRecord`] rows.
pub trait RecordStore
where
	Self: Send + Sync,
{
	/// Persists a newly created record.
	fn insert_record(&self, record: ResourceRecord) -> StoreFuture<'_, ()>;

	/// Lists a principal's records, oldest first.
	fn records_for<'a>(&'a self, principal: &'a PrincipalId)
	-> StoreFuture<'a, Vec<ResourceRecord>>;
}

/// Result of a [`CredentialStore::update_tokens`] call.
#[derive(Clone, Debug)]
pub enum UpdateOutcome {
	/// The credential existed and now holds the returned values.
	Updated(DelegatedCredential),
	/// No credential exists for the principal.
	Missing,
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization or decoding failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A record references a principal without a credential row.
	#[error("Principal {principal} has no credential row.")]
	UnknownPrincipal {
		/// Principal the write referenced.
		principal: String,
	},
}
