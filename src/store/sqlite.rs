//! SQLite-backed store for deployments that need credentials and records to survive restarts.

// std
use std::path::Path;
// crates.io
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ffi, params};
// self
use crate::{
	_prelude::*,
	auth::{
		CredentialGrant, DelegatedCredential, PrincipalId, RecordId, RemoteId, ScopeSet,
		TokenSecret, TokenUpdate,
	},
	record::ResourceRecord,
	store::{CredentialStore, RecordStore, StoreError, StoreFuture, UpdateOutcome},
};

/// Schema DDL; idempotent thanks to `IF NOT EXISTS`.
const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS credentials (
    principal_id  TEXT PRIMARY KEY,
    email         TEXT,
    access_token  TEXT NOT NULL,
    refresh_token TEXT,
    expires_at    INTEGER,          -- unix seconds, NULL when the provider gave no expiry
    scope         TEXT NOT NULL,    -- space-delimited, normalized
    updated_at    INTEGER NOT NULL
);

-- Rows are never updated; deletes are an operator concern.
CREATE TABLE IF NOT EXISTS resource_records (
    record_id    TEXT PRIMARY KEY,
    principal_id TEXT NOT NULL REFERENCES credentials(principal_id),
    remote_id    TEXT NOT NULL,
    title        TEXT NOT NULL,
    content      TEXT NOT NULL,
    web_link     TEXT,
    created_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS resource_records_principal_idx ON resource_records(principal_id);
";
const UPSERT_CREDENTIAL: &str = "
INSERT INTO credentials
    (principal_id, access_token, refresh_token, expires_at, scope, updated_at, email)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(principal_id) DO UPDATE SET
    email         = COALESCE(NULLIF(excluded.email, ''), credentials.email),
    access_token  = excluded.access_token,
    refresh_token = COALESCE(NULLIF(excluded.refresh_token, ''), credentials.refresh_token),
    expires_at    = excluded.expires_at,
    scope         = excluded.scope,
    updated_at    = excluded.updated_at
";
const UPDATE_TOKENS: &str = "
UPDATE credentials SET
    access_token  = COALESCE(NULLIF(?2, ''), access_token),
    expires_at    = CASE WHEN NULLIF(?2, '') IS NULL THEN expires_at ELSE ?3 END,
    refresh_token = COALESCE(NULLIF(?4, ''), refresh_token),
    scope         = COALESCE(NULLIF(?5, ''), scope),
    updated_at    = ?6
WHERE principal_id = ?1
";
const SELECT_CREDENTIAL: &str = "
SELECT principal_id, access_token, refresh_token, expires_at, scope, updated_at, email
FROM credentials WHERE principal_id = ?1
";
const INSERT_RECORD: &str = "
INSERT INTO resource_records
    (record_id, principal_id, remote_id, title, content, web_link, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";
const SELECT_RECORDS: &str = "
SELECT record_id, principal_id, remote_id, title, content, web_link, created_at
FROM resource_records WHERE principal_id = ?1 ORDER BY created_at, rowid
";

/// Credential and record store backed by a single SQLite database.
///
/// Cloning is cheap; clones share one connection guarded by a mutex, so every statement
/// group runs atomically with respect to other callers.
#[derive(Clone)]
pub struct SqliteStore {
	conn: Arc<Mutex<Connection>>,
}
impl SqliteStore {
	/// Opens (or creates) a database at `path` and applies the schema.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		Self::init(Connection::open(path).map_err(backend)?)
	}

	/// Opens a private in-memory database.
	pub fn open_in_memory() -> Result<Self, StoreError> {
		Self::init(Connection::open_in_memory().map_err(backend)?)
	}

	fn init(conn: Connection) -> Result<Self, StoreError> {
		conn.execute_batch(SCHEMA).map_err(backend)?;

		Ok(Self { conn: Arc::new(Mutex::new(conn)) })
	}

	fn upsert_now(
		&self,
		principal: &PrincipalId,
		grant: CredentialGrant,
	) -> Result<DelegatedCredential, StoreError> {
		let mut conn = self.conn.lock();
		let tx = conn.transaction().map_err(backend)?;

		tx.execute(
			UPSERT_CREDENTIAL,
			params![
				principal.as_ref(),
				grant.access_token.expose(),
				grant.refresh_token.as_ref().map(TokenSecret::expose),
				grant.expires_at.map(OffsetDateTime::unix_timestamp),
				grant.scope.normalized(),
				OffsetDateTime::now_utc().unix_timestamp(),
				grant.email,
			],
		)
		.map_err(backend)?;

		let stored = select_credential(&tx, principal)?.ok_or_else(|| StoreError::Backend {
			message: format!("Credential for {principal} vanished during upsert"),
		})?;

		tx.commit().map_err(backend)?;

		Ok(stored)
	}

	fn update_now(
		&self,
		principal: &PrincipalId,
		update: TokenUpdate,
	) -> Result<UpdateOutcome, StoreError> {
		let mut conn = self.conn.lock();
		let tx = conn.transaction().map_err(backend)?;
		let changed = tx
			.execute(
				UPDATE_TOKENS,
				params![
					principal.as_ref(),
					update.access_token.as_ref().map(TokenSecret::expose),
					update.expires_at.map(OffsetDateTime::unix_timestamp),
					update.refresh_token.as_ref().map(TokenSecret::expose),
					update.scope.as_ref().map(ScopeSet::normalized),
					OffsetDateTime::now_utc().unix_timestamp(),
				],
			)
			.map_err(backend)?;

		if changed == 0 {
			return Ok(UpdateOutcome::Missing);
		}

		let outcome = match select_credential(&tx, principal)? {
			Some(credential) => UpdateOutcome::Updated(credential),
			None => UpdateOutcome::Missing,
		};

		tx.commit().map_err(backend)?;

		Ok(outcome)
	}

	fn insert_record_now(&self, record: &ResourceRecord) -> Result<(), StoreError> {
		let conn = self.conn.lock();

		conn.execute(
			INSERT_RECORD,
			params![
				record.id.as_ref(),
				record.principal.as_ref(),
				record.remote_id.as_ref(),
				record.title,
				record.content,
				record.web_link,
				record.created_at.unix_timestamp(),
			],
		)
		.map(|_| ())
		.map_err(|e| match e {
			rusqlite::Error::SqliteFailure(ref failure, _)
				if failure.code == ErrorCode::ConstraintViolation
					&& failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
				StoreError::UnknownPrincipal { principal: record.principal.to_string() },
			other => backend(other),
		})
	}

	fn records_now(&self, principal: &PrincipalId) -> Result<Vec<ResourceRecord>, StoreError> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare(SELECT_RECORDS).map_err(backend)?;
		let rows = stmt.query_map(params![principal.as_ref()], RawRecord::from_row).map_err(backend)?;
		let mut records = Vec::new();

		for row in rows {
			records.push(row.map_err(backend)?.decode()?);
		}

		Ok(records)
	}
}
impl Debug for SqliteStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SqliteStore(..)")
	}
}
impl CredentialStore for SqliteStore {
	fn upsert<'a>(
		&'a self,
		principal: &'a PrincipalId,
		grant: CredentialGrant,
	) -> StoreFuture<'a, DelegatedCredential> {
		Box::pin(async move { self.upsert_now(principal, grant) })
	}

	fn fetch<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> StoreFuture<'a, Option<DelegatedCredential>> {
		Box::pin(async move { select_credential(&self.conn.lock(), principal) })
	}

	fn update_tokens<'a>(
		&'a self,
		principal: &'a PrincipalId,
		update: TokenUpdate,
	) -> StoreFuture<'a, UpdateOutcome> {
		Box::pin(async move { self.update_now(principal, update) })
	}
}
impl RecordStore for SqliteStore {
	fn insert_record(&self, record: ResourceRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.insert_record_now(&record) })
	}

	fn records_for<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> StoreFuture<'a, Vec<ResourceRecord>> {
		Box::pin(async move { self.records_now(principal) })
	}
}

struct RawCredential {
	principal: String,
	access_token: String,
	refresh_token: Option<String>,
	expires_at: Option<i64>,
	scope: String,
	updated_at: i64,
	email: Option<String>,
}
impl RawCredential {
	fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
		Ok(Self {
			principal: row.get(0)?,
			access_token: row.get(1)?,
			refresh_token: row.get(2)?,
			expires_at: row.get(3)?,
			scope: row.get(4)?,
			updated_at: row.get(5)?,
			email: row.get(6)?,
		})
	}

	fn decode(self) -> Result<DelegatedCredential, StoreError> {
		Ok(DelegatedCredential {
			principal: PrincipalId::new(&self.principal).map_err(serialization)?,
			email: self.email.filter(|value| !value.is_empty()),
			access_token: TokenSecret::new(self.access_token),
			refresh_token: self.refresh_token.and_then(TokenSecret::non_empty),
			expires_at: self.expires_at.map(decode_instant).transpose()?,
			scope: ScopeSet::from_delimited(&self.scope).map_err(serialization)?,
			updated_at: decode_instant(self.updated_at)?,
		})
	}
}

struct RawRecord {
	id: String,
	principal: String,
	remote_id: String,
	title: String,
	content: String,
	web_link: Option<String>,
	created_at: i64,
}
impl RawRecord {
	fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
		Ok(Self {
			id: row.get(0)?,
			principal: row.get(1)?,
			remote_id: row.get(2)?,
			title: row.get(3)?,
			content: row.get(4)?,
			web_link: row.get(5)?,
			created_at: row.get(6)?,
		})
	}

	fn decode(self) -> Result<ResourceRecord, StoreError> {
		Ok(ResourceRecord {
			id: RecordId::new(&self.id).map_err(serialization)?,
			principal: PrincipalId::new(&self.principal).map_err(serialization)?,
			remote_id: RemoteId::new(&self.remote_id).map_err(serialization)?,
			title: self.title,
			content: self.content,
			web_link: self.web_link,
			created_at: decode_instant(self.created_at)?,
		})
	}
}

fn select_credential(
	conn: &Connection,
	principal: &PrincipalId,
) -> Result<Option<DelegatedCredential>, StoreError> {
	conn.query_row(SELECT_CREDENTIAL, params![principal.as_ref()], RawCredential::from_row)
		.optional()
		.map_err(backend)?
		.map(RawCredential::decode)
		.transpose()
}

fn decode_instant(secs: i64) -> Result<OffsetDateTime, StoreError> {
	OffsetDateTime::from_unix_timestamp(secs).map_err(serialization)
}

fn backend(e: rusqlite::Error) -> StoreError {
	StoreError::Backend { message: e.to_string() }
}

fn serialization(e: impl Display) -> StoreError {
	StoreError::Serialization { message: e.to_string() }
}
