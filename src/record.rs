//! Local references to documents created in the remote store.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, RecordId, RemoteId},
};

const FILE_EXTENSION: &str = ".txt";

/// Validated document payload about to be written remotely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDraft {
	/// User-facing title (trimmed).
	pub title: String,
	/// Plain-text body.
	pub content: String,
}
impl DocumentDraft {
	/// Validates the title and captures the payload.
	pub fn new(title: impl AsRef<str>, content: impl Into<String>) -> Result<Self> {
		let title = title.as_ref().trim();

		if title.is_empty() {
			return Err(Error::InvalidInput { reason: "document title cannot be empty".into() });
		}

		Ok(Self { title: title.to_owned(), content: content.into() })
	}

	/// Remote object name derived from the title.
	pub fn file_name(&self) -> String {
		format!("{}{FILE_EXTENSION}", self.title)
	}
}

/// One successful delegated write; immutable once persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
	/// Local identifier.
	pub id: RecordId,
	/// Principal the document was written for.
	pub principal: PrincipalId,
	/// Identifier the remote store assigned.
	pub remote_id: RemoteId,
	/// Document title.
	pub title: String,
	/// Document body.
	pub content: String,
	/// Viewable link returned by the remote store, when it supplied one.
	pub web_link: Option<String>,
	/// Creation instant.
	pub created_at: OffsetDateTime,
}
impl ResourceRecord {
	/// Creates a record for a remote object produced from `draft`.
	pub fn new(
		principal: PrincipalId,
		remote_id: RemoteId,
		web_link: Option<String>,
		draft: DocumentDraft,
		created_at: OffsetDateTime,
	) -> Self {
		Self {
			id: RecordId::generate(),
			principal,
			remote_id,
			title: draft.title,
			content: draft.content,
			web_link,
			created_at,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn drafts_require_a_title() {
		assert!(matches!(DocumentDraft::new("  ", "body"), Err(Error::InvalidInput { .. })));

		let draft = DocumentDraft::new(" Dear Ada ", "Hello").expect("Titled draft is valid.");

		assert_eq!(draft.title, "Dear Ada");
		assert_eq!(draft.file_name(), "Dear Ada.txt");
	}
}
