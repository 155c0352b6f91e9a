//! Request-level entry points: verify the caller, then run one delegate operation.
//!
//! Routing, CORS, and process setup belong to the embedding server. Handlers pass the raw
//! `Authorization` header and the decoded JSON body; [`Error::kind`] tells them which response
//! to send on failure.

// self
use crate::{
	_prelude::*,
	auth::{CredentialGrant, RecordId, ScopeSet},
	flows::DriveDelegate,
	identity::IdentityVerifier,
};

/// Body of a "link my Drive" request.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTokensRequest {
	/// Access token obtained by the client-side consent flow.
	pub access_token: String,
	/// Refresh token, when the consent flow issued one.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Access token lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Space-delimited granted scopes.
	#[serde(default)]
	pub scope: Option<String>,
}
impl StoreTokensRequest {
	fn into_grant(self, email: Option<String>) -> Result<CredentialGrant> {
		let mut builder =
			CredentialGrant::builder().access_token(self.access_token).email(email);

		if let Some(refresh) = self.refresh_token {
			builder = builder.refresh_token(refresh);
		}
		if let Some(secs) = self.expires_in {
			builder = builder.expires_in(Duration::seconds(secs));
		}
		if let Some(scope) = self.scope {
			builder = builder.scope(ScopeSet::from_delimited(&scope).map_err(invalid_input)?);
		}

		builder.build().map_err(invalid_input)
	}
}
impl Debug for StoreTokensRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StoreTokensRequest")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Body of a "save this document" request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateDocumentRequest {
	/// Document title; becomes `<title>.txt`.
	pub title: String,
	/// Plain-text body.
	#[serde(default)]
	pub content: String,
}

/// Successful "save this document" response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentResponse {
	/// Browser link to the created file, when Drive returned one.
	pub drive_link: Option<String>,
	/// Local record identifier.
	pub record_id: RecordId,
}

/// Identity verification in front of a [`DriveDelegate`].
#[derive(Clone, Debug)]
pub struct DelegateService {
	verifier: IdentityVerifier,
	delegate: DriveDelegate,
}
impl DelegateService {
	/// Pairs a verifier with the delegate it guards.
	pub fn new(verifier: IdentityVerifier, delegate: DriveDelegate) -> Self {
		Self { verifier, delegate }
	}

	/// The wrapped delegate.
	pub fn delegate(&self) -> &DriveDelegate {
		&self.delegate
	}

	/// Stores the caller's delegated credential.
	pub async fn store_tokens(
		&self,
		authorization: Option<&str>,
		request: StoreTokensRequest,
	) -> Result<()> {
		let principal = self.verifier.verify_header(authorization).await?;
		let grant = request.into_grant(principal.email)?;

		self.delegate.store_credential(&principal.id, grant).await?;

		Ok(())
	}

	/// Creates a document in the caller's Drive.
	pub async fn create_document(
		&self,
		authorization: Option<&str>,
		request: CreateDocumentRequest,
	) -> Result<CreateDocumentResponse> {
		let principal = self.verifier.verify_header(authorization).await?;
		let record =
			self.delegate.create_document(&principal.id, &request.title, &request.content).await?;

		Ok(CreateDocumentResponse { drive_link: record.web_link, record_id: record.id })
	}
}

fn invalid_input(e: impl Display) -> Error {
	Error::InvalidInput { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_requests_use_client_field_names() {
		let request: StoreTokensRequest = serde_json::from_str(
			r#"{"accessToken":"ya29.a","refreshToken":"1//r","expiresIn":3599,"scope":"openid https://www.googleapis.com/auth/drive.file"}"#,
		)
		.expect("Client payload should deserialize.");
		let grant = request.into_grant(None).expect("Payload should convert.");

		assert_eq!(grant.access_token.expose(), "ya29.a");
		assert!(grant.refresh_token.is_some());
		assert!(grant.expires_at.is_some());
		assert_eq!(grant.scope.len(), 2);
	}

	#[test]
	fn token_requests_reject_bad_values() {
		for body in [
			r#"{"accessToken":""}"#,
			r#"{"accessToken":"a","expiresIn":0}"#,
		] {
			let request: StoreTokensRequest =
				serde_json::from_str(body).expect("Payload shape is valid.");
			let err = request.into_grant(None).expect_err("Values must be rejected.");

			assert!(matches!(err, Error::InvalidInput { .. }), "Unexpected error for {body}.");
		}

		let minimal: StoreTokensRequest =
			serde_json::from_str(r#"{"accessToken":"a"}"#).expect("Payload shape is valid.");
		let grant = minimal.into_grant(None).expect("Expiry and refresh token are optional.");

		assert!(grant.expires_at.is_none());
		assert!(grant.refresh_token.is_none());
	}

	#[test]
	fn debug_redacts_request_tokens() {
		let request = StoreTokensRequest {
			access_token: "ya29.secret".into(),
			refresh_token: Some("1//secret".into()),
			expires_in: None,
			scope: None,
		};

		assert!(!format!("{request:?}").contains("secret"));
	}

	#[test]
	fn responses_use_client_field_names() {
		let response = CreateDocumentResponse {
			drive_link: Some("https://drive.google.com/file/d/x/view".into()),
			record_id: RecordId::new("rec_1").expect("Record fixture should be valid."),
		};
		let json = serde_json::to_string(&response).expect("Response should serialize.");

		assert!(json.contains("\"driveLink\""));
		assert!(json.contains("\"recordId\":\"rec_1\""));
	}
}
