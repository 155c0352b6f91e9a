//! Drive v3 multipart upload client.
//!
//! One call creates one plain-text file: a `multipart/related` body carrying JSON metadata
//! (`name`, `mimeType`) followed by the content, posted to the descriptor's upload endpoint
//! with `uploadType=multipart&fields=id,webViewLink`.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use reqwest::header::CONTENT_TYPE;
// self
use crate::{
	_prelude::*,
	auth::{RemoteId, TokenSecret},
	http::ReqwestHttpClient,
	provider::{ApiErrorKind, ProviderCall, ProviderErrorContext, ProviderStrategy},
	record::DocumentDraft,
};

const DOCUMENT_MIME: &str = "text/plain";
const RESPONSE_FIELDS: &str = "id,webViewLink";
const BOUNDARY_PREFIX: &str = "drive_delegate_";
const BOUNDARY_RANDOM_LEN: usize = 32;

/// File metadata returned by the upload endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveFile {
	/// Identifier Drive assigned to the new file.
	pub id: RemoteId,
	/// Browser link to the file, when Drive returned one.
	pub web_view_link: Option<String>,
}

/// Failure of a single upload attempt.
#[derive(Debug)]
pub(crate) enum UploadError {
	/// The provider rejected the access token.
	AuthRejected,
	/// Any failure a token refresh would not fix.
	Failed(Error),
}

/// Borrowed view over the pieces an upload needs.
pub(crate) struct DriveUploader<'a> {
	pub(crate) http_client: &'a ReqwestHttpClient,
	pub(crate) endpoint: &'a Url,
	pub(crate) strategy: &'a dyn ProviderStrategy,
}
impl DriveUploader<'_> {
	pub(crate) async fn create(
		&self,
		access_token: &TokenSecret,
		draft: &DocumentDraft,
	) -> Result<DriveFile, UploadError> {
		let boundary = multipart_boundary();
		let body = multipart_body(&boundary, draft).map_err(UploadError::Failed)?;
		let mut url = self.endpoint.clone();

		url.query_pairs_mut()
			.append_pair("uploadType", "multipart")
			.append_pair("fields", RESPONSE_FIELDS);

		let response = self
			.http_client
			.post(url)
			.bearer_auth(access_token.expose())
			.header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
			.body(body)
			.send()
			.await
			.map_err(|e| UploadError::Failed(transport_failure(e)))?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(|e| UploadError::Failed(transport_failure(e)))?;

		if !status.is_success() {
			return Err(self.classify_failure(status.as_u16(), &bytes));
		}

		parse_created_file(&bytes, status.as_u16()).map_err(UploadError::Failed)
	}

	fn classify_failure(&self, status: u16, body: &[u8]) -> UploadError {
		let preview = String::from_utf8_lossy(body);
		let mut ctx = ProviderErrorContext::new(ProviderCall::DocumentCreate)
			.with_http_status(status)
			.with_body_preview(preview.as_ref());

		if let Ok(envelope) = serde_json::from_slice::<ApiErrorEnvelope>(body) {
			if let Some(api_status) = envelope.error.status {
				ctx = ctx.with_oauth_error(api_status);
			}
			if let Some(message) = envelope.error.message {
				ctx = ctx.with_error_description(message);
			}
		}

		match self.strategy.classify_api_error(&ctx) {
			ApiErrorKind::AuthRejected => UploadError::AuthRejected,
			ApiErrorKind::Failed => UploadError::Failed(Error::RemoteWrite {
				reason: match ctx.error_description {
					Some(message) => format!("upload endpoint returned HTTP {status}: {message}"),
					None => format!("upload endpoint returned HTTP {status}"),
				},
				remote_id: None,
				status: Some(status),
				source: None,
			}),
		}
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
	name: String,
	mime_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedFile {
	id: String,
	#[serde(default)]
	web_view_link: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
	error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
	#[serde(default)]
	status: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

fn multipart_boundary() -> String {
	let suffix: String = rand::rng()
		.sample_iter(&Alphanumeric)
		.take(BOUNDARY_RANDOM_LEN)
		.map(char::from)
		.collect();

	format!("{BOUNDARY_PREFIX}{suffix}")
}

fn multipart_body(boundary: &str, draft: &DocumentDraft) -> Result<String> {
	let metadata = serde_json::to_string(&FileMetadata {
		name: draft.file_name(),
		mime_type: DOCUMENT_MIME,
	})
	.map_err(|e| Error::RemoteWrite {
		reason: "file metadata could not be encoded".into(),
		remote_id: None,
		status: None,
		source: Some(Box::new(e)),
	})?;

	Ok(format!(
		"--{boundary}\r\n\
		 Content-Type: application/json; charset=UTF-8\r\n\r\n\
		 {metadata}\r\n\
		 --{boundary}\r\n\
		 Content-Type: {DOCUMENT_MIME}; charset=UTF-8\r\n\r\n\
		 {content}\r\n\
		 --{boundary}--\r\n",
		content = draft.content,
	))
}

fn parse_created_file(body: &[u8], status: u16) -> Result<DriveFile> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);
	let created: CreatedFile =
		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| Error::RemoteWrite {
			reason: "upload endpoint returned an unreadable body".into(),
			remote_id: None,
			status: Some(status),
			source: Some(Box::new(e)),
		})?;
	let id = RemoteId::new(&created.id).map_err(|e| Error::RemoteWrite {
		reason: "upload endpoint returned an invalid file id".into(),
		remote_id: None,
		status: Some(status),
		source: Some(Box::new(e)),
	})?;

	Ok(DriveFile { id, web_view_link: created.web_view_link.filter(|link| !link.is_empty()) })
}

fn transport_failure(err: ReqwestError) -> Error {
	let reason = if err.is_timeout() {
		"upload request timed out".to_owned()
	} else {
		"upload request could not be completed".to_owned()
	};

	Error::RemoteWrite {
		reason,
		remote_id: None,
		status: err.status().map(|code| code.as_u16()),
		source: Some(Box::new(err)),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn multipart_body_carries_metadata_and_content() {
		let draft = DocumentDraft::new("Dear Ada", "Hello\nthere").expect("Draft should build.");
		let boundary = multipart_boundary();
		let body = multipart_body(&boundary, &draft).expect("Body should encode.");

		assert!(boundary.starts_with(BOUNDARY_PREFIX));
		assert_eq!(boundary.len(), BOUNDARY_PREFIX.len() + BOUNDARY_RANDOM_LEN);
		assert!(body.starts_with(&format!("--{boundary}\r\n")));
		assert!(body.contains(r#"{"name":"Dear Ada.txt","mimeType":"text/plain"}"#));
		assert!(body.contains("\r\n\r\nHello\nthere\r\n"));
		assert!(body.ends_with(&format!("--{boundary}--\r\n")));
	}

	#[test]
	fn created_file_parsing_requires_an_id() {
		let file = parse_created_file(br#"{"id":"file-1","webViewLink":"https://drive/x"}"#, 200)
			.expect("Well-formed bodies should parse.");

		assert_eq!(file.id.as_ref(), "file-1");
		assert_eq!(file.web_view_link.as_deref(), Some("https://drive/x"));

		for body in [&br#"{"webViewLink":"x"}"#[..], br#"{"id":""}"#, b"<html>"] {
			let err = parse_created_file(body, 200).expect_err("Unusable bodies must fail.");

			assert!(matches!(err, Error::RemoteWrite { remote_id: None, status: Some(200), .. }));
		}
	}
}
