//! Delegated document creation with a single forced-refresh retry.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, TokenSecret},
	drive::{DriveFile, DriveUploader, UploadError},
	flows::DriveDelegate,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	record::{DocumentDraft, ResourceRecord},
};

impl DriveDelegate {
	/// Creates `<title>.txt` in the principal's Drive and records it locally.
	///
	/// The title is validated before anything else happens. When the provider rejects the
	/// access token, the credential is force-refreshed and the upload retried exactly once; a
	/// second rejection yields [`Error::ReauthRequired`]. A failed local insert after a
	/// successful upload yields [`Error::RemoteWrite`] carrying the orphaned remote id.
	pub async fn create_document(
		&self,
		principal: &PrincipalId,
		title: &str,
		content: &str,
	) -> Result<ResourceRecord> {
		const KIND: FlowKind = FlowKind::CreateDocument;

		let span = FlowSpan::new(KIND, "create_document");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let draft = DocumentDraft::new(title, content)?;
				let access_token = self.ensure_valid(principal).await?;
				let file = self.upload_with_retry(principal, &draft, access_token).await?;
				let record = ResourceRecord::new(
					principal.clone(),
					file.id,
					file.web_view_link,
					draft,
					OffsetDateTime::now_utc(),
				);

				if let Err(e) = self.records.insert_record(record.clone()).await {
					obs::report_orphaned_remote(principal, &record.remote_id, &e);

					return Err(Error::RemoteWrite {
						reason: "document was created remotely but its local record could not be saved"
							.into(),
						remote_id: Some(record.remote_id),
						status: None,
						source: Some(Box::new(e)),
					});
				}

				Ok(record)
			})
			.await;

		obs::record_result(KIND, result)
	}

	async fn upload_with_retry(
		&self,
		principal: &PrincipalId,
		draft: &DocumentDraft,
		access_token: TokenSecret,
	) -> Result<DriveFile> {
		let uploader = DriveUploader {
			http_client: &self.http_client,
			endpoint: &self.descriptor.endpoints.upload,
			strategy: self.strategy.as_ref(),
		};

		match uploader.create(&access_token, draft).await {
			Ok(file) => return Ok(file),
			Err(UploadError::Failed(e)) => return Err(e),
			Err(UploadError::AuthRejected) => obs::report_rejected_token(principal),
		}

		let refreshed = self.force_refresh(principal, &access_token).await?;

		match uploader.create(&refreshed, draft).await {
			Ok(file) => Ok(file),
			Err(UploadError::Failed(e)) => Err(e),
			Err(UploadError::AuthRejected) =>
				Err(Error::reauth_required("provider rejected the refreshed access token")),
		}
	}
}
