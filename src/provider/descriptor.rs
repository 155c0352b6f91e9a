//! Provider descriptor data structures shared by the refresh and document flows.

/// Builder API for assembling provider descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, auth::ProviderId};

const GOOGLE_DRIVE_ID: &str = "google-drive";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_DRIVE_UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Token endpoint used for refreshes.
	pub token: Url,
	/// Multipart upload endpoint used to create documents.
	pub upload: Url,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Google OAuth token endpoint plus the Drive v3 upload endpoint.
	///
	/// Google expects web-application clients to send their secret in the form body.
	pub fn google_drive() -> Result<Self, ProviderDescriptorError> {
		let id = ProviderId::new(GOOGLE_DRIVE_ID).map_err(|_| {
			ProviderDescriptorError::InvalidPreset { value: GOOGLE_DRIVE_ID.to_owned() }
		})?;

		Self::builder(id)
			.token_endpoint(parse_preset(GOOGLE_TOKEN_ENDPOINT)?)
			.upload_endpoint(parse_preset(GOOGLE_DRIVE_UPLOAD_ENDPOINT)?)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
	}
}

fn parse_preset(raw: &'static str) -> Result<Url, ProviderDescriptorError> {
	Url::parse(raw).map_err(|_| ProviderDescriptorError::InvalidPreset { value: raw.to_owned() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn google_drive_preset_is_valid() {
		let descriptor = ProviderDescriptor::google_drive().expect("Preset should validate.");

		assert_eq!(descriptor.id.as_ref(), GOOGLE_DRIVE_ID);
		assert_eq!(descriptor.endpoints.token.as_str(), GOOGLE_TOKEN_ENDPOINT);
		assert_eq!(descriptor.endpoints.upload.host_str(), Some("www.googleapis.com"));
		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
	}

	#[test]
	fn descriptors_round_trip_through_config_json() {
		let descriptor = ProviderDescriptor::google_drive().expect("Preset should validate.");
		let json = serde_json::to_string(&descriptor).expect("Descriptor should serialize.");

		assert!(json.contains("\"client_secret_post\""));

		let parsed: ProviderDescriptor =
			serde_json::from_str(&json).expect("Descriptor should deserialize.");

		assert_eq!(parsed, descriptor);
	}
}
