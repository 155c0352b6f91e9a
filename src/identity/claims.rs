//! Claims read from a verified identity token.

// self
use crate::{
	_prelude::*,
	auth::{Principal, PrincipalId},
};

/// Subset of identity-token claims the delegate consumes.
///
/// `exp`, `iss`, and `aud` are checked by the verifier and are not kept here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
	/// Stable subject identifier.
	pub sub: String,
	/// Email address, when the identity provider released one.
	#[serde(default)]
	pub email: Option<String>,
}
impl IdentityClaims {
	/// Converts verified claims into a [`Principal`].
	pub fn into_principal(self) -> Result<Principal> {
		let id = PrincipalId::new(&self.sub)
			.map_err(|e| Error::unauthenticated(format!("identity token subject is invalid: {e}")))?;

		Ok(Principal::new(id, self.email))
	}
}
