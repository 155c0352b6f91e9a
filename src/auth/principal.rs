//! Verified caller identity.

// self
use crate::{_prelude::*, auth::PrincipalId};

/// Identity of a human user as asserted by verified identity-token claims.
///
/// Values are only produced by [`IdentityVerifier`](crate::identity::IdentityVerifier) (or
/// test fixtures); request payloads never contribute fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
	/// Stable subject identifier.
	pub id: PrincipalId,
	/// Email claim, when the identity provider supplied one.
	pub email: Option<String>,
}
impl Principal {
	/// Creates a principal from already-verified claim values.
	pub fn new(id: PrincipalId, email: Option<String>) -> Self {
		Self { id, email: email.filter(|value| !value.is_empty()) }
	}
}
