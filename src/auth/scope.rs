//! Scope modeling for delegated credentials.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized set of OAuth scopes granted to a delegated credential.
///
/// Scopes are deduplicated and sorted so equality and hashing do not depend on the order a
/// provider happened to report them in.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(Self { scopes: normalize(scopes)? })
	}

	/// Parses the space-delimited form used by token endpoints and storage columns.
	pub fn from_delimited(raw: &str) -> Result<Self, ScopeValidationError> {
		Self::new(raw.split_whitespace())
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(|s| s.as_str())
	}

	/// Returns the normalized string representation (space-delimited).
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::from_delimited(s)
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	const DRIVE_FILE: &str = "https://www.googleapis.com/auth/drive.file";

	#[test]
	fn provider_scope_strings_normalize() {
		let reported = ScopeSet::from_delimited(&format!("openid {DRIVE_FILE}  openid"))
			.expect("Provider scope string should parse.");
		let stored =
			ScopeSet::new([DRIVE_FILE, "openid"]).expect("Stored scope list should be valid.");

		assert_eq!(reported, stored);
		assert_eq!(reported.len(), 2);
		assert!(reported.contains(DRIVE_FILE));
		assert_eq!(reported.normalized(), format!("{DRIVE_FILE} openid"));
	}

	#[test]
	fn hashing_ignores_reported_order() {
		let mut seen = HashSet::new();

		seen.insert(ScopeSet::from_delimited("openid email").expect("Scope fixture should parse."));

		assert!(seen.contains(&ScopeSet::new(["email", "openid"]).expect("Scope fixture.")));
		assert!(!seen.contains(&ScopeSet::new(["email"]).expect("Scope fixture.")));
	}

	#[test]
	fn blank_and_padded_scopes_are_rejected() {
		assert!(ScopeSet::new([""]).is_err());
		assert!(matches!(
			ScopeSet::new([" drive "]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert!(ScopeSet::from_str("").expect("Empty input is an empty set.").is_empty());
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn serde_uses_scope_lists() {
		let scope = ScopeSet::from_delimited("b a").expect("Scope fixture should parse.");
		let payload = serde_json::to_string(&scope).expect("Scope set should serialize.");

		assert_eq!(payload, "[\"a\",\"b\"]");
		assert!(serde_json::from_str::<ScopeSet>("[\"has space\"]").is_err());
	}
}
