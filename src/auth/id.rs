//! Validated identifiers for authorization servers and slug namespaces.
//!
//! Both appear inside store and cache keys, so each kind restricts its alphabet up front instead
//! of escaping later.

// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 64;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier kind.
		kind: &'static str,
	},
	/// A character outside the kind's alphabet was found.
	#[error("{kind} identifier cannot contain {found:?}.")]
	InvalidCharacter {
		/// Identifier kind.
		kind: &'static str,
		/// First offending character.
		found: char,
	},
	/// The identifier is longer than [`IDENTIFIER_MAX_LEN`] bytes.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Identifier kind.
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

macro_rules! identifier {
	($(#[$meta:meta])* $name:ident, kind = $kind:literal, accepts = $accepts:path) => {
		$(#[$meta])*
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `value` and wraps it.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				check($kind, &value, $accepts)?;

				Ok(Self(value))
			}

			/// Borrows the raw identifier.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({:?})", stringify!($name), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

identifier! {
	/// Names one authorization server configuration.
	ProviderId, kind = "Provider", accepts = is_provider_char
}
identifier! {
	/// Entity set whose slugs must stay unique, such as one table.
	SlugNamespace, kind = "Slug namespace", accepts = is_namespace_char
}

fn is_provider_char(ch: char) -> bool {
	ch.is_ascii_graphic() && ch != ':'
}

fn is_namespace_char(ch: char) -> bool {
	ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '-' | '_' | '.')
}

fn check(kind: &'static str, value: &str, accepts: fn(char) -> bool) -> Result<(), IdentifierError> {
	if value.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if let Some(found) = value.chars().find(|&ch| !accepts(ch)) {
		return Err(IdentifierError::InvalidCharacter { kind, found });
	}
	if value.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn namespaces_are_lowercase_key_safe() {
		assert!(SlugNamespace::new("meeting_notes.v2").is_ok());
		assert_eq!(SlugNamespace::new(""), Err(IdentifierError::Empty { kind: "Slug namespace" }));
		assert_eq!(
			SlugNamespace::new("Notes"),
			Err(IdentifierError::InvalidCharacter { kind: "Slug namespace", found: 'N' })
		);
		assert!(SlugNamespace::new("a:b").is_err());
		assert!(SlugNamespace::new("x".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn provider_ids_validate_through_serde() {
		let provider: ProviderId =
			serde_json::from_str("\"Records-Cloud\"").expect("Provider should deserialize.");

		assert_eq!(provider.as_str(), "Records-Cloud");
		assert_eq!(format!("{provider:?}"), "ProviderId(\"Records-Cloud\")");
		assert!(serde_json::from_str::<ProviderId>("\"with space\"").is_err());
	}
}
