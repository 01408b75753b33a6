//! Scope sets requested from, and granted by, the authorization server.

// std
use std::collections::BTreeSet;
// self
use crate::_prelude::*;

/// Rejection reasons for a single scope entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// An entry was the empty string.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// An entry had whitespace inside it, which would split it on the wire.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// Offending entry.
		scope: String,
	},
}

/// Ordered, duplicate-free scopes.
///
/// Two sets compare equal whatever order the entries arrived in. Serialized as a JSON array.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet(Arc<BTreeSet<String>>);
impl ScopeSet {
	/// Validates every entry and collects them.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		scopes
			.into_iter()
			.map(|scope| {
				let scope = scope.into();

				if scope.is_empty() {
					Err(ScopeValidationError::Empty)
				} else if scope.contains(char::is_whitespace) {
					Err(ScopeValidationError::ContainsWhitespace { scope })
				} else {
					Ok(scope)
				}
			})
			.collect::<Result<BTreeSet<_>, _>>()
			.map(|set| Self(Arc::new(set)))
	}

	/// Splits each raw entry on `delimiter`, skipping blanks.
	///
	/// Token endpoints echo grants either as one delimited string or as separate entries.
	pub fn split<'a>(
		raw: impl IntoIterator<Item = &'a str>,
		delimiter: char,
	) -> Result<Self, ScopeValidationError> {
		Self::new(
			raw.into_iter()
				.flat_map(|entry| entry.split(delimiter))
				.map(str::trim)
				.filter(|scope| !scope.is_empty()),
		)
	}

	/// Number of scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether no scopes are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Membership test.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.contains(scope)
	}

	/// Scopes in ascending order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Wire form joined by `delimiter`; `None` for an empty set.
	pub fn join(&self, delimiter: char) -> Option<String> {
		let mut scopes = self.iter();
		let mut joined = scopes.next()?.to_owned();

		for scope in scopes {
			joined.push(delimiter);
			joined.push_str(scope);
		}

		Some(joined)
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.iter()).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.join(' ').unwrap_or_default())
	}
}
impl TryFrom<Vec<String>> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(scopes: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(scopes)
	}
}
impl From<ScopeSet> for Vec<String> {
	fn from(set: ScopeSet) -> Self {
		set.iter().map(str::to_owned).collect()
	}
}
