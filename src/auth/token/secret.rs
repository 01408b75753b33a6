//! Bearer material that stays out of logs.

// self
use crate::_prelude::*;

const REDACTED: &str = "<redacted>";

/// Access token, refresh token, or PKCE verifier.
///
/// Clones share one allocation, so handing the same token to many waiting callers is cheap.
/// `Debug` and `Display` never print the value; only [`expose`](Self::expose) and the serde
/// representation (used for persistence) do.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(Arc<str>);
impl TokenSecret {
	/// Wraps `value`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(Arc::from(value.into()))
	}

	/// Raw value, for the wire only.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// `Bearer <token>` header value.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({REDACTED})")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn only_expose_and_serde_reveal_the_value() {
		let secret = TokenSecret::new("tok_live_123");
		let copy = secret.clone();

		assert_eq!(format!("{secret:?} {secret}"), "TokenSecret(<redacted>) <redacted>");
		assert_eq!(copy.bearer_header(), "Bearer tok_live_123");
		assert_eq!(serde_json::to_string(&secret).expect("Secret should serialize."), "\"tok_live_123\"");
		assert_eq!(
			serde_json::from_str::<TokenSecret>("\"tok_live_123\"").expect("Secret should parse."),
			secret
		);
	}
}
