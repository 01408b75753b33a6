//! Single-use PKCE material held between "authorization requested" and "callback received".

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Verifier + CSRF nonce persisted in the scratch store while the user is at the authorize page.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
	/// PKCE code verifier; only ever sent to the token endpoint.
	pub code_verifier: TokenSecret,
	/// Opaque state nonce that must round-trip through the redirect.
	pub state: String,
	/// Creation instant.
	pub created_at: OffsetDateTime,
}
impl PendingAuthorization {
	/// Generates a fresh verifier and state nonce.
	pub fn generate() -> Self {
		Self {
			code_verifier: TokenSecret::new(random_string(PKCE_VERIFIER_LEN)),
			state: random_string(STATE_LEN),
			created_at: OffsetDateTime::now_utc(),
		}
	}

	/// Derived PKCE challenge (`BASE64URL(SHA256(verifier))`).
	pub fn code_challenge(&self) -> String {
		compute_pkce_challenge(self.code_verifier.expose())
	}

	/// Challenge method paired with [`code_challenge`](Self::code_challenge).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		PkceCodeChallengeMethod::S256
	}

	/// Returns `true` when the returned state equals the stored nonce.
	pub fn state_matches(&self, returned_state: &str) -> bool {
		constant_time_eq(self.state.as_bytes(), returned_state.as_bytes())
	}
}
impl Debug for PendingAuthorization {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingAuthorization")
			.field("code_verifier", &"<redacted>")
			.field("state", &self.state)
			.field("created_at", &self.created_at)
			.finish()
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}

fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
	if lhs.len() != rhs.len() {
		return false;
	}

	lhs.iter().zip(rhs).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
