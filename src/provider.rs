//! Authorization-server descriptor: where to send the user, where to redeem codes, and how the
//! server expects the client and its scopes to be presented.

mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, auth::ProviderId};

/// How the client proves its identity at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// `Authorization: Basic` header.
	#[default]
	ClientSecretBasic,
	/// `client_id` and `client_secret` form fields.
	ClientSecretPost,
	/// Public client; only `client_id` is sent and PKCE carries the proof.
	NoneWithPkce,
}

/// The two endpoints the handshake needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Page the user is redirected to.
	pub authorization: Url,
	/// Code-exchange and refresh endpoint.
	pub token: Url,
}

/// Server-specific encoding of the `scope` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeFormat {
	/// Separator between scopes; RFC 6749 uses a space, some servers use `,`.
	pub delimiter: char,
	/// Send `scope=` even when no scopes are configured.
	pub send_when_empty: bool,
}
impl Default for ScopeFormat {
	fn default() -> Self {
		Self { delimiter: ' ', send_when_empty: false }
	}
}

/// Validated authorization-server description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Name used in logs and metrics.
	pub id: ProviderId,
	/// Authorization and token endpoints.
	pub endpoints: ProviderEndpoints,
	/// Token-endpoint client authentication.
	#[serde(default)]
	pub client_auth_method: ClientAuthMethod,
	/// Scope encoding.
	#[serde(default)]
	pub scope_format: ScopeFormat,
}
impl ProviderDescriptor {
	/// Starts a builder for `id`.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Re-checks what the builder enforces; deserialized descriptors go through this too.
	pub fn validate(&self) -> Result<(), ProviderDescriptorError> {
		require_https("authorization", &self.endpoints.authorization)?;
		require_https("token", &self.endpoints.token)?;

		let delimiter = self.scope_format.delimiter;

		if delimiter.is_control() || delimiter.is_alphanumeric() {
			return Err(ProviderDescriptorError::InvalidScopeDelimiter { delimiter });
		}

		Ok(())
	}
}

fn require_https(endpoint: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { endpoint, url: url.to_string() }),
	}
}
