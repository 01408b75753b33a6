// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderEndpoints, ScopeFormat},
};

/// Why a descriptor was refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// No authorization endpoint was set.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// No token endpoint was set.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Credentials and codes must not travel over plain HTTP.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// `authorization` or `token`.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// The delimiter would be indistinguishable from scope text.
	#[error("Scope delimiter {delimiter:?} is not a printable separator.")]
	InvalidScopeDelimiter {
		/// Offending delimiter.
		delimiter: char,
	},
}

/// Programmatic alternative to deserializing a [`ProviderDescriptor`].
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	id: ProviderId,
	authorization: Option<Url>,
	token: Option<Url>,
	client_auth_method: ClientAuthMethod,
	scope_format: ScopeFormat,
}
impl ProviderDescriptorBuilder {
	/// Builder with default client authentication and scope format.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			authorization: None,
			token: None,
			client_auth_method: ClientAuthMethod::default(),
			scope_format: ScopeFormat::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token = Some(url);

		self
	}

	/// Sets the token-endpoint client authentication.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Sets the scope encoding.
	pub fn scope_format(mut self, format: ScopeFormat) -> Self {
		self.scope_format = format;

		self
	}

	/// Validates and returns the descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints: ProviderEndpoints {
				authorization: self
					.authorization
					.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?,
				token: self.token.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?,
			},
			client_auth_method: self.client_auth_method,
			scope_format: self.scope_format,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}
