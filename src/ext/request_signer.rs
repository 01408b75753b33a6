//! Signing contract used by the record client to attach the bearer credential.

// self
use crate::auth::TokenSecret;

/// Attaches an access token to an outbound request without constraining the HTTP client type.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the request and returns it carrying the credential.
	fn attach_token(&self, request: Request, token: &TokenSecret) -> Result<Request, Error>;
}

/// Signs requests with `Authorization: Bearer <token>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
#[cfg(feature = "reqwest")]
impl RequestSignerExt<reqwest::Request, crate::error::ConfigError> for BearerSigner {
	fn attach_token(
		&self,
		mut request: reqwest::Request,
		token: &TokenSecret,
	) -> Result<reqwest::Request, crate::error::ConfigError> {
		// crates.io
		use reqwest::header::{AUTHORIZATION, HeaderValue};

		let mut value = HeaderValue::try_from(token.bearer_header())
			.map_err(|e| crate::error::ConfigError::HttpRequest { source: std::sync::Arc::new(e) })?;

		value.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, value);

		Ok(request)
	}
}
