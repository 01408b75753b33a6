//! Facade over the `oauth2` crate for the two token-endpoint grants the manager needs.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ClientAuthMethod, ProviderDescriptor},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token-endpoint grant a failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
	/// `authorization_code` with PKCE.
	AuthorizationCode,
	/// `refresh_token`.
	RefreshToken,
}
impl Grant {
	/// Wire name of the grant.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
		}
	}
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts a transport failure seen while running `grant`.
	fn map_transport_error(
		&self,
		grant: Grant,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: Grant,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => upstream_error(grant, meta, message),
			_ => upstream_error(grant, meta, "unknown HTTP client failure"),
		}
	}
}

/// Issues code-exchange and refresh requests against one authorization server.
pub(crate) struct OAuthFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	scope_delimiter: char,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuthFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		match (descriptor.client_auth_method, client_secret) {
			(ClientAuthMethod::NoneWithPkce, _) | (_, None) => {},
			(ClientAuthMethod::ClientSecretBasic, Some(secret)) => {
				oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
			},
			(ClientAuthMethod::ClientSecretPost, Some(secret)) => {
				oauth_client = oauth_client
					.set_client_secret(ClientSecret::new(secret.to_owned()))
					.set_auth_type(AuthType::RequestBody);
			},
		}

		Ok(Self {
			oauth_client,
			scope_delimiter: descriptor.scope_format.delimiter,
			http_client,
			error_mapper,
		})
	}

	/// Redeems an authorization code together with its PKCE verifier.
	pub(crate) fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		verifier: &'a TokenSecret,
		requested_scope: &'a ScopeSet,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url))
				.request_async(&handle)
				.await
				.map_err(|err| {
					map_request_error(
						Grant::AuthorizationCode,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			self.token_record(requested_scope, response)
		})
	}

	/// Runs the refresh grant. The returned record's refresh token is whatever the server sent,
	/// so callers decide how to handle a non-rotating server.
	pub(crate) fn refresh<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
		requested_scope: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for scope in requested_scope.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				map_request_error(Grant::RefreshToken, meta.take(), err, self.error_mapper.as_ref())
			})?;

			self.token_record(requested_scope, response)
		})
	}

	fn token_record(
		&self,
		requested_scope: &ScopeSet,
		response: BasicTokenResponse,
	) -> Result<TokenRecord> {
		let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
		let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		// Servers may narrow the grant; the echoed list wins over the request.
		let scope = match response.scopes() {
			Some(scopes) if !scopes.is_empty() =>
				ScopeSet::split(scopes.iter().map(|scope| scope.as_str()), self.scope_delimiter)
					.map_err(ConfigError::from)?,
			_ => requested_scope.clone(),
		};
		let mut builder = TokenRecord::builder(scope)
			.access_token(response.access_token().secret().to_owned())
			.token_type(response.token_type().as_ref())
			.issued_at(OffsetDateTime::now_utc())
			.expires_in(Duration::seconds(expires_in));

		if let Some(refresh) = response.refresh_token() {
			builder = builder.refresh_token(refresh.secret().to_owned());
		}

		builder.build().map_err(|err| ConfigError::from(err).into())
	}
}

fn map_request_error<E, M>(
	grant: Grant,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(grant, response, meta),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta, error),
		RequestTokenError::Parse(source, _body) =>
			TransientError::ResponseParse { source: Arc::new(source), status: meta_status(meta) }
				.into(),
		RequestTokenError::Other(message) => upstream_error(grant, meta, message),
	}
}

fn map_server_response(
	grant: Grant,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref().to_owned();
	let message = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code.clone(),
	};
	let status = meta_status(meta);

	if status.is_some_and(|status| status == 429) {
		return Error::RateLimited { retry_after: meta_retry_after(meta) };
	}
	if status.is_some_and(|status| status >= 500)
		|| matches!(code.as_str(), "temporarily_unavailable" | "server_error")
	{
		return TransientError::Upstream {
			message: format!("{} grant failed upstream: {message}", grant.as_str()),
			status,
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	Error::Rejected { status: status.unwrap_or(400), message }
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(grant: Grant, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Upstream {
			message: format!("{} grant timed out", grant.as_str()),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn upstream_error(grant: Grant, meta: Option<&ResponseMetadata>, detail: impl Display) -> Error {
	TransientError::Upstream {
		message: format!("{} grant returned an unexpected response: {detail}", grant.as_str()),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use oauth2::basic::BasicErrorResponseType;
	// self
	use super::*;
	use crate::{auth::ProviderId, http::ReqwestHttpClient};

	fn descriptor(method: ClientAuthMethod) -> ProviderDescriptor {
		ProviderDescriptor::builder(
			ProviderId::new("test-provider").expect("Failed to construct provider identifier."),
		)
		.authorization_endpoint(
			Url::parse("https://example.com/oauth2/authorize")
				.expect("Failed to parse authorization endpoint URL."),
		)
		.token_endpoint(
			Url::parse("https://example.com/oauth2/token")
				.expect("Failed to parse token endpoint URL."),
		)
		.preferred_client_auth_method(method)
		.build()
		.expect("Failed to build provider descriptor.")
	}

	#[test]
	fn builds_for_every_client_auth_method() {
		for method in [
			ClientAuthMethod::ClientSecretBasic,
			ClientAuthMethod::ClientSecretPost,
			ClientAuthMethod::NoneWithPkce,
		] {
			let facade = <OAuthFacade<ReqwestHttpClient, ReqwestTransportErrorMapper>>::from_descriptor(
				&descriptor(method),
				"client-id",
				Some("secret"),
				Arc::new(ReqwestHttpClient::default()),
				Arc::new(ReqwestTransportErrorMapper),
			);

			assert!(facade.is_ok());
		}
	}

	#[test]
	fn server_errors_are_classified_by_status() {
		let response = BasicErrorResponse::new(
			BasicErrorResponseType::InvalidGrant,
			Some("refresh token revoked".into()),
			None,
		);
		let rejected = map_server_response(
			Grant::RefreshToken,
			response.clone(),
			Some(&ResponseMetadata { status: Some(400), retry_after: None }),
		);

		assert!(
			matches!(rejected, Error::Rejected { status: 400, ref message } if message.contains("revoked"))
		);

		let throttled = map_server_response(
			Grant::RefreshToken,
			response.clone(),
			Some(&ResponseMetadata { status: Some(429), retry_after: Some(Duration::seconds(3)) }),
		);

		assert!(matches!(throttled, Error::RateLimited { retry_after: Some(_) }));

		let upstream = map_server_response(
			Grant::AuthorizationCode,
			response,
			Some(&ResponseMetadata { status: Some(503), retry_after: None }),
		);

		assert!(matches!(upstream, Error::Transient(_)));
	}
}
