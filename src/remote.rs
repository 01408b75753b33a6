//! Bearer-authenticated client for the record service.
//!
//! Every request is admitted by the shared [`RateScheduler`] and signed with a credential from
//! the [`TokenManager`]. Responses are classified exactly once, here: throttling becomes
//! [`Error::RateLimited`], a rejected credential becomes [`Error::Unauthorized`] (and the stored
//! credential is cleared), 5xx becomes transient, and every other non-success is
//! [`Error::Rejected`].

// crates.io
use reqwest::{Method, StatusCode};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError, TransportError},
	ext::{BearerSigner, RequestSignerExt},
	flows::TokenManager,
	http::{self, ReqwestHttpClient, TokenHttpClient},
	oauth::{ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, OpSpan, Operation, Outcome},
	schedule::RateScheduler,
};

const THROTTLE_MARKER: &str = "RATE_LIMIT";
const MESSAGE_PREVIEW_CHARS: usize = 256;

/// One call against the record service.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordRequest {
	method: Method,
	path: String,
	query: Vec<(String, String)>,
	body: Option<Value>,
}
impl RecordRequest {
	/// Creates a request for `path`, relative to the client's base URL.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), query: Vec::new(), body: None }
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PATCH path`.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets the JSON body.
	pub fn json(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path relative to the base URL.
	pub fn path(&self) -> &str {
		&self.path
	}
}

/// HTTPS client for the record service.
pub struct RecordClient<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	base_url: Url,
	http: ReqwestClient,
	scheduler: RateScheduler,
	tokens: Arc<TokenManager<C, M>>,
	signer: BearerSigner,
}
impl<C, M> RecordClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client rooted at `base_url`; relative request paths are joined onto it.
	pub fn new(
		base_url: Url,
		http: ReqwestClient,
		scheduler: RateScheduler,
		tokens: Arc<TokenManager<C, M>>,
	) -> Self {
		Self { base_url, http, scheduler, tokens, signer: BearerSigner }
	}

	/// Base URL requests are resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Sends `request` and returns the decoded JSON body (`null` for an empty body).
	pub async fn send(&self, request: RecordRequest) -> Result<Value> {
		const OP: Operation = Operation::RemoteCall;

		let span = OpSpan::new(OP, "send");

		obs::record_operation_outcome(OP, Outcome::Attempt);

		let result = span.instrument(self.scheduler.execute(|| self.dispatch(request))).await;

		obs::record_operation_outcome(OP, Outcome::of(&result));

		result
	}

	/// Sends `request` and deserializes the body into `T`.
	pub async fn send_as<T>(&self, request: RecordRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let value = self.send(request).await?;

		serde_path_to_error::deserialize(value).map_err(|e| {
			ConfigError::UnexpectedBody { path: e.path().to_string(), message: e.inner().to_string() }
				.into()
		})
	}

	async fn dispatch(&self, request: RecordRequest) -> Result<Value> {
		let RecordRequest { method, path, query, body } = request;
		let url = self
			.base_url
			.join(path.trim_start_matches('/'))
			.map_err(|_| ConfigError::InvalidPath { path: path.clone() })?;
		let token = self.tokens.get_valid_token().await?.ok_or(Error::Unauthorized)?;
		let mut builder = self.http.request(method, url);

		if !query.is_empty() {
			builder = builder.query(&query);
		}
		if let Some(body) = &body {
			builder = builder.json(body);
		}

		let request = builder.build().map_err(ConfigError::from)?;
		let request = self.signer.attach_token(request, &token)?;
		let response = self.http.execute(request).await.map_err(TransportError::from)?;
		let status = response.status();
		let retry_after = http::parse_retry_after(response.headers());
		let bytes = response.bytes().await.map_err(TransportError::from)?;

		if status == StatusCode::UNAUTHORIZED {
			self.tokens.clear().await?;

			return Err(Error::Unauthorized);
		}

		classify_response(status, retry_after, &bytes)
	}
}
impl<C, M> Clone for RecordClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			base_url: self.base_url.clone(),
			http: self.http.clone(),
			scheduler: self.scheduler.clone(),
			tokens: Arc::clone(&self.tokens),
			signer: self.signer,
		}
	}
}
impl<C, M> Debug for RecordClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RecordClient").field("base_url", &self.base_url.as_str()).finish()
	}
}

fn classify_response(status: StatusCode, retry_after: Option<Duration>, body: &[u8]) -> Result<Value> {
	if status.is_success() {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(Value::Null);
		}

		let mut deserializer = serde_json::Deserializer::from_slice(body);

		return serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			TransientError::ResponseParse { source: Arc::new(e), status: Some(status.as_u16()) }
				.into()
		});
	}
	if status == StatusCode::TOO_MANY_REQUESTS || signals_throttling(body) {
		return Err(Error::RateLimited { retry_after });
	}

	let message = preview(body);

	if status.is_server_error() {
		return Err(TransientError::Upstream {
			message,
			status: Some(status.as_u16()),
			retry_after,
		}
		.into());
	}

	Err(Error::Rejected { status: status.as_u16(), message })
}

// Accepts `{"error": "RATE_LIMIT_REACHED"}`, `{"error": {"type": "RATE_LIMIT_REACHED"}}`, or a
// plain-text body carrying the marker.
fn signals_throttling(body: &[u8]) -> bool {
	match serde_json::from_slice::<Value>(body) {
		Ok(value) => match value.get("error") {
			Some(Value::String(kind)) => kind.contains(THROTTLE_MARKER),
			Some(error) => error
				.get("type")
				.and_then(Value::as_str)
				.is_some_and(|kind| kind.contains(THROTTLE_MARKER)),
			None => false,
		},
		Err(_) => String::from_utf8_lossy(body).contains(THROTTLE_MARKER),
	}
}

fn preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return "empty body".into();
	}

	trimmed.chars().take(MESSAGE_PREVIEW_CHARS).collect()
}
