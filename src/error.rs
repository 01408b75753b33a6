//! Access-layer error types shared by the scheduler, cache, token manager, and slug allocator.
//!
//! Every error is classified once, where it is created. Downstream code reads
//! [`Error::kind`] and [`Error::retry_class`] instead of inspecting message text.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// The type is `Clone` so a single failed fetch can be handed to every caller waiting on it.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Durable storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The remote service throttled the request.
	#[error("Too many requests; try again shortly.")]
	RateLimited {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The credential is missing, invalid, or expired; the user must authorize again.
	#[error("Credential is missing or was rejected by the remote service.")]
	Unauthorized,
	/// The returned authorization `state` did not match the pending authorization.
	#[error("Authorization state mismatch; restart the authorization flow.")]
	CsrfMismatch,
	/// The authorization code exchange failed.
	#[error("Authorization code exchange failed.")]
	ExchangeFailed {
		/// Underlying token endpoint failure.
		#[source]
		source: Arc<Error>,
	},
	/// The refresh grant failed.
	#[error("Token refresh failed.")]
	RefreshFailed {
		/// Underlying token endpoint failure.
		#[source]
		source: Arc<Error>,
	},
	/// No free slug was found within the attempt budget.
	#[error("No free slug derived from `{base}` within {attempts} attempts.")]
	SlugExhausted {
		/// Canonical base slug.
		base: String,
		/// Number of candidates probed.
		attempts: u32,
	},
	/// The text normalized to an empty slug.
	#[error("Text `{raw}` does not contain any slug-safe characters.")]
	EmptySlug {
		/// Raw input text.
		raw: String,
	},
	/// The call was still queued when the scheduler was cleared or closed.
	#[error("Scheduler cleared before the call was admitted.")]
	SchedulerCleared,
	/// The remote service refused the request; retrying will not help.
	#[error("Remote service rejected the request ({status}): {message}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		message: String,
	},
}
impl Error {
	/// Returns the flat taxonomy label for this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Storage(_) => ErrorKind::Storage,
			Self::Config(_) => ErrorKind::Config,
			Self::Transient(_) => ErrorKind::Transient,
			Self::Transport(_) => ErrorKind::NetworkFailure,
			Self::RateLimited { .. } => ErrorKind::RateLimited,
			Self::Unauthorized => ErrorKind::Unauthorized,
			Self::CsrfMismatch => ErrorKind::CsrfMismatch,
			Self::ExchangeFailed { .. } => ErrorKind::ExchangeFailed,
			Self::RefreshFailed { .. } => ErrorKind::RefreshFailed,
			Self::SlugExhausted { .. } => ErrorKind::SlugExhausted,
			Self::EmptySlug { .. } => ErrorKind::EmptySlug,
			Self::SchedulerCleared => ErrorKind::SchedulerCleared,
			Self::Rejected { .. } => ErrorKind::Rejected,
		}
	}

	/// Returns how the retry layer should treat this error.
	pub fn retry_class(&self) -> RetryClass {
		match self.kind() {
			ErrorKind::RateLimited => RetryClass::RateLimited,
			ErrorKind::NetworkFailure | ErrorKind::Transient => RetryClass::Transient,
			_ => RetryClass::Fatal,
		}
	}

	/// Returns `true` when the caller must send the user back through authorization.
	pub fn requires_authorization(&self) -> bool {
		matches!(
			self.kind(),
			ErrorKind::Unauthorized
				| ErrorKind::CsrfMismatch
				| ErrorKind::ExchangeFailed
				| ErrorKind::RefreshFailed
		)
	}
}

/// Flat error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Throttled by the remote service.
	RateLimited,
	/// Network-level failure.
	NetworkFailure,
	/// Upstream 5xx or unexpected response.
	Transient,
	/// Credential invalid or missing.
	Unauthorized,
	/// Authorization state mismatch.
	CsrfMismatch,
	/// Code exchange failed.
	ExchangeFailed,
	/// Refresh grant failed.
	RefreshFailed,
	/// Slug probing ran out of attempts.
	SlugExhausted,
	/// Slug input normalized to nothing.
	EmptySlug,
	/// Call abandoned by the scheduler.
	SchedulerCleared,
	/// Non-retryable refusal from the remote service.
	Rejected,
	/// Durable storage failure.
	Storage,
	/// Local configuration failure.
	Config,
}

/// Retry treatment derived from an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
	/// Retry with the rate-limit budget.
	RateLimited,
	/// Retry with the transient budget.
	Transient,
	/// Never retry.
	Fatal,
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: SharedError,
	},
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Remote path cannot be joined onto the base URL.
	#[error("Request path `{path}` cannot be joined onto the service base URL.")]
	InvalidPath {
		/// Path that failed to join.
		path: String,
	},
	/// Configuration document is malformed.
	#[error("Configuration is malformed at `{path}`: {message}.")]
	Malformed {
		/// JSON path of the offending field.
		path: String,
		/// Parser message.
		message: String,
	},
	/// A successful record-service body does not decode into the requested type.
	#[error("Record service body does not match the expected shape at `{path}`: {message}.")]
	UnexpectedBody {
		/// JSON path of the offending field.
		path: String,
		/// Decoder message.
		message: String,
	},
	/// Scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Upstream returned an unexpected but non-fatal response.
	#[error("Upstream returned an unexpected response: {message}.")]
	Upstream {
		/// Upstream or locally supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream responded with malformed JSON that could not be parsed.
	#[error("Upstream returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling upstream.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
