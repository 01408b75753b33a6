//! Token lifecycle: PKCE authorization, persistence, serialized refresh, and logout.
//!
//! [`TokenManager`] is the only component that reads or writes the stored [`TokenRecord`]. The
//! durable store holds the record; the in-memory [`AuthState`] only tracks where the manager is
//! in the handshake. Every failure that leaves the credential unusable clears it.

pub mod authorize;
pub mod refresh;

mod metrics;

pub use authorize::AuthorizationRequest;
pub use metrics::TokenMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	config::TokenConfig,
	http::TokenHttpClient,
	oauth::{OAuthFacade, TransportErrorMapper},
	provider::ProviderDescriptor,
	store::{self, KvStore, PENDING_AUTHORIZATION_KEY, TOKEN_RECORD_KEY},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Token manager specialized for the default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Where the manager is in the authorization lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthState {
	/// No usable credential.
	#[default]
	Unauthenticated,
	/// Authorization URL issued; waiting for the callback.
	Authorizing,
	/// Exchanging the authorization code.
	Exchanging,
	/// A credential is stored.
	Authenticated,
	/// A refresh grant is in progress.
	RefreshPending,
}

/// Owns the bearer credential for one authorization server.
pub struct TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: ProviderDescriptor,
	config: TokenConfig,
	durable: Arc<dyn KvStore>,
	scratch: Arc<dyn KvStore>,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	state: Mutex<AuthState>,
	// Bumped by `clear`; in-flight grants started under an older epoch must not persist.
	epoch: AtomicU64,
	exchange_guard: AsyncMutex<()>,
	refresh_guard: AsyncMutex<()>,
	metrics: Arc<TokenMetrics>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager over caller-provided stores and transport.
	///
	/// `durable` keeps the [`TokenRecord`] across restarts; `scratch` holds the short-lived
	/// pending authorization.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		config: TokenConfig,
		durable: Arc<dyn KvStore>,
		scratch: Arc<dyn KvStore>,
		http_client: impl Into<Arc<C>>,
		transport_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			descriptor,
			config,
			durable,
			scratch,
			http_client: http_client.into(),
			transport_mapper: transport_mapper.into(),
			state: Mutex::new(AuthState::Unauthenticated),
			epoch: AtomicU64::new(0),
			exchange_guard: AsyncMutex::new(()),
			refresh_guard: AsyncMutex::new(()),
			metrics: Default::default(),
		}
	}

	/// Current lifecycle state.
	pub fn state(&self) -> AuthState {
		*self.state.lock()
	}

	/// Token-endpoint counters.
	pub fn metrics(&self) -> &TokenMetrics {
		&self.metrics
	}

	/// Authorization server this manager talks to.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Client configuration.
	pub fn config(&self) -> &TokenConfig {
		&self.config
	}

	/// Deletes the stored credential and any pending authorization. Safe to call repeatedly.
	pub async fn clear(&self) -> Result<()> {
		self.epoch.fetch_add(1, Ordering::SeqCst);
		self.set_state(AuthState::Unauthenticated);
		self.durable.delete(TOKEN_RECORD_KEY).await?;
		self.scratch.delete(PENDING_AUTHORIZATION_KEY).await?;

		Ok(())
	}

	fn set_state(&self, next: AuthState) {
		*self.state.lock() = next;
	}

	fn current_epoch(&self) -> u64 {
		self.epoch.load(Ordering::SeqCst)
	}

	fn facade(&self) -> Result<OAuthFacade<C, M>> {
		OAuthFacade::from_descriptor(
			&self.descriptor,
			&self.config.client_id,
			self.config.client_secret.as_ref().map(|secret| secret.expose()),
			Arc::clone(&self.http_client),
			Arc::clone(&self.transport_mapper),
		)
	}

	async fn load_record(&self) -> Result<Option<TokenRecord>> {
		Ok(store::load_json(self.durable.as_ref(), TOKEN_RECORD_KEY).await?)
	}

	/// Persists `record` unless `clear` ran since `epoch` was read.
	async fn persist_record(&self, record: &TokenRecord, epoch: u64) -> Result<bool> {
		if self.current_epoch() != epoch {
			return Ok(false);
		}

		store::save_json(self.durable.as_ref(), TOKEN_RECORD_KEY, record, None).await?;

		Ok(true)
	}
}
#[cfg(feature = "reqwest")]
impl TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with its own reqwest transport.
	pub fn new(
		descriptor: ProviderDescriptor,
		config: TokenConfig,
		durable: Arc<dyn KvStore>,
		scratch: Arc<dyn KvStore>,
	) -> Self {
		Self::with_http_client(
			descriptor,
			config,
			durable,
			scratch,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("provider", &self.descriptor.id)
			.field("client_id", &self.config.client_id)
			.field("client_secret_set", &self.config.client_secret.is_some())
			.field("state", &self.state())
			.finish()
	}
}
