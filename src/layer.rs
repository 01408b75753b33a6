//! Composition root wiring the scheduler, token manager, cache, and record client together.

// crates.io
use reqwest::redirect::Policy;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::SlugNamespace,
	cache::TieredCache,
	config::{AccessConfig, CacheOptions},
	error::ConfigError,
	flows::{ReqwestTokenManager, TokenManager},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	remote::{RecordClient, RecordRequest},
	schedule::RateScheduler,
	slug::{SlugAllocator, SlugProbe},
	store::KvStore,
};

/// One explicitly constructed access layer per application.
///
/// Construct it once at startup, share it by reference or `Arc`, and call [`close`](Self::close)
/// on shutdown.
#[derive(Debug)]
pub struct AccessLayer {
	config: AccessConfig,
	scheduler: RateScheduler,
	cache: TieredCache,
	tokens: Arc<ReqwestTokenManager>,
	remote: RecordClient,
}
impl AccessLayer {
	/// Builds the layer with its own HTTP client.
	///
	/// `durable` holds the credential and the L2 cache; `scratch` holds pending authorizations.
	pub fn new(
		config: AccessConfig,
		durable: Arc<dyn KvStore>,
		scratch: Arc<dyn KvStore>,
	) -> Result<Self> {
		let http = ReqwestClient::builder().redirect(Policy::none()).build().map_err(ConfigError::from)?;

		Self::with_http_client(config, durable, scratch, http)
	}

	/// Builds the layer around a caller-provided HTTP client.
	pub fn with_http_client(
		config: AccessConfig,
		durable: Arc<dyn KvStore>,
		scratch: Arc<dyn KvStore>,
		http: ReqwestClient,
	) -> Result<Self> {
		config.validate()?;

		let scheduler = RateScheduler::new(config.scheduler);
		let cache = TieredCache::new(Arc::clone(&durable), config.retry);
		let tokens = Arc::new(TokenManager::with_http_client(
			config.provider.clone(),
			config.token.clone(),
			durable,
			scratch,
			ReqwestHttpClient::with_client(http.clone()),
			Arc::new(ReqwestTransportErrorMapper),
		));
		let remote = RecordClient::new(
			config.remote_base_url.clone(),
			http,
			scheduler.clone(),
			Arc::clone(&tokens),
		);

		Ok(Self { config, scheduler, cache, tokens, remote })
	}

	/// Configuration the layer was built from.
	pub fn config(&self) -> &AccessConfig {
		&self.config
	}

	/// Shared rate scheduler.
	pub fn scheduler(&self) -> &RateScheduler {
		&self.scheduler
	}

	/// Shared tiered cache.
	pub fn cache(&self) -> &TieredCache {
		&self.cache
	}

	/// Token lifecycle manager.
	pub fn tokens(&self) -> &Arc<ReqwestTokenManager> {
		&self.tokens
	}

	/// Record service client.
	pub fn remote(&self) -> &RecordClient {
		&self.remote
	}

	/// Cached read: serves `key` from the cache, sending `request` on a miss.
	pub async fn read<T>(&self, key: &str, request: RecordRequest, opts: CacheOptions) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
	{
		let remote = self.remote.clone();

		self.cache
			.get(
				key,
				move || {
					let remote = remote.clone();
					let request = request.clone();

					async move { remote.send_as::<T>(request).await }
				},
				opts,
			)
			.await
	}

	/// Sends a mutation, then invalidates `keys` before reporting success.
	pub async fn write(&self, request: RecordRequest, keys: &[&str]) -> Result<Value> {
		let value = self.remote.send(request).await?;

		for key in keys {
			self.cache.invalidate(key).await?;
		}

		Ok(value)
	}

	/// Creates a slug allocator for `namespace` sharing this layer's cache.
	pub fn slug_allocator<P>(&self, namespace: SlugNamespace, probe: Arc<P>) -> SlugAllocator<P>
	where
		P: ?Sized + SlugProbe,
	{
		SlugAllocator::new(self.cache.clone(), probe, namespace, self.config.slug)
	}

	/// Logs out: abandons queued calls, clears the credential, and drops cached data.
	pub async fn logout(&self) -> Result<()> {
		self.scheduler.clear_queue();
		self.tokens.clear().await?;
		self.cache.clear().await
	}

	/// Shuts the layer down; queued calls fail with [`Error::SchedulerCleared`] and later calls are
	/// refused.
	pub fn close(&self) {
		self.scheduler.close();
	}
}
