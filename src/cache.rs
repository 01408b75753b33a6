//! Read-through cache with an in-process tier (L1), a durable tier (L2), and in-flight
//! de-duplication.
//!
//! Values are held as JSON so one cache can serve every record type and so the durable tier can
//! be a single [`KvStore`] record. Lookups go L1, then L2, then the network. Concurrent misses on
//! one key share a single fetch; a failed fetch populates nothing.
//!
//! Every path that writes or deletes durable state holds `l2_gate`, and every path that touches
//! the in-flight table and L1 together locks `in_flight` before `l1`. Invalidation therefore
//! either runs wholly before or wholly after a completing fetch's write-back, and a fetch that
//! was detached by invalidation never writes its value into either tier.

mod entry;

pub use entry::CacheEntry;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared},
};
use serde_json::Value;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	config::CacheOptions,
	obs::{self, CacheTier, OpSpan, Operation, Outcome},
	retry::RetryPolicy,
	store::{self, CACHE_RECORD_KEY, KvStore, StoreError},
};

type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;
type DurableMap = BTreeMap<String, CacheEntry<Value>>;

/// Two-tier read-through cache.
#[derive(Clone)]
pub struct TieredCache {
	inner: Arc<CacheInner>,
}
impl TieredCache {
	/// Creates a cache persisting its durable tier into `durable`.
	pub fn new(durable: Arc<dyn KvStore>, retry: RetryPolicy) -> Self {
		Self {
			inner: Arc::new(CacheInner {
				durable,
				retry,
				l1: Mutex::new(HashMap::new()),
				in_flight: Mutex::new(HashMap::new()),
				l2_gate: AsyncMutex::new(()),
				next_fetch_id: AtomicU64::new(0),
			}),
		}
	}

	/// Returns the cached value for `key`, fetching it through `fetch` on a miss.
	///
	/// `fetch` is retried per the cache's [`RetryPolicy`]. When another caller is already fetching
	/// `key`, this call waits for that fetch instead of starting its own.
	pub async fn get<T, F, Fut>(&self, key: &str, fetch: F, opts: CacheOptions) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnMut() -> Fut,
		Fut: 'static + Send + Future<Output = Result<T>>,
	{
		let span = OpSpan::new(Operation::CacheFetch, "get");

		obs::record_operation_outcome(Operation::CacheFetch, Outcome::Attempt);

		let result = span.instrument(self.lookup(key, fetch, opts)).await;

		obs::record_operation_outcome(Operation::CacheFetch, Outcome::of(&result));

		result
	}

	/// Drops `key` from both tiers and detaches any in-flight fetch for it.
	///
	/// Call this after a mutation succeeds and before reporting success, so the next
	/// [`get`](Self::get) observes post-mutation state.
	pub async fn invalidate(&self, key: &str) -> Result<()> {
		let _gate = self.inner.l2_gate.lock().await;

		{
			let mut in_flight = self.inner.in_flight.lock();

			in_flight.remove(key);
			self.inner.l1.lock().remove(key);
		}

		self.inner.rewrite_durable(|map| map.remove(key).is_some()).await
	}

	/// Drops every key starting with `prefix` from both tiers.
	pub async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
		let _gate = self.inner.l2_gate.lock().await;

		{
			let mut in_flight = self.inner.in_flight.lock();

			in_flight.retain(|key, _| !key.starts_with(prefix));
			self.inner.l1.lock().retain(|key, _| !key.starts_with(prefix));
		}

		self.inner
			.rewrite_durable(|map| {
				let before = map.len();

				map.retain(|key, _| !key.starts_with(prefix));

				map.len() != before
			})
			.await
	}

	/// Drops everything, including the durable record.
	pub async fn clear(&self) -> Result<()> {
		let _gate = self.inner.l2_gate.lock().await;

		{
			let mut in_flight = self.inner.in_flight.lock();

			in_flight.clear();
			self.inner.l1.lock().clear();
		}

		self.inner.durable.delete(CACHE_RECORD_KEY).await?;

		Ok(())
	}

	/// Keys currently held in L1, stale or not.
	pub fn l1_len(&self) -> usize {
		self.inner.l1.lock().len()
	}

	/// Fetches currently in flight.
	pub fn in_flight(&self) -> usize {
		self.inner.in_flight.lock().len()
	}

	async fn lookup<T, F, Fut>(&self, key: &str, fetch: F, opts: CacheOptions) -> Result<T>
	where
		T: 'static + Send + Serialize + DeserializeOwned,
		F: 'static + Send + FnMut() -> Fut,
		Fut: 'static + Send + Future<Output = Result<T>>,
	{
		if let Some(value) = self.inner.l1_get(key, opts.l1_stale()).and_then(decode) {
			obs::record_cache_lookup(CacheTier::L1);

			return Ok(value);
		}

		let l2_hit = match opts.l2_ttl() {
			Some(max_age) => self.inner.l2_get(key, max_age).await?,
			None => None,
		};

		if let Some(value) = l2_hit.and_then(decode) {
			obs::record_cache_lookup(CacheTier::L2);

			return Ok(value);
		}

		let route = {
			let mut in_flight = self.inner.in_flight.lock();

			// A fetch may have completed since the L1 miss above.
			if let Some(value) = self.inner.l1_get(key, opts.l1_stale()) {
				Route::Cached(value)
			} else if let Some(existing) = in_flight.get(key) {
				Route::Await(existing.shared.clone(), CacheTier::Joined)
			} else {
				let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
				let shared = CacheInner::start_fetch(&self.inner, key.to_owned(), id, fetch, opts);

				in_flight.insert(key.to_owned(), InFlight { id, shared: shared.clone() });

				Route::Await(shared, CacheTier::Network)
			}
		};
		let value = match route {
			Route::Cached(value) => {
				obs::record_cache_lookup(CacheTier::L1);

				value
			},
			Route::Await(shared, tier) => {
				obs::record_cache_lookup(tier);

				shared.await?
			},
		};

		decode(value).ok_or_else(|| codec_error(key, "fetched value has the wrong shape"))
	}
}
impl Debug for TieredCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TieredCache")
			.field("l1_len", &self.l1_len())
			.field("in_flight", &self.in_flight())
			.finish()
	}
}

struct CacheInner {
	durable: Arc<dyn KvStore>,
	retry: RetryPolicy,
	l1: Mutex<HashMap<String, L1Entry>>,
	in_flight: Mutex<HashMap<String, InFlight>>,
	l2_gate: AsyncMutex<()>,
	next_fetch_id: AtomicU64,
}
impl CacheInner {
	fn l1_get(&self, key: &str, stale_after: StdDuration) -> Option<Value> {
		self.l1
			.lock()
			.get(key)
			.filter(|entry| entry.stored_at.elapsed() < stale_after)
			.map(|entry| entry.value.clone())
	}

	async fn l2_get(&self, key: &str, max_age: Duration) -> Result<Option<Value>> {
		// Held until L1 is populated so an invalidation cannot slip in between.
		let _gate = self.l2_gate.lock().await;
		let now = OffsetDateTime::now_utc();
		let Some(value) = self
			.load_durable()
			.await?
			.remove(key)
			.filter(|entry| entry.is_fresh_at(now, max_age))
			.map(|entry| entry.value)
		else {
			return Ok(None);
		};

		self.l1
			.lock()
			.insert(key.to_owned(), L1Entry { value: value.clone(), stored_at: Instant::now() });

		Ok(Some(value))
	}

	fn start_fetch<T, F, Fut>(
		this: &Arc<Self>,
		key: String,
		id: u64,
		mut fetch: F,
		opts: CacheOptions,
	) -> SharedFetch
	where
		T: 'static + Send + Serialize,
		F: 'static + Send + FnMut() -> Fut,
		Fut: 'static + Send + Future<Output = Result<T>>,
	{
		let inner = Arc::clone(this);

		async move {
			let fetched = inner
				.retry
				.run(Operation::CacheFetch, || {
					let pending = fetch();

					async move {
						let value = pending.await?;

						serde_json::to_value(value)
							.map_err(|e| codec_error("fetched value", format_args!("{e}")))
					}
				})
				.await;

			match fetched {
				Ok(value) => {
					inner.write_back(&key, id, &value, opts).await;

					Ok(value)
				},
				Err(err) => {
					inner.detach(&key, id);
					obs::trace_event(Operation::CacheFetch, "fetch_failed", format_args!("{key}: {err}"));

					Err(err)
				},
			}
		}
		.boxed()
		.shared()
	}

	async fn write_back(&self, key: &str, id: u64, value: &Value, opts: CacheOptions) {
		let _gate = self.l2_gate.lock().await;

		if !self.is_registered(key, id) {
			obs::trace_event(Operation::CacheFetch, "detached_fetch", key);

			return;
		}
		if let Some(ttl) = opts.l2_ttl() {
			let entry = CacheEntry::new(key, value.clone(), ttl, OffsetDateTime::now_utc());
			let written = self
				.rewrite_durable(|map| {
					map.insert(key.to_owned(), entry);

					true
				})
				.await;

			// The value is still good; only persistence failed.
			if let Err(err) = written {
				obs::trace_event(Operation::CacheFetch, "l2_write_failed", err);
			}
		}

		let mut in_flight = self.in_flight.lock();

		if in_flight.get(key).is_some_and(|flight| flight.id == id) {
			in_flight.remove(key);
			self.l1
				.lock()
				.insert(key.to_owned(), L1Entry { value: value.clone(), stored_at: Instant::now() });
		}
	}

	fn is_registered(&self, key: &str, id: u64) -> bool {
		self.in_flight.lock().get(key).is_some_and(|flight| flight.id == id)
	}

	fn detach(&self, key: &str, id: u64) {
		let mut in_flight = self.in_flight.lock();

		if in_flight.get(key).is_some_and(|flight| flight.id == id) {
			in_flight.remove(key);
		}
	}

	async fn load_durable(&self) -> Result<DurableMap> {
		match store::load_json::<DurableMap>(self.durable.as_ref(), CACHE_RECORD_KEY).await {
			Ok(map) => Ok(map.unwrap_or_default()),
			// A corrupt record is treated as empty and overwritten by the next write.
			Err(StoreError::Serialization { message }) => {
				obs::trace_event(Operation::CacheFetch, "l2_corrupt", message);

				Ok(DurableMap::new())
			},
			Err(err) => Err(err.into()),
		}
	}

	/// Loads the durable map, applies `edit`, prunes expired entries, and saves if anything
	/// changed. Callers must hold `l2_gate`.
	async fn rewrite_durable<E>(&self, edit: E) -> Result<()>
	where
		E: FnOnce(&mut DurableMap) -> bool,
	{
		let now = OffsetDateTime::now_utc();
		let mut map = self.load_durable().await?;
		let before = map.len();
		let edited = edit(&mut map);

		map.retain(|_, entry| now < entry.expires_at());

		if !edited && map.len() == before {
			return Ok(());
		}

		store::save_json(self.durable.as_ref(), CACHE_RECORD_KEY, &map, None).await?;

		Ok(())
	}
}

enum Route {
	Cached(Value),
	Await(SharedFetch, CacheTier),
}

struct L1Entry {
	value: Value,
	stored_at: Instant,
}

struct InFlight {
	id: u64,
	shared: SharedFetch,
}

fn decode<T>(value: Value) -> Option<T>
where
	T: DeserializeOwned,
{
	serde_json::from_value(value).ok()
}

fn codec_error(key: &str, detail: impl Display) -> Error {
	StoreError::Serialization { message: format!("Cache codec failure for `{key}`: {detail}") }
		.into()
}
