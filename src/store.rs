//! Key/value persistence contract (get/set/delete with expiry) and built-in backends.
//!
//! The token manager and the L2 cache tier only ever talk to [`KvStore`]. Values are opaque
//! strings; [`load_json`] and [`save_json`] layer serde on top.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Record key holding the serialized [`TokenRecord`](crate::auth::TokenRecord).
pub const TOKEN_RECORD_KEY: &str = "record_broker.token";
/// Record key holding the L2 cache map.
pub const CACHE_RECORD_KEY: &str = "record_broker.cache";
/// Scratch-store key holding the [`PendingAuthorization`](crate::auth::PendingAuthorization).
pub const PENDING_AUTHORIZATION_KEY: &str = "record_broker.pending_authorization";

/// Durable (or scratch) key/value storage.
pub trait KvStore
where
	Self: Send + Sync,
{
	/// Returns the value under `key`, or `None` when absent or expired.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value. `ttl` of `None` never expires.
	fn set<'a>(&'a self, key: &'a str, value: String, ttl: Option<Duration>)
	-> StoreFuture<'a, ()>;

	/// Removes `key`. Deleting a missing key succeeds.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`KvStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or the typed helpers.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Stored value plus its optional expiry, shared by the built-in backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
	/// Raw value.
	pub value: String,
	/// Absolute expiry instant.
	pub expires_at: Option<OffsetDateTime>,
}
impl StoredValue {
	/// Creates a value that expires `ttl` after `now`.
	pub fn new(value: String, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
		Self { value, expires_at: ttl.map(|ttl| now + ttl) }
	}

	/// Returns `true` once `now` reaches the expiry.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|at| now >= at)
	}
}

/// Reads and deserializes the JSON value stored under `key`.
pub async fn load_json<T>(store: &dyn KvStore, key: &str) -> Result<Option<T>, StoreError>
where
	T: DeserializeOwned,
{
	let Some(raw) = store.get(key).await? else {
		return Ok(None);
	};

	serde_json::from_str(&raw)
		.map(Some)
		.map_err(|e| StoreError::Serialization { message: format!("Failed to parse `{key}`: {e}") })
}

/// Serializes `value` as JSON and stores it under `key`.
pub async fn save_json<T>(
	store: &dyn KvStore,
	key: &str,
	value: &T,
	ttl: Option<Duration>,
) -> Result<(), StoreError>
where
	T: ?Sized + Serialize,
{
	let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize `{key}`: {e}"),
	})?;

	store.set(key, raw, ttl).await
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk full"));

		let source = StdError::source(&error).expect("Error should expose the store error.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn stored_value_expiry_is_inclusive() {
		let now = OffsetDateTime::now_utc();
		let value = StoredValue::new("v".into(), Some(Duration::seconds(5)), now);

		assert!(!value.is_expired_at(now + Duration::seconds(4)));
		assert!(value.is_expired_at(now + Duration::seconds(5)));
		assert!(!StoredValue::new("v".into(), None, now).is_expired_at(now + Duration::days(365)));
	}

	#[tokio::test]
	async fn typed_helpers_round_trip_and_report_bad_json() {
		let store = MemoryStore::default();

		save_json(&store, "k", &vec![1_u8, 2, 3], None).await.expect("Save should succeed.");

		let loaded: Option<Vec<u8>> = load_json(&store, "k").await.expect("Load should succeed.");

		assert_eq!(loaded, Some(vec![1, 2, 3]));

		store.set("bad", "{".into(), None).await.expect("Raw set should succeed.");

		let err = load_json::<Vec<u8>>(&store, "bad").await.expect_err("Bad JSON should fail.");

		assert!(matches!(err, StoreError::Serialization { .. }));
	}
}
