//! Thread-safe in-memory [`KvStore`], used as the scratch area and in tests.

// self
use crate::{
	_prelude::*,
	store::{KvStore, StoreFuture, StoredValue},
};

type StoreMap = Arc<RwLock<HashMap<String, StoredValue>>>;

/// Process-local storage; contents vanish with the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored keys, including expired ones not yet collected.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Returns `true` if a live value exists under `key`.
	pub fn contains_key(&self, key: &str) -> bool {
		Self::get_now(&self.0, key, OffsetDateTime::now_utc()).is_some()
	}

	fn get_now(map: &StoreMap, key: &str, now: OffsetDateTime) -> Option<String> {
		{
			let guard = map.read();

			match guard.get(key) {
				Some(stored) if !stored.is_expired_at(now) => return Some(stored.value.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		// Expired: collect lazily.
		let mut guard = map.write();

		if guard.get(key).is_some_and(|stored| stored.is_expired_at(now)) {
			guard.remove(key);
		}

		None
	}
}
impl KvStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::get_now(&map, key, OffsetDateTime::now_utc())) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			let stored = StoredValue::new(value, ttl, OffsetDateTime::now_utc());

			map.write().insert(key.to_owned(), stored);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}
