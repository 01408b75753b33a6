// self
use crate::_prelude::*;

/// One durable cache entry as persisted in the L2 record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
	/// Logical cache key.
	pub key: String,
	/// Cached value.
	pub value: T,
	/// Wall-clock write instant.
	pub stored_at: OffsetDateTime,
	/// Lifetime granted at write time.
	pub ttl: Duration,
}
impl<T> CacheEntry<T> {
	/// Creates an entry stored at `now`.
	pub fn new(key: impl Into<String>, value: T, ttl: Duration, now: OffsetDateTime) -> Self {
		Self { key: key.into(), value, stored_at: now, ttl }
	}

	/// Instant the entry stops being served.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.stored_at + self.ttl
	}

	/// Returns `true` if the entry is alive at `now` and younger than `max_age`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, max_age: Duration) -> bool {
		now < self.expires_at() && now < self.stored_at + max_age
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn freshness_uses_the_tighter_bound() {
		let stored_at = macros::datetime!(2025-03-01 12:00 UTC);
		let entry = CacheEntry::new("records:1", 1, Duration::minutes(5), stored_at);

		assert!(entry.is_fresh_at(stored_at + Duration::minutes(1), Duration::minutes(10)));
		assert!(!entry.is_fresh_at(stored_at + Duration::minutes(2), Duration::minutes(2)));
		assert!(!entry.is_fresh_at(stored_at + Duration::minutes(5), Duration::hours(1)));
	}
}
