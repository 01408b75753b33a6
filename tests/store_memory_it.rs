// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use record_broker::store::{self, KvStore, MemoryStore};

#[tokio::test]
async fn set_get_delete_cycle() {
	let store = MemoryStore::default();

	store.set("notes:n1", "first".into(), None).await.expect("Set should succeed.");
	store.set("notes:n1", "second".into(), None).await.expect("Overwrite should succeed.");

	assert_eq!(store.get("notes:n1").await.expect("Get should succeed."), Some("second".into()));
	assert_eq!(store.len(), 1);

	store.delete("notes:n1").await.expect("Delete should succeed.");
	store.delete("notes:n1").await.expect("Deleting a missing key should succeed.");

	assert_eq!(store.get("notes:n1").await.expect("Get should succeed."), None);
	assert!(store.is_empty());
}

#[tokio::test]
async fn expired_values_are_collected_on_read() {
	let store = MemoryStore::default();

	store.set("short", "x".into(), Some(Duration::ZERO)).await.expect("Set should succeed.");
	store.set("long", "y".into(), Some(Duration::hours(1))).await.expect("Set should succeed.");

	assert_eq!(store.len(), 2);
	assert!(!store.contains_key("short"));
	assert!(store.contains_key("long"));
	assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn clones_share_contents() {
	let store = MemoryStore::default();
	let shared: Arc<dyn KvStore> = Arc::new(store.clone());

	store::save_json(shared.as_ref(), "numbers", &[1_u8, 2, 3], None)
		.await
		.expect("Save should succeed.");

	let numbers: Option<Vec<u8>> =
		store::load_json(&store, "numbers").await.expect("Load should succeed.");

	assert_eq!(numbers, Some(vec![1, 2, 3]));
}
