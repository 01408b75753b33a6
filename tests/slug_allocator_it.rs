// std
use std::{
	collections::HashSet,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use parking_lot::Mutex;
// self
use record_broker::{
	auth::SlugNamespace,
	cache::TieredCache,
	config::SlugConfig,
	error::Error,
	retry::RetryPolicy,
	slug::{FnProbe, SlugAllocator, SlugProbe},
	store::{KvStore, MemoryStore},
};

struct Taken {
	slugs: Mutex<HashSet<String>>,
	probes: AtomicUsize,
}

fn allocator(taken: &Arc<Taken>, config: SlugConfig) -> SlugAllocator {
	let durable: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let cache = TieredCache::new(durable, RetryPolicy::none());
	let probe: Arc<dyn SlugProbe> = Arc::new(FnProbe::new({
		let taken = Arc::clone(taken);

		move |_namespace: SlugNamespace, candidate: String| {
			let taken = Arc::clone(&taken);

			async move {
				taken.probes.fetch_add(1, Ordering::SeqCst);

				Ok::<_, Error>(taken.slugs.lock().contains(&candidate))
			}
		}
	}));
	let namespace = SlugNamespace::new("notes").expect("Namespace fixture should be valid.");

	SlugAllocator::new(cache, probe, namespace, config)
}

fn taken_set() -> Arc<Taken> {
	Arc::new(Taken { slugs: Mutex::new(HashSet::new()), probes: AtomicUsize::new(0) })
}

#[tokio::test]
async fn collisions_get_numeric_suffixes() {
	let taken = taken_set();
	let allocator = allocator(&taken, SlugConfig::default());

	for expected in ["ha-noi", "ha-noi-2", "ha-noi-3"] {
		let slug = allocator.allocate("Hà Nội").await.expect("Allocation should succeed.");

		assert_eq!(slug, expected);
		taken.slugs.lock().insert(slug);
	}

	// Taken answers are served from the cache; a claimed slug's cached answer is dropped.
	assert_eq!(taken.probes.load(Ordering::SeqCst), 5);
	assert_eq!(allocator.probe_key("ha-noi"), "slug:notes:ha-noi");
}

#[tokio::test]
async fn gaps_are_reused() {
	let taken = taken_set();

	taken.slugs.lock().extend(["quarterly-report".to_owned(), "quarterly-report-3".to_owned()]);

	let allocator = allocator(&taken, SlugConfig::default());
	let slug = allocator.allocate("Quarterly Report").await.expect("Allocation should succeed.");

	assert_eq!(slug, "quarterly-report-2");
}

#[tokio::test]
async fn allocation_gives_up_after_the_attempt_cap() {
	let taken = taken_set();

	taken.slugs.lock().extend(["draft".to_owned(), "draft-2".to_owned(), "draft-3".to_owned()]);

	let allocator = allocator(&taken, SlugConfig { max_attempts: 3, ..Default::default() });
	let err = allocator.allocate("Draft").await.expect_err("Every candidate is taken.");

	assert!(matches!(err, Error::SlugExhausted { ref base, attempts: 3 } if base == "draft"));
	assert_eq!(taken.probes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn text_without_slug_characters_is_rejected() {
	let taken = taken_set();
	let allocator = allocator(&taken, SlugConfig::default());
	let err = allocator.allocate(" -- !! ").await.expect_err("Nothing slug-safe remains.");

	assert!(matches!(err, Error::EmptySlug { .. }));
	assert_eq!(taken.probes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn probe_failures_propagate() {
	let durable: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let cache = TieredCache::new(durable, RetryPolicy::none());
	let probe: Arc<dyn SlugProbe> = Arc::new(FnProbe::new(|_: SlugNamespace, _: String| async {
		Err::<bool, _>(Error::Rejected { status: 403, message: "forbidden".into() })
	}));
	let allocator = SlugAllocator::new(
		cache,
		probe,
		SlugNamespace::new("notes").expect("Namespace fixture should be valid."),
		SlugConfig::default(),
	);
	let err = allocator.allocate("Any title").await.expect_err("Probe failure should surface.");

	assert!(matches!(err, Error::Rejected { status: 403, .. }));
}
