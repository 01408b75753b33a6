//! Human-readable identifiers that avoid collisions with existing records.
//!
//! The allocator probes `base`, `base-2`, `base-3`, ... until a candidate is free. Nothing is
//! locked between the probe and the caller's create request, so two allocators racing on the
//! same text can both receive the same slug. The record service's own uniqueness constraint,
//! where it has one, is the final arbiter.

mod normalize;
mod probe;

pub use normalize::*;
pub use probe::*;

// self
use crate::{
	_prelude::*,
	auth::SlugNamespace,
	cache::TieredCache,
	config::SlugConfig,
	obs::{self, OpSpan, Operation, Outcome},
};

/// Allocates free slugs within one namespace.
pub struct SlugAllocator<P = dyn SlugProbe>
where
	P: ?Sized,
{
	cache: TieredCache,
	probe: Arc<P>,
	namespace: SlugNamespace,
	config: SlugConfig,
}
impl<P> SlugAllocator<P>
where
	P: ?Sized + SlugProbe,
{
	/// Creates an allocator whose probe answers are cached in `cache`.
	pub fn new(
		cache: TieredCache,
		probe: Arc<P>,
		namespace: SlugNamespace,
		config: SlugConfig,
	) -> Self {
		Self { cache, probe, namespace, config }
	}

	/// Namespace probed by this allocator.
	pub fn namespace(&self) -> &SlugNamespace {
		&self.namespace
	}

	/// Returns the first free candidate derived from `raw`.
	///
	/// Fails with [`Error::EmptySlug`] when `raw` has no slug-safe characters and with
	/// [`Error::SlugExhausted`] once `max_attempts` candidates were all taken.
	pub async fn allocate(&self, raw: &str) -> Result<String> {
		let span = OpSpan::new(Operation::SlugAllocate, "allocate");

		obs::record_operation_outcome(Operation::SlugAllocate, Outcome::Attempt);

		let result = span.instrument(self.allocate_inner(raw)).await;

		obs::record_operation_outcome(Operation::SlugAllocate, Outcome::of(&result));

		result
	}

	/// Cache key holding the probe answer for `candidate`.
	pub fn probe_key(&self, candidate: &str) -> String {
		format!("slug:{}:{candidate}", self.namespace)
	}

	async fn allocate_inner(&self, raw: &str) -> Result<String> {
		let base = normalize_slug(raw)?;

		for attempt in 1..=self.config.max_attempts {
			let slug = candidate(&base, attempt);

			if !self.is_taken(&slug).await? {
				// The caller is about to claim it; the cached "free" answer is now wrong.
				self.cache.invalidate(&self.probe_key(&slug)).await?;

				return Ok(slug);
			}
		}

		Err(Error::SlugExhausted { base, attempts: self.config.max_attempts })
	}

	async fn is_taken(&self, slug: &str) -> Result<bool> {
		let probe = Arc::clone(&self.probe);
		let namespace = self.namespace.clone();
		let candidate = slug.to_owned();

		self.cache
			.get(
				&self.probe_key(slug),
				move || {
					let probe = Arc::clone(&probe);
					let namespace = namespace.clone();
					let candidate = candidate.clone();

					async move { probe.exists(&namespace, &candidate).await }
				},
				self.config.probe,
			)
			.await
	}
}
impl<P> Debug for SlugAllocator<P>
where
	P: ?Sized,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SlugAllocator")
			.field("namespace", &self.namespace)
			.field("max_attempts", &self.config.max_attempts)
			.finish()
	}
}
