//! Backoff policy applied to network fetches behind the tiered cache.

// crates.io
use backon::{ExponentialBuilder, Retryable};
// self
use crate::{
	_prelude::*,
	error::RetryClass,
	obs::{self, Operation},
};

/// Retry budgets and the exponential backoff curve.
///
/// The `n`-th retry (zero based) waits `base_delay_ms * 2^n`, so the default curve is 1 s, 2 s,
/// 4 s. Each failure is judged by its own [`RetryClass`]; the total number of retries already
/// spent is compared against that class's budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Retries granted to rate-limited failures.
	pub rate_limited_retries: u32,
	/// Retries granted to other transient failures.
	pub transient_retries: u32,
	/// First backoff step, in milliseconds.
	pub base_delay_ms: u64,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub const fn none() -> Self {
		Self { rate_limited_retries: 0, transient_retries: 0, base_delay_ms: 0 }
	}

	/// Retry budget for a failure class.
	pub fn budget(&self, class: RetryClass) -> u32 {
		match class {
			RetryClass::RateLimited => self.rate_limited_retries,
			RetryClass::Transient => self.transient_retries,
			RetryClass::Fatal => 0,
		}
	}

	/// Exponential curve starting at `base_delay_ms` and doubling, capped by the larger budget.
	fn backoff(&self) -> ExponentialBuilder {
		let max_times = self.rate_limited_retries.max(self.transient_retries);

		ExponentialBuilder::default()
			.with_min_delay(StdDuration::from_millis(self.base_delay_ms))
			.with_factor(2.0)
			.with_max_times(usize::try_from(max_times).unwrap_or(usize::MAX))
	}

	/// Runs `call` until it succeeds, fails fatally, or exhausts the budget for its failure class.
	pub async fn run<T, F, Fut>(&self, op: Operation, call: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut retries = 0;

		call.retry(self.backoff())
			.when(|err: &Error| {
				if retries >= self.budget(err.retry_class()) {
					return false;
				}

				retries += 1;

				true
			})
			.notify(|err: &Error, delay: StdDuration| {
				obs::trace_event(op, "retry_backoff", format_args!("{err}; waiting {delay:?}"));
			})
			.await
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { rate_limited_retries: 3, transient_retries: 2, base_delay_ms: 1_000 }
	}
}
