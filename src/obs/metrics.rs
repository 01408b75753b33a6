// self
use crate::obs::{CacheTier, Operation, Outcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_operation_outcome(op: Operation, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"record_broker_operation_total",
			"op" => op.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (op, outcome);
	}
}

/// Records which tier served a cache lookup.
pub fn record_cache_lookup(tier: CacheTier) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("record_broker_cache_lookup_total", "tier" => tier.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = tier;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_callable_without_a_backend() {
		record_operation_outcome(Operation::CacheFetch, Outcome::Failure);
		record_cache_lookup(CacheTier::Joined);
	}
}
