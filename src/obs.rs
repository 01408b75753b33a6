//! Optional observability hooks for access-layer operations.
//!
//! # Feature Flags
//!
//! - `tracing`: operations run inside spans named `record_broker.op` carrying the `op` and `stage`
//!   fields; notable events (window waits, retry backoff, dropped refreshes) become `debug` events.
//! - `metrics`: the `record_broker_operation_total` counter tracks attempt/success/failure per
//!   `op`, and `record_broker_cache_lookup_total` tracks which cache tier answered.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the access layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Admission through the rate scheduler.
	Schedule,
	/// Tiered cache read.
	CacheFetch,
	/// Building the authorization URL.
	Authorize,
	/// Authorization code exchange.
	Exchange,
	/// Refresh grant.
	Refresh,
	/// Slug allocation.
	SlugAllocate,
	/// Call to the record service.
	RemoteCall,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Schedule => "schedule",
			Self::CacheFetch => "cache_fetch",
			Self::Authorize => "authorize",
			Self::Exchange => "exchange",
			Self::Refresh => "refresh",
			Self::SlugAllocate => "slug_allocate",
			Self::RemoteCall => "remote_call",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Attempt => "attempt",
			Self::Success => "success",
			Self::Failure => "failure",
		}
	}

	/// Maps a result onto its terminal outcome.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { Self::Success } else { Self::Failure }
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Cache tier that answered a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheTier {
	/// In-process tier.
	L1,
	/// Durable tier.
	L2,
	/// Joined a fetch already in flight.
	Joined,
	/// Fetched from the network.
	Network,
}
impl CacheTier {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::L1 => "l1",
			Self::L2 => "l2",
			Self::Joined => "joined",
			Self::Network => "network",
		}
	}
}
