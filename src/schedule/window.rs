// crates.io
use tokio::time::Instant;
// self
use crate::_prelude::*;

/// Timestamps of recent admissions, oldest first.
#[derive(Clone, Debug)]
pub struct RateWindow {
	admissions: VecDeque<Instant>,
	limit: usize,
	length: StdDuration,
}
impl RateWindow {
	/// Creates an empty window admitting `limit` calls per `length`.
	pub fn new(limit: u32, length: StdDuration) -> Self {
		let limit = usize::try_from(limit).unwrap_or(usize::MAX).max(1);

		Self { admissions: VecDeque::with_capacity(limit), limit, length }
	}

	/// Drops admissions that left the window at `now`.
	pub fn prune(&mut self, now: Instant) {
		while self.admissions.front().is_some_and(|at| now.duration_since(*at) >= self.length) {
			self.admissions.pop_front();
		}
	}

	/// Earliest instant a new admission fits, or `None` if one fits now. Call after [`prune`](Self::prune).
	pub fn next_free_at(&self) -> Option<Instant> {
		if self.admissions.len() < self.limit {
			return None;
		}

		self.admissions.front().map(|oldest| *oldest + self.length)
	}

	/// Records an admission at `now`.
	pub fn record(&mut self, now: Instant) {
		self.admissions.push_back(now);
	}

	/// Admissions currently inside the window.
	pub fn len(&self) -> usize {
		self.admissions.len()
	}

	/// Returns `true` when no admission is inside the window.
	pub fn is_empty(&self) -> bool {
		self.admissions.is_empty()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn window_frees_when_the_oldest_admission_ages_out() {
		let mut window = RateWindow::new(2, StdDuration::from_secs(1));
		let t0 = Instant::now();

		window.record(t0);
		window.record(t0 + StdDuration::from_millis(300));

		assert_eq!(window.next_free_at(), Some(t0 + StdDuration::from_secs(1)));

		window.prune(t0 + StdDuration::from_millis(999));

		assert_eq!(window.len(), 2);

		window.prune(t0 + StdDuration::from_secs(1));

		assert_eq!(window.len(), 1);
		assert_eq!(window.next_free_at(), None);
	}
}
