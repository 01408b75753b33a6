//! Sliding-window admission for every call that reaches the record service.
//!
//! Callers enqueue a ticket and wait. A single drain task, spawned whenever the queue gains work
//! and no drain is running, admits tickets in submission order while the [`RateWindow`] has
//! room, and otherwise sleeps until the oldest admission leaves the window. The admitted caller
//! runs its own call, so results and panics stay with the caller that submitted them.

mod window;

pub use window::RateWindow;

// crates.io
use tokio::{sync::oneshot, time::Instant};
// self
use crate::{
	_prelude::*,
	config::SchedulerConfig,
	obs::{self, OpSpan, Operation, Outcome},
};

type Ticket = oneshot::Sender<Result<()>>;

/// FIFO, window-bounded scheduler shared by every outbound call.
#[derive(Clone, Debug)]
pub struct RateScheduler {
	inner: Arc<SchedulerInner>,
}
impl RateScheduler {
	/// Creates a scheduler from validated limits.
	pub fn new(config: SchedulerConfig) -> Self {
		let window = RateWindow::new(config.max_per_window, config.window());

		Self {
			inner: Arc::new(SchedulerInner {
				safety_margin: config.safety_margin(),
				state: Mutex::new(SchedulerState {
					queue: VecDeque::new(),
					window,
					draining: false,
					closed: false,
					next_id: 0,
				}),
			}),
		}
	}

	/// Waits for admission, then runs `call` and returns its result untouched.
	///
	/// Fails with [`Error::SchedulerCleared`] if the queue is cleared or the scheduler closed
	/// before the call was admitted; `call` is never invoked in that case.
	pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let span = OpSpan::new(Operation::Schedule, "execute");

		obs::record_operation_outcome(Operation::Schedule, Outcome::Attempt);

		let admitted = span
			.instrument(async {
				let ticket = SchedulerInner::enqueue(&self.inner)?;

				ticket.await.unwrap_or(Err(Error::SchedulerCleared))
			})
			.await;

		obs::record_operation_outcome(Operation::Schedule, Outcome::of(&admitted));
		admitted?;

		call().await
	}

	/// Rejects every queued call with [`Error::SchedulerCleared`]; returns how many were dropped.
	pub fn clear_queue(&self) -> usize {
		let drained = {
			let mut state = self.inner.state.lock();

			state.queue.drain(..).collect::<Vec<_>>()
		};
		let count = drained.len();

		for call in drained {
			let _ = call.ticket.send(Err(Error::SchedulerCleared));
		}

		if count > 0 {
			obs::trace_event(Operation::Schedule, "queue_cleared", count);
		}

		count
	}

	/// Clears the queue and refuses every later submission.
	pub fn close(&self) {
		self.inner.state.lock().closed = true;
		self.clear_queue();
	}

	/// Returns `true` once [`close`](Self::close) has run.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}

	/// Calls waiting for admission.
	pub fn pending(&self) -> usize {
		self.inner.state.lock().queue.len()
	}
}
impl Default for RateScheduler {
	fn default() -> Self {
		Self::new(SchedulerConfig::default())
	}
}

#[derive(Debug)]
struct SchedulerInner {
	safety_margin: StdDuration,
	state: Mutex<SchedulerState>,
}
impl SchedulerInner {
	fn enqueue(this: &Arc<Self>) -> Result<oneshot::Receiver<Result<()>>> {
		let (ticket, admission) = oneshot::channel();
		let spawn_drain = {
			let mut state = this.state.lock();

			if state.closed {
				return Err(Error::SchedulerCleared);
			}

			let id = state.next_id;

			state.next_id += 1;
			state.queue.push_back(QueuedCall { id, ticket, enqueued_at: Instant::now() });

			!std::mem::replace(&mut state.draining, true)
		};

		if spawn_drain {
			tokio::spawn(Self::drain(Arc::clone(this)));
		}

		Ok(admission)
	}

	async fn drain(self: Arc<Self>) {
		loop {
			let wake_at = {
				let mut state = self.state.lock();
				let now = Instant::now();

				state.window.prune(now);

				if state.queue.is_empty() {
					state.draining = false;

					return;
				}

				match state.window.next_free_at() {
					Some(at) => at + self.safety_margin,
					None => {
						let Some(call) = state.queue.pop_front() else { continue };

						// A caller that stopped waiting does not consume a slot.
						if call.ticket.send(Ok(())).is_ok() {
							state.window.record(now);
						} else {
							obs::trace_event(
								Operation::Schedule,
								"caller_gone",
								format_args!("call {} after {:?}", call.id, call.enqueued_at.elapsed()),
							);
						}

						continue;
					},
				}
			};

			obs::trace_event(
				Operation::Schedule,
				"window_full",
				format_args!("sleeping {:?}", wake_at.saturating_duration_since(Instant::now())),
			);
			tokio::time::sleep_until(wake_at).await;
		}
	}
}

#[derive(Debug)]
struct SchedulerState {
	queue: VecDeque<QueuedCall>,
	window: RateWindow,
	draining: bool,
	closed: bool,
	next_id: u64,
}

#[derive(Debug)]
struct QueuedCall {
	id: u64,
	ticket: Ticket,
	enqueued_at: Instant,
}
