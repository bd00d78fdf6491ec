use std::time::Duration;

use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
struct Pending<T> {
	payload: T,
	deadline: Instant,
}

/// Trailing-edge debounce with an owned timer.
///
/// At most one payload is pending. Each [`schedule`](Self::schedule) replaces
/// it and restarts the quiet period, so a burst collapses into the last
/// payload. [`cancel`](Self::cancel) and [`flush`](Self::flush) both remove the
/// pending payload; they differ only in what the caller intends to do with it.
#[derive(Debug)]
pub struct Debouncer<T> {
	delay: Duration,
	pending: Option<Pending<T>>,
}

impl<T> Debouncer<T> {
	pub fn new(delay: Duration) -> Self {
		Self { delay, pending: None }
	}

	pub fn delay(&self) -> Duration {
		self.delay
	}

	/// Changes the quiet period. Applies from the next `schedule`.
	pub fn set_delay(&mut self, delay: Duration) {
		self.delay = delay;
	}

	/// Replaces the pending payload and restarts the timer.
	///
	/// Returns `true` when an earlier payload was superseded.
	pub fn schedule(&mut self, payload: T) -> bool {
		let superseded = self.pending.is_some();
		self.pending = Some(Pending {
			payload,
			deadline: Instant::now() + self.delay,
		});
		superseded
	}

	/// Drops the pending payload without acting on it.
	pub fn cancel(&mut self) -> Option<T> {
		self.pending.take().map(|pending| pending.payload)
	}

	/// Takes the pending payload immediately, bypassing the quiet period.
	pub fn flush(&mut self) -> Option<T> {
		self.pending.take().map(|pending| pending.payload)
	}

	pub fn is_pending(&self) -> bool {
		self.pending.is_some()
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.pending.as_ref().map(|pending| pending.deadline)
	}

	pub fn peek(&self) -> Option<&T> {
		self.pending.as_ref().map(|pending| &pending.payload)
	}

	/// Takes the payload if its quiet period has elapsed at `now`.
	pub fn poll_due(&mut self, now: Instant) -> Option<T> {
		if self.pending.as_ref().is_some_and(|pending| now >= pending.deadline) {
			return self.flush();
		}
		None
	}

	/// Resolves with the payload once its quiet period elapses.
	///
	/// Never resolves while nothing is pending. Cancel-safe: dropping the
	/// future before it resolves leaves the pending payload in place, which
	/// makes it suitable as a `tokio::select!` branch.
	pub async fn expired(&mut self) -> T {
		loop {
			let Some(deadline) = self.deadline() else {
				std::future::pending::<()>().await;
				continue;
			};
			sleep_until(deadline).await;
			if let Some(payload) = self.flush() {
				return payload;
			}
		}
	}
}

#[cfg(test)]
mod tests;
