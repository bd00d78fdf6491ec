use std::time::Duration;

/// Capped exponential delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
	pub base: Duration,
	pub max: Duration,
}

impl Backoff {
	pub const fn new(base: Duration, max: Duration) -> Self {
		Self { base, max }
	}

	/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped at `max`.
	pub fn delay(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(31);
		self.base.saturating_mul(1u32 << exponent).min(self.max)
	}
}

impl Default for Backoff {
	fn default() -> Self {
		Self {
			base: Duration::from_secs(1),
			max: Duration::from_secs(30),
		}
	}
}

/// Retry policy: a backoff schedule plus an optional attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
	pub backoff: Backoff,
	/// `None` retries forever.
	pub max_attempts: Option<u32>,
}

impl RetryPolicy {
	/// Delay before retry `attempt`, or `None` once the cap is exhausted.
	pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
		match self.max_attempts {
			Some(max) if attempt > max => None,
			_ => Some(self.backoff.delay(attempt)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn delays_double_until_capped() {
		let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(4));
		let delays: Vec<_> = (1..=6).map(|attempt| backoff.delay(attempt)).collect();
		assert_eq!(
			delays,
			vec![
				Duration::from_millis(500),
				Duration::from_secs(1),
				Duration::from_secs(2),
				Duration::from_secs(4),
				Duration::from_secs(4),
				Duration::from_secs(4),
			]
		);
	}

	#[test]
	fn huge_attempt_counts_saturate() {
		let backoff = Backoff::default();
		assert_eq!(backoff.delay(u32::MAX), backoff.max);
	}

	#[test]
	fn policy_stops_after_cap() {
		let policy = RetryPolicy {
			backoff: Backoff::default(),
			max_attempts: Some(2),
		};
		assert!(policy.delay_for(2).is_some());
		assert_eq!(policy.delay_for(3), None);
		assert!(RetryPolicy::default().delay_for(1000).is_some());
	}
}
