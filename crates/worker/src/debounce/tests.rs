use std::time::Duration;

use tokio::time::{advance, timeout};

use super::*;

const DELAY: Duration = Duration::from_millis(1500);

#[tokio::test(start_paused = true)]
async fn burst_collapses_to_last_payload() {
	let mut debouncer = Debouncer::new(DELAY);
	assert!(!debouncer.schedule("first"));
	advance(Duration::from_millis(400)).await;
	assert!(debouncer.schedule("second"));

	let fired = timeout(Duration::from_secs(5), debouncer.expired()).await;
	assert_eq!(fired, Ok("second"));
	assert!(!debouncer.is_pending());
}

#[tokio::test(start_paused = true)]
async fn reschedule_restarts_quiet_period() {
	let mut debouncer = Debouncer::new(DELAY);
	debouncer.schedule(1);
	advance(Duration::from_millis(1000)).await;
	debouncer.schedule(2);
	advance(Duration::from_millis(1000)).await;

	assert_eq!(debouncer.poll_due(Instant::now()), None);
	advance(Duration::from_millis(500)).await;
	assert_eq!(debouncer.poll_due(Instant::now()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn cancel_discards_and_expired_waits_forever() {
	let mut debouncer = Debouncer::new(DELAY);
	debouncer.schedule("stale");
	assert_eq!(debouncer.cancel(), Some("stale"));

	let waited = timeout(Duration::from_secs(10), debouncer.expired()).await;
	assert!(waited.is_err());
}

#[tokio::test(start_paused = true)]
async fn flush_bypasses_delay() {
	let mut debouncer = Debouncer::new(DELAY);
	debouncer.schedule(7);
	assert_eq!(debouncer.peek(), Some(&7));
	assert_eq!(debouncer.flush(), Some(7));
	assert_eq!(debouncer.flush(), None);
}

#[tokio::test(start_paused = true)]
async fn dropped_expiry_keeps_payload() {
	let mut debouncer = Debouncer::new(DELAY);
	debouncer.schedule("kept");
	let early = timeout(Duration::from_millis(100), debouncer.expired()).await;
	assert!(early.is_err());
	assert_eq!(debouncer.peek(), Some(&"kept"));
}
