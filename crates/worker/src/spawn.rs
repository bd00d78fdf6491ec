use std::future::Future;

use tokio::task::JoinHandle;

use crate::TaskClass;

/// Spawns an async task on the current runtime, labelled with its class.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn<F>(class: TaskClass, name: &'static str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), task = name, "worker.spawn");
	tokio::spawn(fut)
}
