//! Shared task and timer primitives.
//!
//! * [`Debouncer`]: trailing-edge debounce owning its pending payload and deadline
//! * [`RetryPolicy`]: capped exponential backoff schedule for reconnection
//! * [`spawn`]: task spawning tagged with a [`TaskClass`] for tracing

mod backoff;
mod class;
mod debounce;
mod spawn;

pub use backoff::{Backoff, RetryPolicy};
pub use class::TaskClass;
pub use debounce::Debouncer;
pub use spawn::spawn;
