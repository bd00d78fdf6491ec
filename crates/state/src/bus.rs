//! Process-wide project event fan-out.
//!
//! Publishers never learn who listens. Each live module holds a
//! [`Subscription`] scoped to its project; dropping it unsubscribes.

use std::fmt;

use chrono::{DateTime, Utc};
use pandaura_primitives::{ModuleId, ProjectId, VersionNumber};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default number of events buffered per subscriber.
const DEFAULT_CAPACITY: usize = 64;

/// A completed rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackEvent {
	pub project_id: ProjectId,
	pub rolled_back_to: VersionNumber,
	/// The version holding the restored snapshot, now current.
	pub new_version: VersionNumber,
	pub timestamp: DateTime<Utc>,
}

/// User-initiated version actions, named in failure notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionAction {
	Create,
	Rollback,
	Delete,
}

impl VersionAction {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Create => "create version",
			Self::Rollback => "rollback",
			Self::Delete => "delete version",
		}
	}
}

impl fmt::Display for VersionAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
	RolledBack(RollbackEvent),
	/// A module's durable state changed.
	StateChanged { project_id: ProjectId, module: ModuleId },
	VersionDeleted { project_id: ProjectId, version: VersionNumber },
	VersionCreated {
		project_id: ProjectId,
		version: VersionNumber,
		is_auto: bool,
	},
	/// A module's unsaved-changes flag flipped.
	UnsavedChanges {
		project_id: ProjectId,
		module: ModuleId,
		has_unsaved_changes: bool,
	},
	/// A user-initiated version action failed; the UI shows a dismissible notice.
	ActionFailed {
		project_id: ProjectId,
		action: VersionAction,
		reason: String,
	},
	/// Delivered by a [`Subscription`] that fell behind: `skipped` events
	/// were dropped and may have included a rollback. Never published.
	Lagged { project_id: ProjectId, skipped: u64 },
}

impl ProjectEvent {
	pub fn project_id(&self) -> ProjectId {
		match self {
			Self::RolledBack(event) => event.project_id,
			Self::StateChanged { project_id, .. }
			| Self::VersionDeleted { project_id, .. }
			| Self::VersionCreated { project_id, .. }
			| Self::UnsavedChanges { project_id, .. }
			| Self::ActionFailed { project_id, .. }
			| Self::Lagged { project_id, .. } => *project_id,
		}
	}

	pub const fn kind(&self) -> &'static str {
		match self {
			Self::RolledBack(_) => "rolled_back",
			Self::StateChanged { .. } => "state_changed",
			Self::VersionDeleted { .. } => "version_deleted",
			Self::VersionCreated { .. } => "version_created",
			Self::UnsavedChanges { .. } => "unsaved_changes",
			Self::ActionFailed { .. } => "action_failed",
			Self::Lagged { .. } => "lagged",
		}
	}
}

/// Cloneable publish handle. Every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct ProjectEventBus {
	tx: broadcast::Sender<ProjectEvent>,
}

impl Default for ProjectEventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}

impl ProjectEventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	/// Publishes to current subscribers. Returns how many received it.
	pub fn publish(&self, event: ProjectEvent) -> usize {
		trace!(project_id = %event.project_id(), kind = event.kind(), "state.bus.publish");
		self.tx.send(event).unwrap_or(0)
	}

	/// Subscribes to events for `project_id` only.
	pub fn subscribe(&self, project_id: ProjectId) -> Subscription {
		Subscription {
			project_id,
			rx: self.tx.subscribe(),
		}
	}

	pub fn subscriber_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

/// A project-scoped event stream.
#[derive(Debug)]
pub struct Subscription {
	project_id: ProjectId,
	rx: broadcast::Receiver<ProjectEvent>,
}

impl Subscription {
	pub fn project_id(&self) -> ProjectId {
		self.project_id
	}

	/// Next event for this project. Cancel-safe.
	///
	/// Returns `None` once every bus handle is gone. Overflow is reported as
	/// [`ProjectEvent::Lagged`] before the events that survived it.
	pub async fn recv(&mut self) -> Option<ProjectEvent> {
		loop {
			match self.rx.recv().await {
				Ok(event) if event.project_id() == self.project_id => return Some(event),
				Ok(_) => continue,
				Err(broadcast::error::RecvError::Lagged(skipped)) => return Some(self.lagged(skipped)),
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Next already-buffered event for this project, without waiting.
	pub fn try_recv(&mut self) -> Option<ProjectEvent> {
		loop {
			match self.rx.try_recv() {
				Ok(event) if event.project_id() == self.project_id => return Some(event),
				Ok(_) => continue,
				Err(broadcast::error::TryRecvError::Lagged(skipped)) => return Some(self.lagged(skipped)),
				Err(_) => return None,
			}
		}
	}

	fn lagged(&self, skipped: u64) -> ProjectEvent {
		warn!(project_id = %self.project_id, skipped, "state.bus.lagged");
		ProjectEvent::Lagged {
			project_id: self.project_id,
			skipped,
		}
	}
}
