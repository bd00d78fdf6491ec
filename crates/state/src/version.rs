//! Version history operations for one project.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pandaura_primitives::{ProjectId, ProjectState, VersionNumber, VersionSummary};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{Error, ProjectBackend, ProjectEvent, ProjectEventBus, Result, RollbackEvent, RollbackOutcome, VersionAction};

/// Default spacing between versions.
pub const DEFAULT_MIN_VERSION_INTERVAL: Duration = Duration::from_secs(30);

/// Creates, reads, deletes, and rolls back versions, announcing each change
/// on the event bus.
///
/// Manual failures are returned and also published as
/// [`ProjectEvent::ActionFailed`]; no local state changes on failure.
/// Automatic versions never fail outward.
pub struct VersionControlManager {
	project_id: ProjectId,
	backend: Arc<dyn ProjectBackend>,
	bus: ProjectEventBus,
	min_interval: Duration,
	last_version_time: Option<Instant>,
	/// Newest first.
	history: Vec<VersionSummary>,
}

impl std::fmt::Debug for VersionControlManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("VersionControlManager")
			.field("project_id", &self.project_id)
			.field("min_interval", &self.min_interval)
			.field("history", &self.history.len())
			.finish_non_exhaustive()
	}
}

impl VersionControlManager {
	pub fn new(project_id: ProjectId, backend: Arc<dyn ProjectBackend>, bus: ProjectEventBus) -> Self {
		Self {
			project_id,
			backend,
			bus,
			min_interval: DEFAULT_MIN_VERSION_INTERVAL,
			last_version_time: None,
			history: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
		self.min_interval = min_interval;
		self
	}

	pub fn project_id(&self) -> ProjectId {
		self.project_id
	}

	/// Whether the throttle interval has passed since the last version.
	///
	/// Advisory for manual versions: callers disable the action, the backend
	/// stays authoritative. Automatic versions are skipped while throttled.
	pub fn can_create_version(&self) -> bool {
		self.last_version_time.is_none_or(|at| at.elapsed() >= self.min_interval)
	}

	/// Cached history from the last fetch, newest first.
	pub fn history(&self) -> &[VersionSummary] {
		&self.history
	}

	pub fn current_version(&self) -> Option<VersionNumber> {
		self.history.first().map(|v| v.version_number)
	}

	pub async fn refresh_history(&mut self) -> Result<&[VersionSummary]> {
		let history = self.backend.get_version_history(self.project_id).await?;
		debug!(project_id = %self.project_id, versions = history.len(), "versions.history_refreshed");
		self.history = history;
		Ok(&self.history)
	}

	pub async fn create_version(&mut self, message: &str, state: &ProjectState) -> Result<VersionNumber> {
		if !self.can_create_version() {
			debug!(project_id = %self.project_id, "versions.create_within_interval");
		}
		match self.backend.create_version(self.project_id, state, message).await {
			Ok(version) => {
				self.record_created(version, message, false);
				Ok(version)
			}
			Err(err) => Err(self.action_failed(VersionAction::Create, err.into_save())),
		}
	}

	/// Restores `version` as the live state, recorded as a new version.
	pub async fn rollback_to_version(&mut self, version: VersionNumber) -> Result<RollbackOutcome> {
		let outcome = match self.backend.rollback_to_version(self.project_id, version).await {
			Ok(outcome) => outcome,
			Err(err) => return Err(self.action_failed(VersionAction::Rollback, err)),
		};
		debug!(
			project_id = %self.project_id,
			rolled_back_to = %outcome.rolled_back_to,
			new_version = %outcome.new_version,
			"versions.rolled_back"
		);

		self.last_version_time = Some(Instant::now());
		if let Err(err) = self.refresh_history().await {
			warn!(project_id = %self.project_id, error = %err, "versions.history_refresh_failed");
			self.push_summary(outcome.new_version, format!("Rolled back to {version}"), false);
		}
		self.bus.publish(ProjectEvent::RolledBack(RollbackEvent {
			project_id: self.project_id,
			rolled_back_to: outcome.rolled_back_to,
			new_version: outcome.new_version,
			timestamp: Utc::now(),
		}));
		Ok(outcome)
	}

	pub async fn delete_version(&mut self, version: VersionNumber) -> Result<()> {
		if let Err(err) = self.backend.delete_version(self.project_id, version).await {
			return Err(self.action_failed(VersionAction::Delete, err));
		}
		self.history.retain(|v| v.version_number != version);
		debug!(project_id = %self.project_id, %version, "versions.deleted");
		self.bus.publish(ProjectEvent::VersionDeleted {
			project_id: self.project_id,
			version,
		});
		Ok(())
	}

	/// Read-only snapshot of `version`.
	pub async fn get_version_data(&self, version: VersionNumber) -> Result<ProjectState> {
		self.backend.get_version_snapshot(self.project_id, version).await
	}

	/// Records an automatic version unless throttled. Failures are logged and
	/// swallowed.
	pub async fn trigger_auto_version(&mut self, state: &ProjectState, reason: &str) -> Option<VersionNumber> {
		if !self.can_create_version() {
			debug!(project_id = %self.project_id, reason, "versions.auto_throttled");
			return None;
		}
		let message = format!("Auto-save: {reason}");
		match self.backend.create_auto_save_version(self.project_id, state, &message).await {
			Ok(version) => {
				self.record_created(version, &message, true);
				Some(version)
			}
			Err(err) => {
				warn!(project_id = %self.project_id, reason, error = %err, "versions.auto_failed");
				None
			}
		}
	}

	fn record_created(&mut self, version: VersionNumber, message: &str, is_auto: bool) {
		self.last_version_time = Some(Instant::now());
		self.push_summary(version, message.to_string(), is_auto);
		debug!(project_id = %self.project_id, %version, is_auto, "versions.created");
		self.bus.publish(ProjectEvent::VersionCreated {
			project_id: self.project_id,
			version,
			is_auto,
		});
	}

	fn push_summary(&mut self, version: VersionNumber, message: String, is_auto: bool) {
		self.history.insert(
			0,
			VersionSummary {
				version_number: version,
				message,
				is_auto,
				created_at: Utc::now(),
			},
		);
	}

	fn action_failed(&self, action: VersionAction, err: Error) -> Error {
		error!(project_id = %self.project_id, %action, error = %err, "versions.action_failed");
		self.bus.publish(ProjectEvent::ActionFailed {
			project_id: self.project_id,
			action,
			reason: err.to_string(),
		});
		err
	}
}
