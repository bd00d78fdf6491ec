//! Debounced durable persistence for one module's slice of project state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pandaura_primitives::{ModuleId, ModuleState, ProjectId, ProjectState};
use pandaura_worker::Debouncer;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::{Error, KeyValueStore, ProjectBackend, ProjectEvent, ProjectEventBus, Result, fallback_key};

/// Autosave tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
	pub debounce: Duration,
	/// Upper bound on the final save attempted when the page closes.
	pub close_flush_timeout: Duration,
}

impl Default for AutosaveConfig {
	fn default() -> Self {
		Self {
			debounce: Duration::from_secs(1),
			close_flush_timeout: Duration::from_secs(2),
		}
	}
}

/// Observable save state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutosaveStatus {
	pub is_saving: bool,
	/// When the last durable write was confirmed.
	pub last_saved: Option<DateTime<Utc>>,
	pub save_error: Option<String>,
	/// In-memory state differs from the last confirmed write.
	pub has_unsaved_changes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
	Saved,
	/// The last confirmed write already holds this content; nothing was sent.
	UpToDate,
}

/// Merges module updates in memory and persists them after a quiet period.
///
/// Every merge bumps a revision; a write records the revision it carried.
/// A save is skipped when the confirmed revision is current, so a pending
/// debounced save and an explicit [`save_now`](Self::save_now) never write
/// the same content twice.
pub struct AutosaveController {
	project_id: ProjectId,
	module: ModuleId,
	backend: Arc<dyn ProjectBackend>,
	fallback: Option<Arc<dyn KeyValueStore>>,
	bus: Option<ProjectEventBus>,
	config: AutosaveConfig,
	state: ProjectState,
	revision: u64,
	saved_revision: u64,
	/// This module's state as last known to be durable.
	baseline: Option<ModuleState>,
	debounce: Debouncer<()>,
	status: watch::Sender<AutosaveStatus>,
}

impl std::fmt::Debug for AutosaveController {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AutosaveController")
			.field("project_id", &self.project_id)
			.field("module", &self.module)
			.field("revision", &self.revision)
			.field("saved_revision", &self.saved_revision)
			.field("status", &*self.status.borrow())
			.finish_non_exhaustive()
	}
}

impl AutosaveController {
	pub fn new(project_id: ProjectId, module: ModuleId, backend: Arc<dyn ProjectBackend>, config: AutosaveConfig) -> Self {
		let (status, _) = watch::channel(AutosaveStatus::default());
		Self {
			project_id,
			module,
			backend,
			fallback: None,
			bus: None,
			config,
			state: ProjectState::new(),
			revision: 0,
			saved_revision: 0,
			baseline: None,
			debounce: Debouncer::new(config.debounce),
			status,
		}
	}

	/// Mirrors unsaved state into `store` until it is durably written.
	#[must_use]
	pub fn with_fallback(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.fallback = Some(store);
		self
	}

	#[must_use]
	pub fn with_bus(mut self, bus: ProjectEventBus) -> Self {
		self.bus = Some(bus);
		self
	}

	pub fn project_id(&self) -> ProjectId {
		self.project_id
	}

	pub fn module(&self) -> &ModuleId {
		&self.module
	}

	pub fn state(&self) -> &ProjectState {
		&self.state
	}

	pub fn module_state(&self) -> Option<&ModuleState> {
		self.state.module(&self.module)
	}

	pub fn status(&self) -> AutosaveStatus {
		self.status.borrow().clone()
	}

	pub fn watch_status(&self) -> watch::Receiver<AutosaveStatus> {
		self.status.subscribe()
	}

	pub fn has_pending_save(&self) -> bool {
		self.debounce.is_pending()
	}

	/// Loads the live project state from the backend as the saved baseline.
	pub async fn load(&mut self) -> Result<()> {
		let state = self.backend.get_project_state(self.project_id).await?;
		self.debounce.cancel();
		self.state = state;
		self.mark_saved(None);
		debug!(project_id = %self.project_id, module = %self.module, "autosave.loaded");
		Ok(())
	}

	/// Merges `partial` into this module's state and restarts the debounce.
	pub async fn update_project_state(&mut self, partial: Value) {
		self.state.merge(&self.module, partial, Utc::now());
		self.revision += 1;
		self.debounce.schedule(());
		self.set_unsaved(true);
		self.mirror().await;
	}

	/// Resolves once the debounce elapses. Cancel-safe.
	pub async fn due(&mut self) {
		self.debounce.expired().await;
	}

	/// Runs the debounced save. Failures are recorded in the status, not returned.
	pub async fn save_due(&mut self) {
		if let Err(err) = self.save_now().await {
			warn!(project_id = %self.project_id, module = %self.module, error = %err, "autosave.save_failed");
		}
	}

	/// Saves immediately, cancelling any pending debounced save.
	pub async fn save_now(&mut self) -> Result<SaveOutcome> {
		self.debounce.cancel();
		if self.revision == self.saved_revision {
			trace!(project_id = %self.project_id, module = %self.module, "autosave.up_to_date");
			return Ok(SaveOutcome::UpToDate);
		}
		let Some(module_state) = self.state.module(&self.module).cloned() else {
			self.mark_saved(None);
			return Ok(SaveOutcome::UpToDate);
		};

		let revision = self.revision;
		self.status.send_modify(|status| status.is_saving = true);
		let result = self.backend.save_module_state(self.project_id, &self.module, &module_state).await;

		match result {
			Ok(()) => {
				self.mark_saved(Some(Utc::now()));
				if let Some(store) = &self.fallback
					&& let Err(err) = store.remove(&fallback_key(self.project_id, &self.module)).await
				{
					warn!(error = %err, "autosave.fallback_clear_failed");
				}
				debug!(project_id = %self.project_id, module = %self.module, revision, "autosave.saved");
				self.publish(ProjectEvent::StateChanged {
					project_id: self.project_id,
					module: self.module.clone(),
				});
				Ok(SaveOutcome::Saved)
			}
			Err(err) => {
				let err = err.into_save();
				self.status.send_modify(|status| {
					status.is_saving = false;
					status.save_error = Some(err.to_string());
					status.has_unsaved_changes = true;
				});
				Err(err)
			}
		}
	}

	/// Drops the pending debounced save. Returns whether one was pending.
	pub fn cancel_pending(&mut self) -> bool {
		let pending = self.debounce.cancel().is_some();
		if pending {
			debug!(project_id = %self.project_id, module = %self.module, "autosave.pending_cancelled");
		}
		pending
	}

	/// Replaces the in-memory state wholesale with a snapshot already durable
	/// in the backend.
	///
	/// Pending saves are cancelled first so stale in-memory state cannot
	/// overwrite the restored snapshot.
	pub async fn restore(&mut self, snapshot: ProjectState) {
		self.cancel_pending();
		self.state = snapshot;
		self.revision += 1;
		self.mark_saved(None);
		if let Some(store) = &self.fallback
			&& let Err(err) = store.remove(&fallback_key(self.project_id, &self.module)).await
		{
			warn!(error = %err, "autosave.fallback_clear_failed");
		}
		self.publish(ProjectEvent::StateChanged {
			project_id: self.project_id,
			module: self.module.clone(),
		});
	}

	/// Re-checks this module against the backend after events may have been
	/// missed. Returns whether the in-memory state was replaced.
	///
	/// The pending save is held back while checking. When the durable module
	/// state moved away from the last known baseline, it wins and local
	/// unsaved edits are discarded. Otherwise unsaved edits are rescheduled.
	pub async fn resync(&mut self) -> Result<bool> {
		let held = self.cancel_pending();
		let live = match self.backend.get_project_state(self.project_id).await {
			Ok(live) => live,
			Err(err) => {
				if held {
					self.debounce.schedule(());
				}
				return Err(err);
			}
		};
		if live.module(&self.module) != self.baseline.as_ref() {
			debug!(project_id = %self.project_id, module = %self.module, "autosave.resync_reloaded");
			self.restore(live).await;
			return Ok(true);
		}
		if self.revision != self.saved_revision {
			self.debounce.schedule(());
		}
		trace!(project_id = %self.project_id, module = %self.module, "autosave.resync_unchanged");
		Ok(false)
	}

	/// Best-effort final save bounded by the close timeout. Returns whether
	/// everything ended up durable.
	pub async fn on_page_close(&mut self) -> bool {
		if self.revision == self.saved_revision {
			self.debounce.cancel();
			return true;
		}
		match tokio::time::timeout(self.config.close_flush_timeout, self.save_now()).await {
			Ok(Ok(_)) => true,
			Ok(Err(err)) => {
				warn!(project_id = %self.project_id, module = %self.module, error = %err, "autosave.close_save_failed");
				false
			}
			Err(_) => {
				warn!(project_id = %self.project_id, module = %self.module, "autosave.close_save_timed_out");
				self.status.send_modify(|status| status.is_saving = false);
				false
			}
		}
	}

	/// Restores state mirrored by a previous session that never reached the
	/// backend, and schedules it for saving. Returns whether anything was found.
	pub async fn recover(&mut self) -> Result<bool> {
		let Some(store) = &self.fallback else {
			return Ok(false);
		};
		let Some(raw) = store.get(&fallback_key(self.project_id, &self.module)).await? else {
			return Ok(false);
		};
		let module_state: ModuleState = serde_json::from_str(&raw)?;
		debug!(project_id = %self.project_id, module = %self.module, "autosave.recovered");
		self.state.replace_module(self.module.clone(), module_state);
		self.revision += 1;
		self.debounce.schedule(());
		self.set_unsaved(true);
		Ok(true)
	}

	async fn mirror(&self) {
		let (Some(store), Some(module_state)) = (&self.fallback, self.state.module(&self.module)) else {
			return;
		};
		let result = match serde_json::to_string(module_state) {
			Ok(raw) => store.put(&fallback_key(self.project_id, &self.module), raw).await,
			Err(err) => Err(Error::from(err)),
		};
		if let Err(err) = result {
			warn!(project_id = %self.project_id, module = %self.module, error = %err, "autosave.fallback_write_failed");
		}
	}

	fn mark_saved(&mut self, at: Option<DateTime<Utc>>) {
		self.saved_revision = self.revision;
		self.baseline = self.state.module(&self.module).cloned();
		let was_unsaved = self.status.borrow().has_unsaved_changes;
		self.status.send_modify(|status| {
			status.is_saving = false;
			status.save_error = None;
			status.has_unsaved_changes = false;
			if at.is_some() {
				status.last_saved = at;
			}
		});
		if was_unsaved {
			self.publish_unsaved(false);
		}
	}

	fn set_unsaved(&self, unsaved: bool) {
		let changed = self.status.send_if_modified(|status| {
			let changed = status.has_unsaved_changes != unsaved;
			status.has_unsaved_changes = unsaved;
			changed
		});
		if changed {
			self.publish_unsaved(unsaved);
		}
	}

	fn publish_unsaved(&self, has_unsaved_changes: bool) {
		self.publish(ProjectEvent::UnsavedChanges {
			project_id: self.project_id,
			module: self.module.clone(),
			has_unsaved_changes,
		});
	}

	fn publish(&self, event: ProjectEvent) {
		if let Some(bus) = &self.bus {
			bus.publish(event);
		}
	}
}
