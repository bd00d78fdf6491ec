//! A mounted tool module: its autosave plus its bus subscription.

use std::sync::Arc;

use pandaura_primitives::{ModuleId, ProjectId, VersionNumber};
use tracing::{debug, trace, warn};

use crate::{AutosaveController, ProjectBackend, ProjectEvent, ProjectEventBus, Result, RollbackEvent, Subscription};

/// What one [`ModuleSession::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionActivity {
	/// A rollback was applied; local state now mirrors `restored_from`.
	Restored { restored_from: VersionNumber },
	/// Events were lost; the module was checked against the backend and
	/// `reloaded` tells whether durable state replaced local state.
	Resynced { reloaded: bool },
	/// The debounced autosave ran.
	Saved,
	/// An event that needs no local action.
	Observed(ProjectEvent),
	/// The bus went away.
	Detached,
}

/// Lifetime of one module instance for one project.
///
/// Subscribes on [`mount`](Self::mount) and unsubscribes when dropped.
/// Rollback notifications are applied before any pending autosave can fire.
pub struct ModuleSession {
	autosave: AutosaveController,
	backend: Arc<dyn ProjectBackend>,
	events: Subscription,
}

impl std::fmt::Debug for ModuleSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleSession").field("autosave", &self.autosave).finish_non_exhaustive()
	}
}

impl ModuleSession {
	/// Loads live state, recovers any unsaved fallback state, and subscribes.
	pub async fn mount(mut autosave: AutosaveController, backend: Arc<dyn ProjectBackend>, bus: &ProjectEventBus) -> Result<Self> {
		let events = bus.subscribe(autosave.project_id());
		autosave.load().await?;
		if autosave.recover().await? {
			debug!(project_id = %autosave.project_id(), module = %autosave.module(), "module.recovered_unsaved_state");
		}
		Ok(Self { autosave, backend, events })
	}

	pub fn project_id(&self) -> ProjectId {
		self.autosave.project_id()
	}

	pub fn module(&self) -> &ModuleId {
		self.autosave.module()
	}

	pub fn autosave(&self) -> &AutosaveController {
		&self.autosave
	}

	pub fn autosave_mut(&mut self) -> &mut AutosaveController {
		&mut self.autosave
	}

	/// Waits for the next rollback or autosave deadline and handles it.
	///
	/// Bus events are polled first, so a rollback that arrives alongside an
	/// expiring autosave cancels that save instead of racing it. A lagged
	/// subscription counts as a possibly missed rollback. Events that need no
	/// local action are consumed silently.
	pub async fn tick(&mut self) -> Result<SessionActivity> {
		loop {
			tokio::select! {
				biased;

				event = self.events.recv() => match event {
					Some(event) => match self.apply(event).await? {
						SessionActivity::Observed(event) => trace!(kind = event.kind(), "module.event_observed"),
						activity => return Ok(activity),
					},
					None => return Ok(SessionActivity::Detached),
				},
				() = self.autosave.due() => {
					self.autosave.save_due().await;
					return Ok(SessionActivity::Saved);
				}
			}
		}
	}

	/// Applies one bus event for this project.
	pub async fn apply(&mut self, event: ProjectEvent) -> Result<SessionActivity> {
		if event.project_id() != self.project_id() {
			trace!(project_id = %event.project_id(), "module.foreign_event");
			return Ok(SessionActivity::Observed(event));
		}
		match event {
			ProjectEvent::RolledBack(rollback) => self.restore(&rollback).await,
			ProjectEvent::Lagged { skipped, .. } => {
				let reloaded = self.autosave.resync().await?;
				debug!(project_id = %self.project_id(), module = %self.module(), skipped, reloaded, "module.resynced");
				Ok(SessionActivity::Resynced { reloaded })
			}
			other => Ok(SessionActivity::Observed(other)),
		}
	}

	async fn restore(&mut self, rollback: &RollbackEvent) -> Result<SessionActivity> {
		// Stale in-memory state must not be written over the restored snapshot.
		self.autosave.cancel_pending();

		let snapshot = match self.backend.get_version_snapshot(rollback.project_id, rollback.new_version).await {
			Ok(snapshot) => snapshot,
			Err(err) => {
				warn!(
					project_id = %rollback.project_id,
					module = %self.autosave.module(),
					version = %rollback.new_version,
					error = %err,
					"module.restore_failed"
				);
				return Err(err);
			}
		};
		self.autosave.restore(snapshot).await;
		debug!(
			project_id = %rollback.project_id,
			module = %self.autosave.module(),
			rolled_back_to = %rollback.rolled_back_to,
			"module.restored"
		);
		Ok(SessionActivity::Restored {
			restored_from: rollback.rolled_back_to,
		})
	}

	/// Cancels timers after a best-effort final save. Returns whether all
	/// state ended up durable.
	pub async fn unmount(mut self) -> bool {
		let saved = self.autosave.on_page_close().await;
		debug!(project_id = %self.project_id(), module = %self.module(), saved, "module.unmounted");
		saved
	}
}

#[cfg(test)]
mod tests;
