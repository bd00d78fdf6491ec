use std::time::Duration;

use chrono::Utc;
use pandaura_primitives::ProjectState;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::time::timeout;

use super::*;
use crate::{AutosaveConfig, InMemoryBackend, MemoryStore, VersionControlManager};

const P: ProjectId = ProjectId(8);

fn logic_state(code: &str) -> ProjectState {
	let mut state = ProjectState::new();
	state.merge(&ModuleId::logic_studio(), json!({ "code": code }), chrono::DateTime::UNIX_EPOCH);
	state
}

fn code(session: &ModuleSession) -> Option<Value> {
	session.autosave().module_state().and_then(|m| m.field("code").cloned())
}

struct Fixture {
	backend: Arc<InMemoryBackend>,
	bus: ProjectEventBus,
	versions: VersionControlManager,
}

impl Fixture {
	fn new() -> Self {
		let backend = Arc::new(InMemoryBackend::new());
		let bus = ProjectEventBus::default();
		let versions = VersionControlManager::new(P, backend.clone(), bus.clone());
		Self { backend, bus, versions }
	}

	fn autosave(&self) -> AutosaveController {
		AutosaveController::new(P, ModuleId::logic_studio(), self.backend.clone(), AutosaveConfig::default()).with_bus(self.bus.clone())
	}

	async fn mount(&self) -> ModuleSession {
		ModuleSession::mount(self.autosave(), self.backend.clone(), &self.bus).await.unwrap()
	}
}

#[tokio::test(start_paused = true)]
async fn rollback_wins_over_expiring_autosave() {
	let mut fx = Fixture::new();
	fx.versions.create_version("baseline", &logic_state("v1")).await.unwrap();
	let mut session = fx.mount().await;

	session.autosave_mut().update_project_state(json!({"code": "stale edit"})).await;
	fx.versions.rollback_to_version(VersionNumber(1)).await.unwrap();
	tokio::time::advance(Duration::from_secs(5)).await;

	assert_eq!(
		session.tick().await.unwrap(),
		SessionActivity::Restored {
			restored_from: VersionNumber(1)
		}
	);
	assert_eq!(code(&session), Some(json!("v1")));
	assert!(!session.autosave().has_pending_save());
	assert!(!session.autosave().status().has_unsaved_changes);

	assert!(timeout(Duration::from_secs(10), session.tick()).await.is_err());
	assert_eq!(fx.backend.module_saves(), 0);
	assert_eq!(fx.backend.get_project_state(P).await.unwrap(), logic_state("v1"));
}

fn flood(bus: &ProjectEventBus, count: usize) {
	for _ in 0..count {
		bus.publish(ProjectEvent::StateChanged {
			project_id: P,
			module: ModuleId::tag_database(),
		});
	}
}

#[tokio::test(start_paused = true)]
async fn rollback_lost_to_lag_still_beats_autosave() {
	let mut fx = Fixture::new();
	fx.versions.create_version("baseline", &logic_state("v1")).await.unwrap();
	let mut session = fx.mount().await;

	session.autosave_mut().update_project_state(json!({"code": "stale edit"})).await;
	fx.versions.rollback_to_version(VersionNumber(1)).await.unwrap();
	flood(&fx.bus, 64);
	tokio::time::advance(Duration::from_secs(5)).await;

	assert_eq!(session.tick().await.unwrap(), SessionActivity::Resynced { reloaded: true });
	assert_eq!(code(&session), Some(json!("v1")));
	assert!(!session.autosave().has_pending_save());
	assert!(!session.autosave().status().has_unsaved_changes);

	while let Ok(activity) = timeout(Duration::from_secs(10), session.tick()).await {
		assert_ne!(activity.unwrap(), SessionActivity::Saved);
	}
	assert_eq!(fx.backend.module_saves(), 0);
	assert_eq!(fx.backend.get_project_state(P).await.unwrap(), logic_state("v1"));
}

#[tokio::test(start_paused = true)]
async fn lag_without_durable_change_keeps_edits() {
	let fx = Fixture::new();
	let mut session = fx.mount().await;

	session.autosave_mut().update_project_state(json!({"code": "mine"})).await;
	flood(&fx.bus, 70);

	assert_eq!(session.tick().await.unwrap(), SessionActivity::Resynced { reloaded: false });
	assert!(session.autosave().has_pending_save());
	assert_eq!(code(&session), Some(json!("mine")));

	assert_eq!(session.tick().await.unwrap(), SessionActivity::Saved);
	let live = fx.backend.get_project_state(P).await.unwrap();
	assert_eq!(live.module(&ModuleId::logic_studio()).unwrap().field("code"), Some(&json!("mine")));
}

#[tokio::test(start_paused = true)]
async fn edits_after_restore_save_normally() {
	let mut fx = Fixture::new();
	fx.versions.create_version("baseline", &logic_state("v1")).await.unwrap();
	let mut session = fx.mount().await;

	fx.versions.rollback_to_version(VersionNumber(1)).await.unwrap();
	session.tick().await.unwrap();

	session.autosave_mut().update_project_state(json!({"code": "after"})).await;
	assert_eq!(session.tick().await.unwrap(), SessionActivity::Saved);
	assert_eq!(fx.backend.module_saves(), 1);
	let live = fx.backend.get_project_state(P).await.unwrap();
	assert_eq!(live.module(&ModuleId::logic_studio()).unwrap().field("code"), Some(&json!("after")));
}

#[tokio::test]
async fn other_events_are_observed_only() {
	let fx = Fixture::new();
	let mut session = fx.mount().await;

	let foreign = ProjectEvent::RolledBack(RollbackEvent {
		project_id: ProjectId(99),
		rolled_back_to: VersionNumber(1),
		new_version: VersionNumber(2),
		timestamp: Utc::now(),
	});
	assert!(matches!(session.apply(foreign).await.unwrap(), SessionActivity::Observed(_)));

	let deleted = ProjectEvent::VersionDeleted {
		project_id: P,
		version: VersionNumber(4),
	};
	assert_eq!(session.apply(deleted.clone()).await.unwrap(), SessionActivity::Observed(deleted));
}

#[tokio::test]
async fn missing_snapshot_keeps_current_state() {
	let fx = Fixture::new();
	let mut session = fx.mount().await;
	session.autosave_mut().update_project_state(json!({"code": "mine"})).await;

	let bogus = ProjectEvent::RolledBack(RollbackEvent {
		project_id: P,
		rolled_back_to: VersionNumber(1),
		new_version: VersionNumber(2),
		timestamp: Utc::now(),
	});
	let err = session.apply(bogus).await.unwrap_err();
	assert!(matches!(err, crate::Error::VersionNotFound(_)));
	assert_eq!(code(&session), Some(json!("mine")));
}

#[tokio::test]
async fn mount_recovers_and_unmount_flushes() {
	let fx = Fixture::new();
	let store = Arc::new(MemoryStore::new());

	let mut first = ModuleSession::mount(fx.autosave().with_fallback(store.clone()), fx.backend.clone(), &fx.bus)
		.await
		.unwrap();
	first.autosave_mut().update_project_state(json!({"code": "draft"})).await;
	drop(first);
	assert_eq!(fx.backend.module_saves(), 0);

	let second = ModuleSession::mount(fx.autosave().with_fallback(store.clone()), fx.backend.clone(), &fx.bus)
		.await
		.unwrap();
	assert_eq!(code(&second), Some(json!("draft")));
	assert!(second.unmount().await);
	assert_eq!(fx.backend.module_saves(), 1);
	assert!(store.is_empty());
}

#[tokio::test]
async fn dropping_a_session_unsubscribes() {
	let fx = Fixture::new();
	let session = fx.mount().await;
	assert_eq!(fx.bus.subscriber_count(), 1);
	drop(session);
	assert_eq!(fx.bus.subscriber_count(), 0);
}
