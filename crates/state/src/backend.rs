//! Version and project-state API port.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pandaura_primitives::{ModuleId, ModuleState, ProjectId, ProjectState, Version, VersionNumber, VersionSummary};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// What a rollback copied from and where history now stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
	pub rolled_back_to: VersionNumber,
	pub new_version: VersionNumber,
}

/// Remote storage for live project state and its version history.
///
/// Histories are returned newest first. Rollback copies forward: the target
/// snapshot becomes the live state and a new version records it.
#[async_trait]
pub trait ProjectBackend: Send + Sync {
	async fn get_project_state(&self, project_id: ProjectId) -> Result<ProjectState>;

	async fn save_module_state(&self, project_id: ProjectId, module: &ModuleId, state: &ModuleState) -> Result<()>;

	async fn get_version_history(&self, project_id: ProjectId) -> Result<Vec<VersionSummary>>;

	async fn create_version(&self, project_id: ProjectId, state: &ProjectState, message: &str) -> Result<VersionNumber>;

	async fn get_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<Version>;

	/// The snapshot of `version` including nested module states.
	async fn get_version_snapshot(&self, project_id: ProjectId, version: VersionNumber) -> Result<ProjectState>;

	async fn rollback_to_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<RollbackOutcome>;

	async fn delete_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<()>;

	async fn create_auto_save_version(&self, project_id: ProjectId, state: &ProjectState, message: &str) -> Result<VersionNumber>;
}

#[derive(Debug, Default)]
struct ProjectRecord {
	live: ProjectState,
	/// Oldest first.
	versions: Vec<Version>,
	last_number: u64,
}

impl ProjectRecord {
	fn append(&mut self, snapshot: ProjectState, message: String, is_auto: bool) -> VersionNumber {
		self.last_number += 1;
		let number = VersionNumber(self.last_number);
		self.versions.push(Version {
			version_number: number,
			message,
			is_auto,
			created_at: Utc::now(),
			snapshot,
		});
		number
	}

	fn find(&self, version: VersionNumber) -> Result<&Version> {
		self.versions
			.iter()
			.find(|v| v.version_number == version)
			.ok_or(Error::VersionNotFound(version))
	}
}

/// Append-only backend held in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
	projects: Mutex<HashMap<ProjectId, ProjectRecord>>,
	reject_writes: AtomicBool,
	write_latency_ms: AtomicU64,
	module_saves: AtomicUsize,
}

impl InMemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every write fail with [`Error::Save`] until reset.
	pub fn reject_writes(&self, reject: bool) {
		self.reject_writes.store(reject, Ordering::SeqCst);
	}

	/// Delays every module-state write, as a slow network would.
	pub fn set_write_latency(&self, latency: Duration) {
		self.write_latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
	}

	/// Module-state writes accepted so far.
	pub fn module_saves(&self) -> usize {
		self.module_saves.load(Ordering::SeqCst)
	}

	fn check_writable(&self) -> Result<()> {
		if self.reject_writes.load(Ordering::SeqCst) {
			return Err(Error::Save("backend rejected the write".to_string()));
		}
		Ok(())
	}

	fn create(&self, project_id: ProjectId, state: &ProjectState, message: &str, is_auto: bool) -> Result<VersionNumber> {
		self.check_writable()?;
		let mut projects = self.projects.lock();
		let record = projects.entry(project_id).or_default();
		let number = record.append(state.clone(), message.to_string(), is_auto);
		debug!(%project_id, version = %number, is_auto, "state.backend.version_created");
		Ok(number)
	}
}

#[async_trait]
impl ProjectBackend for InMemoryBackend {
	async fn get_project_state(&self, project_id: ProjectId) -> Result<ProjectState> {
		Ok(self.projects.lock().get(&project_id).map(|record| record.live.clone()).unwrap_or_default())
	}

	async fn save_module_state(&self, project_id: ProjectId, module: &ModuleId, state: &ModuleState) -> Result<()> {
		let latency = self.write_latency_ms.load(Ordering::SeqCst);
		if latency > 0 {
			tokio::time::sleep(Duration::from_millis(latency)).await;
		}
		self.check_writable()?;
		let mut projects = self.projects.lock();
		projects
			.entry(project_id)
			.or_default()
			.live
			.replace_module(module.clone(), state.clone());
		self.module_saves.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn get_version_history(&self, project_id: ProjectId) -> Result<Vec<VersionSummary>> {
		let projects = self.projects.lock();
		let Some(record) = projects.get(&project_id) else {
			return Ok(Vec::new());
		};
		Ok(record.versions.iter().rev().map(Version::summary).collect())
	}

	async fn create_version(&self, project_id: ProjectId, state: &ProjectState, message: &str) -> Result<VersionNumber> {
		self.create(project_id, state, message, false)
	}

	async fn get_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<Version> {
		let projects = self.projects.lock();
		let record = projects.get(&project_id).ok_or(Error::VersionNotFound(version))?;
		record.find(version).cloned()
	}

	async fn get_version_snapshot(&self, project_id: ProjectId, version: VersionNumber) -> Result<ProjectState> {
		Ok(self.get_version(project_id, version).await?.snapshot)
	}

	async fn rollback_to_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<RollbackOutcome> {
		self.check_writable()?;
		let mut projects = self.projects.lock();
		let record = projects.get_mut(&project_id).ok_or(Error::VersionNotFound(version))?;
		let snapshot = record.find(version)?.snapshot.clone();

		record.live = snapshot.clone();
		let new_version = record.append(snapshot, format!("Rolled back to {version}"), false);
		debug!(%project_id, rolled_back_to = %version, new_version = %new_version, "state.backend.rolled_back");
		Ok(RollbackOutcome {
			rolled_back_to: version,
			new_version,
		})
	}

	async fn delete_version(&self, project_id: ProjectId, version: VersionNumber) -> Result<()> {
		self.check_writable()?;
		let mut projects = self.projects.lock();
		let record = projects.get_mut(&project_id).ok_or(Error::VersionNotFound(version))?;
		let before = record.versions.len();
		record.versions.retain(|v| v.version_number != version);
		if record.versions.len() == before {
			return Err(Error::VersionNotFound(version));
		}
		Ok(())
	}

	async fn create_auto_save_version(&self, project_id: ProjectId, state: &ProjectState, message: &str) -> Result<VersionNumber> {
		self.create(project_id, state, message, true)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	const P: ProjectId = ProjectId(1);

	fn state(code: &str) -> ProjectState {
		let mut state = ProjectState::new();
		state.merge(&ModuleId::logic_studio(), json!({ "code": code }), chrono::DateTime::UNIX_EPOCH);
		state
	}

	#[tokio::test]
	async fn numbers_survive_deletion() {
		let backend = InMemoryBackend::new();
		assert_eq!(backend.create_version(P, &state("a"), "one").await.unwrap(), VersionNumber(1));
		assert_eq!(backend.create_version(P, &state("b"), "two").await.unwrap(), VersionNumber(2));
		backend.delete_version(P, VersionNumber(2)).await.unwrap();
		assert_eq!(backend.create_auto_save_version(P, &state("c"), "auto").await.unwrap(), VersionNumber(3));

		let history = backend.get_version_history(P).await.unwrap();
		let numbers: Vec<_> = history.iter().map(|v| v.version_number.0).collect();
		assert_eq!(numbers, vec![3, 1]);
		assert!(history[0].is_auto);
	}

	#[tokio::test]
	async fn rollback_copies_forward() {
		let backend = InMemoryBackend::new();
		backend.create_version(P, &state("a"), "one").await.unwrap();
		backend.create_version(P, &state("b"), "two").await.unwrap();

		let outcome = backend.rollback_to_version(P, VersionNumber(1)).await.unwrap();
		assert_eq!(
			outcome,
			RollbackOutcome {
				rolled_back_to: VersionNumber(1),
				new_version: VersionNumber(3),
			}
		);
		assert_eq!(backend.get_project_state(P).await.unwrap(), state("a"));
		assert_eq!(backend.get_version_snapshot(P, VersionNumber(3)).await.unwrap(), state("a"));
		assert_eq!(backend.get_version_snapshot(P, VersionNumber(2)).await.unwrap(), state("b"));
	}

	#[tokio::test]
	async fn missing_versions_are_reported() {
		let backend = InMemoryBackend::new();
		assert!(matches!(
			backend.rollback_to_version(P, VersionNumber(9)).await,
			Err(Error::VersionNotFound(VersionNumber(9)))
		));
		backend.create_version(P, &state("a"), "one").await.unwrap();
		assert!(matches!(
			backend.delete_version(P, VersionNumber(9)).await,
			Err(Error::VersionNotFound(_))
		));
		assert!(matches!(backend.get_version(P, VersionNumber(2)).await, Err(Error::VersionNotFound(_))));
	}

	#[test]
	fn rollback_outcome_wire_shape() {
		let outcome: RollbackOutcome = serde_json::from_str(r#"{"rolledBackTo":3,"newVersion":8}"#).unwrap();
		assert_eq!(outcome.rolled_back_to, VersionNumber(3));
		assert_eq!(outcome.new_version, VersionNumber(8));
	}
}
