//! Local key-value persistence port used as a session fallback.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pandaura_primitives::{ModuleId, ProjectId};
use parking_lot::Mutex;
use tracing::trace;

use crate::Result;

/// Key under which a module's unsaved state is mirrored.
pub fn fallback_key(project_id: ProjectId, module: &ModuleId) -> String {
	format!("project:{project_id}:module:{module}")
}

/// String-keyed blob storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>>;
	async fn put(&self, key: &str, value: String) -> Result<()>;
	/// Removing a missing key is not an error.
	async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(self.entries.lock().get(key).cloned())
	}

	async fn put(&self, key: &str, value: String) -> Result<()> {
		self.entries.lock().insert(key.to_string(), value);
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<()> {
		self.entries.lock().remove(key);
		Ok(())
	}
}

/// One file per key inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
	dir: PathBuf,
}

impl FileStore {
	/// Uses `dir`, creating it if needed.
	pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
		let dir = dir.into();
		tokio::fs::create_dir_all(&dir).await?;
		Ok(Self { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let name: String = key
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
			.collect();
		self.dir.join(format!("{name}.json"))
	}
}

#[async_trait]
impl KeyValueStore for FileStore {
	async fn get(&self, key: &str) -> Result<Option<String>> {
		match tokio::fs::read_to_string(self.path_for(key)).await {
			Ok(value) => Ok(Some(value)),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(err) => Err(err.into()),
		}
	}

	async fn put(&self, key: &str, value: String) -> Result<()> {
		let path = self.path_for(key);
		let tmp = path.with_extension("json.tmp");
		tokio::fs::write(&tmp, value).await?;
		tokio::fs::rename(&tmp, &path).await?;
		trace!(path = %path.display(), "state.store.written");
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<()> {
		match tokio::fs::remove_file(self.path_for(key)).await {
			Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
			_ => Ok(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn keys_name_project_and_module() {
		assert_eq!(fallback_key(ProjectId(12), &ModuleId::logic_studio()), "project:12:module:LogicStudio");
	}

	#[tokio::test]
	async fn memory_store_round_trips() {
		let store = MemoryStore::new();
		assert_eq!(store.get("a").await.unwrap(), None);
		store.put("a", "1".into()).await.unwrap();
		store.put("a", "2".into()).await.unwrap();
		assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
		store.remove("a").await.unwrap();
		store.remove("a").await.unwrap();
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn file_store_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let key = fallback_key(ProjectId(3), &ModuleId::ask_pandaura());

		let store = FileStore::open(dir.path().join("fallback")).await.unwrap();
		store.put(&key, r#"{"draft":"hi"}"#.into()).await.unwrap();

		let reopened = FileStore::open(dir.path().join("fallback")).await.unwrap();
		assert_eq!(reopened.get(&key).await.unwrap().as_deref(), Some(r#"{"draft":"hi"}"#));

		reopened.remove(&key).await.unwrap();
		assert_eq!(reopened.get(&key).await.unwrap(), None);
		reopened.remove(&key).await.unwrap();
	}
}
