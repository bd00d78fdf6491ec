use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ModuleId;

/// State blob owned by one tool module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
	pub state: Value,
	pub last_activity: DateTime<Utc>,
}

impl ModuleState {
	pub fn new(state: Value, last_activity: DateTime<Utc>) -> Self {
		Self { state, last_activity }
	}

	/// Returns a top-level field of the state blob, if the blob is an object.
	pub fn field(&self, key: &str) -> Option<&Value> {
		self.state.as_object().and_then(|map| map.get(key))
	}
}

/// Live state of a project, keyed by module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
	#[serde(default)]
	pub modules: BTreeMap<ModuleId, ModuleState>,
}

impl ProjectState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.modules.is_empty()
	}

	pub fn module(&self, id: &ModuleId) -> Option<&ModuleState> {
		self.modules.get(id)
	}

	/// Merges `partial` into the module's blob and stamps its activity time.
	///
	/// Object partials are merged key by key; anything else replaces the blob.
	pub fn merge(&mut self, id: &ModuleId, partial: Value, now: DateTime<Utc>) {
		match self.modules.get_mut(id) {
			Some(module) => {
				merge_json(&mut module.state, partial);
				module.last_activity = now;
			}
			None => {
				self.modules.insert(id.clone(), ModuleState::new(partial, now));
			}
		}
	}

	/// Replaces one module's state wholesale, returning the previous entry.
	pub fn replace_module(&mut self, id: ModuleId, state: ModuleState) -> Option<ModuleState> {
		self.modules.insert(id, state)
	}
}

/// Shallow JSON merge: top-level keys of `partial` overwrite those of `target`.
pub fn merge_json(target: &mut Value, partial: Value) {
	match (target, partial) {
		(Value::Object(target), Value::Object(partial)) => {
			for (key, value) in partial {
				target.insert(key, value);
			}
		}
		(target, partial) => *target = partial,
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn merge_overwrites_top_level_keys_only() {
		let mut state = ProjectState::new();
		let module = ModuleId::logic_studio();
		let t0 = Utc::now();
		state.merge(&module, json!({"code": "a", "vendor": "siemens"}), t0);
		state.merge(&module, json!({"code": "b"}), t0);

		assert_eq!(state.module(&module).unwrap().state, json!({"code": "b", "vendor": "siemens"}));
	}

	#[test]
	fn non_object_partial_replaces_blob() {
		let mut value = json!({"a": 1});
		merge_json(&mut value, json!([1, 2]));
		assert_eq!(value, json!([1, 2]));
	}
}
