//! Snapshot schema adapter.
//!
//! Backends have stored snapshots in three layouts over time. Each has one
//! normalizer producing the current [`ProjectState`]:
//!
//! * [`Schema::Legacy`]: a flat map from module name to its state blob
//! * [`Schema::Current`]: `{"schemaVersion": 2, "modules": {name: {state, lastActivity}}}`
//! * [`Schema::Enhanced`]: `{"snapshot": <legacy or current>, "moduleStates": {name: blob}}`,
//!   where `moduleStates` entries override the nested snapshot
//!
//! Anything else is rejected; callers keep their current state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pandaura_primitives::{ModuleId, ModuleState, ProjectState};
use serde_json::{Map, Value};

/// Highest `schemaVersion` this adapter understands.
pub const CURRENT_SCHEMA_VERSION: u64 = 2;

/// Known snapshot layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
	Legacy,
	Current,
	Enhanced,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SchemaError {
	#[error("unrecognized snapshot shape: {0}")]
	Unrecognized(&'static str),
	#[error("snapshot schema version {0} is newer than supported ({CURRENT_SCHEMA_VERSION})")]
	UnsupportedVersion(u64),
	#[error("malformed {schema:?} snapshot: {reason}")]
	Malformed { schema: Schema, reason: String },
}

/// Identifies the layout of `raw` without normalizing it.
pub fn detect(raw: &Value) -> Result<Schema, SchemaError> {
	let Value::Object(map) = raw else {
		return Err(SchemaError::Unrecognized("snapshot is not an object"));
	};
	if map.contains_key("snapshot") {
		return Ok(Schema::Enhanced);
	}
	if map.contains_key("modules") || map.contains_key("schemaVersion") {
		return Ok(Schema::Current);
	}
	if map.values().all(Value::is_object) {
		return Ok(Schema::Legacy);
	}
	Err(SchemaError::Unrecognized("top-level values are not module objects"))
}

/// Normalizes any known snapshot layout. `fallback_time` stands in for
/// missing activity timestamps.
pub fn normalize(raw: Value, fallback_time: DateTime<Utc>) -> Result<ProjectState, SchemaError> {
	match detect(&raw)? {
		Schema::Legacy => from_legacy(raw, fallback_time),
		Schema::Current => from_current(raw, fallback_time),
		Schema::Enhanced => from_enhanced(raw, fallback_time),
	}
}

fn from_legacy(raw: Value, fallback_time: DateTime<Utc>) -> Result<ProjectState, SchemaError> {
	let Value::Object(map) = raw else {
		return Err(SchemaError::Unrecognized("snapshot is not an object"));
	};
	Ok(ProjectState {
		modules: modules_from_map(map, fallback_time),
	})
}

fn from_current(raw: Value, fallback_time: DateTime<Utc>) -> Result<ProjectState, SchemaError> {
	let Value::Object(mut map) = raw else {
		return Err(SchemaError::Unrecognized("snapshot is not an object"));
	};
	if let Some(version) = map.get("schemaVersion") {
		let version = version.as_u64().ok_or_else(|| SchemaError::Malformed {
			schema: Schema::Current,
			reason: format!("schemaVersion {version} is not an integer"),
		})?;
		if version > CURRENT_SCHEMA_VERSION {
			return Err(SchemaError::UnsupportedVersion(version));
		}
	}
	match map.remove("modules") {
		None | Some(Value::Null) => Ok(ProjectState::new()),
		Some(Value::Object(modules)) => Ok(ProjectState {
			modules: modules_from_map(modules, fallback_time),
		}),
		Some(_) => Err(SchemaError::Malformed {
			schema: Schema::Current,
			reason: "modules is not an object".to_string(),
		}),
	}
}

fn from_enhanced(raw: Value, fallback_time: DateTime<Utc>) -> Result<ProjectState, SchemaError> {
	let Value::Object(mut map) = raw else {
		return Err(SchemaError::Unrecognized("snapshot is not an object"));
	};
	let inner = map.remove("snapshot").unwrap_or(Value::Null);
	let mut state = match inner {
		Value::Null => ProjectState::new(),
		inner => match detect(&inner)? {
			Schema::Enhanced => {
				return Err(SchemaError::Malformed {
					schema: Schema::Enhanced,
					reason: "nested enhanced snapshot".to_string(),
				});
			}
			Schema::Legacy => from_legacy(inner, fallback_time)?,
			Schema::Current => from_current(inner, fallback_time)?,
		},
	};

	match map.remove("moduleStates") {
		None | Some(Value::Null) => {}
		Some(Value::Object(overrides)) => {
			for (name, module) in modules_from_map(overrides, fallback_time) {
				state.replace_module(name, module);
			}
		}
		Some(_) => {
			return Err(SchemaError::Malformed {
				schema: Schema::Enhanced,
				reason: "moduleStates is not an object".to_string(),
			});
		}
	}
	Ok(state)
}

fn modules_from_map(map: Map<String, Value>, fallback_time: DateTime<Utc>) -> BTreeMap<ModuleId, ModuleState> {
	map.into_iter()
		.map(|(name, blob)| (ModuleId::new(name), module_from_blob(blob, fallback_time)))
		.collect()
}

/// Accepts both `{state, lastActivity}` envelopes and bare state blobs.
fn module_from_blob(blob: Value, fallback_time: DateTime<Utc>) -> ModuleState {
	if let Value::Object(map) = &blob
		&& map.contains_key("state")
		&& map.keys().all(|key| key == "state" || key == "lastActivity")
	{
		let last_activity = map
			.get("lastActivity")
			.and_then(Value::as_str)
			.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
			.map_or(fallback_time, |ts| ts.with_timezone(&Utc));
		let state = map.get("state").cloned().unwrap_or(Value::Null);
		return ModuleState::new(state, last_activity);
	}
	ModuleState::new(blob, fallback_time)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn t0() -> DateTime<Utc> {
		DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc)
	}

	fn logic(state: &ProjectState) -> &Value {
		&state.module(&ModuleId::logic_studio()).unwrap().state
	}

	#[test]
	fn legacy_flat_map() {
		let raw = json!({"LogicStudio": {"code": "VAR END_VAR"}, "AskPandaura": {"messages": []}});
		assert_eq!(detect(&raw), Ok(Schema::Legacy));

		let state = normalize(raw, t0()).unwrap();
		assert_eq!(state.modules.len(), 2);
		assert_eq!(logic(&state), &json!({"code": "VAR END_VAR"}));
		assert_eq!(state.module(&ModuleId::logic_studio()).unwrap().last_activity, t0());
	}

	#[test]
	fn current_schema_keeps_timestamps() {
		let raw = json!({
			"schemaVersion": 2,
			"modules": {
				"LogicStudio": {"state": {"code": "x"}, "lastActivity": "2024-05-05T08:30:00Z"}
			}
		});
		let state = normalize(raw, t0()).unwrap();
		let module = state.module(&ModuleId::logic_studio()).unwrap();
		assert_eq!(module.state, json!({"code": "x"}));
		assert_eq!(module.last_activity.to_rfc3339(), "2024-05-05T08:30:00+00:00");
	}

	#[test]
	fn serialized_project_state_is_current() {
		let mut original = ProjectState::new();
		original.merge(&ModuleId::logic_studio(), json!({"code": "y"}), t0());
		let raw = serde_json::to_value(&original).unwrap();
		assert_eq!(normalize(raw, Utc::now()).unwrap(), original);
	}

	#[test]
	fn enhanced_module_states_override_snapshot() {
		let raw = json!({
			"snapshot": {"LogicStudio": {"code": "old"}, "TagDatabaseManager": {"filter": "all"}},
			"moduleStates": {"LogicStudio": {"code": "new"}}
		});
		let state = normalize(raw, t0()).unwrap();
		assert_eq!(logic(&state), &json!({"code": "new"}));
		assert_eq!(
			state.module(&ModuleId::tag_database()).unwrap().state,
			json!({"filter": "all"})
		);
	}

	#[test]
	fn enhanced_without_inner_snapshot() {
		let raw = json!({"snapshot": null, "moduleStates": {"LogicStudio": {"code": "z"}}});
		assert_eq!(logic(&normalize(raw, t0()).unwrap()), &json!({"code": "z"}));
	}

	#[test]
	fn unknown_shapes_are_rejected() {
		assert!(matches!(normalize(json!([1, 2]), t0()), Err(SchemaError::Unrecognized(_))));
		assert!(matches!(normalize(json!({"LogicStudio": "text"}), t0()), Err(SchemaError::Unrecognized(_))));
		assert_eq!(
			normalize(json!({"schemaVersion": 3, "modules": {}}), t0()),
			Err(SchemaError::UnsupportedVersion(3))
		);
		assert!(matches!(
			normalize(json!({"snapshot": {"snapshot": {}}}), t0()),
			Err(SchemaError::Malformed { schema: Schema::Enhanced, .. })
		));
	}
}
