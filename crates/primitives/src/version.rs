use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProjectState, VersionNumber};

/// History entry for one version, without its snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
	pub version_number: VersionNumber,
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub is_auto: bool,
	pub created_at: DateTime<Utc>,
}

/// Immutable, numbered record wrapping a project snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
	pub version_number: VersionNumber,
	pub message: String,
	pub is_auto: bool,
	pub created_at: DateTime<Utc>,
	pub snapshot: ProjectState,
}

impl Version {
	pub fn summary(&self) -> VersionSummary {
		VersionSummary {
			version_number: self.version_number,
			message: self.message.clone(),
			is_auto: self.is_auto,
			created_at: self.created_at,
		}
	}
}
