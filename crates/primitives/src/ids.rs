use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

impl fmt::Display for ProjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Per-project version number. Strictly increasing, never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(pub u64);

impl VersionNumber {
	/// Returns the number following this one.
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0 + 1)
	}
}

impl fmt::Display for VersionNumber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

/// Name of a tool module owning a slice of project state (e.g. `LogicStudio`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
	pub const LOGIC_STUDIO: &'static str = "LogicStudio";
	pub const TAG_DATABASE: &'static str = "TagDatabaseManager";
	pub const ASK_PANDAURA: &'static str = "AskPandaura";

	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	pub fn logic_studio() -> Self {
		Self::new(Self::LOGIC_STUDIO)
	}

	pub fn tag_database() -> Self {
		Self::new(Self::TAG_DATABASE)
	}

	pub fn ask_pandaura() -> Self {
		Self::new(Self::ASK_PANDAURA)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ModuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ModuleId {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}
