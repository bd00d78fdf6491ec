use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declaration scope of a tag, mirroring the structured-text block it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
	Global,
	Local,
	Input,
	Output,
	Memory,
	Db,
}

impl TagScope {
	/// Scopes in the order their blocks are emitted when generating code.
	pub const EMIT_ORDER: [TagScope; 6] = [
		TagScope::Global,
		TagScope::Input,
		TagScope::Output,
		TagScope::Local,
		TagScope::Memory,
		TagScope::Db,
	];

	/// Block keyword opening a declaration section of this scope.
	pub const fn keyword(self) -> &'static str {
		match self {
			Self::Global => "VAR_GLOBAL",
			Self::Local => "VAR",
			Self::Input => "VAR_INPUT",
			Self::Output => "VAR_OUTPUT",
			Self::Memory => "VAR_MEMORY",
			Self::Db => "VAR_DB",
		}
	}

	/// Resolves a block keyword, accepting the aliases that map onto local scope.
	pub fn from_keyword(keyword: &str) -> Option<Self> {
		let scope = match keyword.to_ascii_uppercase().as_str() {
			"VAR" | "VAR_TEMP" | "VAR_IN_OUT" => Self::Local,
			"VAR_GLOBAL" => Self::Global,
			"VAR_INPUT" => Self::Input,
			"VAR_OUTPUT" => Self::Output,
			"VAR_MEMORY" => Self::Memory,
			"VAR_DB" => Self::Db,
			_ => return None,
		};
		Some(scope)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Global => "global",
			Self::Local => "local",
			Self::Input => "input",
			Self::Output => "output",
			Self::Memory => "memory",
			Self::Db => "db",
		}
	}
}

impl fmt::Display for TagScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown scope name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tag scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for TagScope {
	type Err = UnknownScope;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"global" => Ok(Self::Global),
			"local" => Ok(Self::Local),
			"input" => Ok(Self::Input),
			"output" => Ok(Self::Output),
			"memory" => Ok(Self::Memory),
			"db" => Ok(Self::Db),
			_ => Err(UnknownScope(s.to_string())),
		}
	}
}

/// A named PLC variable.
///
/// Identity within a project is the tag name; the wire form uses camelCase
/// field names and omits absent optionals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
	pub name: String,
	pub data_type: String,
	pub scope: TagScope,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vendor: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

impl Tag {
	/// Creates a tag with only the mandatory fields set.
	pub fn new(name: impl Into<String>, data_type: impl Into<String>, scope: TagScope) -> Self {
		Self {
			name: name.into(),
			data_type: data_type.into(),
			scope,
			address: None,
			default_value: None,
			vendor: None,
			description: None,
		}
	}

	#[must_use]
	pub fn with_address(mut self, address: impl Into<String>) -> Self {
		self.address = Some(address.into());
		self
	}

	#[must_use]
	pub fn with_default(mut self, value: impl Into<String>) -> Self {
		self.default_value = Some(value.into());
		self
	}

	#[must_use]
	pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
		self.vendor = Some(vendor.into());
		self
	}

	#[must_use]
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}
}
