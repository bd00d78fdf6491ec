//! JSON wire messages, discriminated by a `type` field.

use std::fmt;

use pandaura_primitives::{ProjectId, Tag};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
	/// Declares interest in a project's tag stream.
	Subscribe { project_id: ProjectId },
	/// Pushes editor text for server-side tag extraction.
	SyncTags {
		project_id: ProjectId,
		vendor: Option<String>,
		st_code: String,
		debounce_ms: u64,
	},
	Ping,
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
	/// Authoritative full tag list for a project.
	TagsUpdated {
		project_id: ProjectId,
		/// Tags that fail to decode are dropped; the rest of the list still applies.
		#[serde(deserialize_with = "lenient_tags")]
		tags: Vec<Tag>,
		#[serde(default)]
		parsed_count: usize,
	},
	/// A `sync_tags` request was accepted and queued.
	SyncQueued { sync_id: SyncId },
	Pong,
	Error { error: String },
	/// Any message type this client does not understand.
	#[serde(other)]
	Unknown,
}

/// Server-assigned identifier for a queued sync. Servers send either form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncId {
	Number(u64),
	Text(String),
}

impl fmt::Display for SyncId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(id) => write!(f, "{id}"),
			Self::Text(id) => f.write_str(id),
		}
	}
}

fn lenient_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Tag>, D::Error> {
	let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
	Ok(raw
		.into_iter()
		.filter_map(|value| match serde_json::from_value::<Tag>(value) {
			Ok(tag) => Some(tag),
			Err(err) => {
				warn!(error = %err, "sync.protocol.tag_skipped");
				None
			}
		})
		.collect())
}

impl ClientMessage {
	pub fn encode(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

impl ServerMessage {
	pub fn decode(text: &str) -> serde_json::Result<Self> {
		serde_json::from_str(text)
	}

	/// Short name used in logs.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::TagsUpdated { .. } => "tags_updated",
			Self::SyncQueued { .. } => "sync_queued",
			Self::Pong => "pong",
			Self::Error { .. } => "error",
			Self::Unknown => "unknown",
		}
	}
}
