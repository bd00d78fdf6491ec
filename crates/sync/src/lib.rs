//! Live project tag synchronization.
//!
//! One [`SyncChannel`] per active project carries JSON-framed
//! [`ClientMessage`]s and [`ServerMessage`]s over a websocket, reconnecting
//! with backoff and probing liveness with ping/pong. A [`TagSyncController`]
//! sits on top: it extracts tags from editor text, debounces pushes, skips
//! sends whose code matches what was last synced, and applies inbound tag
//! lists back to the editor. [`spawn_tag_sync`] drives both from one task.
//!
//! The socket is reached through the [`Connector`] seam; [`WsConnector`] is
//! the production implementation.

mod channel;
mod controller;
mod driver;
mod protocol;
mod transport;
mod ws;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use channel::{ChannelConfig, ChannelEvent, ChannelEvents, ChannelStatus, ConnectionState, SyncChannel};
pub use controller::{EditOutcome, MessageSink, SYNC_DEBOUNCE, SyncDecision, SyncSession, SyncStatus, TagSyncController, TagsApplied};
pub use driver::{TagSyncHandle, TagUpdates, spawn_tag_sync};
pub use protocol::{ClientMessage, ServerMessage, SyncId};
pub use transport::{AUTH_CLOSE_CODES, Connection, Connector, Endpoint, Frame, NORMAL_CLOSURE, is_auth_close};
pub use ws::WsConnector;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What a [`Error::Timeout`] was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
	/// Opening the socket.
	Connect,
	/// A `pong` reply to a keepalive `ping`.
	Keepalive,
}

impl fmt::Display for TimeoutKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Connect => f.write_str("connection attempt"),
			Self::Keepalive => f.write_str("keepalive"),
		}
	}
}

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The transport failed to establish or maintain the socket.
	#[error("connection failed: {0}")]
	Connection(String),
	/// The server rejected the credentials.
	#[error("authentication rejected: {0}")]
	Auth(String),
	/// A connection attempt or keepalive exceeded its bound.
	#[error("{0} timed out")]
	Timeout(TimeoutKind),
	/// The channel is between connections.
	#[error("not connected")]
	NotConnected,
	/// The channel has shut down for good.
	#[error("channel closed")]
	Closed,
	/// A frame could not be encoded or decoded.
	#[error("codec error: {0}")]
	Codec(#[from] serde_json::Error),
}

impl Error {
	/// Whether reconnecting could plausibly succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::NotConnected)
	}
}
