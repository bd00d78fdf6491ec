//! Decides when editor text is pushed and applies inbound tag lists.
//!
//! The controller is a plain state machine with no task of its own. Callers
//! feed it edits, channel events, and debounce expiries; it answers with
//! [`SyncDecision`]s and [`TagsApplied`] updates. [`crate::spawn_tag_sync`]
//! wires it to a live [`crate::SyncChannel`].

use std::time::Duration;

use pandaura_primitives::{ProjectId, Tag};
use pandaura_tags::{Extractor, generate_code, new_tag_names};
use pandaura_worker::Debouncer;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::{ChannelEvent, ChannelStatus, ClientMessage, ConnectionState, Result, ServerMessage, SyncChannel};

/// Quiet period after the last edit before code is pushed.
pub const SYNC_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Outbound half of a channel, as seen by the controller.
pub trait MessageSink {
	fn send(&self, message: ClientMessage) -> Result<()>;
}

impl MessageSink for SyncChannel {
	fn send(&self, message: ClientMessage) -> Result<()> {
		SyncChannel::send(self, message)
	}
}

/// Per-connection session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSession {
	pub project_id: ProjectId,
	pub connection: ConnectionState,
	/// Code most recently pushed or generated from the tag database.
	pub last_synced_code: Option<String>,
	pub queued_sync_count: u32,
	pub reconnect_attempts: u32,
}

impl SyncSession {
	fn new(project_id: ProjectId) -> Self {
		Self {
			project_id,
			connection: ConnectionState::Disconnected,
			last_synced_code: None,
			queued_sync_count: 0,
			reconnect_attempts: 0,
		}
	}
}

/// User-visible sync indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
	pub connection: ConnectionState,
	/// Syncs the server has queued but not yet answered.
	pub pending_syncs: u32,
	pub reconnect_attempts: u32,
	pub offline: bool,
	pub last_error: Option<String>,
}

/// Result of asking the controller to push code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
	Sent,
	/// Identical to the last synced code; nothing was sent.
	Unchanged,
	/// The channel refused the message. The code is retried after resubscription.
	Offline,
}

/// What a local edit produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOutcome {
	pub extracted: Vec<Tag>,
	/// Names absent from the previously known tag set.
	pub new_names: Vec<String>,
}

/// An authoritative tag list applied from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsApplied {
	pub tags: Vec<Tag>,
	pub parsed_count: usize,
	/// Editor text regenerated from `tags`, when a refresh was requested.
	pub regenerated_code: Option<String>,
}

/// Debounce, change detection, and inbound application for one project.
#[derive(Debug)]
pub struct TagSyncController {
	session: SyncSession,
	extractor: Extractor,
	debounce: Debouncer<String>,
	known_tags: Vec<Tag>,
	/// Newest editor text, synced or not.
	latest_code: Option<String>,
	/// A push went out and neither `tags_updated` nor `error` has answered it.
	awaiting_ack: bool,
	/// No tag list has arrived yet.
	initial_load: bool,
	refresh_requested: bool,
	status: watch::Sender<SyncStatus>,
}

impl TagSyncController {
	/// Creates a controller that regenerates editor text from the first tag list it receives,
	/// unless the editor has already produced text of its own.
	pub fn new(project_id: ProjectId, extractor: Extractor) -> Self {
		let (status, _) = watch::channel(SyncStatus {
			offline: true,
			..SyncStatus::default()
		});
		Self {
			session: SyncSession::new(project_id),
			extractor,
			debounce: Debouncer::new(SYNC_DEBOUNCE),
			known_tags: Vec::new(),
			latest_code: None,
			awaiting_ack: false,
			initial_load: true,
			refresh_requested: false,
			status,
		}
	}

	#[must_use]
	pub fn with_debounce(mut self, delay: Duration) -> Self {
		self.debounce.set_delay(delay);
		self
	}

	pub fn project_id(&self) -> ProjectId {
		self.session.project_id
	}

	pub fn session(&self) -> &SyncSession {
		&self.session
	}

	/// Last known tag list, from the server or the latest extraction.
	pub fn tags(&self) -> &[Tag] {
		&self.known_tags
	}

	pub fn status(&self) -> SyncStatus {
		self.status.borrow().clone()
	}

	pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
		self.status.subscribe()
	}

	/// Records an edit and restarts the debounce window.
	///
	/// Extraction faults degrade to an empty tag list; the code is still pushed
	/// because the server validates authoritatively.
	pub fn on_edit(&mut self, code: impl Into<String>) -> EditOutcome {
		let code = code.into();
		let extracted = match self.extractor.extract(&code) {
			Ok(tags) => tags,
			Err(err) => {
				warn!(project_id = %self.session.project_id, line = err.line(), error = %err, "sync.controller.extract_failed");
				Vec::new()
			}
		};

		let new_names = new_tag_names(&self.known_tags, &extracted);
		if !new_names.is_empty() {
			debug!(project_id = %self.session.project_id, names = ?new_names, "sync.controller.new_tags");
		}
		self.known_tags.clone_from(&extracted);

		self.latest_code = Some(code.clone());
		if self.debounce.schedule(code) {
			trace!(project_id = %self.session.project_id, "sync.controller.debounce_restarted");
		}
		EditOutcome { extracted, new_names }
	}

	/// When the pending push becomes due, if one is pending.
	pub fn next_due(&self) -> Option<Instant> {
		self.debounce.deadline()
	}

	/// Resolves with the debounced code once its quiet period elapses. Cancel-safe.
	pub async fn due(&mut self) -> String {
		self.debounce.expired().await
	}

	/// Pushes `code` unless it matches the last synced code.
	pub fn sync_code(&mut self, sink: &dyn MessageSink, code: String) -> SyncDecision {
		if self.session.last_synced_code.as_deref() == Some(code.as_str()) {
			trace!(project_id = %self.session.project_id, "sync.controller.unchanged");
			return SyncDecision::Unchanged;
		}

		let message = ClientMessage::SyncTags {
			project_id: self.session.project_id,
			vendor: self.extractor.vendor().map(str::to_owned),
			st_code: code.clone(),
			debounce_ms: self.debounce.delay().as_millis() as u64,
		};
		match sink.send(message) {
			Ok(()) => {
				debug!(project_id = %self.session.project_id, bytes = code.len(), "sync.controller.sent");
				self.session.last_synced_code = Some(code);
				self.awaiting_ack = true;
				self.publish(|status| {
					status.offline = false;
					status.last_error = None;
				});
				SyncDecision::Sent
			}
			Err(err) => {
				warn!(project_id = %self.session.project_id, error = %err, "sync.controller.send_failed");
				self.publish(|status| {
					status.offline = true;
					status.last_error = Some(err.to_string());
				});
				SyncDecision::Offline
			}
		}
	}

	/// Pushes any pending edit immediately.
	pub fn flush(&mut self, sink: &dyn MessageSink) -> Option<SyncDecision> {
		let code = self.debounce.flush()?;
		Some(self.sync_code(sink, code))
	}

	/// Applies one inbound message in receipt order.
	pub fn handle_message(&mut self, message: ServerMessage) -> Option<TagsApplied> {
		match message {
			ServerMessage::TagsUpdated { project_id, .. } if project_id != self.session.project_id => {
				debug!(%project_id, expected = %self.session.project_id, "sync.controller.foreign_project");
				None
			}
			ServerMessage::TagsUpdated { tags, parsed_count, .. } => Some(self.apply_tags(tags, parsed_count)),
			ServerMessage::SyncQueued { sync_id } => {
				self.session.queued_sync_count += 1;
				trace!(%sync_id, pending = self.session.queued_sync_count, "sync.controller.queued");
				self.publish_session();
				None
			}
			ServerMessage::Error { error } => {
				warn!(project_id = %self.session.project_id, error = %error, "sync.controller.server_error");
				self.session.queued_sync_count = self.session.queued_sync_count.saturating_sub(1);
				self.awaiting_ack = false;
				self.publish(|status| status.last_error = Some(error));
				None
			}
			ServerMessage::Pong | ServerMessage::Unknown => None,
		}
	}

	fn apply_tags(&mut self, tags: Vec<Tag>, parsed_count: usize) -> TagsApplied {
		self.session.queued_sync_count = self.session.queued_sync_count.saturating_sub(1);
		self.awaiting_ack = false;
		self.known_tags.clone_from(&tags);

		let initial = std::mem::replace(&mut self.initial_load, false);
		let regenerate = std::mem::replace(&mut self.refresh_requested, false)
			|| (initial && self.latest_code.is_none() && !self.debounce.is_pending());
		let regenerated_code = if regenerate {
			if let Some(dropped) = self.debounce.cancel() {
				debug!(project_id = %self.session.project_id, bytes = dropped.len(), "sync.controller.edit_superseded");
			}
			let code = generate_code(&tags);
			self.session.last_synced_code = Some(code.clone());
			self.latest_code = Some(code.clone());
			Some(code)
		} else {
			None
		};

		debug!(
			project_id = %self.session.project_id,
			tags = tags.len(),
			parsed_count,
			regenerated = regenerated_code.is_some(),
			"sync.controller.tags_applied"
		);
		self.publish_session();
		TagsApplied {
			tags,
			parsed_count,
			regenerated_code,
		}
	}

	/// Routes a channel event. Returns the applied tags for `tags_updated`.
	pub fn handle_channel_event(&mut self, sink: &dyn MessageSink, event: ChannelEvent) -> Option<TagsApplied> {
		match event {
			ChannelEvent::Message(message) => self.handle_message(message),
			ChannelEvent::Status(status) => {
				self.on_connection_state(sink, &status);
				None
			}
			ChannelEvent::Stopped { reason } => {
				self.on_connection_state(
					sink,
					&ChannelStatus {
						state: ConnectionState::Disconnected,
						reconnect_attempts: self.session.reconnect_attempts,
						last_error: reason,
					},
				);
				None
			}
		}
	}

	/// Tracks the channel state.
	///
	/// A disconnect with an unanswered push forgets the last synced code so the
	/// edit is pushed again once the channel resubscribes.
	pub fn on_connection_state(&mut self, sink: &dyn MessageSink, status: &ChannelStatus) {
		self.session.connection = status.state;
		self.session.reconnect_attempts = status.reconnect_attempts;

		match status.state {
			ConnectionState::Disconnected => {
				if self.awaiting_ack {
					self.awaiting_ack = false;
					self.session.last_synced_code = None;
				}
				self.session.queued_sync_count = 0;
				let last_error = status.last_error.clone();
				self.publish(|s| {
					s.offline = true;
					if last_error.is_some() {
						s.last_error = last_error;
					}
				});
			}
			ConnectionState::Subscribed => {
				self.publish(|s| {
					s.offline = false;
					s.last_error = None;
				});
				let resync = self
					.latest_code
					.clone()
					.filter(|code| !self.debounce.is_pending() && self.session.last_synced_code.as_ref() != Some(code));
				if let Some(code) = resync {
					debug!(project_id = %self.session.project_id, "sync.controller.resync");
					self.sync_code(sink, code);
				}
			}
			ConnectionState::Connecting | ConnectionState::Connected => self.publish_session(),
		}
	}

	/// Regenerates editor text from the next inbound tag list, discarding any pending edit.
	pub fn request_refresh(&mut self) {
		self.refresh_requested = true;
	}

	/// Cancels any pending push. Returns the discarded code.
	pub fn teardown(&mut self) -> Option<String> {
		let dropped = self.debounce.cancel();
		self.session.queued_sync_count = 0;
		self.awaiting_ack = false;
		debug!(project_id = %self.session.project_id, dropped = dropped.is_some(), "sync.controller.teardown");
		self.publish_session();
		dropped
	}

	fn publish_session(&self) {
		self.publish(|_| {});
	}

	fn publish(&self, apply: impl FnOnce(&mut SyncStatus)) {
		self.status.send_if_modified(|status| {
			let before = status.clone();
			status.connection = self.session.connection;
			status.pending_syncs = self.session.queued_sync_count;
			status.reconnect_attempts = self.session.reconnect_attempts;
			apply(status);
			*status != before
		});
	}
}
