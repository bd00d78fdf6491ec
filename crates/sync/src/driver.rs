use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{ChannelEvent, ChannelEvents, Error, Result, SyncChannel, SyncDecision, SyncStatus, TagSyncController, TagsApplied};

/// Tag lists applied from the server, in receipt order.
pub type TagUpdates = mpsc::UnboundedReceiver<TagsApplied>;

#[derive(Debug)]
enum Command {
	Edit(String),
	Refresh,
	Flush(oneshot::Sender<Option<SyncDecision>>),
	Shutdown,
}

/// Handle to a running tag sync task.
#[derive(Debug)]
pub struct TagSyncHandle {
	commands: mpsc::UnboundedSender<Command>,
	status: watch::Receiver<SyncStatus>,
	task: JoinHandle<()>,
}

impl TagSyncHandle {
	/// Reports new editor text. Never blocks on the network.
	pub fn edit(&self, code: impl Into<String>) -> Result<()> {
		self.command(Command::Edit(code.into()))
	}

	/// Regenerates editor text from the next tag list the server sends.
	pub fn refresh(&self) -> Result<()> {
		self.command(Command::Refresh)
	}

	/// Pushes any pending edit without waiting out the debounce.
	pub async fn flush(&self) -> Result<Option<SyncDecision>> {
		let (reply, rx) = oneshot::channel();
		self.command(Command::Flush(reply))?;
		rx.await.map_err(|_| Error::Closed)
	}

	pub fn status(&self) -> SyncStatus {
		self.status.borrow().clone()
	}

	pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
		self.status.clone()
	}

	/// Cancels pending pushes, closes the channel normally, and waits for the task.
	pub async fn shutdown(self) {
		let _ = self.commands.send(Command::Shutdown);
		let _ = self.task.await;
	}

	fn command(&self, command: Command) -> Result<()> {
		self.commands.send(command).map_err(|_| Error::Closed)
	}
}

/// Drives `controller` against `channel` on a background task.
///
/// Edits, channel events, and debounce expiry are handled one at a time in
/// arrival order, so inbound tag lists never interleave with a push.
pub fn spawn_tag_sync(mut controller: TagSyncController, channel: SyncChannel, mut events: ChannelEvents) -> (TagSyncHandle, TagUpdates) {
	let (command_tx, mut commands) = mpsc::unbounded_channel();
	let (update_tx, update_rx) = mpsc::unbounded_channel();
	let status = controller.watch_status();

	let task = pandaura_worker::spawn(pandaura_worker::TaskClass::Interactive, "sync.tag_sync", async move {
		let mut events_open = true;
		loop {
			tokio::select! {
				biased;

				command = commands.recv() => match command {
					None | Some(Command::Shutdown) => break,
					Some(Command::Edit(code)) => {
						controller.on_edit(code);
					}
					Some(Command::Refresh) => controller.request_refresh(),
					Some(Command::Flush(reply)) => {
						let _ = reply.send(controller.flush(&channel));
					}
				},

				event = events.recv(), if events_open => match event {
					Some(event) => {
						if let ChannelEvent::Stopped { reason } = &event {
							debug!(project_id = %controller.project_id(), reason = ?reason, "sync.tag_sync.channel_stopped");
						}
						if let Some(applied) = controller.handle_channel_event(&channel, event) {
							let _ = update_tx.send(applied);
						}
					}
					None => events_open = false,
				},

				code = controller.due() => {
					controller.sync_code(&channel, code);
				}
			}
		}

		controller.teardown();
		channel.close().await;
	});

	let handle = TagSyncHandle {
		commands: command_tx,
		status,
		task,
	};
	(handle, update_rx)
}

#[cfg(test)]
mod tests;
