//! Persistent, self-healing connection for one project.
//!
//! State machine: `Disconnected -> Connecting -> Connected -> Subscribed`.
//! Abnormal closes, transport errors, and keepalive expiry drop back to
//! `Disconnected` and retry on the [`RetryPolicy`] schedule; the attempt
//! counter resets on every successful `Connected` transition. A normal close
//! (code 1000) from either side and rejected credentials end the channel.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use pandaura_primitives::ProjectId;
use pandaura_worker::{Backoff, RetryPolicy, TaskClass};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tracing::{debug, trace, warn};

use crate::transport::{NORMAL_CLOSURE, is_auth_close};
use crate::{ClientMessage, Connection, Connector, Endpoint, Error, Frame, Result, ServerMessage, TimeoutKind};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
	Subscribed,
}

impl ConnectionState {
	/// Whether frames can currently be written.
	pub const fn is_open(self) -> bool {
		matches!(self, Self::Connected | Self::Subscribed)
	}
}

/// Observable channel status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStatus {
	pub state: ConnectionState,
	/// Failed attempts since the last successful connection.
	pub reconnect_attempts: u32,
	pub last_error: Option<String>,
}

/// Channel tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
	pub connect_timeout: Duration,
	pub ping_interval: Duration,
	/// How long to wait for a `pong` before declaring the socket dead.
	pub pong_timeout: Duration,
	pub retry: RetryPolicy,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			connect_timeout: Duration::from_secs(10),
			ping_interval: Duration::from_secs(25),
			pong_timeout: Duration::from_secs(10),
			retry: RetryPolicy {
				backoff: Backoff::default(),
				max_attempts: None,
			},
		}
	}
}

/// Inbound notifications, delivered in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
	Message(ServerMessage),
	Status(ChannelStatus),
	/// The channel stopped for good; no further events follow.
	Stopped { reason: Option<String> },
}

/// Receiving half of a channel's event stream.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

#[derive(Debug)]
enum Command {
	Send(ClientMessage),
	Subscribe(ProjectId),
	Close,
}

/// Handle to one project's live connection.
///
/// Dropping the handle closes the connection normally.
pub struct SyncChannel {
	project_id: ProjectId,
	commands: mpsc::UnboundedSender<Command>,
	status: watch::Receiver<ChannelStatus>,
	task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SyncChannel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncChannel")
			.field("project_id", &self.project_id)
			.field("status", &*self.status.borrow())
			.finish()
	}
}

impl SyncChannel {
	/// Opens the connection.
	///
	/// The first attempt is awaited so its failure reaches the caller as
	/// [`Error::Connection`], [`Error::Auth`], or [`Error::Timeout`]. Once open,
	/// the channel maintains itself in a background task.
	pub async fn connect(connector: Arc<dyn Connector>, endpoint: Endpoint, config: ChannelConfig) -> Result<(Self, ChannelEvents)> {
		let (command_tx, command_rx) = mpsc::unbounded_channel();
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let (status_tx, status_rx) = watch::channel(ChannelStatus::default());
		let project_id = endpoint.project_id;

		let mut link = Link {
			connector,
			endpoint,
			config,
			commands: command_rx,
			events: event_tx,
			status: status_tx,
			subscription: None,
		};
		let conn = link.open().await?;
		let task = pandaura_worker::spawn(TaskClass::Connection, "sync.channel", link.run(conn));

		let channel = Self {
			project_id,
			commands: command_tx,
			status: status_rx,
			task: Some(task),
		};
		Ok((channel, event_rx))
	}

	pub fn project_id(&self) -> ProjectId {
		self.project_id
	}

	/// Declares interest in a project's tag stream. Idempotent.
	///
	/// The subscription survives reconnection.
	pub fn subscribe(&self, project_id: ProjectId) -> Result<()> {
		self.commands.send(Command::Subscribe(project_id)).map_err(|_| Error::Closed)
	}

	/// Queues a message for the current connection. Fire-and-forget.
	pub fn send(&self, message: ClientMessage) -> Result<()> {
		if self.commands.is_closed() {
			return Err(Error::Closed);
		}
		if !self.state().is_open() {
			return Err(Error::NotConnected);
		}
		self.commands.send(Command::Send(message)).map_err(|_| Error::Closed)
	}

	pub fn state(&self) -> ConnectionState {
		self.status.borrow().state
	}

	pub fn status(&self) -> ChannelStatus {
		self.status.borrow().clone()
	}

	/// Watches status changes, including reconnect attempt counts.
	pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
		self.status.clone()
	}

	/// Closes with code 1000 and waits for the connection task to finish.
	pub async fn close(mut self) {
		let _ = self.commands.send(Command::Close);
		if let Some(task) = self.task.take() {
			let _ = task.await;
		}
	}
}

impl Drop for SyncChannel {
	fn drop(&mut self) {
		let _ = self.commands.send(Command::Close);
	}
}

/// How one connected session ended.
enum SessionEnd {
	/// We closed normally.
	ClientClosed,
	/// The server closed with code 1000.
	ServerClosed,
	AuthRejected(String),
	Lost(Error),
}

/// Connection task state, owned by the background task after the first connect.
struct Link {
	connector: Arc<dyn Connector>,
	endpoint: Endpoint,
	config: ChannelConfig,
	commands: mpsc::UnboundedReceiver<Command>,
	events: mpsc::UnboundedSender<ChannelEvent>,
	status: watch::Sender<ChannelStatus>,
	subscription: Option<ProjectId>,
}

impl Link {
	async fn run(mut self, mut conn: Box<dyn Connection>) {
		loop {
			let end = self.session(conn.as_mut()).await;
			drop(conn);

			let error = match end {
				SessionEnd::ClientClosed => {
					debug!(project_id = %self.endpoint.project_id, "sync.channel.closed");
					self.stop(None);
					return;
				}
				SessionEnd::ServerClosed => {
					debug!(project_id = %self.endpoint.project_id, "sync.channel.server_closed");
					self.stop(Some("server closed the connection".to_string()));
					return;
				}
				SessionEnd::AuthRejected(reason) => {
					self.auth_rejected(reason);
					return;
				}
				SessionEnd::Lost(err) => err,
			};
			warn!(project_id = %self.endpoint.project_id, error = %error, "sync.channel.lost");

			conn = match self.reconnect(error).await {
				Some(conn) => conn,
				None => return,
			};
		}
	}

	/// Retries until a connection opens. `None` means the channel stopped.
	async fn reconnect(&mut self, mut error: Error) -> Option<Box<dyn Connection>> {
		loop {
			let attempt = self.status.borrow().reconnect_attempts.saturating_add(1);
			self.update(|status| {
				status.state = ConnectionState::Disconnected;
				status.reconnect_attempts = attempt;
				status.last_error = Some(error.to_string());
			});

			let Some(delay) = self.config.retry.delay_for(attempt) else {
				warn!(project_id = %self.endpoint.project_id, attempts = attempt - 1, "sync.channel.gave_up");
				self.stop(Some(format!("gave up reconnecting: {error}")));
				return None;
			};
			debug!(project_id = %self.endpoint.project_id, attempt, delay_ms = delay.as_millis() as u64, "sync.channel.retry_scheduled");

			if self.wait(delay).await.is_break() {
				self.stop(None);
				return None;
			}

			match self.open().await {
				Ok(conn) => return Some(conn),
				Err(Error::Auth(reason)) => {
					self.auth_rejected(reason);
					return None;
				}
				Err(err) => error = err,
			}
		}
	}

	/// One connection attempt bounded by the connect timeout.
	async fn open(&mut self) -> Result<Box<dyn Connection>> {
		self.set_state(ConnectionState::Connecting);
		let outcome = timeout(self.config.connect_timeout, self.connector.connect(&self.endpoint)).await;
		let conn = match outcome {
			Ok(Ok(conn)) => conn,
			Ok(Err(err)) => {
				self.set_failed(&err);
				return Err(err);
			}
			Err(_) => {
				let err = Error::Timeout(TimeoutKind::Connect);
				self.set_failed(&err);
				return Err(err);
			}
		};

		self.update(|status| {
			status.state = ConnectionState::Connected;
			status.reconnect_attempts = 0;
			status.last_error = None;
		});
		debug!(project_id = %self.endpoint.project_id, "sync.channel.connected");
		Ok(conn)
	}

	async fn session(&mut self, conn: &mut dyn Connection) -> SessionEnd {
		if let Some(project_id) = self.subscription
			&& let Err(err) = self.write_subscribe(conn, project_id).await
		{
			return SessionEnd::Lost(err);
		}

		let period = self.config.ping_interval;
		let mut ping = interval_at(Instant::now() + period, period);
		ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut pong_deadline: Option<Instant> = None;

		loop {
			tokio::select! {
				biased;

				command = self.commands.recv() => match command {
					None | Some(Command::Close) => {
						if let Err(err) = conn.close(NORMAL_CLOSURE).await {
							trace!(error = %err, "sync.channel.close_failed");
						}
						return SessionEnd::ClientClosed;
					}
					Some(Command::Subscribe(project_id)) => {
						if self.subscription == Some(project_id) && self.status.borrow().state == ConnectionState::Subscribed {
							trace!(%project_id, "sync.channel.already_subscribed");
							continue;
						}
						if let Err(err) = self.write_subscribe(conn, project_id).await {
							return SessionEnd::Lost(err);
						}
					}
					Some(Command::Send(message)) => {
						if let Err(err) = write(conn, &message).await {
							return SessionEnd::Lost(err);
						}
					}
				},

				frame = conn.recv() => match frame {
					Some(Ok(Frame::Text(text))) => match ServerMessage::decode(&text) {
						Ok(ServerMessage::Pong) => {
							trace!("sync.channel.pong");
							pong_deadline = None;
						}
						Ok(message) => {
							trace!(kind = message.kind(), "sync.channel.message");
							let _ = self.events.send(ChannelEvent::Message(message));
						}
						Err(err) => warn!(error = %err, "sync.channel.undecodable_frame"),
					},
					Some(Ok(Frame::Close(Some(NORMAL_CLOSURE)))) => return SessionEnd::ServerClosed,
					Some(Ok(Frame::Close(Some(code)))) if is_auth_close(code) => {
						return SessionEnd::AuthRejected(format!("server closed with code {code}"));
					}
					Some(Ok(Frame::Close(Some(code)))) => {
						return SessionEnd::Lost(Error::Connection(format!("abnormal close with code {code}")));
					}
					Some(Ok(Frame::Close(None))) => {
						return SessionEnd::Lost(Error::Connection("close frame without code".to_string()));
					}
					Some(Err(err)) => return SessionEnd::Lost(err),
					None => return SessionEnd::Lost(Error::Connection("stream ended without close frame".to_string())),
				},

				_ = ping.tick() => {
					if pong_deadline.is_none() {
						if let Err(err) = write(conn, &ClientMessage::Ping).await {
							return SessionEnd::Lost(err);
						}
						pong_deadline = Some(Instant::now() + self.config.pong_timeout);
					}
				}

				_ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
					warn!(project_id = %self.endpoint.project_id, "sync.channel.keepalive_expired");
					let _ = conn.close(NORMAL_CLOSURE).await;
					return SessionEnd::Lost(Error::Timeout(TimeoutKind::Keepalive));
				}
			}
		}
	}

	/// Waits out a retry delay while still honoring commands.
	async fn wait(&mut self, delay: Duration) -> ControlFlow<()> {
		let deadline = Instant::now() + delay;
		loop {
			tokio::select! {
				biased;

				command = self.commands.recv() => match command {
					None | Some(Command::Close) => return ControlFlow::Break(()),
					Some(Command::Subscribe(project_id)) => self.subscription = Some(project_id),
					Some(Command::Send(message)) => {
						debug!(message = ?message, "sync.channel.send_while_disconnected");
					}
				},
				_ = sleep_until(deadline) => return ControlFlow::Continue(()),
			}
		}
	}

	async fn write_subscribe(&mut self, conn: &mut dyn Connection, project_id: ProjectId) -> Result<()> {
		write(conn, &ClientMessage::Subscribe { project_id }).await?;
		self.subscription = Some(project_id);
		self.set_state(ConnectionState::Subscribed);
		debug!(%project_id, "sync.channel.subscribed");
		Ok(())
	}

	fn auth_rejected(&mut self, reason: String) {
		warn!(project_id = %self.endpoint.project_id, reason = %reason, "sync.channel.auth_rejected");
		let error = Error::Auth(reason);
		self.set_failed(&error);
		self.stop(Some(error.to_string()));
	}

	fn set_failed(&self, error: &Error) {
		self.update(|status| {
			status.state = ConnectionState::Disconnected;
			status.last_error = Some(error.to_string());
		});
	}

	fn set_state(&self, state: ConnectionState) {
		self.update(|status| status.state = state);
	}

	fn update(&self, apply: impl FnOnce(&mut ChannelStatus)) {
		let changed = self.status.send_if_modified(|status| {
			let before = status.clone();
			apply(status);
			*status != before
		});
		if changed {
			let _ = self.events.send(ChannelEvent::Status(self.status.borrow().clone()));
		}
	}

	fn stop(&self, reason: Option<String>) {
		self.set_state(ConnectionState::Disconnected);
		let _ = self.events.send(ChannelEvent::Stopped { reason });
	}
}

async fn write(conn: &mut dyn Connection, message: &ClientMessage) -> Result<()> {
	let text = message.encode()?;
	trace!(bytes = text.len(), "sync.channel.write");
	conn.send(text).await
}
