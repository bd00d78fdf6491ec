//! In-process socket doubles for channel tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pandaura_worker::{Backoff, RetryPolicy};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{ChannelConfig, ChannelEvent, ChannelEvents, ChannelStatus, ClientMessage, Connection, Connector, Endpoint, Error, Frame, Result, ServerMessage};

/// How the next connection attempt behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
	Accept,
	RefuseConnection,
	RefuseAuth,
	/// Never completes; exercises the connect timeout.
	Hang,
}

/// What the client wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
	Text(String),
	Close(u16),
}

/// Connector that follows a script, accepting once the script runs out.
pub(crate) struct ScriptedConnector {
	script: Mutex<VecDeque<Attempt>>,
	attempts: AtomicUsize,
	servers: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedConnector {
	pub(crate) fn new(script: impl IntoIterator<Item = Attempt>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
		let (servers, rx) = mpsc::unbounded_channel();
		let connector = Arc::new(Self {
			script: Mutex::new(script.into_iter().collect()),
			attempts: AtomicUsize::new(0),
			servers,
		});
		(connector, rx)
	}

	pub(crate) fn push(&self, attempt: Attempt) {
		self.script.lock().push_back(attempt);
	}

	pub(crate) fn attempts(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Connector for ScriptedConnector {
	async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Connection>> {
		self.attempts.fetch_add(1, Ordering::SeqCst);
		let attempt = self.script.lock().pop_front().unwrap_or(Attempt::Accept);
		match attempt {
			Attempt::Accept => {
				let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
				let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
				let _ = self.servers.send(ServerEnd {
					from_client: outbound_rx,
					to_client: inbound_tx,
				});
				Ok(Box::new(TestConnection {
					outbound: outbound_tx,
					inbound: inbound_rx,
				}))
			}
			Attempt::RefuseConnection => Err(Error::Connection("connection refused".into())),
			Attempt::RefuseAuth => Err(Error::Auth("HTTP 401".into())),
			Attempt::Hang => std::future::pending().await,
		}
	}
}

struct TestConnection {
	outbound: mpsc::UnboundedSender<Outbound>,
	inbound: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Connection for TestConnection {
	async fn send(&mut self, text: String) -> Result<()> {
		self.outbound
			.send(Outbound::Text(text))
			.map_err(|_| Error::Connection("peer went away".into()))
	}

	async fn recv(&mut self) -> Option<Result<Frame>> {
		self.inbound.recv().await.map(Ok)
	}

	async fn close(&mut self, code: u16) -> Result<()> {
		let _ = self.outbound.send(Outbound::Close(code));
		Ok(())
	}
}

/// Server side of one accepted connection. Dropping it ends the stream abnormally.
pub(crate) struct ServerEnd {
	from_client: mpsc::UnboundedReceiver<Outbound>,
	to_client: mpsc::UnboundedSender<Frame>,
}

impl ServerEnd {
	/// Next raw frame from the client, pings included.
	pub(crate) async fn next_raw(&mut self) -> Option<Outbound> {
		self.from_client.recv().await
	}

	/// Next decoded message, skipping pings. `None` once the client closes.
	pub(crate) async fn next_message(&mut self) -> Option<ClientMessage> {
		loop {
			match self.from_client.recv().await? {
				Outbound::Text(text) => match serde_json::from_str(&text) {
					Ok(ClientMessage::Ping) => continue,
					Ok(message) => return Some(message),
					Err(err) => panic!("client sent undecodable frame {text:?}: {err}"),
				},
				Outbound::Close(_) => return None,
			}
		}
	}

	pub(crate) fn push(&self, message: ServerMessage) {
		let text = serde_json::to_string(&message).expect("server message encodes");
		let _ = self.to_client.send(Frame::Text(text));
	}

	pub(crate) fn push_raw(&self, text: &str) {
		let _ = self.to_client.send(Frame::Text(text.to_string()));
	}

	pub(crate) fn close(&self, code: u16) {
		let _ = self.to_client.send(Frame::Close(Some(code)));
	}
}

/// Fast retries and a keepalive far beyond any test's horizon.
pub(crate) fn test_config() -> ChannelConfig {
	ChannelConfig {
		connect_timeout: Duration::from_secs(5),
		ping_interval: Duration::from_secs(3600),
		pong_timeout: Duration::from_secs(10),
		retry: RetryPolicy {
			backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
			max_attempts: None,
		},
	}
}

pub(crate) fn endpoint(project_id: u64) -> Endpoint {
	let url = url::Url::parse("ws://sync.test/ws/tags").expect("static url parses");
	Endpoint::new(url, pandaura_primitives::ProjectId(project_id), "secret")
}

/// Next status event, skipping messages.
pub(crate) async fn next_status(events: &mut ChannelEvents) -> Option<ChannelStatus> {
	loop {
		match events.recv().await? {
			ChannelEvent::Status(status) => return Some(status),
			ChannelEvent::Message(_) => continue,
			ChannelEvent::Stopped { .. } => return None,
		}
	}
}

/// Next status that reports the connection down, skipping the rest.
pub(crate) async fn next_disconnect(events: &mut ChannelEvents) -> Option<ChannelStatus> {
	loop {
		let status = next_status(events).await?;
		if status.state == crate::ConnectionState::Disconnected {
			return Some(status);
		}
	}
}

/// Next inbound server message, skipping status changes.
pub(crate) async fn next_server_message(events: &mut ChannelEvents) -> Option<ServerMessage> {
	loop {
		match events.recv().await? {
			ChannelEvent::Message(message) => return Some(message),
			ChannelEvent::Status(_) => continue,
			ChannelEvent::Stopped { .. } => return None,
		}
	}
}

/// Drains events until the channel stops, returning the stop reason.
pub(crate) async fn stopped(events: &mut ChannelEvents) -> Option<String> {
	loop {
		match events.recv().await {
			Some(ChannelEvent::Stopped { reason }) => return reason,
			Some(_) => continue,
			None => panic!("event stream ended without a stop event"),
		}
	}
}
