//! Socket seam between the channel state machine and the wire.

use async_trait::async_trait;
use pandaura_primitives::ProjectId;
use url::Url;

use crate::Result;

/// Close code for a deliberate, normal shutdown. Any other code is a failure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close codes servers use to reject credentials.
pub const AUTH_CLOSE_CODES: [u16; 3] = [1008, 4001, 4003];

pub fn is_auth_close(code: u16) -> bool {
	AUTH_CLOSE_CODES.contains(&code)
}

/// Where and as whom to connect.
#[derive(Clone)]
pub struct Endpoint {
	pub url: Url,
	pub project_id: ProjectId,
	pub auth_token: String,
}

impl std::fmt::Debug for Endpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Endpoint")
			.field("url", &self.url.as_str())
			.field("project_id", &self.project_id)
			.finish_non_exhaustive()
	}
}

impl Endpoint {
	pub fn new(url: Url, project_id: ProjectId, auth_token: impl Into<String>) -> Self {
		Self {
			url,
			project_id,
			auth_token: auth_token.into(),
		}
	}

	/// Connection URL carrying the token and project as query parameters.
	pub fn request_url(&self) -> Url {
		let mut url = self.url.clone();
		url.query_pairs_mut()
			.append_pair("token", &self.auth_token)
			.append_pair("projectId", &self.project_id.to_string());
		url
	}
}

/// An inbound frame after transport-level control frames are handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Text(String),
	/// The peer closed the socket, with its close code if it sent one.
	Close(Option<u16>),
}

/// One open socket.
#[async_trait]
pub trait Connection: Send {
	async fn send(&mut self, text: String) -> Result<()>;

	/// Next inbound frame, or `None` once the stream ends without a close frame.
	///
	/// Must be cancel-safe: it is polled as a `tokio::select!` branch.
	async fn recv(&mut self) -> Option<Result<Frame>>;

	async fn close(&mut self, code: u16) -> Result<()>;
}

/// Opens sockets.
///
/// Implementations report rejected credentials as [`crate::Error::Auth`] and
/// every other failure as [`crate::Error::Connection`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
	async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>>;
}
