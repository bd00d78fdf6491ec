use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

use crate::{Connection, Connector, Endpoint, Error, Frame, Result};

/// Websocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
	async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>> {
		let url = endpoint.request_url();
		match connect_async(url.as_str()).await {
			Ok((stream, response)) => {
				trace!(status = %response.status(), "sync.ws.handshake");
				Ok(Box::new(WsConnection { stream }))
			}
			Err(WsError::Http(response)) if matches!(response.status().as_u16(), 401 | 403) => {
				Err(Error::Auth(format!("handshake rejected with {}", response.status())))
			}
			Err(err) => Err(Error::Connection(err.to_string())),
		}
	}
}

struct WsConnection {
	stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
	async fn send(&mut self, text: String) -> Result<()> {
		self.stream
			.send(Message::Text(text.into()))
			.await
			.map_err(|err| Error::Connection(err.to_string()))
	}

	async fn recv(&mut self) -> Option<Result<Frame>> {
		loop {
			let message = match self.stream.next().await? {
				Ok(message) => message,
				Err(err) => return Some(Err(Error::Connection(err.to_string()))),
			};
			match message {
				Message::Text(text) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
				Message::Close(frame) => return Some(Ok(Frame::Close(frame.map(|frame| u16::from(frame.code))))),
				// tungstenite answers pings itself; binary frames are not part of the protocol.
				Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
			}
		}
	}

	async fn close(&mut self, code: u16) -> Result<()> {
		let frame = CloseFrame {
			code: CloseCode::from(code),
			reason: "".into(),
		};
		match self.stream.close(Some(frame)).await {
			Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
			Err(err) => Err(Error::Connection(err.to_string())),
		}
	}
}
