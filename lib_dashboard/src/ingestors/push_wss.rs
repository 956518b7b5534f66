//! # WebSocket Push Connector
//!
//! Opens the backend's Socket.IO push channel over the WebSocket transport
//! (`/socket.io/?EIO=4&transport=websocket`), carrying the session bearer token
//! both in the upgrade request and in the Socket.IO connect packet.
//!
//! Engine.IO housekeeping stays inside this module: the open packet is awaited,
//! server pings are answered with pongs, and both surface as heartbeats so the
//! connection manager's inactivity watchdog sees a quiet-but-alive channel as
//! alive. Socket.IO event packets (`42[...]`) are passed through untouched.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::auth::TokenStore;
use crate::core::connection_manager::{PushConnector, PushFrame, PushStream};
use crate::errors::PushError;
use crate::models::events::SOCKETIO_EVENT_PREFIX;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Engine.IO `open` packet payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPacket {
    #[serde(default)]
    sid: String,
    #[serde(default)]
    ping_interval: u64,
    #[serde(default)]
    ping_timeout: u64,
}

/// What one Engine.IO text packet means to the reader.
#[derive(Debug, PartialEq, Eq)]
enum Packet {
    /// A Socket.IO event, forwarded as-is.
    Event,
    /// Server ping; must be answered with a pong.
    Ping,
    /// Protocol traffic that only proves liveness.
    Alive,
    /// Server-side close or namespace disconnect.
    Closed,
    /// Namespace connection refused, with the server's reason.
    Refused(String),
    /// Anything unrecognized, forwarded so the dispatcher can account for it.
    Unknown,
}

fn classify(text: &str) -> Packet {
    if text.starts_with(SOCKETIO_EVENT_PREFIX) {
        return Packet::Event;
    }
    match text.as_bytes().first().copied() {
        Some(b'2') => Packet::Ping,
        Some(b'0' | b'3' | b'5' | b'6') => Packet::Alive,
        Some(b'1') => Packet::Closed,
        Some(b'4') => match text.as_bytes().get(1).copied() {
            Some(b'1') => Packet::Closed,
            Some(b'4') => Packet::Refused(text[2..].to_string()),
            // connect ack, acks and binary headers
            Some(b'0' | b'3' | b'5' | b'6') => Packet::Alive,
            _ => Packet::Unknown,
        },
        _ => Packet::Unknown,
    }
}

/// Connects to a Socket.IO push endpoint.
pub struct WssPushConnector {
    /// `ws://` or `wss://` Engine.IO endpoint.
    url: String,
    /// Source of the bearer credential.
    tokens: Arc<TokenStore>,
}

impl WssPushConnector {
    /// Creates a connector for `url`.
    pub fn new(url: impl Into<String>, tokens: Arc<TokenStore>) -> Self {
        Self { url: url.into(), tokens }
    }

    async fn open(&self) -> Result<PushStream, PushError> {
        let token = self.tokens.get();
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| PushError::Handshake(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| PushError::Handshake(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        log::info!("Connecting push channel: {}", self.url);
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;
        let (mut sink, mut source) = ws_stream.split();

        let open = Self::await_open(&mut source).await?;
        log::info!(
            "Push channel open (sid {}, ping every {}ms, timeout {}ms).",
            open.sid,
            open.ping_interval,
            open.ping_timeout
        );

        let connect = format!("40{}", serde_json::json!({ "token": token }));
        sink.send(Message::Text(connect.into()))
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        Ok(stream::unfold((sink, source), |(mut sink, mut source)| async move {
            let item = Self::next_frame(&mut sink, &mut source).await?;
            Some((item, (sink, source)))
        })
        .boxed())
    }

    /// Reads up to and including the Engine.IO open packet.
    async fn await_open(source: &mut SplitStream<Socket>) -> Result<OpenPacket, PushError> {
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    let body = text
                        .as_str()
                        .strip_prefix('0')
                        .ok_or_else(|| PushError::Handshake(format!("expected open packet, got '{}'", text.as_str())))?;
                    return serde_json::from_str(body).map_err(|e| PushError::Handshake(e.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => return Err(PushError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(PushError::Transport(e.to_string())),
            }
        }
    }

    /// Next item for the connection manager; `None` once the socket is gone.
    async fn next_frame(
        sink: &mut SplitSink<Socket, Message>,
        source: &mut SplitStream<Socket>,
    ) -> Option<Result<PushFrame, PushError>> {
        loop {
            let text = match source.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bin)) => {
                    log::debug!("Ignoring binary push frame ({} bytes).", bin.len());
                    return Some(Ok(PushFrame::Heartbeat));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => return Some(Ok(PushFrame::Heartbeat)),
                Ok(Message::Close(_)) => return Some(Err(PushError::Closed)),
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(PushError::Transport(e.to_string()))),
            };

            return Some(match classify(text.as_str()) {
                Packet::Event | Packet::Unknown => Ok(PushFrame::Text(text.as_str().to_string())),
                Packet::Ping => match sink.send(Message::Text("3".into())).await {
                    Ok(()) => Ok(PushFrame::Heartbeat),
                    Err(e) => Err(PushError::Transport(e.to_string())),
                },
                Packet::Alive => Ok(PushFrame::Heartbeat),
                Packet::Closed => Err(PushError::Closed),
                Packet::Refused(reason) => Err(PushError::Handshake(reason)),
            });
        }
    }
}

impl PushConnector for WssPushConnector {
    fn connect(&self) -> BoxFuture<'_, Result<PushStream, PushError>> {
        Box::pin(self.open())
    }
}
