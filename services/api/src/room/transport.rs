//! Real-time room transport abstraction and its WebSocket implementation.
//!
//! The lifecycle manager never registers callbacks on a connection object;
//! it consumes typed events from a channel handed back by `connect`. The
//! concrete transport speaks JSON over a WebSocket with a bearer-token
//! handshake and translates the wire events into `RoomEvent`s.

use super::LifecycleError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

/// Events a room connection delivers to its lifecycle task.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Connected,
    Disconnected,
    ParticipantConnected { identity: String },
    ParticipantDisconnected { identity: String },
    /// An application data payload published into the room.
    Data(Bytes),
}

/// Options applied when joining a room.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub auto_subscribe: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_subscribe: true,
        }
    }
}

/// Connects to rooms on a real-time media server.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Establishes a room connection. Events arrive on the returned
    /// receiver; the receiver closing means the connection is gone.
    async fn connect(
        &self,
        server_url: &str,
        token: &str,
        options: &ConnectOptions,
    ) -> Result<(Box<dyn RoomConnection>, mpsc::Receiver<RoomEvent>), LifecycleError>;
}

/// A live connection to one room.
#[async_trait]
pub trait RoomConnection: Send + Sync {
    /// Publishes an application data payload into the room.
    async fn publish_data(&self, payload: Bytes) -> Result<(), LifecycleError>;

    /// Closes the connection. Safe to call once per connection.
    async fn disconnect(&self);
}

/// Wire format of the agent signaling channel.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SignalMessage {
    Connected,
    Disconnected,
    ParticipantConnected { identity: String },
    ParticipantDisconnected { identity: String },
    Data { payload: String },
}

/// `RoomTransport` over a WebSocket signaling endpoint.
pub struct WsRoomTransport;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

struct WsRoomConnection {
    sink: Mutex<WsSink>,
    reader: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl RoomTransport for WsRoomTransport {
    async fn connect(
        &self,
        server_url: &str,
        token: &str,
        options: &ConnectOptions,
    ) -> Result<(Box<dyn RoomConnection>, mpsc::Receiver<RoomEvent>), LifecycleError> {
        let url = format!(
            "{}/agent?auto_subscribe={}",
            server_url.trim_end_matches('/'),
            options.auto_subscribe
        );
        let mut request = url
            .into_client_request()
            .map_err(|e| LifecycleError::Connect(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}")
                .parse()
                .map_err(|_| LifecycleError::Connect("token is not a valid header value".to_string()))?,
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| LifecycleError::Connect(e.to_string()))?;
        info!(server = %server_url, "connected to room signaling endpoint");

        let (sink, mut stream) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(64);

        // Translate wire frames into room events until the socket closes.
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match serde_json::from_str::<SignalMessage>(&text) {
                    Ok(message) => {
                        let event = match message {
                            SignalMessage::Connected => RoomEvent::Connected,
                            SignalMessage::Disconnected => RoomEvent::Disconnected,
                            SignalMessage::ParticipantConnected { identity } => {
                                RoomEvent::ParticipantConnected { identity }
                            }
                            SignalMessage::ParticipantDisconnected { identity } => {
                                RoomEvent::ParticipantDisconnected { identity }
                            }
                            SignalMessage::Data { payload } => {
                                RoomEvent::Data(Bytes::from(payload.into_bytes()))
                            }
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "ignoring unparseable signaling frame");
                    }
                }
            }
            let _ = event_tx.send(RoomEvent::Disconnected).await;
        });

        let connection = WsRoomConnection {
            sink: Mutex::new(sink),
            reader,
        };
        Ok((Box::new(connection), event_rx))
    }
}

#[async_trait]
impl RoomConnection for WsRoomConnection {
    async fn publish_data(&self, payload: Bytes) -> Result<(), LifecycleError> {
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|_| LifecycleError::Transport("data payload is not utf-8".to_string()))?;
        let frame = serde_json::to_string(&SignalMessage::Data { payload })
            .map_err(|e| LifecycleError::Transport(e.to_string()))?;
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| LifecycleError::Transport(e.to_string()))
    }

    async fn disconnect(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(err) = sink.send(WsMessage::Close(None)).await {
            warn!(error = %err, "error while closing room connection");
        }
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_messages_round_trip() {
        let frame = r#"{"event":"participant_connected","identity":"learner-1"}"#;
        let message: SignalMessage = serde_json::from_str(frame).unwrap();
        assert!(matches!(
            message,
            SignalMessage::ParticipantConnected { ref identity } if identity == "learner-1"
        ));

        let data = SignalMessage::Data {
            payload: "{\"type\":\"text\"}".to_string(),
        };
        let encoded = serde_json::to_string(&data).unwrap();
        assert!(encoded.contains("\"event\":\"data\""));
    }

    #[test]
    fn connect_options_default_to_auto_subscribe() {
        assert!(ConnectOptions::default().auto_subscribe);
    }
}
