use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerMessage, SetupRequest};
use super::transport::{LiveConnection, LiveTransport, TransportListener};
use crate::error::AgentError;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Websocket client for the live API
pub struct LiveClient {
    endpoint: String,
    setup_timeout: Duration,
}

impl LiveClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            setup_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }
}

impl Default for LiveClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// Decoded websocket frame
enum Frame {
    Message(ServerMessage),
    Close(Option<String>),
    Skip,
}

fn parse_frame(message: Message) -> Frame {
    let parsed = match message {
        Message::Text(text) => serde_json::from_str::<ServerMessage>(&text),
        Message::Binary(bytes) => serde_json::from_slice::<ServerMessage>(&bytes),
        Message::Close(frame) => return Frame::Close(frame.map(|f| f.reason.to_string())),
        _ => return Frame::Skip,
    };

    match parsed {
        Ok(message) => Frame::Message(message),
        Err(e) => {
            warn!("Failed to parse server message: {}", e);
            Frame::Skip
        }
    }
}

async fn wait_for_setup(stream: &mut WsStream) -> Result<(), AgentError> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| AgentError::TransportOpen(e.to_string()))?;
        match parse_frame(frame) {
            Frame::Message(message) if message.setup_complete.is_some() => return Ok(()),
            Frame::Message(_) => debug!("Ignoring message received before setup completed"),
            Frame::Close(reason) => {
                return Err(AgentError::TransportOpen(format!(
                    "connection closed during setup: {}",
                    reason.unwrap_or_default()
                )))
            }
            Frame::Skip => {}
        }
    }

    Err(AgentError::TransportOpen(
        "connection ended before setup completed".to_string(),
    ))
}

enum Outgoing {
    Message(ClientMessage),
    Close,
}

async fn write_loop(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Message(message) => {
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to serialize client message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(payload.into())).await {
                    error!("Failed to send message: {}", e);
                    break;
                }
            }
            Outgoing::Close => {
                if let Err(e) = sink.close().await {
                    debug!("Error closing websocket: {}", e);
                }
                break;
            }
        }
    }
    debug!("Websocket writer stopped");
}

async fn read_loop(mut stream: WsStream, listener: Arc<dyn TransportListener>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(message) => match parse_frame(message) {
                Frame::Message(message) => listener.on_message(message),
                Frame::Close(reason) => {
                    info!("Live session closed by server: {:?}", reason);
                    listener.on_close(reason);
                    return;
                }
                Frame::Skip => {}
            },
            Err(e) => {
                error!("Websocket error: {}", e);
                listener.on_error(e.to_string());
                return;
            }
        }
    }
    listener.on_close(None);
}

#[async_trait]
impl LiveTransport for LiveClient {
    async fn open(
        &self,
        api_key: &str,
        setup: SetupRequest,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn LiveConnection>, AgentError> {
        info!("Connecting to live endpoint {} (model {})", self.endpoint, setup.model);

        let url = format!("{}?key={}", self.endpoint, api_key);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| AgentError::TransportOpen(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let payload = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| AgentError::TransportOpen(format!("invalid setup message: {}", e)))?;
        sink.send(Message::Text(payload.into()))
            .await
            .map_err(|e| AgentError::TransportOpen(e.to_string()))?;

        tokio::time::timeout(self.setup_timeout, wait_for_setup(&mut stream))
            .await
            .map_err(|_| AgentError::TransportOpen("timed out waiting for setup".to_string()))??;

        info!("Live session open");

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, rx));
        let reader = tokio::spawn(read_loop(stream, listener));

        Ok(Box::new(WsConnection {
            tx,
            reader: Some(reader),
            writer: Some(writer),
        }))
    }
}

struct WsConnection {
    tx: mpsc::UnboundedSender<Outgoing>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl LiveConnection for WsConnection {
    fn send(&self, message: ClientMessage) -> Result<(), AgentError> {
        self.tx
            .send(Outgoing::Message(message))
            .map_err(|_| AgentError::Transport("connection is closed".to_string()))
    }

    fn close(&mut self) -> Result<(), AgentError> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        // Local close: the listener must not hear about it
        reader.abort();
        // The writer drains what is queued, then closes the socket
        self.writer.take();
        self.tx
            .send(Outgoing::Close)
            .map_err(|_| AgentError::Transport("writer already stopped".to_string()))
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = self.tx.send(Outgoing::Close);
        }
    }
}
