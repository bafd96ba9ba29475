use anyhow::{bail, Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{parse_server_event, RealtimeInputMessage, SetupMessage};
use super::{LiveChannel, LiveConfig, LiveConnector, LiveEvent, LiveSink};
use crate::audio::PcmChunk;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

const EVENT_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gemini Live API over WebSocket
pub struct GeminiConnector {
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiConnector {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_defaults(api_key: impl Into<String>) -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL, api_key)
    }
}

#[async_trait::async_trait]
impl LiveConnector for GeminiConnector {
    async fn open(&self, config: &LiveConfig) -> Result<LiveChannel> {
        if self.api_key.is_empty() {
            bail!("No API key configured");
        }

        info!("Connecting to live service at {}", self.endpoint);

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let (ws, _response) = connect_async(url)
            .await
            .context("Failed to connect to live service")?;

        let (mut ws_tx, ws_rx) = ws.split();

        let setup = serde_json::to_string(&SetupMessage::new(&self.model, config))?;
        ws_tx
            .send(Message::Text(setup.into()))
            .await
            .context("Failed to send setup message")?;

        info!(
            "Setup sent (model={}, voice={})",
            self.model, config.voice_name
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(read_events(ws_rx, event_tx));

        Ok(LiveChannel {
            sink: Box::new(GeminiSink {
                ws_tx,
                closed: false,
            }),
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "Gemini Live"
    }
}

/// Forward socket messages as events until the socket or the receiver goes away
async fn read_events(mut ws_rx: SplitStream<WsStream>, tx: mpsc::Sender<LiveEvent>) {
    debug!("Live event reader started");

    while let Some(message) = ws_rx.next().await {
        let parsed = match message {
            Ok(Message::Text(text)) => parse_server_event(text.as_bytes()),
            Ok(Message::Binary(bytes)) => parse_server_event(&bytes),
            Ok(Message::Close(frame)) => {
                let event = match frame {
                    Some(frame) if frame.code != CloseCode::Normal => {
                        warn!("Live service closed the channel: {} {}", frame.code, frame.reason.as_str());
                        LiveEvent::Error(format!("{} ({})", frame.reason.as_str(), frame.code))
                    }
                    _ => {
                        info!("Live service closed the channel");
                        LiveEvent::Close
                    }
                };
                let _ = tx.send(event).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("Live channel error: {}", e);
                let _ = tx.send(LiveEvent::Error(e.to_string())).await;
                return;
            }
        };

        match parsed {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    debug!("Session dropped its event receiver");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to parse server message: {}", e),
        }
    }

    let _ = tx.send(LiveEvent::Close).await;
    debug!("Live event reader stopped");
}

struct GeminiSink {
    ws_tx: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait::async_trait]
impl LiveSink for GeminiSink {
    async fn send(&mut self, chunk: PcmChunk) -> Result<()> {
        if self.closed {
            bail!("Channel is closed");
        }

        let payload = serde_json::to_string(&RealtimeInputMessage::audio(chunk))?;
        self.ws_tx
            .send(Message::Text(payload.into()))
            .await
            .context("Failed to send audio chunk")
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            bail!("Channel already closed");
        }
        self.closed = true;

        info!("Closing live channel");
        self.ws_tx
            .close()
            .await
            .context("Failed to close live channel")
    }
}
