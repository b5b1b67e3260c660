//! WhatsApp channel — talks to a WhatsApp Web bridge over WebSocket.
//!
//! The bridge process drives the browser session (QR pairing, local auth
//! storage) and relays events to us as JSON frames tagged by `type`:
//!
//! - bridge → bot: `qr`, `authenticated`, `ready`, `message`, `disconnected`
//! - bot → bridge: `send`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::channels::{Channel, ChannelEvent, EventStream, IncomingMessage, OutgoingResponse};
use crate::error::ChannelError;

/// Longest text sent in a single bridge `send` frame.
const WHATSAPP_MAX_MESSAGE_LENGTH: usize = 4096;

const CHANNEL_NAME: &str = "whatsapp";

// ── JSON Protocol ───────────────────────────────────────────────────────

/// Frame from bridge → bot.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeEvent {
    Qr {
        code: String,
    },
    Authenticated,
    Ready,
    Message {
        from: String,
        body: String,
        #[serde(default)]
        id: Option<String>,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

/// Frame from bot → bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeCommand {
    Send { to: String, body: String },
}

impl BridgeEvent {
    fn into_channel_event(self) -> ChannelEvent {
        match self {
            Self::Qr { code } => ChannelEvent::CredentialReady { code },
            Self::Authenticated => ChannelEvent::Authenticated,
            Self::Ready => ChannelEvent::Ready,
            Self::Message { from, body, id } => {
                let mut msg = IncomingMessage::new(CHANNEL_NAME, &from, body.trim());
                if let Some(id) = id {
                    msg = msg.with_external_id(id);
                }
                ChannelEvent::Message(msg)
            }
            Self::Disconnected { reason } => ChannelEvent::Disconnected { reason },
        }
    }
}

// ── WhatsAppChannel ─────────────────────────────────────────────────────

/// A channel backed by a WhatsApp Web bridge.
///
/// `start()` opens the WebSocket and spawns one task that owns it: frames
/// from the bridge become `ChannelEvent`s, and replies queued by
/// `send_reply()` are written out as `send` frames.
pub struct WhatsAppChannel {
    url: String,
    /// Set once `start()` has connected.
    outgoing_tx: Mutex<Option<mpsc::UnboundedSender<BridgeCommand>>>,
    ready: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl WhatsAppChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outgoing_tx: Mutex::new(None),
            ready: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (mut socket, _resp) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| ChannelError::StartupFailed {
                    name: CHANNEL_NAME.into(),
                    reason: format!("cannot reach bridge at {}: {e}", self.url),
                })?;
        info!(url = %self.url, "Connected to WhatsApp bridge");

        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<BridgeCommand>();
        *self.outgoing_tx.lock().await = Some(outgoing_tx);

        let ready = Arc::clone(&self.ready);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let disconnect_reason = loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        let _ = socket.close(None).await;
                        break "channel shut down".to_string();
                    }

                    Some(command) = outgoing_rx.recv() => {
                        let json = match serde_json::to_string(&command) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode bridge command");
                                continue;
                            }
                        };
                        if let Err(e) = socket.send(Message::Text(json.into())).await {
                            break format!("send to bridge failed: {e}");
                        }
                    }

                    frame = socket.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<BridgeEvent>(&text) {
                                    Ok(event) => {
                                        let event = event.into_channel_event();
                                        match &event {
                                            ChannelEvent::Ready => ready.store(true, Ordering::SeqCst),
                                            ChannelEvent::Disconnected { .. } => {
                                                ready.store(false, Ordering::SeqCst)
                                            }
                                            _ => {}
                                        }
                                        if event_tx.send(event).is_err() {
                                            debug!("WhatsApp event receiver dropped");
                                            break "event receiver dropped".to_string();
                                        }
                                    }
                                    Err(e) => {
                                        debug!(error = %e, frame = %text.as_str(), "Ignoring unrecognized bridge frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if socket.send(Message::Pong(data)).await.is_err() {
                                    break "pong to bridge failed".to_string();
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                break "bridge closed the connection".to_string();
                            }
                            Some(Err(e)) => {
                                break format!("bridge connection error: {e}");
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            };

            ready.store(false, Ordering::SeqCst);
            info!(reason = %disconnect_reason, "WhatsApp bridge connection closed");
            let _ = event_tx.send(ChannelEvent::Disconnected {
                reason: disconnect_reason,
            });
        });

        let stream = stream::unfold(event_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_reply(
        &self,
        identity: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let guard = self.outgoing_tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or_else(|| Self::send_failed("channel not started"))?;

        for chunk in split_message(&response.content, WHATSAPP_MAX_MESSAGE_LENGTH) {
            tx.send(BridgeCommand::Send {
                to: identity.to_string(),
                body: chunk,
            })
            .map_err(|_| Self::send_failed("bridge connection closed"))?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChannelError::Disconnected {
                name: CHANNEL_NAME.into(),
                reason: "bridge not ready".into(),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.shutdown.notify_one();
        self.outgoing_tx.lock().await.take();
        Ok(())
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring to
/// break after a newline.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.chars().count() <= max_chars {
            chunks.push(rest.to_string());
            break;
        }
        // Byte offset of the first char past the limit.
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = rest[..limit]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(limit);
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks
}
