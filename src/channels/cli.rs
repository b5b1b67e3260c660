//! CLI channel — stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, ChannelEvent, EventStream, IncomingMessage, OutgoingResponse};
use crate::error::ChannelError;

/// A channel that reads messages from stdin and prints replies to stdout.
///
/// Every line is treated as a message from one fixed identity.
pub struct CliChannel {
    identity: String,
}

impl CliChannel {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let identity = self.identity.clone();

        let _ = tx.send(ChannelEvent::Ready);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let msg = IncomingMessage::new("cli", &identity, &line);
                        if tx.send(ChannelEvent::Message(msg)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(ChannelEvent::Disconnected {
                            reason: "stdin closed".to_string(),
                        });
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_reply(
        &self,
        _identity: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
