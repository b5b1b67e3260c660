//! Bot runtime — connects a channel's event stream to the message router.
//!
//! Each identity gets a queue drained by its own worker task, so messages
//! from one contact are handled strictly in arrival order while different
//! contacts proceed concurrently. A semaphore bounds how many messages are
//! being handled at once across all workers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bot::router::MessageRouter;
use crate::channels::{
    Channel, ChannelEvent, IncomingMessage, OutgoingResponse, render_pairing_qr,
};
use crate::error::{ChannelError, Error};

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of messages handled concurrently.
    pub max_in_flight: usize,
    /// Period of `Channel::health_check` calls.
    pub health_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            health_interval: Duration::from_secs(60),
        }
    }
}

/// Owns the main event loop.
pub struct BotRuntime {
    router: Arc<MessageRouter>,
    channel: Arc<dyn Channel>,
    config: RuntimeConfig,
}

impl BotRuntime {
    /// The router's store must already be open: no message is accepted
    /// before `run` starts the channel.
    pub fn new(router: Arc<MessageRouter>, channel: Arc<dyn Channel>, config: RuntimeConfig) -> Self {
        Self {
            router,
            channel,
            config,
        }
    }

    /// Run until Ctrl+C or until the channel's event stream ends.
    pub async fn run(self) -> Result<(), Error> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Ctrl+C received, shutting down...");
        })
        .await
    }

    /// Run until `shutdown` resolves or the channel's event stream ends.
    ///
    /// On exit, messages already received are still answered, then the
    /// channel is shut down and the store closed. A stream that ends without
    /// a shutdown request is reported as `ChannelError::Disconnected`.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.channel.start().await?;
        info!(channel = self.channel.name(), "Channel started");

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<String>();
        let mut dispatcher = Dispatcher {
            router: Arc::clone(&self.router),
            channel: Arc::clone(&self.channel),
            permits: Arc::new(Semaphore::new(self.config.max_in_flight.max(1))),
            done_tx,
            queues: HashMap::new(),
            workers: JoinSet::new(),
        };

        let period = self.config.health_interval.max(Duration::from_millis(1));
        let mut health = tokio::time::interval_at(Instant::now() + period, period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Set when the channel went away on its own.
        let mut lost: Option<String> = None;
        let mut last_disconnect: Option<String> = None;

        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(identity) = done_rx.recv() => {
                    dispatcher.message_done(&identity);
                    continue;
                }
                Some(result) = dispatcher.workers.join_next(), if !dispatcher.workers.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "Identity worker failed");
                    }
                    continue;
                }
                _ = health.tick() => {
                    match self.channel.health_check().await {
                        Ok(()) => debug!(channel = self.channel.name(), "Channel healthy"),
                        Err(e) => warn!(error = %e, "Channel health check failed"),
                    }
                    continue;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        warn!("Channel event stream ended, shutting down...");
                        lost = Some(
                            last_disconnect
                                .take()
                                .unwrap_or_else(|| "event stream ended".to_string()),
                        );
                        break;
                    }
                },
            };

            match event {
                ChannelEvent::CredentialReady { code } => show_pairing_code(&code),
                ChannelEvent::Authenticated => info!("Authentication successful"),
                ChannelEvent::Ready => info!(channel = self.channel.name(), "Channel is ready"),
                ChannelEvent::Disconnected { reason } => {
                    warn!(reason = %reason, "Channel disconnected");
                    last_disconnect = Some(reason);
                }
                ChannelEvent::Message(msg) => dispatcher.enqueue(msg),
            }
        }

        dispatcher.drain().await;

        if let Err(e) = self.channel.shutdown().await {
            warn!(error = %e, "Channel shutdown failed");
        }
        if let Err(e) = self.router.store().close().await {
            warn!(error = %e, "Store close failed");
        }
        info!("Bot stopped");

        match lost {
            Some(reason) => Err(ChannelError::Disconnected {
                name: self.channel.name().to_string(),
                reason,
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Draw the pairing QR code on stderr for the operator to scan.
fn show_pairing_code(code: &str) {
    debug!(code = %code, "Pairing code received");
    match render_pairing_qr(code) {
        Ok(art) => {
            eprintln!("\nScan this QR code with WhatsApp (Settings > Linked devices):\n");
            eprintln!("{art}");
            info!("QR code displayed, waiting for the phone to pair");
        }
        Err(e) => {
            warn!(error = %e, "Cannot draw the QR code, pair with the raw code instead");
            info!(code = %code, "Pairing code");
        }
    }
}

struct IdentityQueue {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    /// Messages sent to the worker and not yet reported done.
    pending: usize,
}

struct Dispatcher {
    router: Arc<MessageRouter>,
    channel: Arc<dyn Channel>,
    permits: Arc<Semaphore>,
    done_tx: mpsc::UnboundedSender<String>,
    queues: HashMap<String, IdentityQueue>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    fn enqueue(&mut self, msg: IncomingMessage) {
        debug!(id = %msg.id, identity = %msg.identity, "Inbound message");
        let identity = msg.identity.clone();

        let msg = match self.queues.get_mut(&identity) {
            Some(queue) => match queue.tx.send(msg) {
                Ok(()) => {
                    queue.pending += 1;
                    return;
                }
                // Worker is gone (it panicked); start a fresh one below.
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.workers.spawn(identity_worker(
            identity.clone(),
            rx,
            Arc::clone(&self.router),
            Arc::clone(&self.channel),
            Arc::clone(&self.permits),
            self.done_tx.clone(),
        ));
        // The receiver is alive in the worker we just spawned.
        let _ = tx.send(msg);
        self.queues.insert(identity, IdentityQueue { tx, pending: 1 });
    }

    fn message_done(&mut self, identity: &str) {
        let Some(queue) = self.queues.get_mut(identity) else {
            return;
        };
        queue.pending = queue.pending.saturating_sub(1);
        if queue.pending == 0 {
            // Dropping the sender lets the idle worker exit.
            self.queues.remove(identity);
        }
    }

    /// Close every queue and wait for the workers to finish what they have.
    async fn drain(mut self) {
        self.queues.clear();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Identity worker failed");
            }
        }
    }
}

async fn identity_worker(
    identity: String,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    router: Arc<MessageRouter>,
    channel: Arc<dyn Channel>,
    permits: Arc<Semaphore>,
    done_tx: mpsc::UnboundedSender<String>,
) {
    while let Some(msg) = rx.recv().await {
        let Ok(_permit) = permits.acquire().await else {
            break;
        };

        let reply = router
            .handle_inbound_at(&msg.identity, &msg.content, msg.received_at)
            .await;
        if !reply.is_success() {
            warn!(id = %msg.id, identity = %msg.identity, "Replying with failure notice");
        }

        if let Err(e) = channel
            .send_reply(&msg.identity, OutgoingResponse::text(reply.text))
            .await
        {
            warn!(id = %msg.id, identity = %msg.identity, error = %e, "Failed to deliver reply");
        }

        let _ = done_tx.send(identity.clone());
    }
}
