use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use receipt_bot::bot::{BotRuntime, MessageRouter, RuntimeConfig};
use receipt_bot::channels::{Channel, CliChannel, WhatsAppChannel};
use receipt_bot::config::BotConfig;
use receipt_bot::error::{ChannelError, Error};
use receipt_bot::store::{LibSqlBackend, UserStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🧾 Receipt Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.database_url);
    match &config.whatsapp_bridge_url {
        Some(url) => eprintln!("   WhatsApp bridge: {}", url),
        None => {
            eprintln!("   Channel: CLI (identity: {})", config.cli_identity);
            eprintln!("   Type a message and press Enter. Ctrl+D to exit.\n");
        }
    }

    // ── Database ─────────────────────────────────────────────────────────
    // Opened before the channel so no message arrives without a store.
    let store: Arc<dyn UserStore> = Arc::new(
        LibSqlBackend::open(&config.database_url)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(url = %config.database_url, error = %e, "Failed to open database");
                eprintln!("Error: Failed to open database at {}: {}", config.database_url, e);
                std::process::exit(1);
            }),
    );

    let users = store.count_users().await?;
    info!(users, "User store ready");

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.whatsapp_bridge_url {
        Some(url) => Arc::new(WhatsAppChannel::new(url.clone())),
        None => Arc::new(CliChannel::new(config.cli_identity.clone())),
    };

    let router = Arc::new(
        MessageRouter::new(store, config.store_timeout)
            .with_first_contact_window(config.first_contact_window),
    );
    let runtime = BotRuntime::new(
        router,
        channel,
        RuntimeConfig {
            max_in_flight: config.max_in_flight,
            health_interval: config.health_interval,
        },
    );

    match runtime.run().await {
        Ok(()) => Ok(()),
        // Closing stdin is how the CLI session ends.
        Err(Error::Channel(ChannelError::Disconnected { .. }))
            if config.whatsapp_bridge_url.is_none() =>
        {
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Bot stopped with an error");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Console logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "receipt-bot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(env_filter()),
        )
        .with(file_layer)
        .init();

    guard
}
