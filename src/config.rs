//! Configuration types.
//!
//! Everything is read from the process environment once at startup. Each
//! setting has a local default so the bot runs with no configuration at all.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default libSQL database location.
pub const DEFAULT_DATABASE_URL: &str = "./data/receipt-bot.db";

/// Default identity for messages typed into the CLI channel.
pub const DEFAULT_CLI_IDENTITY: &str = "local-user";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Store location: a local file path or `:memory:`.
    pub database_url: String,
    /// Upper bound on each store call made while handling a message.
    pub store_timeout: Duration,
    /// Maximum number of inbound messages handled concurrently.
    pub max_in_flight: usize,
    /// Messages this soon after a user's first contact are greeted again
    /// instead of being taken as onboarding answers.
    pub first_contact_window: Duration,
    /// How often the runtime checks the channel's health.
    pub health_interval: Duration,
    /// WebSocket URL of the WhatsApp bridge. `None` selects the CLI channel.
    pub whatsapp_bridge_url: Option<String>,
    /// Identity attached to CLI messages.
    pub cli_identity: String,
    /// Directory for rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            store_timeout: Duration::from_secs(5),
            max_in_flight: 64,
            first_contact_window: Duration::from_secs(2),
            health_interval: Duration::from_secs(60),
            whatsapp_bridge_url: None,
            cli_identity: DEFAULT_CLI_IDENTITY.to_string(),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = non_empty(lookup("RECEIPT_BOT_DATABASE_URL"))
            .unwrap_or(defaults.database_url);

        let store_timeout = match non_empty(lookup("RECEIPT_BOT_STORE_TIMEOUT_MS")) {
            Some(raw) => Duration::from_millis(parse_positive("RECEIPT_BOT_STORE_TIMEOUT_MS", &raw)?),
            None => defaults.store_timeout,
        };

        let max_in_flight = match non_empty(lookup("RECEIPT_BOT_MAX_IN_FLIGHT")) {
            Some(raw) => parse_positive("RECEIPT_BOT_MAX_IN_FLIGHT", &raw)? as usize,
            None => defaults.max_in_flight,
        };

        let first_contact_window =
            match non_empty(lookup("RECEIPT_BOT_FIRST_CONTACT_WINDOW_MS")) {
                Some(raw) => Duration::from_millis(parse_number(
                    "RECEIPT_BOT_FIRST_CONTACT_WINDOW_MS",
                    &raw,
                )?),
                None => defaults.first_contact_window,
            };

        let health_interval = match non_empty(lookup("RECEIPT_BOT_HEALTH_INTERVAL_SECS")) {
            Some(raw) => Duration::from_secs(parse_positive("RECEIPT_BOT_HEALTH_INTERVAL_SECS", &raw)?),
            None => defaults.health_interval,
        };

        let cli_identity = non_empty(lookup("RECEIPT_BOT_CLI_IDENTITY"))
            .unwrap_or(defaults.cli_identity);

        Ok(Self {
            database_url,
            store_timeout,
            max_in_flight,
            first_contact_window,
            health_interval,
            whatsapp_bridge_url: non_empty(lookup("WHATSAPP_BRIDGE_URL")),
            cli_identity,
            log_dir: non_empty(lookup("RECEIPT_BOT_LOG_DIR")).map(PathBuf::from),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?} is not a number: {e}"),
    })
}

fn parse_positive(key: &str, raw: &str) -> Result<u64, ConfigError> {
    let value = parse_number(key, raw)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
