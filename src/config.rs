use anyhow::{Context, Result};
use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Where license records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!(
                "unknown STORE_BACKEND '{}' (expected postgres or memory)",
                other
            ),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Which record store to use.
    pub store_backend: StoreBackend,
    /// The URL of the PostgreSQL database.
    pub database_url: Option<String>,
    /// The URL of the Redis server. Rate limiting is off without it.
    pub redis_url: Option<String>,
    /// The Telegram bot token.
    pub telegram_bot_token: Zeroizing<String>,
    /// The only chat allowed to issue admin commands.
    pub telegram_admin_chat_id: i64,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` header value.
    pub telegram_webhook_secret: Option<Zeroizing<String>>,
    /// The Bot API base URL.
    pub telegram_api_base: String,
    /// The address to bind the HTTP listener to.
    pub bind_addr: IpAddr,
    /// The port to listen on.
    pub port: u16,
    /// Inactivity after which a session stops blocking other addresses.
    pub session_timeout: chrono::Duration,
    /// How often expired bindings are swept; `None` disables the sweep.
    pub session_sweep_interval: Option<Duration>,
    /// Validate and heartbeat calls allowed per client address per minute.
    pub validate_rate_limit_per_minute: u32,
    /// Whether to take the client address from `X-Forwarded-For`.
    pub trust_proxy_headers: bool,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Creates a new `Config` from an arbitrary variable source.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value of a variable, if set.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let store_backend: StoreBackend = parse_or(&var, "STORE_BACKEND", StoreBackend::Postgres)?;

        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set (or set STORE_BACKEND=memory)");
        }

        let telegram_bot_token = var("TELEGRAM_BOT_TOKEN")
            .map(Zeroizing::new)
            .context("TELEGRAM_BOT_TOKEN must be set")?;

        let telegram_admin_chat_id = var("TELEGRAM_ADMIN_CHAT_ID")
            .context("TELEGRAM_ADMIN_CHAT_ID must be set")?
            .trim()
            .parse()
            .context("TELEGRAM_ADMIN_CHAT_ID must be an integer chat id")?;

        let session_timeout_minutes: u32 = parse_or(&var, "SESSION_TIMEOUT_MINUTES", 60)?;
        if session_timeout_minutes == 0 {
            anyhow::bail!("SESSION_TIMEOUT_MINUTES must be greater than zero");
        }

        let sweep_secs: u64 = parse_or(&var, "SESSION_SWEEP_INTERVAL_SECS", 3600)?;

        Ok(Self {
            store_backend,
            database_url,
            redis_url: var("REDIS_URL"),
            telegram_bot_token,
            telegram_admin_chat_id,
            telegram_webhook_secret: var("TELEGRAM_WEBHOOK_SECRET").map(Zeroizing::new),
            telegram_api_base: var("TELEGRAM_API_BASE")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            bind_addr: parse_or(&var, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&var, "PORT", 3001)?,
            session_timeout: chrono::Duration::minutes(i64::from(session_timeout_minutes)),
            session_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            validate_rate_limit_per_minute: parse_or(&var, "VALIDATE_RATE_LIMIT_PER_MINUTE", 120)?,
            trust_proxy_headers: parse_bool_or(&var, "TRUST_PROXY_HEADERS", true)?,
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", name, e)),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(var: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name).map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("Invalid {}: expected true or false", name),
        },
        None => Ok(default),
    }
}
