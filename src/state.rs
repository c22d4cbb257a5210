use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::{
    config::{Config, StoreBackend},
    error::{AppError, Result},
    repositories::{
        license::{LicenseStore, PgLicenseStore},
        memory::MemoryLicenseStore,
    },
    services::{
        session::SessionPolicy,
        telegram::{ChatReplier, TelegramClient},
    },
};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The license record store.
    pub store: Arc<dyn LicenseStore>,
    /// The Redis connection manager, when rate limiting is enabled.
    pub redis: Option<ConnectionManager>,
    /// Sends replies to the admin chat.
    pub replier: Arc<dyn ChatReplier>,
    /// The session timeout policy.
    pub policy: SessionPolicy,
    /// The application's configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates a new `AppState`, connecting every configured backend.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn LicenseStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    AppError::Internal(
                        "DATABASE_URL is required for the postgres store".to_string(),
                    )
                })?;
                let pool = crate::db::create_pool(url)?;
                crate::db::migrate(&pool).await?;
                tracing::info!("✅ PostgreSQL pool initialized");
                Arc::new(PgLicenseStore::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("⚠️ Using the in-memory store; records are lost on restart");
                Arc::new(MemoryLicenseStore::new())
            }
        };

        let redis = match config.redis_url.as_deref() {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (rate limiting on)");
                Some(manager)
            }
            None => {
                tracing::info!("ℹ️ REDIS_URL not set; rate limiting disabled");
                None
            }
        };

        let replier = Arc::new(TelegramClient::new(
            &config.telegram_api_base,
            &config.telegram_bot_token,
        )?);
        tracing::info!("✅ Telegram client initialized");

        Ok(Self::with_parts(config.clone(), store, redis, replier))
    }

    /// Assembles a state from already constructed parts.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn LicenseStore>,
        redis: Option<ConnectionManager>,
        replier: Arc<dyn ChatReplier>,
    ) -> Self {
        Self {
            store,
            redis,
            replier,
            policy: SessionPolicy::new(config.session_timeout),
            config: Arc::new(config),
        }
    }
}
