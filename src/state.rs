use std::sync::Arc;

use crate::{
    auth::repo::{PermissionStore, TokenStore, UserStore},
    background::Background,
    config::AppConfig,
    db::PgStore,
    mailer::{LogMailer, Mailer},
    memory::MemoryStore,
    movies::repo::MovieStore,
    rate_limit::RateLimiter,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
    pub mailer: Arc<dyn Mailer>,
    pub background: Background,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Connects to PostgreSQL and applies pending migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = PgStore::connect(&config.db).await?;
        store.migrate().await?;
        tracing::info!("database connection pool established");

        Ok(Self::from_store(config, store, Arc::new(LogMailer)))
    }

    /// Every store trait served by one backing store.
    pub fn from_store<S>(config: AppConfig, store: S, mailer: Arc<dyn Mailer>) -> Self
    where
        S: UserStore + TokenStore + PermissionStore + MovieStore + Clone + 'static,
    {
        Self {
            rate_limiter: RateLimiter::new(&config.limiter),
            config: Arc::new(config),
            users: Arc::new(store.clone()),
            tokens: Arc::new(store.clone()),
            permissions: Arc::new(store.clone()),
            movies: Arc::new(store),
            mailer,
            background: Background::new(),
        }
    }

    pub fn in_memory(config: AppConfig, mailer: Arc<dyn Mailer>) -> (Self, MemoryStore) {
        let store = MemoryStore::new();
        (Self::from_store(config, store.clone(), mailer), store)
    }
}
