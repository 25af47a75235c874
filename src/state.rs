use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::store::{memory::MemoryStore, postgres::PgStore, Store};
use crate::tokens::repo::Tokens;
use crate::users::repo::Users;

#[derive(Clone)]
pub struct AppState {
    pub users: Users,
    pub tokens: Tokens,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Production wiring: env config, Postgres pool, startup migrations,
    /// system clock.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        Ok(Self::with_store(
            Arc::new(PgStore::new(pool)),
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Explicit wiring over any backend and clock.
    pub fn with_store(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            users: Users::new(store.clone(), clock.clone()),
            tokens: Tokens::new(store, clock),
            config,
        }
    }

    /// In-memory state for tests; no database required.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: "postgres://localhost/unused".into(),
            token_ttl_hours: 24,
            host: "127.0.0.1".into(),
            port: 0,
        });
        Self::with_store(Arc::new(MemoryStore::new()), Arc::new(SystemClock), config)
    }
}
